//! The seam between the protocol core and the network.
//!
//! The core only ever hands a [`Transport`] a fully prepared [`ApiRequest`];
//! connection handling lives entirely behind the trait.

use crate::config::Config;
use crate::error::{LaunchKeyError, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde_json::{Map, Value};
use std::fmt;

pub type Params = Map<String, Value>;

pub const USER_AGENT: &str = concat!("launchkey-rust/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// GET and DELETE carry their parameters in the query string.
    pub fn uses_query(self) -> bool {
        matches!(self, Method::Get | Method::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub params: Params,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>, params: Params) -> Self {
        Self {
            method,
            path: path.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

pub trait Transport: Send + Sync {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        (**self).execute(request)
    }
}

/// Blocking HTTPS transport against the configured endpoint.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.endpoint)
            .map_err(|e| LaunchKeyError::Transport(format!("endpoint {}: {e}", config.endpoint)))?;
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.http_open_timeout)
            .timeout(config.http_read_timeout);
        if let Some(path) = &config.ca_bundle_path {
            let pem = std::fs::read(path)?;
            let cert = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(cert);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| LaunchKeyError::Transport(format!("path {path}: {e}")))
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(&request.path)?;
        let pairs = form_pairs(&request.params);
        let builder = match request.method {
            Method::Get => self.client.get(url).query(&pairs),
            Method::Delete => self.client.delete(url).query(&pairs),
            Method::Post => self.client.post(url).form(&pairs),
            Method::Put => self.client.put(url).form(&pairs),
        };
        let res = builder.header(ACCEPT, "application/json").send()?;

        let status = res.status().as_u16();
        let is_json = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("json"))
            .unwrap_or(false);
        let text = res.text()?;
        let body = if is_json {
            match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(_) => Value::String(text),
            }
        } else {
            Value::String(text)
        };
        Ok(ApiResponse { status, body })
    }
}

/// Flatten parameters into url-encoded pairs; nested values go as JSON.
pub fn form_pairs(params: &Params) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect()
}
