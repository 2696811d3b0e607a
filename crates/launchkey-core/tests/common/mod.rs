#![allow(dead_code)]

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use launchkey_core::time_sync::format_service_time;
use launchkey_core::{
    ApiRequest, ApiResponse, Config, Credentials, Keypair, Method, Result, Transport, PING_PATH,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use zeroize::Zeroizing;

pub const APP_ID: u64 = 42;
pub const APP_SECRET: &str = "s3cr3t";

type Responder = Box<dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync>;

/// In-process stand-in for the service: answers pings, checks every other
/// call's signature and secret, then hands off to a per-test responder.
pub struct MockService {
    pub key: Keypair,
    app_public: Keypair,
    clock_offset: Duration,
    ping_delay: Option<std::time::Duration>,
    failing_pings: AtomicUsize,
    pings: AtomicUsize,
    requests: Mutex<Vec<ApiRequest>>,
    secrets: Mutex<Vec<Value>>,
    responder: Responder,
}

impl MockService {
    pub fn new(app: &Keypair) -> Self {
        Self {
            key: Keypair::generate(1024).unwrap(),
            app_public: app.public_key(),
            clock_offset: Duration::zero(),
            ping_delay: None,
            failing_pings: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            secrets: Mutex::new(Vec::new()),
            responder: Box::new(|_| ok(json!({"message": "Successfully updated"}))),
        }
    }

    pub fn with_clock_offset(mut self, offset: Duration) -> Self {
        self.clock_offset = offset;
        self
    }

    pub fn with_ping_delay(mut self, delay: std::time::Duration) -> Self {
        self.ping_delay = Some(delay);
        self
    }

    pub fn with_failing_pings(self, count: usize) -> Self {
        self.failing_pings.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_responder(
        mut self,
        responder: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static,
    ) -> Self {
        self.responder = Box::new(responder);
        self
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    /// Decrypted `secret_key` payloads, in arrival order.
    pub fn secrets(&self) -> Vec<Value> {
        self.secrets.lock().clone()
    }

    pub fn service_now(&self) -> chrono::DateTime<Utc> {
        Utc::now() + self.clock_offset
    }

    /// Encrypt an auth decision for the app the way the service does.
    pub fn auth_blob(&self, response: Value, auth_request: &str) -> String {
        let plain = json!({
            "response": response,
            "auth_request": auth_request,
            "app_pins": "",
            "device_id": "dev-1",
        })
        .to_string();
        general_purpose::STANDARD.encode(self.app_public.public_encrypt(plain.as_bytes()).unwrap())
    }

    /// Sign a deorbit payload stamped at `service_time`.
    pub fn deorbit(&self, service_time: chrono::DateTime<Utc>, user_hash: &str) -> (String, String) {
        let payload = json!({
            "launchkey_time": format_service_time(service_time),
            "user_hash": user_hash,
        })
        .to_string();
        let signature = general_purpose::STANDARD.encode(self.key.sign(payload.as_bytes()).unwrap());
        (signature, payload)
    }

    fn ping(&self) -> ApiResponse {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.ping_delay {
            std::thread::sleep(delay);
        }
        let failing = self
            .failing_pings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return ApiResponse {
                status: 500,
                body: json!({"successful": false, "message": "Ping failed", "message_code": 60401}),
            };
        }
        let public = self.key.public_key().export(None).unwrap();
        ok(json!({
            "key": public.as_str(),
            "launchkey_time": format_service_time(self.service_now()),
        }))
    }

    fn check_signed(&self, request: &ApiRequest) -> std::result::Result<Value, ApiResponse> {
        let field = |name: &str| {
            request
                .params
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(signature_mismatch)
        };
        if field("app_key")? != APP_ID.to_string() {
            return Err(signature_mismatch());
        }
        let ciphertext = general_purpose::STANDARD
            .decode(field("secret_key")?)
            .map_err(|_| signature_mismatch())?;
        let signature = general_purpose::STANDARD
            .decode(field("signature")?)
            .map_err(|_| signature_mismatch())?;
        if !self.app_public.verify(&signature, &ciphertext) {
            return Err(signature_mismatch());
        }
        let plain = self
            .key
            .private_decrypt(&ciphertext)
            .map_err(|_| signature_mismatch())?;
        let secret: Value = serde_json::from_slice(&plain).map_err(|_| signature_mismatch())?;
        if secret["secret"] != APP_SECRET {
            return Err(signature_mismatch());
        }
        Ok(secret)
    }
}

impl Transport for MockService {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.requests.lock().push(request.clone());
        if request.method == Method::Get && request.path == PING_PATH {
            return Ok(self.ping());
        }
        match self.check_signed(request) {
            Ok(secret) => {
                self.secrets.lock().push(secret);
                Ok((self.responder)(request))
            }
            Err(rejection) => Ok(rejection),
        }
    }
}

pub fn ok(body: Value) -> ApiResponse {
    ApiResponse { status: 200, body }
}

pub fn failure(status: u16, code: u32, message: &str) -> ApiResponse {
    ApiResponse {
        status,
        body: json!({"successful": false, "message": message, "message_code": code}),
    }
}

fn signature_mismatch() -> ApiResponse {
    failure(401, 40428, "Invalid signature")
}

pub fn credentials_with(key: Keypair) -> Credentials {
    Config {
        domain: Some("https://example.com".into()),
        app_id: Some(APP_ID),
        app_secret: Some(Zeroizing::new(APP_SECRET.into())),
        keypair: Some(Arc::new(key)),
        ..Config::default()
    }
    .validate()
    .unwrap()
}

pub fn credentials() -> Credentials {
    credentials_with(Keypair::generate(1024).unwrap())
}
