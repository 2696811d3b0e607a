use crate::config::Credentials;
use crate::error::{LaunchKeyError, Result};
use crate::response::{classify, ApiErrorKind, Outcome};
use crate::signer::{PeerSnapshot, RequestSigner};
use crate::transport::{ApiRequest, Method, Params, Transport};
use crate::webhook::{DeorbitVerdict, WebhookVerifier};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use tracing::{debug, info};

const LOG_UPDATED: &str = "Successfully updated";

/// Log actions reported back to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogAction {
    Authenticate,
    Revoke,
}

impl LogAction {
    fn as_str(self) -> &'static str {
        match self {
            LogAction::Authenticate => "Authenticate",
            LogAction::Revoke => "Revoke",
        }
    }
}

/// One application session against the service.
pub struct Client<T: Transport> {
    signer: RequestSigner,
    transport: T,
}

impl<T: Transport> Client<T> {
    pub fn new(credentials: Credentials, transport: T) -> Self {
        Self::with_signer(RequestSigner::new(credentials), transport)
    }

    pub fn with_signer(signer: RequestSigner, transport: T) -> Self {
        Self { signer, transport }
    }

    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Force a resync with the service.
    pub fn ping(&self) -> Result<PeerSnapshot> {
        self.signer.resync(&self.transport)
    }

    /// Sign (unless it is the ping), send and classify a call.
    pub fn call(&self, method: Method, path: &str, params: Params) -> Result<Outcome> {
        let params = self.signer.sign(&self.transport, method, path, params)?;
        let request = ApiRequest::new(method, path, params);
        let response = self.transport.execute(&request)?;
        Ok(classify(response.status, &response.body))
    }

    /// Like [`Client::call`], but a pending reply is an error too.
    pub fn request(&self, method: Method, path: &str, params: Params) -> Result<Value> {
        match self.call(method, path, params)? {
            Outcome::Success(body) => Ok(body),
            Outcome::Pending(err) | Outcome::Failure(err) => Err(err.into()),
        }
    }

    /// Start an authorization for `username`, returning the auth request token.
    pub fn authorize(&self, username: &str) -> Result<String> {
        let body = self.request(Method::Post, "auths", params(json!({ "username": username })))?;
        let auth_request = body
            .get("auth_request")
            .and_then(Value::as_str)
            .ok_or_else(|| LaunchKeyError::Encoding("auths response missing auth_request".into()))?;
        info!(auth_request, "authorization requested");
        Ok(auth_request.to_string())
    }

    /// `None` while the user has not answered yet.
    pub fn poll_request(&self, auth_request: &str) -> Result<Option<Value>> {
        let outcome = self.call(
            Method::Get,
            "poll",
            params(json!({ "auth_request": auth_request })),
        )?;
        match outcome {
            Outcome::Success(body) => Ok(Some(body)),
            Outcome::Pending(_) => Ok(None),
            Outcome::Failure(err) => Err(err.into()),
        }
    }

    /// Decrypt the `auth` value of a poll response and report the decision
    /// back to the service. True only if the user accepted and the service
    /// acknowledged the log entry.
    pub fn authorized(&self, auth_response: &str) -> Result<bool> {
        let compact: String = auth_response.chars().filter(|c| !c.is_whitespace()).collect();
        let crypted = general_purpose::STANDARD.decode(compact)?;
        let plain = self.signer.credentials().keypair.private_decrypt(&crypted)?;
        let auth: Value = serde_json::from_slice(&plain)?;

        let accepted = match auth.get("response") {
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            Some(Value::Bool(b)) => *b,
            _ => false,
        };
        let auth_request = auth
            .get("auth_request")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());

        match auth_request {
            Some(auth_request) if accepted => {
                self.notify(LogAction::Authenticate, true, Some(auth_request))
            }
            auth_request => {
                self.notify(LogAction::Authenticate, false, auth_request)?;
                Ok(false)
            }
        }
    }

    /// Tell the service the user's session has ended.
    pub fn deauthorize(&self, auth_request: &str) -> Result<bool> {
        self.notify(LogAction::Revoke, true, Some(auth_request))
    }

    /// Verify a deorbit webhook with peer state at least as fresh as the one
    /// used for signing.
    pub fn deorbit(&self, signature: &str, payload: &str) -> Result<DeorbitVerdict> {
        let snapshot = self.signer.ensure_fresh(&self.transport)?;
        Ok(WebhookVerifier::from(&snapshot).verify(signature, payload))
    }

    fn notify(&self, action: LogAction, status: bool, auth_request: Option<&str>) -> Result<bool> {
        let body = self.request(
            Method::Put,
            "logs",
            params(json!({
                "action": action.as_str(),
                "status": status,
                "auth_request": auth_request,
            })),
        )?;
        let acknowledged = body.get("message").and_then(Value::as_str) == Some(LOG_UPDATED);
        debug!(action = action.as_str(), status, acknowledged, "log notified");
        Ok(acknowledged && status)
    }
}

/// True when `err` is the service saying an auth request is still pending.
pub fn is_pending(err: &LaunchKeyError) -> bool {
    matches!(err, LaunchKeyError::Api(api) if api.kind == ApiErrorKind::AuthRequestPending)
}

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}
