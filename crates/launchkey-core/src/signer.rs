//! Outbound request signing.
//!
//! Every call other than the ping carries `app_key`, `secret_key` and
//! `signature`. `secret_key` is the application secret plus a service-clock
//! timestamp, encrypted under the service's public key; `signature` is the
//! application's signature over that ciphertext.

use crate::config::Credentials;
use crate::error::{LaunchKeyError, Result};
use crate::keypair::Keypair;
use crate::response::{classify, Outcome};
use crate::time_sync::{format_service_time, parse_service_time, TimeSync};
use crate::transport::{ApiRequest, Method, Params, Transport};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

pub const PING_PATH: &str = "/v1/ping";

/// The ping bootstraps the peer key and skew, so it is never signed.
pub fn is_ping(method: Method, path: &str) -> bool {
    if method != Method::Get {
        return false;
    }
    let path = path.split('?').next().unwrap_or_default().trim_end_matches('/');
    path == PING_PATH || path == "ping" || path == PING_PATH.trim_start_matches('/')
}

#[derive(Debug, Deserialize)]
struct PingBody {
    key: String,
    launchkey_time: String,
}

#[derive(Serialize)]
struct SecretPlaintext<'a> {
    secret: &'a str,
    stamped: String,
}

/// The three parameters attached to a single signed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    pub app_key: String,
    pub secret_key: String,
    pub signature: String,
}

impl SignedEnvelope {
    /// Signed values replace any caller parameter with the same name.
    pub fn merge_into(self, params: &mut Params) {
        params.insert("app_key".into(), Value::String(self.app_key));
        params.insert("secret_key".into(), Value::String(self.secret_key));
        params.insert("signature".into(), Value::String(self.signature));
    }
}

/// Peer key and clock state as of the last resync.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub peer_key: Arc<Keypair>,
    pub sync: TimeSync,
}

#[derive(Debug, Default)]
struct SessionState {
    sync: TimeSync,
    peer_key: Option<Arc<Keypair>>,
}

impl SessionState {
    fn stale(&self) -> bool {
        self.peer_key.is_none() || self.sync.needs_resync()
    }

    fn snapshot(&self) -> Option<PeerSnapshot> {
        self.peer_key.as_ref().map(|peer_key| PeerSnapshot {
            peer_key: peer_key.clone(),
            sync: self.sync.clone(),
        })
    }
}

pub struct RequestSigner {
    credentials: Credentials,
    state: Mutex<SessionState>,
}

impl RequestSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Like [`RequestSigner::new`] with a non-default freshness window.
    pub fn with_window(credentials: Credentials, window: Duration) -> Self {
        Self {
            credentials,
            state: Mutex::new(SessionState {
                sync: TimeSync::new(window),
                peer_key: None,
            }),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Current peer state without touching the network.
    pub fn snapshot(&self) -> Option<PeerSnapshot> {
        self.state.lock().snapshot()
    }

    /// Return fresh peer state, pinging first if it is missing or stale.
    ///
    /// The lock is held across the ping: concurrent callers that find the
    /// state stale queue behind the one doing the resync and then reuse its
    /// result.
    pub fn ensure_fresh(&self, transport: &dyn Transport) -> Result<PeerSnapshot> {
        let mut state = self.state.lock();
        if state.stale() {
            resync_locked(&mut state, transport)?;
        }
        state
            .snapshot()
            .ok_or_else(|| LaunchKeyError::Crypto("peer key unavailable after resync".into()))
    }

    /// Ping unconditionally.
    pub fn resync(&self, transport: &dyn Transport) -> Result<PeerSnapshot> {
        let mut state = self.state.lock();
        resync_locked(&mut state, transport)?;
        state
            .snapshot()
            .ok_or_else(|| LaunchKeyError::Crypto("peer key unavailable after resync".into()))
    }

    pub fn sign(
        &self,
        transport: &dyn Transport,
        method: Method,
        path: &str,
        params: Params,
    ) -> Result<Params> {
        if is_ping(method, path) {
            return Ok(params);
        }
        let snapshot = self.ensure_fresh(transport)?;
        let envelope = self.envelope(&snapshot, Utc::now())?;
        debug!(%method, path, "request signed");
        let mut params = params;
        envelope.merge_into(&mut params);
        Ok(params)
    }

    pub fn envelope(&self, snapshot: &PeerSnapshot, local_now: DateTime<Utc>) -> Result<SignedEnvelope> {
        let plaintext = SecretPlaintext {
            secret: self.credentials.app_secret.as_str(),
            stamped: format_service_time(snapshot.sync.adjusted_at(local_now)),
        };
        let raw = Zeroizing::new(serde_json::to_vec(&plaintext)?);
        let ciphertext = snapshot.peer_key.public_encrypt(&raw)?;
        let signature = self.credentials.keypair.sign(&ciphertext)?;
        Ok(SignedEnvelope {
            app_key: self.credentials.app_id.to_string(),
            secret_key: general_purpose::STANDARD.encode(&ciphertext),
            signature: general_purpose::STANDARD.encode(signature),
        })
    }
}

fn resync_locked(state: &mut SessionState, transport: &dyn Transport) -> Result<()> {
    let request = ApiRequest::new(Method::Get, PING_PATH, Params::new());
    let response = transport.execute(&request)?;
    let body = match classify(response.status, &response.body) {
        Outcome::Success(body) => body,
        Outcome::Pending(err) | Outcome::Failure(err) => return Err(err.into()),
    };
    let ping: PingBody = serde_json::from_value(body)?;
    let server_time = parse_service_time(&ping.launchkey_time)?;
    let peer_key = Keypair::from_wrapped_public_key(&ping.key)?;

    state.sync.record(server_time, Utc::now());
    info!(
        fingerprint = peer_key.fingerprint(),
        skew_ms = state.sync.skew().num_milliseconds(),
        "resynced with service"
    );
    state.peer_key = Some(Arc::new(peer_key));
    Ok(())
}
