//! Verification of deorbit webhooks pushed by the service.
//!
//! A forged or replayed delivery is an expected input here, so the outcome is
//! always a [`DeorbitVerdict`] value rather than an error.

use crate::keypair::Keypair;
use crate::signer::PeerSnapshot;
use crate::time_sync::{parse_service_time, TimeSync};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct DeorbitPayload {
    pub launchkey_time: String,
    pub user_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BadSignatureEncoding,
    SignatureMismatch,
    MalformedPayload,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeorbitVerdict {
    Authentic {
        user_hash: String,
        stamped: DateTime<Utc>,
    },
    Rejected(RejectReason),
}

impl DeorbitVerdict {
    pub fn is_authentic(&self) -> bool {
        matches!(self, DeorbitVerdict::Authentic { .. })
    }

    pub fn user_hash(&self) -> Option<&str> {
        match self {
            DeorbitVerdict::Authentic { user_hash, .. } => Some(user_hash),
            DeorbitVerdict::Rejected(_) => None,
        }
    }
}

pub struct WebhookVerifier {
    peer_key: Arc<Keypair>,
    sync: TimeSync,
}

impl WebhookVerifier {
    pub fn new(peer_key: Arc<Keypair>, sync: TimeSync) -> Self {
        Self { peer_key, sync }
    }

    pub fn verify(&self, signature: &str, payload: &str) -> DeorbitVerdict {
        self.verify_at(signature, payload, Utc::now())
    }

    /// Verify against an explicit local "now".
    pub fn verify_at(&self, signature: &str, payload: &str, now: DateTime<Utc>) -> DeorbitVerdict {
        let compact: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
        let signature = match general_purpose::STANDARD.decode(compact) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "deorbit rejected: signature is not base64");
                return DeorbitVerdict::Rejected(RejectReason::BadSignatureEncoding);
            }
        };
        if !self.peer_key.verify(&signature, payload.as_bytes()) {
            warn!("deorbit rejected: signature mismatch");
            return DeorbitVerdict::Rejected(RejectReason::SignatureMismatch);
        }

        let parsed: DeorbitPayload = match serde_json::from_str(payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "deorbit rejected: malformed payload");
                return DeorbitVerdict::Rejected(RejectReason::MalformedPayload);
            }
        };
        let stamped = match parse_service_time(&parsed.launchkey_time) {
            Ok(stamped) => stamped,
            Err(err) => {
                warn!(error = %err, "deorbit rejected: unreadable timestamp");
                return DeorbitVerdict::Rejected(RejectReason::MalformedPayload);
            }
        };

        // Both sides of the comparison are on the service clock.
        let service_now = self.sync.adjusted_at(now);
        let age = service_now - stamped;
        debug!(%stamped, age_s = age.num_seconds(), "deorbit received");
        if age.abs() > self.sync.window() {
            warn!(age_s = age.num_seconds(), "deorbit rejected: outside freshness window");
            return DeorbitVerdict::Rejected(RejectReason::Stale);
        }

        DeorbitVerdict::Authentic {
            user_hash: parsed.user_hash,
            stamped,
        }
    }
}

impl From<&PeerSnapshot> for WebhookVerifier {
    fn from(snapshot: &PeerSnapshot) -> Self {
        Self::new(snapshot.peer_key.clone(), snapshot.sync.clone())
    }
}
