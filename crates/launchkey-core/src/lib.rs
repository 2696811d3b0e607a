//! Client security layer for the LaunchKey two-factor service.
//!
//! Request signing, service clock tracking, response classification and
//! deorbit webhook verification, plus the [`Client`] that strings them
//! together over a [`Transport`].

pub mod client;
pub mod config;
pub mod error;
pub mod keypair;
pub mod response;
pub mod signer;
pub mod time_sync;
pub mod transport;
pub mod webhook;

pub use client::{is_pending, Client, LogAction};
pub use config::{Config, ConfigOverrides, Credentials};
pub use error::{LaunchKeyError, Result};
pub use keypair::{Keypair, DEFAULT_KEY_BITS};
pub use response::{classify, ApiError, ApiErrorKind, Outcome};
pub use signer::{PeerSnapshot, RequestSigner, SignedEnvelope, PING_PATH};
pub use time_sync::{TimeSync, TimeSyncState};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Params, Transport};
pub use webhook::{DeorbitVerdict, RejectReason, WebhookVerifier};
