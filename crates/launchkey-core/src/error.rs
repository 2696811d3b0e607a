use crate::response::ApiError;

pub type Result<T> = std::result::Result<T, LaunchKeyError>;

#[derive(Debug, thiserror::Error)]
pub enum LaunchKeyError {
    #[error("launchkey is misconfigured; missing {}", .missing.join(", "))]
    Misconfiguration { missing: Vec<&'static str> },
    #[error("invalid keypair: {0}")]
    InvalidKeypair(String),
    #[error("private key missing or passphrase incorrect")]
    PrivateKeyMissing,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("crypto: {0}")]
    Crypto(String),
    #[error("encoding: {0}")]
    Encoding(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LaunchKeyError {
    /// The service error code, when the failure came from the remote side.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Api(err) => err.code,
            _ => None,
        }
    }
}

impl From<base64::DecodeError> for LaunchKeyError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<reqwest::Error> for LaunchKeyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
