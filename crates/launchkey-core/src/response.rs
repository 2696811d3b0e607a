use serde_json::Value;

/// Named failure kinds the service reports through `message_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    IncorrectData,
    InvalidCredentials,
    AppVerification,
    NoPairedDevices,
    InvalidAppKey,
    UserNotFound,
    SignatureMismatch,
    AuthExpired,
    AppDisabled,
    AuthAttemptsExceeded,
    AppNotFound,
    LogInconsistency,
    UnknownAuthRequest,
    AuthRequestNotFound,
    AuthRequestPending,
    AuthRequestExpired,
    Unknown,
}

impl ApiErrorKind {
    pub fn from_code(code: Option<u32>) -> Self {
        use ApiErrorKind::*;
        match code {
            // auths
            Some(40421) => IncorrectData,
            Some(40422) | Some(40429) => InvalidCredentials,
            Some(40423) => AppVerification,
            Some(40424) => NoPairedDevices,
            Some(40425) => InvalidAppKey,
            Some(40426) => UserNotFound,
            Some(40428) => SignatureMismatch,
            Some(40431) => AuthExpired,
            Some(40435) => AppDisabled,
            Some(40436) => AuthAttemptsExceeded,
            // logs
            Some(50441) | Some(50444) => IncorrectData,
            Some(50442) | Some(50449) => InvalidCredentials,
            Some(50443) => AppVerification,
            Some(50445) => InvalidAppKey,
            Some(50447) => AppNotFound,
            Some(50448) => SignatureMismatch,
            Some(50451) => AuthExpired,
            Some(50455) => LogInconsistency,
            Some(50456) => UnknownAuthRequest,
            // ping
            Some(60401) => IncorrectData,
            // poll
            Some(70401) => IncorrectData,
            Some(70402) => AuthRequestNotFound,
            Some(70403) => AuthRequestPending,
            Some(70404) => AuthRequestExpired,
            _ => Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}{message}{}", fmt_code(.code), fmt_status(.status))]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub code: Option<u32>,
    pub message: String,
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(message: impl Into<String>, code: Option<u32>, status: Option<u16>) -> Self {
        Self {
            kind: ApiErrorKind::from_code(code),
            code,
            message: message.into(),
            status,
        }
    }
}

fn fmt_code(code: &Option<u32>) -> String {
    code.map(|c| format!("[{c}] ")).unwrap_or_default()
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (Status {s})")).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    /// The authorization is still outstanding; poll again later.
    Pending(ApiError),
    Failure(ApiError),
}

pub fn classify(status: u16, body: &Value) -> Outcome {
    let ok_status = (200..400).contains(&status);
    let flagged_unsuccessful = body
        .get("successful")
        .map(|v| v.as_bool() != Some(true))
        .unwrap_or(false);
    if ok_status && !flagged_unsuccessful {
        return Outcome::Success(body.clone());
    }

    let error = match body {
        Value::Object(map) => {
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            ApiError::new(message, message_code(map.get("message_code")), Some(status))
        }
        _ => ApiError::new("Unknown error", None, Some(status)),
    };
    if error.kind == ApiErrorKind::AuthRequestPending {
        Outcome::Pending(error)
    } else {
        Outcome::Failure(error)
    }
}

// The service sends message_code as a number, occasionally as a string.
fn message_code(raw: Option<&Value>) -> Option<u32> {
    match raw? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
