use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    Internal,
    #[serde(other)]
    Unknown,
}

/// Error payload returned by the console backend on non-success responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Best-effort mapping for bodies that do not carry a structured error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let code = match status {
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            400 | 422 => ErrorCode::Validation,
            409 => ErrorCode::Conflict,
            500..=599 => ErrorCode::Internal,
            _ => ErrorCode::Unknown,
        };
        Self::new(code, message)
    }
}
