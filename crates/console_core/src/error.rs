use shared::error::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid api base url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: &'static str,
        source: reqwest::Error,
    },
    #[error("{endpoint} returned status {status}: {}", .error.message)]
    Api {
        endpoint: &'static str,
        status: u16,
        error: ApiError,
    },
    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        source: reqwest::Error,
    },
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Api { status, .. } => Some(*status),
            TransportError::Request { source, .. } | TransportError::Decode { source, .. } => {
                source.status().map(|status| status.as_u16())
            }
            TransportError::InvalidBaseUrl { .. } => None,
        }
    }
}
