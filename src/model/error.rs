//! Typed failures surfaced by language-model clients.
//!
//! Every failure is classified as either [`ErrorKind::Transient`] (worth
//! retrying with backoff) or [`ErrorKind::Fatal`] (the run cannot continue).

use thiserror::Error;

/// Coarse classification used by retry logic and the episode controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rate limits, timeouts, overloaded or unreachable servers.
    Transient,
    /// Authentication, configuration, or malformed requests.
    Fatal,
}

/// A failed `complete` call.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("rate limited by model API: {message}")]
    RateLimited { message: String },

    #[error("model request timed out: {message}")]
    Timeout { message: String },

    #[error("model API unavailable ({status:?}): {message}")]
    Unavailable { status: Option<u16>, message: String },

    #[error("could not decode model response: {message}")]
    Decode { message: String },

    #[error("model API rejected credentials ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("model API rejected request ({status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("model client misconfigured: {message}")]
    Config { message: String },
}

impl LlmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::Unavailable { .. }
            | Self::Decode { .. } => ErrorKind::Transient,
            Self::Auth { .. } | Self::InvalidRequest { .. } | Self::Config { .. } => {
                ErrorKind::Fatal
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Classify a non-success HTTP status returned by the chat endpoint.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited { message: body },
            408 => Self::Timeout { message: body },
            401 | 403 => Self::Auth {
                status,
                message: body,
            },
            500..=599 => Self::Unavailable {
                status: Some(status),
                message: body,
            },
            _ => Self::InvalidRequest {
                status,
                message: body,
            },
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            Self::Timeout { message }
        } else if err.is_decode() {
            Self::Decode { message }
        } else if err.is_builder() {
            Self::Config { message }
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), message)
        } else {
            Self::Unavailable {
                status: None,
                message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(LlmError::from_status(429, "slow down".into()).kind(), ErrorKind::Transient);
        assert_eq!(LlmError::from_status(503, "busy".into()).kind(), ErrorKind::Transient);
        assert_eq!(LlmError::from_status(408, String::new()).kind(), ErrorKind::Transient);
        assert_eq!(LlmError::from_status(401, "bad key".into()).kind(), ErrorKind::Fatal);
        assert_eq!(LlmError::from_status(400, "bad body".into()).kind(), ErrorKind::Fatal);
    }

    #[test]
    fn config_errors_are_fatal() {
        let err = LlmError::Config {
            message: "missing api key".into(),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("missing api key"));
    }
}
