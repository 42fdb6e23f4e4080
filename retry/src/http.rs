//! Minimal HTTP status error understood by the default classifier.

/// An HTTP response that came back with a failing status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("HTTP {status_code}: {message}")]
pub struct HttpError {
    pub status_code: u16,
    pub message: String,
}

impl HttpError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    /// 408 Request Timeout
    pub fn is_timeout(&self) -> bool {
        self.status_code == 408
    }

    /// Server errors (5xx) and 429 Too Many Requests.
    pub fn is_temporary(&self) -> bool {
        is_temporary_status(self.status_code)
    }
}

pub(crate) fn is_temporary_status(status_code: u16) -> bool {
    status_code >= 500 || status_code == 429
}
