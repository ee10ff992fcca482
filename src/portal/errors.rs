use reqwest::{Response, StatusCode, Url};
use thiserror::Error;

/// Error status returned by the portal
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("{status} Client Error: {reason} for url: {url}")]
    Client { status: u16, reason: String, url: String },

    #[error("{status} Server Error: {reason} for url: {url}")]
    Server { status: u16, reason: String, url: String },
}

impl HttpError {
    pub fn status(&self) -> u16 {
        match self {
            HttpError::Client { status, .. } | HttpError::Server { status, .. } => *status,
        }
    }

    pub fn is_client(&self) -> bool {
        matches!(self, HttpError::Client { .. })
    }

    pub fn is_server(&self) -> bool {
        matches!(self, HttpError::Server { .. })
    }
}

/// Classify a status code: 4xx and 5xx become errors, everything else passes
pub fn check_status(status: StatusCode, url: &Url) -> Result<(), HttpError> {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or_default().to_string();
    let url = url.to_string();

    match code {
        400..=499 => Err(HttpError::Client { status: code, reason, url }),
        500..=599 => Err(HttpError::Server { status: code, reason, url }),
        _ => Ok(()),
    }
}

pub fn raise_for_status(response: &Response) -> Result<(), HttpError> {
    check_status(response.status(), response.url())
}
