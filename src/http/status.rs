//! Classification of HTTP failures into the provisioning error taxonomy.

use reqwest::StatusCode;
use std::error::Error as StdError;

use crate::error::ProvisionError;

/// Maps a response status to a failure, or `None` when the body can be used.
///
/// Only 404 is reported as [`ProvisionError::NotFound`]; every other
/// unsuccessful status is a [`ProvisionError::Network`] carrying the code.
pub fn classify_status(url: &str, status: StatusCode) -> Option<ProvisionError> {
    if status.is_success() {
        return None;
    }

    let reason = match status {
        StatusCode::NOT_FOUND => {
            return Some(ProvisionError::NotFound {
                url: url.to_string(),
            });
        }
        StatusCode::UNAUTHORIZED => {
            "HTTP 401 Unauthorized. Check your GITHUB_TOKEN.".to_string()
        }
        StatusCode::FORBIDDEN => {
            "HTTP 403 Forbidden. The API rate limit may be exceeded; set GITHUB_TOKEN.".to_string()
        }
        StatusCode::TOO_MANY_REQUESTS => "HTTP 429 Too Many Requests".to_string(),
        s => match s.canonical_reason() {
            Some(text) => format!("HTTP {} {}", s.as_u16(), text),
            None => format!("HTTP {}", s.as_u16()),
        },
    };

    Some(ProvisionError::Network {
        url: url.to_string(),
        reason,
    })
}

/// Maps a transport failure (DNS, connect, TLS, timeout, broken stream).
pub fn classify_send_error(url: &str, error: &reqwest::Error) -> ProvisionError {
    let kind = if error.is_timeout() {
        "timed out"
    } else if error.is_connect() {
        "connection failed"
    } else if error.is_body() || error.is_decode() {
        "response body interrupted"
    } else {
        "request failed"
    };

    let mut reason = format!("{}: {}", kind, error);
    let mut source = error.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }

    ProvisionError::Network {
        url: url.to_string(),
        reason,
    }
}
