//! Classification of remote failures.

use crate::api::ApiMessage;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use thiserror::Error;

/// A failed remote call, classified by what the caller can do about it.
///
/// Nothing here is retried; each failure is reported once.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// 4xx other than 401/404: the request itself was rejected.
    #[error("{message}")]
    Validation { status: u16, message: String },
    /// 404. For recognition this means no faces are registered yet.
    #[error("{message}")]
    NotFound { message: String },
    /// 401: the session is no longer valid.
    #[error("{message}")]
    Unauthorized { message: String },
    /// Network failure, timeout or 5xx.
    #[error("{message}")]
    Transient { status: Option<u16>, message: String },
}

impl RemoteError {
    pub fn classify(status: u16, message: String) -> Self {
        match status {
            401 => Self::Unauthorized { message },
            404 => Self::NotFound { message },
            400..=499 => Self::Validation { status, message },
            _ => Self::Transient {
                status: Some(status),
                message,
            },
        }
    }

    /// Classify a non-2xx response, preferring the server's `msg`.
    pub fn from_response(resp: &ApiResponse, fallback: &str) -> Self {
        let message = resp
            .json::<ApiMessage>()
            .map(|m| m.msg)
            .unwrap_or_else(|_| fallback.to_string());
        Self::classify(resp.status, message)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            Self::Unauthorized { .. } => Some(401),
            Self::Transient { status, .. } => *status,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::NotFound { message }
            | Self::Unauthorized { message }
            | Self::Transient { message, .. } => message,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Send one request and turn anything but a 2xx into a [`RemoteError`].
pub(crate) async fn round_trip(
    transport: &dyn Transport,
    request: ApiRequest,
    fallback: &str,
) -> Result<ApiResponse, RemoteError> {
    let path = request.path;
    match transport.send(request).await {
        Ok(resp) if resp.is_success() => Ok(resp),
        Ok(resp) => {
            let err = RemoteError::from_response(&resp, fallback);
            tracing::warn!(path, status = resp.status, error = %err, "remote call failed");
            Err(err)
        }
        Err(e) => {
            tracing::warn!(path, error = %e, "transport failure");
            Err(RemoteError::Transient {
                status: None,
                message: format!("{fallback}: {e}"),
            })
        }
    }
}
