//! Rendering for stateless token and REST endpoints.

use std::fmt;

use chrono::Duration;
use rampart_core::LockKind;
use serde::Serialize;

use crate::{adapters::AuthOutcome, messages};

/// A rejected API attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiAuthError {
    InvalidCredentials,
    Delayed {
        remaining: Duration,
    },
    Locked {
        kind: LockKind,
        remaining: Option<Duration>,
    },
}

impl fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiAuthError::InvalidCredentials => f.write_str(messages::INVALID_CREDENTIALS),
            ApiAuthError::Delayed { remaining } => f.write_str(&messages::delayed(*remaining)),
            ApiAuthError::Locked { kind, remaining } => {
                f.write_str(&messages::locked(*kind, *remaining))
            }
        }
    }
}

/// JSON body for an API error response.
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
}

impl ApiAuthError {
    /// Convert an outcome into the principal or the error to return.
    pub fn from_outcome<T>(outcome: AuthOutcome<T>) -> Result<T, ApiAuthError> {
        match outcome {
            AuthOutcome::Success(value) => Ok(value),
            AuthOutcome::InvalidCredentials => Err(ApiAuthError::InvalidCredentials),
            AuthOutcome::Delayed { remaining } => Err(ApiAuthError::Delayed { remaining }),
            AuthOutcome::Locked { kind, remaining } => {
                Err(ApiAuthError::Locked { kind, remaining })
            }
        }
    }

    /// HTTP status to answer with.
    pub fn status(&self) -> u16 {
        match self {
            ApiAuthError::InvalidCredentials => 401,
            ApiAuthError::Delayed { .. } => 429,
            ApiAuthError::Locked {
                kind: LockKind::Temporary,
                ..
            } => 429,
            ApiAuthError::Locked {
                kind: LockKind::Permanent,
                ..
            } => 403,
        }
    }

    /// Seconds the client should wait before retrying, for a `Retry-After` header.
    pub fn retry_after(&self) -> Option<i64> {
        match self {
            ApiAuthError::InvalidCredentials => None,
            ApiAuthError::Delayed { remaining } => Some(remaining.num_seconds().max(1)),
            ApiAuthError::Locked { remaining, .. } => {
                remaining.map(|remaining| remaining.num_seconds().max(1))
            }
        }
    }

    pub fn body(&self) -> ApiErrorBody {
        ApiErrorBody {
            message: self.to_string(),
            retry_after: self.retry_after(),
        }
    }
}
