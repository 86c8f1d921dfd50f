//! Crate-wide error type and the retryability taxonomy from spec §7.
//!
//! Grounded on `domain::error` in the teacher (lucasvienna-empire): a
//! hand-rolled `Error` wrapping a classified representation, rather than a
//! `thiserror` derive, with `ErrorKind` carrying the dimension callers
//! actually branch on.

use std::{error, fmt, io};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every error kind named in spec §7's table, plus validation/not-found
/// kinds needed to give the REST surface real status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request body or query failed validation.
    Validation,
    /// Referenced instance, template, or auth id does not exist locally.
    NotFound,
    /// Provider responded 4xx other than 429.
    ProviderClientError,
    /// Provider responded 429.
    RateLimit,
    /// Provider responded 5xx.
    ProviderServerError,
    /// Network failure or request timeout talking to the Provider.
    NetworkError,
    /// Circuit breaker is open for the endpoint being called.
    CircuitBreakerError,
    /// MONITOR workflow exceeded `maxWaitTime` before reaching `running`.
    StartupTimeout,
    /// Health checker did not reach `healthy` before `maxWaitTime` elapsed.
    HealthCheckFailed,
    /// A StartupOperation already exists and is non-terminal for the instance.
    StartupAlreadyInProgress,
    /// `getRegistryAuth` found no entry for the requested id.
    RegistryAuthNotFound,
    /// Product Selector exhausted every region without a match.
    NoOptimalProductAnyRegion,
    /// Migration scheduler singleton lock is already held.
    MigrationJobConflict,
    /// Job handler timed out (spec §4.1 Timeout).
    JobTimeout,
    /// Job engine is shutting down; remaining jobs are being failed.
    Shutdown,
    /// Anything else: I/O, (de)serialization, or an internal invariant break.
    Internal,
}

impl ErrorKind {
    /// Centralizes the retryable/terminal split spec §9 asks for, so call
    /// sites never branch on a stringified message.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit
                | ErrorKind::ProviderServerError
                | ErrorKind::NetworkError
                | ErrorKind::CircuitBreakerError
                | ErrorKind::HealthCheckFailed
                | ErrorKind::JobTimeout
        )
    }

    fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound | ErrorKind::RegistryAuthNotFound => StatusCode::NOT_FOUND,
            ErrorKind::ProviderClientError => StatusCode::BAD_GATEWAY,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::ProviderServerError | ErrorKind::NetworkError => {
                StatusCode::BAD_GATEWAY
            }
            ErrorKind::CircuitBreakerError => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::StartupTimeout | ErrorKind::HealthCheckFailed => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorKind::StartupAlreadyInProgress | ErrorKind::MigrationJobConflict => {
                StatusCode::CONFLICT
            }
            ErrorKind::NoOptimalProductAnyRegion => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::JobTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, e.g. for the `{code}` field of spec §7's
    /// user-visible error shape.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::ProviderClientError => "PROVIDER_CLIENT_ERROR",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::ProviderServerError => "PROVIDER_SERVER_ERROR",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::CircuitBreakerError => "CIRCUIT_BREAKER_ERROR",
            ErrorKind::StartupTimeout => "STARTUP_TIMEOUT",
            ErrorKind::HealthCheckFailed => "HEALTH_CHECK_FAILED",
            ErrorKind::StartupAlreadyInProgress => "STARTUP_ALREADY_IN_PROGRESS",
            ErrorKind::RegistryAuthNotFound => "REGISTRY_AUTH_NOT_FOUND",
            ErrorKind::NoOptimalProductAnyRegion => "NO_OPTIMAL_PRODUCT_ANY_REGION",
            ErrorKind::MigrationJobConflict => "MIGRATION_JOB_CONFLICT",
            ErrorKind::JobTimeout => "JOB_TIMEOUT",
            ErrorKind::Shutdown => "SHUTDOWN",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    Io(io::Error),
    Config(config::ConfigError),
    Serde(serde_json::Error),
    Reqwest(reqwest::Error),
    Anyhow(anyhow::Error),
}

pub struct Error {
    repr: ErrorRepr,
}

impl Error {
    pub fn new(kind: ErrorKind, description: &'static str) -> Self {
        Self {
            repr: ErrorRepr::WithDescription(kind, description),
        }
    }

    pub fn with_detail(kind: ErrorKind, description: &'static str, detail: impl Into<String>) -> Self {
        Self {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, detail.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::WithDescription(kind, _) => *kind,
            ErrorRepr::WithDescriptionAndDetail(kind, _, _) => *kind,
            ErrorRepr::Io(_) | ErrorRepr::Serde(_) | ErrorRepr::Anyhow(_) | ErrorRepr::Config(_) => {
                ErrorKind::Internal
            }
            ErrorRepr::Reqwest(err) => {
                if err.is_timeout() || err.is_connect() {
                    ErrorKind::NetworkError
                } else {
                    ErrorKind::Internal
                }
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<(ErrorKind, &'static str)> for Error {
    fn from((kind, desc): (ErrorKind, &'static str)) -> Error {
        Error::new(kind, desc)
    }
}

impl From<(ErrorKind, &'static str, String)> for Error {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> Error {
        Error::with_detail(kind, desc, detail)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error {
            repr: ErrorRepr::Io(err),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Error {
        Error {
            repr: ErrorRepr::Config(err),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error {
            repr: ErrorRepr::Serde(err),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Error {
        Error {
            repr: ErrorRepr::Reqwest(err),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Error {
        Error {
            repr: ErrorRepr::Anyhow(err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Io(err) => Some(err),
            ErrorRepr::Config(err) => Some(err),
            ErrorRepr::Serde(err) => Some(err),
            ErrorRepr::Reqwest(err) => Some(err),
            ErrorRepr::Anyhow(err) => err.source(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.repr {
            ErrorRepr::WithDescription(_, desc) => desc.fmt(f),
            ErrorRepr::WithDescriptionAndDetail(_, desc, detail) => {
                desc.fmt(f)?;
                f.write_str(": ")?;
                detail.fmt(f)
            }
            ErrorRepr::Io(err) => err.fmt(f),
            ErrorRepr::Config(err) => err.fmt(f),
            ErrorRepr::Serde(err) => err.fmt(f),
            ErrorRepr::Reqwest(err) => err.fmt(f),
            ErrorRepr::Anyhow(err) => err.fmt(f),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = kind.status_code();
        let (message, details) = match &self.repr {
            ErrorRepr::WithDescription(_, desc) => (desc.to_string(), None),
            ErrorRepr::WithDescriptionAndDetail(_, desc, detail) => {
                (desc.to_string(), Some(detail.clone()))
            }
            _ => ("internal error".to_string(), None),
        };
        let body = ErrorBody {
            code: kind.code(),
            message,
            details,
            timestamp: chrono::Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}
