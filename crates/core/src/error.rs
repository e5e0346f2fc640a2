use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type OutreachResult<T> = Result<T, OutreachError>;

#[derive(Error, Debug)]
pub enum OutreachError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Session expired during dispatch")]
    SessionExpired,

    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Rate limited by platform: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unknown platform error: {0}")]
    Unknown(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Failure category attached by collaborator adapters at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    NotFound,
    RateLimited,
    Auth,
    Network,
    Other,
}

impl ServiceErrorKind {
    /// Whether a second send attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceErrorKind::RateLimited | ServiceErrorKind::Network | ServiceErrorKind::Other
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceErrorKind::NotFound => "not_found",
            ServiceErrorKind::RateLimited => "rate_limited",
            ServiceErrorKind::Auth => "auth",
            ServiceErrorKind::Network => "network",
            ServiceErrorKind::Other => "other",
        }
    }
}

/// Error returned by an external collaborator (account service, text
/// generator). Classification happens on `kind`, never on `message`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::NotFound, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::RateLimited, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Network, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Other, message)
    }

    /// Short user-facing reason recorded in a failed dispatch result.
    pub fn reason(&self) -> String {
        match self.kind {
            ServiceErrorKind::NotFound => "Usuario no encontrado".to_string(),
            ServiceErrorKind::RateLimited => "Límite de envíos alcanzado".to_string(),
            ServiceErrorKind::Auth => "Error de autenticación".to_string(),
            ServiceErrorKind::Network => "Error de red".to_string(),
            ServiceErrorKind::Other => {
                let trimmed = self.message.trim();
                if trimmed.is_empty() {
                    "Error desconocido".to_string()
                } else {
                    trimmed.to_string()
                }
            }
        }
    }
}

impl From<ServiceError> for OutreachError {
    fn from(err: ServiceError) -> Self {
        match err.kind {
            ServiceErrorKind::NotFound => OutreachError::NotFound(err.message),
            ServiceErrorKind::RateLimited => OutreachError::RateLimited(err.message),
            ServiceErrorKind::Auth => OutreachError::Authentication(err.message),
            ServiceErrorKind::Network => OutreachError::Network(err.message),
            ServiceErrorKind::Other => OutreachError::Unknown(err.message),
        }
    }
}
