use std::fmt;

use thiserror::Error;

pub type ZkvResult<T> = Result<T, ZkvError>;

#[derive(Debug, Error)]
pub enum ZkvError {
    /// Malformed or missing field, bad integer encoding. Nothing was mutated.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Displays without detail so callers cannot tell which check failed.
    #[error("authentication failed")]
    Auth(AuthFailure),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Unknown upload id or chunk index.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ZkvError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        ZkvError::Protocol(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        ZkvError::Integrity(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        ZkvError::Transport(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        ZkvError::Storage(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ZkvError::NotFound(msg.into())
    }

    /// The auth sub-reason, for logging only.
    pub fn auth_failure(&self) -> Option<AuthFailure> {
        match self {
            ZkvError::Auth(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Short stable label used as a metrics/log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ZkvError::Protocol(_) => "protocol",
            ZkvError::Auth(_) => "auth",
            ZkvError::Integrity(_) => "integrity",
            ZkvError::Transport(_) => "transport",
            ZkvError::Storage(_) => "storage",
            ZkvError::NotFound(_) => "not_found",
            ZkvError::Config(_) => "config",
            ZkvError::Io(_) => "io",
            ZkvError::Other(_) => "other",
        }
    }
}

impl From<AuthFailure> for ZkvError {
    fn from(reason: AuthFailure) -> Self {
        ZkvError::Auth(reason)
    }
}

/// Why an authentication step was refused.
///
/// Never shown to the remote party; `ZkvError::Auth` renders the same generic
/// message for every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    NotRegistered,
    AlreadyRegistered,
    UnknownChallenge,
    ProofRejected,
    InvalidSession,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::NotRegistered => "not_registered",
            AuthFailure::AlreadyRegistered => "already_registered",
            AuthFailure::UnknownChallenge => "unknown_challenge",
            AuthFailure::ProofRejected => "proof_rejected",
            AuthFailure::InvalidSession => "invalid_session",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
