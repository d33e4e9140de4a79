use crate::Status;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RpcError>;

/// Why a call context stopped being live
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Connection-level failures, never produced by a remote instance
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("Failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("Transport I/O error: {0}")]
    Io(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),
}

/// Error surfaced to the caller of a remote operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The remote side answered with a status
    #[error(transparent)]
    Status(#[from] Status),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Decoding error: {0}")]
    Decode(String),
}

impl RpcError {
    /// The remote status, if the remote side produced this error
    pub fn status(&self) -> Option<&Status> {
        match self {
            Self::Status(status) => Some(status),
            _ => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<ContextError> for RpcError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::Canceled => Self::Canceled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// Failures while setting up or running the shared endpoint
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Service already registered: {0}")]
    DuplicateService(String),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
