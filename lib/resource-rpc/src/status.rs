//! Wire-level status codes

use crate::{ContextError, RpcError};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Status codes, numbered after the usual RPC convention
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Ok,
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    Unimplemented,
    Internal,
    Unavailable,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
        }
    }

    /// HTTP status used when this code crosses the wire
    pub fn http_status(&self) -> StatusCode {
        match self {
            Code::Ok => StatusCode::OK,
            // 499 "client closed request"
            Code::Canceled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            Code::Unknown | Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists => StatusCode::CONFLICT,
            Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error as it travels between dispatcher and client
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[error("rpc error: code = {code} desc = {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Translate an instance failure into a status without losing its text.
    ///
    /// Statuses raised further down a federation chain keep their code.
    pub fn from_error(err: &anyhow::Error) -> Self {
        if let Some(status) = err.downcast_ref::<Status>() {
            return status.clone();
        }
        if let Some(rpc) = err.downcast_ref::<RpcError>() {
            return Self::from(rpc.clone());
        }
        Self::unknown(format!("{:#}", err))
    }
}

impl From<ContextError> for Status {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::Canceled => Self::new(Code::Canceled, e.to_string()),
            ContextError::DeadlineExceeded => Self::new(Code::DeadlineExceeded, e.to_string()),
        }
    }
}

impl From<RpcError> for Status {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Status(status) => status,
            RpcError::Canceled => ContextError::Canceled.into(),
            RpcError::DeadlineExceeded => ContextError::DeadlineExceeded.into(),
            RpcError::Transport(t) => Self::unavailable(t.to_string()),
            RpcError::Encode(msg) | RpcError::Decode(msg) => Self::internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportError;

    #[test]
    fn test_status_display_keeps_message() {
        let status = Status::unknown("test failed");
        assert_eq!(status.to_string(), "rpc error: code = unknown desc = test failed");
    }

    #[test]
    fn test_from_error_keeps_chain() {
        let err = anyhow::anyhow!("disk full").context("saving episode");
        let status = Status::from_error(&err);
        assert_eq!(status.code, Code::Unknown);
        assert!(status.message.contains("saving episode"));
        assert!(status.message.contains("disk full"));
    }

    #[test]
    fn test_from_error_passes_remote_status_through() {
        let err = anyhow::Error::new(RpcError::Status(Status::not_found("arm")));
        let status = Status::from_error(&err);
        assert_eq!(status, Status::not_found("arm"));
    }

    #[test]
    fn test_transport_maps_to_unavailable() {
        let status = Status::from(RpcError::Transport(TransportError::ConnectionClosed));
        assert_eq!(status.code, Code::Unavailable);
    }

    #[test]
    fn test_code_serde() {
        let json = serde_json::to_string(&Status::not_found("x")).unwrap();
        assert_eq!(json, r#"{"code":"not_found","message":"x"}"#);
    }

    #[test]
    fn test_http_mapping() {
        assert_eq!(Code::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(Code::Canceled.http_status().as_u16(), 499);
        assert_eq!(Code::Unimplemented.http_status(), StatusCode::NOT_IMPLEMENTED);
    }
}
