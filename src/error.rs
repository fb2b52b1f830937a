//! Crate-wide error taxonomy for the protocol layers (§7 of the spec).
//!
//! Handler-level domain errors live in [`crate::rpc::RpcError`] — they are
//! encoded into the response envelope rather than propagated here, per the
//! spec's propagation policy: protocol/socket errors are latched once per
//! session, handler errors are not.

use crate::frame::FrameError;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can surface from the session/stream protocol layer.
#[derive(Debug, Error, Clone)]
pub enum ProtocolError {
    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),

    #[error("socket read error: {0}")]
    SocketReadError(Arc<io::Error>),

    #[error("socket write error: {0}")]
    SocketWriteError(Arc<io::Error>),

    #[error("operation on a closed session or stream")]
    ClosedPipe,

    #[error("operation timed out")]
    Timeout,

    #[error("stream not found: it may have been closed")]
    StreamNotFound,

    #[error("envelope or value encoding error: {0}")]
    EncodingError(String),
}

impl From<FrameError> for ProtocolError {
    fn from(e: FrameError) -> Self {
        ProtocolError::InvalidProtocol(e.to_string())
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Boxed catch-all error, used at API boundaries the way the teacher's
/// `lib.rs` defines `Error`/`Result` for cases that cross several layers.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
