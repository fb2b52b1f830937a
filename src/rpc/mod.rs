//! RPC layer: envelope + value codec, flight domain model, handlers, and
//! the per-stream dispatcher (§4.9, §6).

pub mod dispatcher;
pub mod envelope;
pub mod flight;
pub mod handlers;
pub mod repo;
pub mod value;

use thiserror::Error;

/// Handler-level domain errors (§7), encoded into the response envelope
/// rather than propagated up through [`crate::error::ProtocolError`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("RPC method not found")]
    NotFound,
    #[error("invalid query params")]
    InvalidParams,
    #[error("failed to reserve")]
    FailToReserve,
    #[error("flight not found")]
    NoFlightFound,
    #[error("meal not found")]
    MealsNotFound,
    #[error("internal error")]
    InternalError,
}

impl RpcError {
    /// The tag used in `EnvelopeError.error` (matches the `errors.New(...)`
    /// message style the original keys its error variable names on).
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::NotFound => "NotFound",
            RpcError::InvalidParams => "InvalidParams",
            RpcError::FailToReserve => "FailToReserve",
            RpcError::NoFlightFound => "NoFlightFound",
            RpcError::MealsNotFound => "MealsNotFound",
            RpcError::InternalError => "InternalError",
        }
    }
}
