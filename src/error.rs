//! Error types for the session core and its transport seam

use crate::domain::models::ConnectionState;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the GATT session controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {operation}: device not connected (state: {state:?})")]
    NotConnected {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("characteristic {0} is not part of the discovered services")]
    UnknownCharacteristic(Uuid),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors raised when a request cannot be handed to the transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("characteristic {0} not found on peripheral")]
    CharacteristicNotFound(Uuid),

    #[error("request failed: {0}")]
    Request(String),
}
