//! Host/peer synchronization layer

pub mod client;
pub mod ordering;
pub mod session;
pub mod ticker;
pub mod transport;

use std::time::Duration;

pub use client::{ClientSession, ShadowState};
pub use session::{SessionHandle, SessionId, SessionRegistry};

/// Transport-level failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
}

/// Failures surfaced to whoever drives a client session
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("No assignment from host within {0:?}")]
    JoinTimeout(Duration),

    #[error("Host rejected join ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("No player slot assigned yet")]
    NotAssigned,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
