//! Transport seam between a peer and its host

use std::fmt;
use std::future::Future;

use tokio::sync::{broadcast, mpsc};
use tracing::warn;
use uuid::Uuid;

use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::session::{ClientId, SessionHandle, SessionId, SessionRegistry};
use super::TransportError;

/// What the sync layer needs from a message transport
pub trait Transport: Send {
    fn send(&mut self, msg: ClientMsg) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Next message from the host
    fn recv(&mut self) -> impl Future<Output = Result<ServerMsg, TransportError>> + Send;
}

/// In-process transport straight onto a session's channels. Used by the
/// host's own player and by single-player rounds.
pub struct LocalTransport {
    client_id: ClientId,
    handle: SessionHandle,
    direct_rx: mpsc::Receiver<ServerMsg>,
    state_rx: broadcast::Receiver<ServerMsg>,
    /// Set once the host has dropped this peer's direct channel
    direct_closed: bool,
}

impl fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransport")
            .field("client_id", &self.client_id)
            .field("session_id", &self.handle.id)
            .field("direct_closed", &self.direct_closed)
            .finish_non_exhaustive()
    }
}

/// Next broadcast message that is already queued, skipping over lag.
/// Used once the host is gone, so nothing it sent last (the final state,
/// `round_end`) is lost.
pub fn next_queued(state_rx: &mut broadcast::Receiver<ServerMsg>) -> Option<ServerMsg> {
    loop {
        match state_rx.try_recv() {
            Ok(msg) => return Some(msg),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                warn!(lagged_count = n, "Skipped lagged messages while draining");
            }
            Err(_) => return None,
        }
    }
}

impl LocalTransport {
    pub async fn connect(handle: &SessionHandle) -> Result<Self, TransportError> {
        let client_id = Uuid::new_v4();
        let (direct_rx, state_rx) = handle.connect(client_id).await?;
        Ok(Self {
            client_id,
            handle: handle.clone(),
            direct_rx,
            state_rx,
            direct_closed: false,
        })
    }

    /// Join a session by id
    pub async fn join(registry: &SessionRegistry, id: SessionId) -> Result<Self, TransportError> {
        let handle = registry
            .get(&id)
            .ok_or(TransportError::SessionNotFound(id))?;
        Self::connect(&handle).await
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }
}

impl Transport for LocalTransport {
    async fn send(&mut self, msg: ClientMsg) -> Result<(), TransportError> {
        self.handle.send(self.client_id, msg).await
    }

    async fn recv(&mut self) -> Result<ServerMsg, TransportError> {
        loop {
            if self.direct_closed {
                return next_queued(&mut self.state_rx).ok_or(TransportError::Closed);
            }

            tokio::select! {
                biased;

                msg = self.direct_rx.recv() => match msg {
                    Some(msg) => return Ok(msg),
                    None => self.direct_closed = true,
                },

                msg = self.state_rx.recv() => match msg {
                    Ok(msg) => return Ok(msg),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // a newer snapshot supersedes whatever was skipped
                        warn!(client_id = %self.client_id, lagged_count = n, "Local peer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Closed),
                },
            }
        }
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.handle.disconnect(self.client_id);
    }
}
