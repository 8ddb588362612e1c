//! Authoritative session host and registry

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::snapshot::SnapshotBuilder;
use crate::game::{PlayerIndex, RoundPhase, RoundSimulator};
use crate::ws::protocol::{
    Assignment, ClientMsg, GameEvent, InputCommand, LobbyCountdown, LobbyState, RoundResult,
    RoundSnapshot, ServerMsg,
};

use super::ordering::SequenceBuffer;
use super::ticker::{IntervalTicker, TickSource};
use super::TransportError;

pub type SessionId = Uuid;
pub type ClientId = Uuid;

/// Sequence number peers start counting input from
pub const FIRST_INPUT_SEQ: u32 = 1;

/// Traffic from connections into the session task
#[derive(Debug)]
pub enum HostInput {
    /// New connection; `direct` carries messages meant for it alone
    Connect {
        client_id: ClientId,
        direct: mpsc::Sender<ServerMsg>,
    },
    Message {
        client_id: ClientId,
        msg: ClientMsg,
    },
    Disconnect {
        client_id: ClientId,
    },
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for enough players
    Lobby,
    /// Seats filled, counting down to the first tick
    Countdown,
    /// Round is ticking
    Active,
    Ended,
}

/// Handle to a running session, also the join acknowledgement handed to
/// connecting peers
#[derive(Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    input_tx: mpsc::Sender<HostInput>,
    state_tx: broadcast::Sender<ServerMsg>,
    latest: Arc<RwLock<Option<RoundSnapshot>>>,
    player_count: Arc<AtomicUsize>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Most recent authoritative snapshot, for read-only consumers
    pub fn latest_snapshot(&self) -> Option<RoundSnapshot> {
        self.latest.read().clone()
    }

    /// Stop the session at the next tick boundary
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Register a connection. Returns its direct channel and a
    /// subscription to broadcast state.
    pub async fn connect(
        &self,
        client_id: ClientId,
    ) -> Result<(mpsc::Receiver<ServerMsg>, broadcast::Receiver<ServerMsg>), TransportError> {
        let (direct, direct_rx) = mpsc::channel(16);
        let state_rx = self.state_tx.subscribe();
        self.input_tx
            .send(HostInput::Connect { client_id, direct })
            .await
            .map_err(|_| TransportError::Closed)?;
        Ok((direct_rx, state_rx))
    }

    pub async fn send(&self, client_id: ClientId, msg: ClientMsg) -> Result<(), TransportError> {
        self.input_tx
            .send(HostInput::Message { client_id, msg })
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Non-blocking disconnect, usable from `Drop`
    pub fn disconnect(&self, client_id: ClientId) {
        let _ = self.input_tx.try_send(HostInput::Disconnect { client_id });
    }
}

/// One connected peer
struct Peer {
    direct: mpsc::Sender<ServerMsg>,
    player_index: Option<PlayerIndex>,
    order: SequenceBuffer<InputCommand>,
}

impl Peer {
    /// Messages for this peer alone; a full or closed channel is logged
    fn send_direct(&self, session_id: SessionId, client_id: ClientId, msg: ServerMsg) {
        if let Err(e) = self.direct.try_send(msg) {
            warn!(
                session_id = %session_id,
                client_id = %client_id,
                error = %e,
                "Direct message dropped"
            );
        }
    }
}

/// The authoritative host. Owns the round simulator; every other party
/// only ever sees snapshots.
pub struct HostSession<T: TickSource> {
    id: SessionId,
    config: GameConfig,
    phase: SessionPhase,
    sim: RoundSimulator,
    ticker: T,
    input_rx: mpsc::Receiver<HostInput>,
    state_tx: broadcast::Sender<ServerMsg>,
    stop_rx: watch::Receiver<bool>,
    latest: Arc<RwLock<Option<RoundSnapshot>>>,
    player_count: Arc<AtomicUsize>,
    snapshot_builder: SnapshotBuilder,
    peers: HashMap<ClientId, Peer>,
    /// Commands received since the last tick
    queued: Vec<InputCommand>,
    /// Events of ticks whose snapshot was not sent yet
    pending_events: Vec<GameEvent>,
    countdown_ticks_left: u32,
}

impl<T: TickSource> HostSession<T> {
    pub fn new(id: SessionId, config: GameConfig, ticker: T) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (state_tx, _) = broadcast::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        let latest = Arc::new(RwLock::new(None));
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = SessionHandle {
            id,
            input_tx,
            state_tx: state_tx.clone(),
            latest: latest.clone(),
            player_count: player_count.clone(),
            stop_tx: Arc::new(stop_tx),
        };

        let seed = config.seed.unwrap_or_else(rand::random);
        let session = Self {
            id,
            phase: SessionPhase::Lobby,
            sim: RoundSimulator::new(&config, seed),
            snapshot_builder: SnapshotBuilder::new(config.snapshot_mode),
            config,
            ticker,
            input_rx,
            state_tx,
            stop_rx,
            latest,
            player_count,
            peers: HashMap::new(),
            queued: Vec::new(),
            pending_events: Vec::new(),
            countdown_ticks_left: 0,
        };

        (session, handle)
    }

    /// Run until the round ends, the session is stopped or the tick
    /// source runs dry. Returns the result when the round finished.
    pub async fn run(mut self) -> Option<RoundResult> {
        info!(session_id = %self.id, "Session started");

        loop {
            tokio::select! {
                biased;

                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        info!(session_id = %self.id, "Session stopped");
                        break;
                    }
                }

                more = self.ticker.next_tick() => {
                    if !more {
                        info!(session_id = %self.id, "Tick source exhausted");
                        break;
                    }
                    self.run_tick();
                    if self.phase == SessionPhase::Ended {
                        break;
                    }
                }

                Some(input) = self.input_rx.recv() => {
                    self.handle_input(input);
                }
            }
        }

        self.phase = SessionPhase::Ended;
        let result = self.sim.result().cloned();
        if let Some(result) = &result {
            let _ = self.state_tx.send(ServerMsg::RoundEnd(result.clone()));
        }

        info!(session_id = %self.id, finished = result.is_some(), "Session closed");
        result
    }

    fn run_tick(&mut self) {
        // whatever arrived before this tick fired belongs to it
        while let Ok(input) = self.input_rx.try_recv() {
            self.handle_input(input);
        }

        match self.phase {
            SessionPhase::Lobby | SessionPhase::Ended => return,
            SessionPhase::Countdown => {
                self.countdown_ticks_left = self.countdown_ticks_left.saturating_sub(1);
                if self.countdown_ticks_left == 0 {
                    self.start_round();
                }
                return;
            }
            SessionPhase::Active => {}
        }

        // inputs received between ticks land here, never mid-tick
        for cmd in std::mem::take(&mut self.queued) {
            self.sim.apply_command(&cmd);
        }

        let report = self.sim.tick();
        self.pending_events.extend(report.events);
        let snapshot = self.sim.snapshot(self.pending_events.clone());
        *self.latest.write() = Some(snapshot.clone());

        if self.snapshot_builder.should_send(&snapshot) {
            self.pending_events.clear();
            let _ = self.state_tx.send(ServerMsg::State(snapshot));
        }

        if report.ended.is_some() || self.sim.phase() == RoundPhase::Ended {
            self.phase = SessionPhase::Ended;
        }
    }

    fn handle_input(&mut self, input: HostInput) {
        match input {
            HostInput::Connect { client_id, direct } => {
                debug!(session_id = %self.id, client_id = %client_id, "Peer connected");
                self.peers.insert(
                    client_id,
                    Peer {
                        direct,
                        player_index: None,
                        order: SequenceBuffer::new(FIRST_INPUT_SEQ),
                    },
                );
            }
            HostInput::Message { client_id, msg } => match msg {
                ClientMsg::RequestAssign => self.handle_assign(client_id),
                ClientMsg::Input(cmd) => self.handle_command(client_id, cmd),
                ClientMsg::Leave => self.handle_leave(client_id),
            },
            HostInput::Disconnect { client_id } => self.handle_leave(client_id),
        }
    }

    fn handle_assign(&mut self, client_id: ClientId) {
        let Some(peer) = self.peers.get(&client_id) else {
            warn!(session_id = %self.id, client_id = %client_id, "Assign request from unknown peer");
            return;
        };

        let player_index = match peer.player_index {
            Some(index) => index,
            None => match self.sim.add_player() {
                Some(index) => index,
                None => {
                    peer.send_direct(
                        self.id,
                        client_id,
                        ServerMsg::Error {
                            code: "session_full".to_string(),
                            message: "No free player slot".to_string(),
                        },
                    );
                    warn!(session_id = %self.id, client_id = %client_id, "Session full");
                    return;
                }
            },
        };

        if let Some(peer) = self.peers.get_mut(&client_id) {
            peer.player_index = Some(player_index);
            // assignment and the full state go out together
            peer.send_direct(self.id, client_id, ServerMsg::Assign(Assignment { player_index }));
            peer.send_direct(self.id, client_id, ServerMsg::State(self.sim.snapshot(Vec::new())));
        }

        let connected_players: Vec<PlayerIndex> =
            self.sim.worms().iter().map(|w| w.player_index).collect();
        self.player_count.store(connected_players.len(), Ordering::Relaxed);
        *self.latest.write() = Some(self.sim.snapshot(Vec::new()));

        info!(
            session_id = %self.id,
            client_id = %client_id,
            player_index,
            player_count = connected_players.len(),
            "Player assigned"
        );

        let ready = connected_players.len() >= self.config.min_players;
        let _ = self.state_tx.send(ServerMsg::Lobby(LobbyState {
            connected_players,
            needed: self.config.min_players,
        }));

        if self.phase == SessionPhase::Lobby && ready {
            self.begin_countdown();
        }
    }

    fn begin_countdown(&mut self) {
        let ticks = self.config.countdown_ticks();
        if ticks == 0 {
            self.start_round();
            return;
        }

        self.phase = SessionPhase::Countdown;
        self.countdown_ticks_left = ticks;
        let wait_ms = u64::from(ticks) * self.config.tick_interval_ms;
        let start_time = chrono::Utc::now().timestamp_millis() + wait_ms as i64;
        let _ = self.state_tx.send(ServerMsg::LobbyCountdown(LobbyCountdown {
            start_time,
            seconds_remaining: self.config.countdown_secs,
        }));
        info!(session_id = %self.id, ticks, "Lobby countdown started");
    }

    fn start_round(&mut self) {
        self.phase = SessionPhase::Active;
        self.snapshot_builder.force_next();
        info!(session_id = %self.id, "Round started");
    }

    fn handle_command(&mut self, client_id: ClientId, cmd: InputCommand) {
        let Some(peer) = self.peers.get_mut(&client_id) else {
            debug!(session_id = %self.id, client_id = %client_id, "Input from unknown peer");
            return;
        };
        if peer.player_index != Some(cmd.player_index) {
            warn!(
                session_id = %self.id,
                client_id = %client_id,
                player_index = cmd.player_index,
                "Input for a worm the peer does not own"
            );
            return;
        }

        // sequence numbers still advance so later input is not held back
        let ready = match cmd.seq {
            Some(seq) => peer.order.push(seq, cmd),
            None => vec![cmd],
        };
        if self.phase != SessionPhase::Active {
            debug!(
                session_id = %self.id,
                client_id = %client_id,
                dropped = ready.len(),
                "Input before the round started dropped"
            );
            return;
        }
        self.queued.extend(ready);
    }

    fn handle_leave(&mut self, client_id: ClientId) {
        // the worm stays on the board until the round ends
        if let Some(peer) = self.peers.remove(&client_id) {
            info!(
                session_id = %self.id,
                client_id = %client_id,
                player_index = ?peer.player_index,
                "Peer left"
            );
        }
    }
}

/// Registry of all hosted sessions
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Host a new session ticking on the wall clock
    pub fn host(&self, config: GameConfig) -> SessionId {
        let ticker = IntervalTicker::new(config.tick_interval());
        self.host_with_ticker(config, ticker)
    }

    /// Host a new session driven by `ticker`. The session removes itself
    /// from the registry when it finishes.
    pub fn host_with_ticker<T>(&self, config: GameConfig, ticker: T) -> SessionId
    where
        T: TickSource + 'static,
    {
        let id = Uuid::new_v4();
        let (session, handle) = HostSession::new(id, config, ticker);
        self.sessions.insert(id, handle);

        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            session.run().await;
            sessions.remove(&id);
        });

        info!(session_id = %id, "Session hosted");
        id
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_players(&self) -> usize {
        self.sessions
            .iter()
            .map(|s| s.value().player_count())
            .sum()
    }

    /// Stop every session, used on shutdown
    pub fn stop_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().stop();
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
