//! Non-authoritative peer: shadow state with movement prediction

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::game::combat::AttackStats;
use crate::game::grid::{Cell, Direction};
use crate::game::worm::Worm;
use crate::game::PlayerIndex;
use crate::ws::protocol::{ClientMsg, InputCommand, RoundSnapshot, ServerMsg};

use super::session::{SessionId, SessionRegistry, FIRST_INPUT_SEQ};
use super::transport::{LocalTransport, Transport};
use super::SyncError;

/// A peer's local copy of the round. Only snapshots make it correct
/// again; prediction just moves worms along their heading.
#[derive(Debug, Clone)]
pub struct ShadowState {
    local_player: Option<PlayerIndex>,
    worms: Vec<Worm>,
    food: Option<Cell>,
    powerup: Option<Cell>,
    obstacles: Vec<Cell>,
    ticks_remaining: u32,
    /// Tick of the last applied snapshot
    last_tick: Option<u64>,
    next_seq: u32,
}

impl ShadowState {
    pub fn new(local_player: Option<PlayerIndex>) -> Self {
        Self {
            local_player,
            worms: Vec::new(),
            food: None,
            powerup: None,
            obstacles: Vec::new(),
            ticks_remaining: 0,
            last_tick: None,
            next_seq: FIRST_INPUT_SEQ,
        }
    }

    pub fn local_player(&self) -> Option<PlayerIndex> {
        self.local_player
    }

    pub fn worms(&self) -> &[Worm] {
        &self.worms
    }

    pub fn food(&self) -> Option<Cell> {
        self.food
    }

    pub fn powerup(&self) -> Option<Cell> {
        self.powerup
    }

    pub fn obstacles(&self) -> &[Cell] {
        &self.obstacles
    }

    pub fn ticks_remaining(&self) -> u32 {
        self.ticks_remaining
    }

    pub fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Advance every worm one cell. No collisions, eating or deaths.
    pub fn predict_tick(&mut self) {
        for worm in &mut self.worms {
            worm.apply_move(false);
        }
    }

    /// Apply the local player's input immediately and build the command
    /// for the host. `None` until a player index is assigned.
    pub fn submit_input(&mut self, direction: Option<Direction>, attack: bool) -> Option<InputCommand> {
        let player_index = self.local_player?;

        if let Some(worm) = self.worms.iter_mut().find(|w| w.player_index == player_index) {
            if let Some(direction) = direction {
                worm.set_direction(direction);
            }
            if attack {
                worm.request_attack(&AttackStats::default());
            }
        }

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        Some(InputCommand {
            player_index,
            direction: direction.map(|d| d.as_str().to_string()),
            attack,
            seq: Some(seq),
        })
    }

    /// Replace the whole shadow with `snapshot`. Snapshots that are not
    /// newer than the last applied one are discarded.
    pub fn apply_snapshot(&mut self, snapshot: &RoundSnapshot) -> bool {
        if self.last_tick.is_some_and(|last| snapshot.tick <= last) {
            debug!(tick = snapshot.tick, "Stale snapshot discarded");
            return false;
        }

        self.worms = snapshot
            .worms
            .iter()
            .map(|w| {
                Worm::from_parts(
                    w.player_index,
                    w.segments.clone(),
                    w.direction,
                    w.attack_active,
                    w.attack_ticks_remaining,
                    w.attack_charges,
                )
            })
            .collect();
        self.food = snapshot.food;
        self.powerup = snapshot.powerup;
        self.obstacles = snapshot.obstacles.clone();
        self.ticks_remaining = snapshot.ticks_remaining;
        self.last_tick = Some(snapshot.tick);
        true
    }
}

/// A joined peer: transport plus shadow state
#[derive(Debug)]
pub struct ClientSession<T: Transport> {
    transport: T,
    player_index: PlayerIndex,
    shadow: ShadowState,
}

impl<T: Transport> ClientSession<T> {
    /// Request a slot and wait for the assignment and the first full
    /// state, giving up after `wait`.
    pub async fn join(mut transport: T, wait: Duration) -> Result<Self, SyncError> {
        transport.send(ClientMsg::RequestAssign).await?;

        let handshake = async {
            let mut assigned = None;
            loop {
                match transport.recv().await? {
                    ServerMsg::Assign(assignment) => assigned = Some(assignment.player_index),
                    ServerMsg::State(snapshot) => {
                        let Some(player_index) = assigned else {
                            continue;
                        };
                        if snapshot.worms.iter().any(|w| w.player_index == player_index) {
                            return Ok::<_, SyncError>((player_index, snapshot));
                        }
                    }
                    ServerMsg::Error { code, message } => {
                        return Err(SyncError::Rejected { code, message })
                    }
                    ServerMsg::Lobby(_) | ServerMsg::LobbyCountdown(_) | ServerMsg::RoundEnd(_) => {}
                }
            }
        };

        let (player_index, snapshot) = timeout(wait, handshake)
            .await
            .map_err(|_| SyncError::JoinTimeout(wait))??;

        let mut shadow = ShadowState::new(Some(player_index));
        shadow.apply_snapshot(&snapshot);
        info!(player_index, tick = snapshot.tick, "Joined session");

        Ok(Self {
            transport,
            player_index,
            shadow,
        })
    }

    pub fn player_index(&self) -> PlayerIndex {
        self.player_index
    }

    pub fn shadow(&self) -> &ShadowState {
        &self.shadow
    }

    /// Local tick between snapshots
    pub fn predict_tick(&mut self) {
        self.shadow.predict_tick();
    }

    /// Steer and/or attack: applied locally, then sent to the host
    pub async fn send_input(&mut self, direction: Option<Direction>, attack: bool) -> Result<(), SyncError> {
        let cmd = self
            .shadow
            .submit_input(direction, attack)
            .ok_or(SyncError::NotAssigned)?;
        self.transport.send(ClientMsg::Input(cmd)).await?;
        Ok(())
    }

    /// Next host message. State snapshots are folded into the shadow
    /// before being returned.
    pub async fn recv(&mut self) -> Result<ServerMsg, SyncError> {
        let msg = self.transport.recv().await?;
        if let ServerMsg::State(snapshot) = &msg {
            self.shadow.apply_snapshot(snapshot);
        }
        Ok(msg)
    }

    pub async fn leave(mut self) -> Result<(), SyncError> {
        self.transport.send(ClientMsg::Leave).await?;
        Ok(())
    }
}

impl ClientSession<LocalTransport> {
    /// Join a hosted session in-process, waiting as long as `config` allows
    pub async fn join_local(
        registry: &SessionRegistry,
        id: SessionId,
        config: &GameConfig,
    ) -> Result<Self, SyncError> {
        let transport = LocalTransport::join(registry, id).await?;
        Self::join(transport, config.join_timeout()).await
    }
}
