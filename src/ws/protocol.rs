//! WebSocket protocol message definitions
//! These are the wire types for host-peer communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::collision::DeathCause;
use crate::game::grid::{Cell, Direction};
use crate::game::PlayerIndex;

/// Messages sent from a peer to the authoritative host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Ask for a player slot
    RequestAssign,

    /// Direction change and/or attack for the sender's worm
    Input(InputCommand),

    /// Leave the session
    Leave,
}

/// Messages sent from the host to peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Player slot granted to the requesting peer
    Assign(Assignment),

    /// Lobby roster, sent whenever a slot is assigned
    Lobby(LobbyState),

    /// Enough players are seated; the round starts at `startTime`
    LobbyCountdown(LobbyCountdown),

    /// Full round state
    State(RoundSnapshot),

    /// Final scores
    RoundEnd(RoundResult),

    /// Error message
    Error {
        code: String,
        message: String,
    },
}

/// Input command for one worm
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputCommand {
    pub player_index: PlayerIndex,
    /// Raw direction string; unknown values are ignored by the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, alias = "shoot")]
    pub attack: bool,
    /// Per-peer sequence number for in-order application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u32>,
}

impl InputCommand {
    pub fn turn(player_index: PlayerIndex, direction: Direction) -> Self {
        Self {
            player_index,
            direction: Some(direction.as_str().to_string()),
            ..Self::default()
        }
    }

    pub fn attack(player_index: PlayerIndex) -> Self {
        Self {
            player_index,
            attack: true,
            ..Self::default()
        }
    }

    /// Requested direction, if present and well-formed
    pub fn parsed_direction(&self) -> Option<Direction> {
        self.direction.as_deref().and_then(|d| d.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub player_index: PlayerIndex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyState {
    pub connected_players: Vec<PlayerIndex>,
    /// Players required before the round starts
    pub needed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyCountdown {
    /// Unix time in milliseconds at which the first tick runs
    pub start_time: i64,
    pub seconds_remaining: u64,
}

/// Worm state in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WormSnapshot {
    pub player_index: PlayerIndex,
    /// Head first
    pub segments: Vec<Cell>,
    pub direction: Direction,
    pub attack_charges: u32,
    pub attack_active: bool,
    pub attack_ticks_remaining: u32,
}

/// Full authoritative round state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
    /// Monotonic tick index, used to discard stale snapshots
    #[serde(default)]
    pub tick: u64,
    pub worms: Vec<WormSnapshot>,
    pub food: Option<Cell>,
    pub powerup: Option<Cell>,
    pub obstacles: Vec<Cell>,
    pub ticks_remaining: u32,
    /// Events produced by the tick this snapshot follows
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<GameEvent>,
}

/// Discrete round events for audio/notification consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GameEvent {
    AteFood {
        player_index: PlayerIndex,
        cell: Cell,
    },

    AtePowerup {
        player_index: PlayerIndex,
        cell: Cell,
    },

    AgentDied {
        player_index: PlayerIndex,
        cause: DeathCause,
        /// Attacker, for attack kills
        #[serde(default, skip_serializing_if = "Option::is_none")]
        killed_by: Option<PlayerIndex>,
    },

    PowerupSpawned {
        cell: Cell,
    },

    ObstacleRepaired {
        cell: Cell,
        by_player: PlayerIndex,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerScore {
    pub player_index: PlayerIndex,
    pub score: u32,
}

/// Final standings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    /// Longest worm, ties to the lowest index
    pub winner: Option<PlayerIndex>,
    pub scores: Vec<PlayerScore>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_command_wire_shape() {
        let msg: ClientMsg = serde_json::from_value(json!({
            "type": "input",
            "playerIndex": 2,
            "direction": "up",
        }))
        .unwrap();
        let ClientMsg::Input(cmd) = msg else {
            panic!("expected input");
        };
        assert_eq!(cmd.player_index, 2);
        assert_eq!(cmd.parsed_direction(), Some(Direction::Up));
        assert!(!cmd.attack);
        assert_eq!(cmd.seq, None);
    }

    #[test]
    fn malformed_direction_keeps_attack() {
        let msg: ClientMsg = serde_json::from_value(json!({
            "type": "input",
            "playerIndex": 0,
            "direction": "diagonal",
            "shoot": true,
        }))
        .unwrap();
        let ClientMsg::Input(cmd) = msg else {
            panic!("expected input");
        };
        assert_eq!(cmd.parsed_direction(), None);
        assert!(cmd.attack);
    }

    #[test]
    fn lobby_countdown_wire_shape() {
        let msg = ServerMsg::LobbyCountdown(LobbyCountdown {
            start_time: 1_700_000_005_000,
            seconds_remaining: 5,
        });
        assert_eq!(
            serde_json::to_value(msg).unwrap(),
            json!({"type": "lobby_countdown", "startTime": 1_700_000_005_000_i64, "secondsRemaining": 5})
        );
    }

    #[test]
    fn request_assign_is_bare_tag() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"request_assign"}"#).unwrap();
        assert_eq!(msg, ClientMsg::RequestAssign);
        assert_eq!(
            serde_json::to_value(ServerMsg::Assign(Assignment { player_index: 1 })).unwrap(),
            json!({"type": "assign", "playerIndex": 1})
        );
    }

    #[test]
    fn state_snapshot_wire_shape() {
        let snapshot = RoundSnapshot {
            tick: 7,
            worms: vec![WormSnapshot {
                player_index: 0,
                segments: vec![Cell::new(3, 2), Cell::new(2, 2)],
                direction: Direction::Right,
                attack_charges: 1,
                attack_active: false,
                attack_ticks_remaining: 0,
            }],
            food: Some(Cell::new(5, 5)),
            powerup: None,
            obstacles: vec![Cell::new(1, 1)],
            ticks_remaining: 90,
            events: Vec::new(),
        };

        let value = serde_json::to_value(ServerMsg::State(snapshot.clone())).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "state",
                "tick": 7,
                "worms": [{
                    "playerIndex": 0,
                    "segments": [{"x": 3, "y": 2}, {"x": 2, "y": 2}],
                    "direction": "right",
                    "attackCharges": 1,
                    "attackActive": false,
                    "attackTicksRemaining": 0,
                }],
                "food": {"x": 5, "y": 5},
                "powerup": null,
                "obstacles": [{"x": 1, "y": 1}],
                "ticksRemaining": 90,
            })
        );

        let back: ServerMsg = serde_json::from_value(value).unwrap();
        assert_eq!(back, ServerMsg::State(snapshot));
    }

    #[test]
    fn events_are_tagged() {
        let event = GameEvent::AgentDied {
            player_index: 3,
            cause: DeathCause::HeadOn,
            killed_by: None,
        };
        assert_eq!(
            serde_json::to_value(event).unwrap(),
            json!({"event": "agent_died", "playerIndex": 3, "cause": "head_on"})
        );
    }
}
