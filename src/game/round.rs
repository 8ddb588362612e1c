//! Round state and the authoritative per-tick state machine

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashSet};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::ws::protocol::{
    GameEvent, InputCommand, PlayerScore, RoundResult, RoundSnapshot, WormSnapshot,
};

use super::collision::{CollisionSystem, DeathCause, MoveIntent};
use super::combat::{AttackStats, CombatSystem};
use super::grid::{Cell, Direction, GridWorld};
use super::spawner::ResourceSpawner;
use super::worm::Worm;
use super::{PlayerIndex, MAX_PLAYERS};

/// Round phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Ticks are being simulated
    Active,
    /// Timer ran out, terminal
    Ended,
}

/// What a single tick produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub events: Vec<GameEvent>,
    /// Set on the tick that ended the round
    pub ended: Option<RoundResult>,
}

/// Authoritative round simulator. Owns every worm, the food, the powerup,
/// the obstacle set and the round timer.
pub struct RoundSimulator {
    world: GridWorld,
    attack: AttackStats,
    /// Ordered by player index
    worms: Vec<Worm>,
    food: Option<Cell>,
    powerup: Option<Cell>,
    obstacles: BTreeSet<Cell>,
    ticks_remaining: u32,
    tick_index: u64,
    phase: RoundPhase,
    spawner: ResourceSpawner,
    rng: ChaCha8Rng,
    result: Option<RoundResult>,
}

impl RoundSimulator {
    pub fn new(config: &GameConfig, seed: u64) -> Self {
        let world = GridWorld::new(config.cols, config.rows);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let spawner = ResourceSpawner::new(world, config.powerup_spawn_ticks);
        let food = spawner.place_food(&HashSet::new(), &mut rng);

        Self {
            world,
            attack: config.attack,
            worms: Vec::new(),
            food,
            powerup: None,
            obstacles: BTreeSet::new(),
            ticks_remaining: config.round_ticks,
            tick_index: 0,
            phase: if config.round_ticks == 0 {
                RoundPhase::Ended
            } else {
                RoundPhase::Active
            },
            spawner,
            rng,
            result: None,
        }
    }

    pub fn world(&self) -> &GridWorld {
        &self.world
    }

    pub fn worms(&self) -> &[Worm] {
        &self.worms
    }

    pub fn worm(&self, player_index: PlayerIndex) -> Option<&Worm> {
        self.worms.iter().find(|w| w.player_index == player_index)
    }

    pub fn food(&self) -> Option<Cell> {
        self.food
    }

    pub fn powerup(&self) -> Option<Cell> {
        self.powerup
    }

    pub fn obstacles(&self) -> &BTreeSet<Cell> {
        &self.obstacles
    }

    pub fn ticks_remaining(&self) -> u32 {
        self.ticks_remaining
    }

    pub fn tick_index(&self) -> u64 {
        self.tick_index
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn result(&self) -> Option<&RoundResult> {
        self.result.as_ref()
    }

    /// Seat a new worm at the next free index. `None` when the round is
    /// full or over.
    pub fn add_player(&mut self) -> Option<PlayerIndex> {
        if self.phase == RoundPhase::Ended || self.worms.len() >= MAX_PLAYERS {
            return None;
        }
        let player_index = self.worms.len();
        let occupied = self.occupied_cells();
        let mut worm = Worm::new(player_index, Cell::new(1, 0));
        worm.respawn(&self.world, &occupied, &mut self.rng);
        self.worms.push(worm);

        info!(player_index, "Worm added to round");
        Some(player_index)
    }

    fn worm_mut(&mut self, player_index: PlayerIndex) -> Option<&mut Worm> {
        self.worms.iter_mut().find(|w| w.player_index == player_index)
    }

    /// Queue a heading change. Reversals and unknown players are ignored.
    pub fn set_direction(&mut self, player_index: PlayerIndex, direction: Direction) -> bool {
        self.worm_mut(player_index)
            .map(|w| w.set_direction(direction))
            .unwrap_or(false)
    }

    pub fn request_attack(&mut self, player_index: PlayerIndex) -> bool {
        let stats = self.attack;
        self.worm_mut(player_index)
            .map(|w| w.request_attack(&stats))
            .unwrap_or(false)
    }

    /// Apply a remote or local input command. Malformed parts are dropped
    /// without affecting the rest of the round.
    pub fn apply_command(&mut self, cmd: &InputCommand) -> bool {
        if self.worm(cmd.player_index).is_none() {
            debug!(player_index = cmd.player_index, "Input for unknown worm ignored");
            return false;
        }

        let mut applied = false;
        match (cmd.direction.as_deref(), cmd.parsed_direction()) {
            (_, Some(direction)) => applied |= self.set_direction(cmd.player_index, direction),
            (Some(raw), None) => {
                debug!(player_index = cmd.player_index, direction = raw, "Unknown direction ignored")
            }
            (None, None) => {}
        }
        if cmd.attack {
            applied |= self.request_attack(cmd.player_index);
        }
        applied
    }

    /// Advance the round by one tick
    pub fn tick(&mut self) -> TickReport {
        if self.phase == RoundPhase::Ended {
            return TickReport::default();
        }
        let mut events = Vec::new();

        // attack windows expire before anything else
        for worm in &mut self.worms {
            worm.tick_attack();
        }

        self.spawner.tick();
        let occupied = self.occupied_cells();
        if let Some(cell) = self
            .spawner
            .maybe_spawn_powerup(self.powerup, &occupied, &mut self.rng)
        {
            self.powerup = Some(cell);
            events.push(GameEvent::PowerupSpawned { cell });
        }

        // every collision check this tick reads these, never live bodies
        let old_segments: Vec<Vec<Cell>> = self
            .worms
            .iter()
            .map(|w| w.segments.iter().copied().collect())
            .collect();
        let projected: Vec<Cell> = self.worms.iter().map(Worm::projected_head).collect();
        let intents: Vec<MoveIntent<'_>> = self
            .worms
            .iter()
            .zip(&old_segments)
            .zip(&projected)
            .map(|((worm, body), &head)| MoveIntent {
                player_index: worm.player_index,
                old_segments: body,
                projected_head: head,
            })
            .collect();

        let verdict = CollisionSystem::classify(
            &self.world,
            &intents,
            self.food,
            self.powerup,
            &self.obstacles,
        );

        let mut reserved: HashSet<Cell> = old_segments.iter().flatten().copied().collect();
        reserved.extend(projected.iter().copied().filter(|&c| self.world.contains(c)));

        if let Some(winner) = verdict.food_winner {
            if let Some(eaten) = self.food.take() {
                self.obstacles.insert(eaten);
                let mut excluded = reserved.clone();
                excluded.extend(self.obstacles.iter().copied());
                excluded.extend(self.powerup);
                self.food = self.spawner.place_food(&excluded, &mut self.rng);
                events.push(GameEvent::AteFood {
                    player_index: self.worms[winner].player_index,
                    cell: eaten,
                });
            }
        }

        if let Some(winner) = verdict.powerup_winner {
            if let Some(cell) = self.powerup.take() {
                self.worms[winner].attack_charges += 1;
                self.spawner.powerup_consumed();
                events.push(GameEvent::AtePowerup {
                    player_index: self.worms[winner].player_index,
                    cell,
                });
            }
        }

        let mut respawn_occupied = reserved;
        respawn_occupied.extend(self.obstacles.iter().copied());
        respawn_occupied.extend(self.food);
        respawn_occupied.extend(self.powerup);

        for (i, worm) in self.worms.iter_mut().enumerate() {
            if let Some(&cause) = verdict.dead.get(&i) {
                worm.respawn(&self.world, &respawn_occupied, &mut self.rng);
                respawn_occupied.extend(worm.segments.iter().copied());
                debug!(player_index = worm.player_index, ?cause, "Worm died");
                events.push(GameEvent::AgentDied {
                    player_index: worm.player_index,
                    cause,
                    killed_by: None,
                });
            } else {
                worm.apply_move(verdict.food_winner == Some(i));
            }
        }

        // attacks act on post-move positions
        events.extend(self.resolve_attacks());

        if self.food.is_none() {
            self.food = self
                .spawner
                .place_food(&self.occupied_cells(), &mut self.rng);
        }

        self.tick_index += 1;
        self.ticks_remaining = self.ticks_remaining.saturating_sub(1);

        let ended = if self.ticks_remaining == 0 {
            let result = self.finalize();
            info!(
                tick = self.tick_index,
                winner = ?result.winner,
                "Round ended"
            );
            Some(result)
        } else {
            None
        };

        TickReport { events, ended }
    }

    fn resolve_attacks(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();

        for attacker in 0..self.worms.len() {
            if !self.worms[attacker].attack_active {
                continue;
            }
            let by_player = self.worms[attacker].player_index;
            let strike = CombatSystem::strike(attacker, &self.worms, &mut self.obstacles, &self.attack);

            for cell in strike.repaired {
                events.push(GameEvent::ObstacleRepaired { cell, by_player });
            }

            for victim in strike.victims {
                let occupied = self.occupied_cells();
                let Some(victim_index) = CombatSystem::owner(&self.worms, victim) else {
                    continue;
                };
                self.worms[victim].respawn(&self.world, &occupied, &mut self.rng);
                debug!(player_index = victim_index, by_player, "Worm hit by attack");
                events.push(GameEvent::AgentDied {
                    player_index: victim_index,
                    cause: DeathCause::Attack,
                    killed_by: Some(by_player),
                });
            }
        }

        events
    }

    fn finalize(&mut self) -> RoundResult {
        self.phase = RoundPhase::Ended;

        let winner = self
            .worms
            .iter()
            .max_by_key(|w| (w.len(), Reverse(w.player_index)))
            .map(|w| w.player_index);

        let result = RoundResult {
            winner,
            scores: self.scores(),
            finished_at: chrono::Utc::now(),
        };
        self.result = Some(result.clone());
        result
    }

    /// Current score per worm: length minus one
    pub fn scores(&self) -> Vec<PlayerScore> {
        self.worms
            .iter()
            .map(|w| PlayerScore {
                player_index: w.player_index,
                score: w.score(),
            })
            .collect()
    }

    /// Every cell a new item or worm must avoid
    fn occupied_cells(&self) -> HashSet<Cell> {
        let mut occupied: HashSet<Cell> = self
            .worms
            .iter()
            .flat_map(|w| w.segments.iter().copied())
            .collect();
        occupied.extend(self.obstacles.iter().copied());
        occupied.extend(self.food);
        occupied.extend(self.powerup);
        occupied
    }

    /// Full round state for replication
    pub fn snapshot(&self, events: Vec<GameEvent>) -> RoundSnapshot {
        RoundSnapshot {
            tick: self.tick_index,
            worms: self
                .worms
                .iter()
                .map(|w| WormSnapshot {
                    player_index: w.player_index,
                    segments: w.segments.iter().copied().collect(),
                    // committed, so peers check reversals the way the host does
                    direction: w.direction,
                    attack_charges: w.attack_charges,
                    attack_active: w.attack_active,
                    attack_ticks_remaining: w.attack_ticks_remaining,
                })
                .collect(),
            food: self.food,
            powerup: self.powerup,
            obstacles: self.obstacles.iter().copied().collect(),
            ticks_remaining: self.ticks_remaining,
            events,
        }
    }
}
