//! Simultaneous move classification.
//!
//! Every check reads the pre-tick bodies and the projected heads only, so
//! the verdict for one worm never depends on where another worm sits in
//! the iteration order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::grid::{Cell, GridWorld};
use super::PlayerIndex;

/// Why a worm died this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Wall,
    #[serde(rename = "self")]
    SelfCollision,
    Body,
    Obstacle,
    HeadOn,
    Attack,
}

/// One worm as seen by the classification pass
#[derive(Debug, Clone)]
pub struct MoveIntent<'a> {
    pub player_index: PlayerIndex,
    /// Body before this tick, head first
    pub old_segments: &'a [Cell],
    pub projected_head: Cell,
}

/// Verdict for a whole tick. Keys are positions into the intent slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub dead: BTreeMap<usize, DeathCause>,
    pub food_winner: Option<usize>,
    pub powerup_winner: Option<usize>,
}

impl Classification {
    pub fn is_dead(&self, position: usize) -> bool {
        self.dead.contains_key(&position)
    }
}

/// Collision system for classifying simultaneous moves
pub struct CollisionSystem;

impl CollisionSystem {
    pub fn classify(
        world: &GridWorld,
        intents: &[MoveIntent<'_>],
        food: Option<Cell>,
        powerup: Option<Cell>,
        obstacles: &BTreeSet<Cell>,
    ) -> Classification {
        let mut result = Classification::default();
        let mut food_candidates = Vec::new();
        let mut powerup_candidates = Vec::new();

        for (i, intent) in intents.iter().enumerate() {
            let head = intent.projected_head;
            if !world.contains(head) {
                result.dead.insert(i, DeathCause::Wall);
            } else if food == Some(head) {
                food_candidates.push(i);
            } else if powerup == Some(head) {
                powerup_candidates.push(i);
            }
        }

        let lowest_index = |candidates: &[usize]| {
            candidates
                .iter()
                .copied()
                .min_by_key(|&i| intents[i].player_index)
        };
        result.food_winner = lowest_index(&food_candidates);
        result.powerup_winner = lowest_index(&powerup_candidates);

        let is_winner = |i: usize| result.food_winner == Some(i) || result.powerup_winner == Some(i);

        let mut body_deaths = Vec::new();
        for (i, intent) in intents.iter().enumerate() {
            if result.dead.contains_key(&i) || is_winner(i) {
                continue;
            }
            let head = intent.projected_head;
            if intent.old_segments.iter().skip(1).any(|&c| c == head) {
                body_deaths.push((i, DeathCause::SelfCollision));
            } else if intents
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && other.old_segments.contains(&head))
            {
                body_deaths.push((i, DeathCause::Body));
            } else if obstacles.contains(&head) {
                body_deaths.push((i, DeathCause::Obstacle));
            }
        }

        let mut by_cell: HashMap<Cell, Vec<usize>> = HashMap::new();
        for (i, intent) in intents.iter().enumerate() {
            if world.contains(intent.projected_head) {
                by_cell.entry(intent.projected_head).or_default().push(i);
            }
        }
        let mut head_on = Vec::new();
        for group in by_cell.values() {
            if group.len() >= 2 && !group.iter().any(|&i| is_winner(i)) {
                head_on.extend(group.iter().copied());
            }
        }

        for (i, cause) in body_deaths {
            result.dead.insert(i, cause);
        }
        for i in head_on {
            result.dead.entry(i).or_insert(DeathCause::HeadOn);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(list: &[(i32, i32)]) -> Vec<Cell> {
        list.iter().map(|&(x, y)| Cell::new(x, y)).collect()
    }

    fn intents<'a>(bodies: &'a [Vec<Cell>], heads: &[(i32, i32)]) -> Vec<MoveIntent<'a>> {
        bodies
            .iter()
            .zip(heads)
            .enumerate()
            .map(|(i, (body, &(x, y)))| MoveIntent {
                player_index: i,
                old_segments: body,
                projected_head: Cell::new(x, y),
            })
            .collect()
    }

    fn world() -> GridWorld {
        GridWorld::new(10, 10)
    }

    #[test]
    fn wall_kills() {
        let bodies = vec![cells(&[(9, 3), (8, 3)])];
        let c = CollisionSystem::classify(&world(), &intents(&bodies, &[(10, 3)]), None, None, &BTreeSet::new());
        assert_eq!(c.dead.get(&0), Some(&DeathCause::Wall));
    }

    #[test]
    fn head_on_kills_both_in_either_order() {
        let bodies = vec![cells(&[(4, 4), (3, 4)]), cells(&[(6, 4), (7, 4)])];
        let forward = intents(&bodies, &[(5, 4), (5, 4)]);
        let c = CollisionSystem::classify(&world(), &forward, None, None, &BTreeSet::new());
        assert_eq!(c.dead.len(), 2);
        assert!(c.dead.values().all(|&d| d == DeathCause::HeadOn));

        let reversed_bodies = vec![bodies[1].clone(), bodies[0].clone()];
        let reversed = intents(&reversed_bodies, &[(5, 4), (5, 4)]);
        let c = CollisionSystem::classify(&world(), &reversed, None, None, &BTreeSet::new());
        assert_eq!(c.dead.len(), 2);
    }

    #[test]
    fn food_contest_goes_to_lowest_index() {
        let bodies = vec![cells(&[(6, 5), (7, 5)]), cells(&[(4, 5), (3, 5)])];
        let mut list = intents(&bodies, &[(5, 5), (5, 5)]);
        // position 0 carries the higher player index
        list[0].player_index = 1;
        list[1].player_index = 0;
        let c = CollisionSystem::classify(&world(), &list, Some(Cell::new(5, 5)), None, &BTreeSet::new());
        assert_eq!(c.food_winner, Some(1));
        assert!(c.dead.is_empty());
    }

    #[test]
    fn losing_food_contender_still_hits_obstacles() {
        let bodies = vec![cells(&[(4, 5), (3, 5)]), cells(&[(6, 5), (7, 5)])];
        let list = intents(&bodies, &[(5, 5), (5, 5)]);
        let obstacles = BTreeSet::from([Cell::new(5, 5)]);
        let c = CollisionSystem::classify(&world(), &list, Some(Cell::new(5, 5)), None, &obstacles);
        assert_eq!(c.food_winner, Some(0));
        assert_eq!(c.dead.get(&1), Some(&DeathCause::Obstacle));
        assert!(!c.is_dead(0));
    }

    #[test]
    fn powerup_contest_uses_same_tie_break() {
        let bodies = vec![cells(&[(2, 1), (1, 1)]), cells(&[(3, 0), (4, 0)]), cells(&[(8, 8), (7, 8)])];
        let list = intents(&bodies, &[(3, 1), (3, 1), (9, 8)]);
        let c = CollisionSystem::classify(&world(), &list, None, Some(Cell::new(3, 1)), &BTreeSet::new());
        assert_eq!(c.powerup_winner, Some(0));
        assert!(c.dead.is_empty());
    }

    #[test]
    fn body_checks_use_pre_tick_positions() {
        // worm 1's tail cell is vacated this tick, but the old body still counts
        let bodies = vec![cells(&[(2, 2), (1, 2)]), cells(&[(4, 1), (4, 2), (3, 2)])];
        let list = intents(&bodies, &[(3, 2), (4, 0)]);
        let c = CollisionSystem::classify(&world(), &list, None, None, &BTreeSet::new());
        assert_eq!(c.dead.get(&0), Some(&DeathCause::Body));
        assert!(!c.is_dead(1));
    }

    #[test]
    fn self_collision_ignores_old_head() {
        let bodies = vec![cells(&[(3, 3), (3, 4), (4, 4), (4, 3)])];
        let c = CollisionSystem::classify(&world(), &intents(&bodies, &[(4, 3)]), None, None, &BTreeSet::new());
        assert_eq!(c.dead.get(&0), Some(&DeathCause::SelfCollision));
    }
}
