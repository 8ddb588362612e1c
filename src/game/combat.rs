//! Combat system - attack rays, kills and obstacle repair

use std::collections::BTreeSet;

use super::grid::Cell;
use super::worm::Worm;
use super::PlayerIndex;

/// Attack tuning shared by all worms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackStats {
    /// Ticks an attack stays live after being requested
    pub duration_ticks: u32,
    /// Ray length in cells
    pub range: u32,
}

impl Default for AttackStats {
    fn default() -> Self {
        Self {
            duration_ticks: 3,
            range: 3,
        }
    }
}

/// Outcome of one worm's attack ray
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrikeResult {
    /// Obstacle cells cleared by the ray
    pub repaired: Vec<Cell>,
    /// Positions (into the worm slice) of worms touched by the ray
    pub victims: Vec<usize>,
}

/// Combat system for resolving attack rays
pub struct CombatSystem;

impl CombatSystem {
    /// Resolve the ray of the worm at `attacker`. Obstacles on the ray are
    /// removed right away so later placements can reuse the cells. Victims
    /// are reported, not respawned.
    pub fn strike(
        attacker: usize,
        worms: &[Worm],
        obstacles: &mut BTreeSet<Cell>,
        stats: &AttackStats,
    ) -> StrikeResult {
        let mut result = StrikeResult::default();
        let Some(worm) = worms.get(attacker) else {
            return result;
        };

        for cell in worm.attack_ray(stats) {
            if obstacles.remove(&cell) {
                result.repaired.push(cell);
            }
            for (idx, other) in worms.iter().enumerate() {
                if idx != attacker && other.occupies(cell) && !result.victims.contains(&idx) {
                    result.victims.push(idx);
                }
            }
        }

        result
    }

    /// Player index of whoever owns `position`, for event reporting
    pub fn owner(worms: &[Worm], position: usize) -> Option<PlayerIndex> {
        worms.get(position).map(|w| w.player_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::Direction;

    fn worm(index: PlayerIndex, cells: &[(i32, i32)], direction: Direction) -> Worm {
        let segments = cells.iter().map(|&(x, y)| Cell::new(x, y)).collect();
        Worm::from_parts(index, segments, direction, false, 0, 0)
    }

    #[test]
    fn inactive_attack_does_nothing() {
        let worms = vec![
            worm(0, &[(2, 2), (1, 2)], Direction::Right),
            worm(1, &[(3, 2), (3, 3)], Direction::Up),
        ];
        let mut obstacles = BTreeSet::from([Cell::new(4, 2)]);
        let result = CombatSystem::strike(0, &worms, &mut obstacles, &AttackStats::default());
        assert_eq!(result, StrikeResult::default());
        assert_eq!(obstacles.len(), 1);
    }

    #[test]
    fn ray_hits_other_worms_and_repairs_holes() {
        let mut attacker = worm(0, &[(2, 2), (1, 2)], Direction::Right);
        attacker.attack_active = true;
        let worms = vec![
            attacker,
            worm(1, &[(5, 0), (5, 1)], Direction::Up),
            worm(2, &[(4, 3), (4, 2)], Direction::Down),
            worm(3, &[(8, 8), (7, 8)], Direction::Right),
        ];
        let mut obstacles = BTreeSet::from([Cell::new(3, 2), Cell::new(9, 9)]);

        let result = CombatSystem::strike(0, &worms, &mut obstacles, &AttackStats::default());

        assert_eq!(result.repaired, vec![Cell::new(3, 2)]);
        assert_eq!(result.victims, vec![2]);
        assert_eq!(obstacles, BTreeSet::from([Cell::new(9, 9)]));
        assert_eq!(CombatSystem::owner(&worms, 2), Some(2));
    }
}
