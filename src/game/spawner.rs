//! Food and powerup placement

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use super::grid::{Cell, GridWorld};

/// Random attempts per board cell before switching to a full scan
const SAMPLES_PER_CELL: usize = 4;

/// Places resources on free cells and tracks the powerup spawn timer
#[derive(Debug, Clone)]
pub struct ResourceSpawner {
    world: GridWorld,
    /// Ticks a board must go without a powerup before one spawns
    powerup_threshold: u32,
    ticks_since_powerup: u32,
}

impl ResourceSpawner {
    pub fn new(world: GridWorld, powerup_threshold: u32) -> Self {
        Self {
            world,
            powerup_threshold,
            ticks_since_powerup: 0,
        }
    }

    pub fn ticks_since_powerup(&self) -> u32 {
        self.ticks_since_powerup
    }

    /// A uniformly chosen cell outside `occupied`, or `None` when the
    /// board is full.
    pub fn place_food(&self, occupied: &HashSet<Cell>, rng: &mut ChaCha8Rng) -> Option<Cell> {
        self.free_cell(occupied, rng)
    }

    /// Advance the spawn timer by one tick.
    pub fn tick(&mut self) {
        self.ticks_since_powerup = self.ticks_since_powerup.saturating_add(1);
    }

    /// Spawn a powerup when none is on the board and the timer has run
    /// out. The timer restarts on spawn.
    pub fn maybe_spawn_powerup(
        &mut self,
        current: Option<Cell>,
        occupied: &HashSet<Cell>,
        rng: &mut ChaCha8Rng,
    ) -> Option<Cell> {
        if current.is_some() || self.ticks_since_powerup < self.powerup_threshold {
            return None;
        }
        let cell = self.free_cell(occupied, rng)?;
        self.ticks_since_powerup = 0;
        Some(cell)
    }

    /// Restart the timer after a powerup was eaten.
    pub fn powerup_consumed(&mut self) {
        self.ticks_since_powerup = 0;
    }

    fn free_cell(&self, occupied: &HashSet<Cell>, rng: &mut ChaCha8Rng) -> Option<Cell> {
        let total = self.world.cell_count();
        if total == 0 {
            return None;
        }

        for _ in 0..total * SAMPLES_PER_CELL {
            let cell = self.world.random_cell(rng);
            if !occupied.contains(&cell) {
                return Some(cell);
            }
        }

        let free: Vec<Cell> = self.world.cells().filter(|c| !occupied.contains(c)).collect();
        free.choose(rng).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn food_lands_on_free_cell() {
        let world = GridWorld::new(5, 5);
        let spawner = ResourceSpawner::new(world, 10);
        let occupied: HashSet<Cell> = world.cells().filter(|&c| c != Cell::new(3, 1)).collect();
        assert_eq!(spawner.place_food(&occupied, &mut rng()), Some(Cell::new(3, 1)));
    }

    #[test]
    fn full_board_places_nothing() {
        let world = GridWorld::new(4, 4);
        let spawner = ResourceSpawner::new(world, 10);
        let occupied: HashSet<Cell> = world.cells().collect();
        assert_eq!(spawner.place_food(&occupied, &mut rng()), None);
    }

    #[test]
    fn powerup_waits_for_threshold() {
        let world = GridWorld::new(8, 8);
        let mut spawner = ResourceSpawner::new(world, 3);
        let mut rng = rng();
        let occupied = HashSet::new();

        spawner.tick();
        spawner.tick();
        assert_eq!(spawner.maybe_spawn_powerup(None, &occupied, &mut rng), None);

        spawner.tick();
        let cell = spawner.maybe_spawn_powerup(None, &occupied, &mut rng);
        assert!(cell.is_some());
        assert_eq!(spawner.ticks_since_powerup(), 0);
    }

    #[test]
    fn powerup_never_doubles_up() {
        let world = GridWorld::new(8, 8);
        let mut spawner = ResourceSpawner::new(world, 1);
        let mut rng = rng();
        spawner.tick();
        spawner.tick();
        let existing = Some(Cell::new(1, 1));
        assert_eq!(spawner.maybe_spawn_powerup(existing, &HashSet::new(), &mut rng), None);
        assert_eq!(spawner.ticks_since_powerup(), 2);

        spawner.powerup_consumed();
        assert_eq!(spawner.ticks_since_powerup(), 0);
    }
}
