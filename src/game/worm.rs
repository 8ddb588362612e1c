//! Worm agent: body, heading and attack state

use std::collections::{HashSet, VecDeque};

use rand::Rng;
use tracing::warn;

use super::combat::AttackStats;
use super::grid::{Cell, Direction, GridWorld};
use super::PlayerIndex;

/// Length of a freshly (re)spawned worm
pub const SPAWN_LENGTH: usize = 2;
/// Random placement attempts before falling back to a full scan
pub const MAX_SPAWN_ATTEMPTS: u32 = 100;
/// Preferred distance from the walls for a fresh head
const SPAWN_MARGIN: i32 = 2;
/// Last-resort head position when the board has no valid spot
pub const FALLBACK_HEAD: Cell = Cell::new(2, 2);

/// How a respawn position was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Random search succeeded
    Random,
    /// Random search exhausted, a full scan found a free spot
    Scanned,
    /// Nothing free; fixed cell used, may overlap occupied cells
    Fallback,
}

/// A player-controlled worm. `segments[0]` is the head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worm {
    pub player_index: PlayerIndex,
    pub segments: VecDeque<Cell>,
    /// Direction of the last committed move
    pub direction: Direction,
    /// Requested direction for the next move
    pending_direction: Option<Direction>,
    pub attack_active: bool,
    pub attack_ticks_remaining: u32,
    pub attack_charges: u32,
}

impl Worm {
    /// Worm with its head at `head`, tail directly to the left, facing right
    pub fn new(player_index: PlayerIndex, head: Cell) -> Self {
        Self {
            player_index,
            segments: spawn_body(head),
            direction: Direction::default(),
            pending_direction: None,
            attack_active: false,
            attack_ticks_remaining: 0,
            attack_charges: 0,
        }
    }

    /// Rebuild a worm from replicated state. An empty body is padded to a
    /// spawn body at the origin so the head is always defined.
    pub fn from_parts(
        player_index: PlayerIndex,
        segments: Vec<Cell>,
        direction: Direction,
        attack_active: bool,
        attack_ticks_remaining: u32,
        attack_charges: u32,
    ) -> Self {
        let segments = if segments.is_empty() {
            spawn_body(Cell::new(1, 0))
        } else {
            segments.into()
        };
        Self {
            player_index,
            segments,
            direction,
            pending_direction: None,
            attack_active,
            attack_ticks_remaining,
            attack_charges,
        }
    }

    pub fn head(&self) -> Cell {
        self.segments[0]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn score(&self) -> u32 {
        self.segments.len().saturating_sub(1) as u32
    }

    pub fn occupies(&self, cell: Cell) -> bool {
        self.segments.contains(&cell)
    }

    /// Direction the next move will use
    pub fn heading(&self) -> Direction {
        self.pending_direction.unwrap_or(self.direction)
    }

    /// Request a new heading for the next move. Reversing onto the neck is
    /// rejected. Returns whether the request was accepted.
    pub fn set_direction(&mut self, direction: Direction) -> bool {
        if direction == self.direction.opposite() {
            return false;
        }
        self.pending_direction = Some(direction);
        true
    }

    /// Spend a charge to start an attack. No-op without charges or while
    /// an attack is already running.
    pub fn request_attack(&mut self, stats: &AttackStats) -> bool {
        if self.attack_charges == 0 || self.attack_active {
            return false;
        }
        self.attack_charges -= 1;
        self.attack_active = true;
        self.attack_ticks_remaining = stats.duration_ticks;
        true
    }

    pub fn tick_attack(&mut self) {
        if !self.attack_active {
            return;
        }
        self.attack_ticks_remaining = self.attack_ticks_remaining.saturating_sub(1);
        if self.attack_ticks_remaining == 0 {
            self.attack_active = false;
        }
    }

    /// Cell the head moves to next, possibly out of bounds
    pub fn projected_head(&self) -> Cell {
        self.head().step(self.heading(), 1)
    }

    /// Advance one cell. With `grow` the tail stays, adding one segment.
    pub fn apply_move(&mut self, grow: bool) {
        let next = self.projected_head();
        self.direction = self.heading();
        self.pending_direction = None;
        self.segments.push_front(next);
        if !grow {
            self.segments.pop_back();
        }
    }

    /// Cells covered by an active attack, nearest first
    pub fn attack_ray(&self, stats: &AttackStats) -> Vec<Cell> {
        if !self.attack_active {
            return Vec::new();
        }
        let head = self.head();
        (1..=stats.range as i32)
            .map(|distance| head.step(self.direction, distance))
            .collect()
    }

    /// Put the worm back on the board at length 2, facing right, with
    /// attack state and charges cleared. Neither the new head nor the
    /// tail behind it may hit `occupied` unless the fallback is used.
    pub fn respawn<R: Rng + ?Sized>(
        &mut self,
        world: &GridWorld,
        occupied: &HashSet<Cell>,
        rng: &mut R,
    ) -> Placement {
        let (head, placement) = find_spawn_head(world, occupied, rng);
        if placement == Placement::Fallback {
            warn!(
                player_index = self.player_index,
                x = head.x,
                y = head.y,
                "No free spawn position, using fallback cell"
            );
        }

        self.segments = spawn_body(head);
        self.direction = Direction::default();
        self.pending_direction = None;
        self.attack_active = false;
        self.attack_ticks_remaining = 0;
        self.attack_charges = 0;
        placement
    }
}

fn spawn_body(head: Cell) -> VecDeque<Cell> {
    VecDeque::from([head, Cell::new(head.x - 1, head.y)])
}

fn spawn_fits(world: &GridWorld, head: Cell, occupied: &HashSet<Cell>) -> bool {
    let tail = Cell::new(head.x - 1, head.y);
    world.contains(head) && world.contains(tail) && !occupied.contains(&head) && !occupied.contains(&tail)
}

fn spawn_span(len: i32, min: i32) -> (i32, i32) {
    if len - 2 * SPAWN_MARGIN > min.max(0) {
        (SPAWN_MARGIN.max(min), len - SPAWN_MARGIN)
    } else {
        (min, len)
    }
}

fn find_spawn_head<R: Rng + ?Sized>(
    world: &GridWorld,
    occupied: &HashSet<Cell>,
    rng: &mut R,
) -> (Cell, Placement) {
    let (x_lo, x_hi) = spawn_span(world.cols, 1);
    let (y_lo, y_hi) = spawn_span(world.rows, 0);

    if x_lo < x_hi && y_lo < y_hi {
        for _ in 0..MAX_SPAWN_ATTEMPTS {
            let head = Cell::new(rng.gen_range(x_lo..x_hi), rng.gen_range(y_lo..y_hi));
            if spawn_fits(world, head, occupied) {
                return (head, Placement::Random);
            }
        }
    }

    if let Some(head) = world.cells().find(|&c| spawn_fits(world, c, occupied)) {
        return (head, Placement::Scanned);
    }

    let head = Cell::new(
        FALLBACK_HEAD.x.min(world.cols - 1).max(1),
        FALLBACK_HEAD.y.min(world.rows - 1).max(0),
    );
    (head, Placement::Fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn stats() -> AttackStats {
        AttackStats {
            duration_ticks: 3,
            range: 3,
        }
    }

    fn worm_at(cells: &[(i32, i32)], direction: Direction) -> Worm {
        let segments = cells.iter().map(|&(x, y)| Cell::new(x, y)).collect();
        Worm::from_parts(0, segments, direction, false, 0, 0)
    }

    #[test]
    fn reversal_is_rejected() {
        let mut worm = worm_at(&[(4, 4), (3, 4)], Direction::Right);
        assert!(!worm.set_direction(Direction::Left));
        assert_eq!(worm.heading(), Direction::Right);
        assert!(worm.set_direction(Direction::Up));
        assert_eq!(worm.heading(), Direction::Up);
    }

    #[test]
    fn two_quick_turns_cannot_reverse() {
        let mut worm = worm_at(&[(4, 4), (3, 4)], Direction::Right);
        assert!(worm.set_direction(Direction::Up));
        // still judged against the committed heading
        assert!(!worm.set_direction(Direction::Left));
        assert_eq!(worm.heading(), Direction::Up);
    }

    #[test]
    fn direction_change_only_affects_next_move() {
        let mut worm = worm_at(&[(4, 4), (3, 4)], Direction::Right);
        worm.set_direction(Direction::Down);
        assert_eq!(worm.direction, Direction::Right);
        worm.apply_move(false);
        assert_eq!(worm.head(), Cell::new(4, 5));
        assert_eq!(worm.direction, Direction::Down);
    }

    #[test]
    fn move_and_grow() {
        let mut worm = worm_at(&[(4, 4), (3, 4)], Direction::Right);
        assert_eq!(worm.projected_head(), Cell::new(5, 4));
        worm.apply_move(false);
        assert_eq!(worm.segments, VecDeque::from([Cell::new(5, 4), Cell::new(4, 4)]));
        worm.apply_move(true);
        assert_eq!(worm.len(), 3);
        assert_eq!(worm.segments.back(), Some(&Cell::new(4, 4)));
        assert_eq!(worm.score(), 2);
    }

    #[test]
    fn attack_consumes_charge_and_expires() {
        let mut worm = worm_at(&[(4, 4), (3, 4)], Direction::Right);
        assert!(!worm.request_attack(&stats()));

        worm.attack_charges = 2;
        assert!(worm.request_attack(&stats()));
        assert!(!worm.request_attack(&stats()));
        assert_eq!(worm.attack_charges, 1);
        assert_eq!(worm.attack_ticks_remaining, 3);

        worm.tick_attack();
        worm.tick_attack();
        assert!(worm.attack_active);
        worm.tick_attack();
        assert!(!worm.attack_active);
        assert_eq!(worm.attack_ticks_remaining, 0);
    }

    #[test]
    fn attack_ray_points_forward() {
        let mut worm = worm_at(&[(4, 4), (4, 5)], Direction::Up);
        assert!(worm.attack_ray(&stats()).is_empty());
        worm.attack_active = true;
        assert_eq!(
            worm.attack_ray(&stats()),
            vec![Cell::new(4, 3), Cell::new(4, 2), Cell::new(4, 1)]
        );
    }

    #[test]
    fn respawn_avoids_occupied_cells() {
        let world = GridWorld::new(10, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let occupied: HashSet<Cell> = world.cells().filter(|c| c.y != 6).collect();

        let mut worm = worm_at(&[(4, 4), (3, 4), (2, 4)], Direction::Up);
        worm.attack_charges = 3;
        let placement = worm.respawn(&world, &occupied, &mut rng);

        assert_ne!(placement, Placement::Fallback);
        assert_eq!(worm.len(), SPAWN_LENGTH);
        assert_eq!(worm.head().y, 6);
        assert_eq!(worm.segments[1], Cell::new(worm.head().x - 1, 6));
        assert_eq!(worm.direction, Direction::Right);
        assert_eq!(worm.attack_charges, 0);
    }

    #[test]
    fn respawn_scans_when_random_search_misses() {
        let world = GridWorld::new(10, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        // only the top-right corner pair is free, outside the random span
        let occupied: HashSet<Cell> = world
            .cells()
            .filter(|&c| c != Cell::new(9, 0) && c != Cell::new(8, 0))
            .collect();

        let mut worm = worm_at(&[(4, 4), (3, 4)], Direction::Right);
        assert_eq!(worm.respawn(&world, &occupied, &mut rng), Placement::Scanned);
        assert_eq!(worm.head(), Cell::new(9, 0));
    }

    #[test]
    fn respawn_on_full_board_uses_fallback() {
        let world = GridWorld::new(6, 6);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let occupied: HashSet<Cell> = world.cells().collect();

        let mut worm = worm_at(&[(4, 4), (3, 4)], Direction::Right);
        assert_eq!(worm.respawn(&world, &occupied, &mut rng), Placement::Fallback);
        assert_eq!(worm.head(), FALLBACK_HEAD);
        assert_eq!(worm.len(), SPAWN_LENGTH);
    }
}
