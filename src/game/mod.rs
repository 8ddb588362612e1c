//! Game simulation modules

pub mod collision;
pub mod combat;
pub mod grid;
pub mod round;
pub mod snapshot;
pub mod spawner;
pub mod worm;

pub use round::{RoundPhase, RoundSimulator, TickReport};

/// Seat number of a player, `0..MAX_PLAYERS`
pub type PlayerIndex = usize;

/// Hard cap on worms per round
pub const MAX_PLAYERS: usize = 4;
