//! Snapshot send policy

use std::str::FromStr;

use crate::ws::protocol::RoundSnapshot;

/// When the host pushes state to peers. Sending every tick keeps
/// corrections small; the other modes trade correction latency for
/// bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    EveryTick,
    /// Only when the board or events changed
    OnChange,
    /// Every N ticks
    Interval(u32),
}

impl Default for SnapshotMode {
    fn default() -> Self {
        Self::EveryTick
    }
}

impl FromStr for SnapshotMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "every_tick" => Ok(Self::EveryTick),
            "on_change" => Ok(Self::OnChange),
            other => other
                .strip_prefix("interval:")
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|&n| n > 0)
                .map(Self::Interval)
                .ok_or_else(|| format!("unknown snapshot mode: {other}")),
        }
    }
}

/// Decides which snapshots go out on the wire
pub struct SnapshotBuilder {
    mode: SnapshotMode,
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    forced: bool,
    last_sent: Option<RoundSnapshot>,
}

impl SnapshotBuilder {
    pub fn new(mode: SnapshotMode) -> Self {
        Self {
            mode,
            ticks_since_snapshot: 0,
            forced: false,
            last_sent: None,
        }
    }

    /// Force snapshot on next check (used for joins and round end)
    pub fn force_next(&mut self) {
        self.forced = true;
    }

    /// Check whether `snapshot` should be sent, recording it if so
    pub fn should_send(&mut self, snapshot: &RoundSnapshot) -> bool {
        self.ticks_since_snapshot += 1;

        let send = self.forced
            || snapshot.ticks_remaining == 0
            || match self.mode {
                SnapshotMode::EveryTick => true,
                SnapshotMode::Interval(n) => self.ticks_since_snapshot >= n,
                SnapshotMode::OnChange => {
                    !snapshot.events.is_empty()
                        || self
                            .last_sent
                            .as_ref()
                            .map_or(true, |last| !same_board(last, snapshot))
                }
            };

        if send {
            self.forced = false;
            self.ticks_since_snapshot = 0;
            self.last_sent = Some(snapshot.clone());
        }
        send
    }
}

/// Board equality ignoring the clock and events
fn same_board(a: &RoundSnapshot, b: &RoundSnapshot) -> bool {
    a.worms == b.worms && a.food == b.food && a.powerup == b.powerup && a.obstacles == b.obstacles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::{Cell, Direction};
    use crate::ws::protocol::{GameEvent, WormSnapshot};

    fn snapshot(tick: u64, head_x: i32) -> RoundSnapshot {
        RoundSnapshot {
            tick,
            worms: vec![WormSnapshot {
                player_index: 0,
                segments: vec![Cell::new(head_x, 1), Cell::new(head_x - 1, 1)],
                direction: Direction::Right,
                attack_charges: 0,
                attack_active: false,
                attack_ticks_remaining: 0,
            }],
            food: Some(Cell::new(0, 0)),
            powerup: None,
            obstacles: Vec::new(),
            ticks_remaining: 100 - tick as u32,
            events: Vec::new(),
        }
    }

    #[test]
    fn parses_modes() {
        assert_eq!("every_tick".parse(), Ok(SnapshotMode::EveryTick));
        assert_eq!("on_change".parse(), Ok(SnapshotMode::OnChange));
        assert_eq!("interval:3".parse(), Ok(SnapshotMode::Interval(3)));
        assert!("interval:0".parse::<SnapshotMode>().is_err());
        assert!("sometimes".parse::<SnapshotMode>().is_err());
    }

    #[test]
    fn on_change_skips_identical_boards() {
        let mut builder = SnapshotBuilder::new(SnapshotMode::OnChange);
        assert!(builder.should_send(&snapshot(1, 3)));
        // only the clock moved
        let mut same = snapshot(2, 3);
        same.ticks_remaining = 50;
        assert!(!builder.should_send(&same));
        assert!(builder.should_send(&snapshot(3, 4)));

        let mut with_event = snapshot(4, 4);
        with_event.events.push(GameEvent::PowerupSpawned { cell: Cell::new(2, 2) });
        assert!(builder.should_send(&with_event));
    }

    #[test]
    fn interval_counts_ticks() {
        let mut builder = SnapshotBuilder::new(SnapshotMode::Interval(3));
        let sent: Vec<bool> = (1..=6).map(|t| builder.should_send(&snapshot(t, 3))).collect();
        assert_eq!(sent, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn forced_and_final_snapshots_always_go_out() {
        let mut builder = SnapshotBuilder::new(SnapshotMode::Interval(10));
        builder.force_next();
        assert!(builder.should_send(&snapshot(1, 3)));
        assert!(!builder.should_send(&snapshot(2, 3)));

        let mut last = snapshot(3, 3);
        last.ticks_remaining = 0;
        assert!(builder.should_send(&last));
    }
}
