//! Tick scheduling sources

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Drives a session's tick loop. `next_tick` resolves once per tick and
/// returns `false` when the source is exhausted. It must be cancel safe,
/// the session races it against incoming messages.
pub trait TickSource: Send {
    fn next_tick(&mut self) -> impl Future<Output = bool> + Send;
}

/// Wall-clock ticks at a fixed interval
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

impl TickSource for IntervalTicker {
    async fn next_tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticks on demand, one per message on its channel. Dropping every
/// sender exhausts it.
pub struct ManualTicker {
    rx: mpsc::Receiver<()>,
}

impl ManualTicker {
    pub fn new() -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel(64);
        (Self { rx }, tx)
    }
}

impl TickSource for ManualTicker {
    async fn next_tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_ticker_exhausts_when_sender_drops() {
        let (mut ticker, tx) = ManualTicker::new();
        tx.send(()).await.unwrap();
        assert!(ticker.next_tick().await);
        drop(tx);
        assert!(!ticker.next_tick().await);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_ticker_follows_the_clock() {
        let mut ticker = IntervalTicker::new(Duration::from_millis(120));
        let start = tokio::time::Instant::now();
        // first tick completes immediately
        assert!(ticker.next_tick().await);
        assert!(ticker.next_tick().await);
        assert_eq!(start.elapsed(), Duration::from_millis(120));
    }
}
