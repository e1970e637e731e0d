//! Per-job progress channel.
//!
//! Each batch owns its own [`ProgressChannel`] wrapping a tokio broadcast
//! sender, so concurrent jobs cannot leak progress into each other's
//! listeners. Subscribers attach with [`ProgressChannel::subscribe`]; a
//! subscriber disconnecting only stops its own delivery — the underlying job
//! always runs to completion, and emitting into a channel with no receivers
//! is a no-op rather than an error.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Progress event emitted after every per-image completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// One more image finished (successfully or not).
    ///
    /// `percent` is `round(done / total * 100)`; values are monotonically
    /// non-decreasing and the final event of a batch is always 100.
    Percent {
        done: usize,
        total: usize,
        percent: u8,
    },
    /// The batch finished; counts for the caller's summary.
    Finished { succeeded: usize, failed: usize },
}

/// Rounded completion percentage for `done` out of `total` items.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).round() as u8
}

/// Broadcast handle for one job's progress events.
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressChannel {
    /// Create a channel buffering up to `capacity` undelivered events per
    /// subscriber. Slow subscribers that fall further behind see a lag error
    /// and resume at the newest event, which is fine for percentages.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Attach a new listener.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current listeners. A job with no listeners is
    /// not an error.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_and_caps() {
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_a_noop() {
        let ch = ProgressChannel::default();
        ch.emit(ProgressEvent::Percent {
            done: 1,
            total: 2,
            percent: 50,
        });
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let ch = ProgressChannel::default();
        let mut rx = ch.subscribe();
        for done in 1..=4usize {
            ch.emit(ProgressEvent::Percent {
                done,
                total: 4,
                percent: percent(done, 4),
            });
        }
        ch.emit(ProgressEvent::Finished {
            succeeded: 4,
            failed: 0,
        });

        let mut last = 0u8;
        for _ in 0..4 {
            match rx.recv().await.unwrap() {
                ProgressEvent::Percent { percent, .. } => {
                    assert!(percent >= last);
                    last = percent;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(last, 100);
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::Finished {
                succeeded: 4,
                failed: 0
            }
        );
    }
}
