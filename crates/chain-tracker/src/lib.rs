//! Serial-writer cache of the latest observed block.
//!
//! Fed from NewBlock events, with RPC status as a fallback. The halt signal
//! trips when no new block has been observed for longer than the configured
//! timeout.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
struct Observed {
    height: u64,
    block_time: DateTime<Utc>,
    seen_at: Instant,
}

/// Shared cache of `(latest_block_height, latest_block_time)`.
#[derive(Debug)]
pub struct ChainTracker {
    latest: Mutex<Option<Observed>>,
    halt_timeout: Duration,
}

impl ChainTracker {
    pub fn new(halt_timeout: Duration) -> Self {
        Self {
            latest: Mutex::new(None),
            halt_timeout,
        }
    }

    /// Records a newer block. Stale updates (height not advancing) only
    /// refresh the halt clock when the pair actually changed.
    pub fn observe(&self, height: u64, block_time: DateTime<Utc>) {
        let mut latest = self.latest.lock();
        match latest.as_mut() {
            Some(prev) if height <= prev.height && block_time <= prev.block_time => {}
            _ => {
                *latest = Some(Observed {
                    height,
                    block_time,
                    seen_at: Instant::now(),
                });
            }
        }
    }

    pub fn latest_block_height(&self) -> Option<u64> {
        self.latest.lock().map(|observed| observed.height)
    }

    pub fn latest_block_time(&self) -> Option<DateTime<Utc>> {
        self.latest.lock().map(|observed| observed.block_time)
    }

    /// True when the latest pair has not changed for longer than the
    /// configured timeout. An empty cache does not count as halted.
    pub fn is_halted(&self) -> bool {
        let Some(observed) = *self.latest.lock() else {
            return false;
        };
        let halted = observed.seen_at.elapsed() > self.halt_timeout;
        if halted {
            warn!(
                height = observed.height,
                stale_for_secs = observed.seen_at.elapsed().as_secs(),
                "chain appears halted"
            );
        }
        halted
    }
}
