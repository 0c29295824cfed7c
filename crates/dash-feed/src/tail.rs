//! Live log following with a jittered polling cadence.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dash_core::config::TailConfig;

use crate::infinite::{InfiniteList, LazyQuery, LoadOutcome};
use crate::log_format::LogEvent;

/// Consecutive failures past this count no longer lengthen the wait.
const MAX_BACKOFF_DOUBLINGS: u32 = 3;

/// Picks the wait before each tail poll.
///
/// The wait is the base interval, doubled for every consecutive failed poll
/// (at most [`MAX_BACKOFF_DOUBLINGS`] times), plus a jitter of up to
/// `max_jitter`. The jitter sequence is fixed by the key, so two tails of the
/// same log wait the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollScheduler {
    base: Duration,
    max_jitter_ms: u64,
    state: u64,
}

impl PollScheduler {
    pub fn new(base: Duration, max_jitter: Duration, key: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        Self {
            base: base.max(Duration::from_millis(1)),
            max_jitter_ms: u64::try_from(max_jitter.as_millis()).unwrap_or(u64::MAX),
            // xorshift never leaves zero
            state: hasher.finish() | 1,
        }
    }

    pub fn from_config(cfg: &TailConfig, key: &str) -> Self {
        Self::new(cfg.base_interval, cfg.max_jitter, key)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Wait without jitter after `failures` consecutive failed polls.
    pub fn backoff(&self, failures: usize) -> Duration {
        let doublings = u32::try_from(failures)
            .unwrap_or(u32::MAX)
            .min(MAX_BACKOFF_DOUBLINGS);
        self.base.saturating_mul(1_u32 << doublings)
    }

    /// Wait before the next poll; advances the jitter sequence.
    pub fn next_interval(&mut self, failures: usize) -> Duration {
        let jitter = self.next_jitter();
        self.backoff(failures).saturating_add(jitter)
    }

    fn next_jitter(&mut self) -> Duration {
        if self.max_jitter_ms == 0 {
            return Duration::ZERO;
        }
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        Duration::from_millis(x % self.max_jitter_ms.saturating_add(1))
    }
}

// ---------------------------------------------------------------------------
// LogTail
// ---------------------------------------------------------------------------

/// Result of one tail poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailTick {
    /// Lines appended by this poll, oldest first.
    pub new_events: Vec<LogEvent>,
    pub failed: bool,
}

/// Follows a log by repeatedly fetching whatever follows the newest line.
pub struct LogTail<Q>
where
    Q: LazyQuery<Item = LogEvent>,
{
    list: InfiniteList<Q>,
    scheduler: PollScheduler,
    consecutive_failures: usize,
}

impl<Q> LogTail<Q>
where
    Q: LazyQuery<Item = LogEvent>,
{
    /// `list` should already carry the buffer cap; see [`LogTail::from_config`].
    pub fn new(list: InfiniteList<Q>, scheduler: PollScheduler) -> Self {
        Self {
            list,
            scheduler,
            consecutive_failures: 0,
        }
    }

    pub fn from_config(list: InfiniteList<Q>, cfg: &TailConfig, key: &str) -> Self {
        let list = list.with_max_items(cfg.max_buffered_events);
        Self::new(list, PollScheduler::from_config(cfg, key))
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.list.items()
    }

    pub fn list(&self) -> &InfiniteList<Q> {
        &self.list
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    /// Fetch once. `new_events` holds every appended line, even when the
    /// buffer cap already dropped some of them.
    pub async fn poll_once(&mut self) -> TailTick {
        let (outcome, appended) = self.list.poll_appended().await;
        match outcome {
            LoadOutcome::Appended { .. } => {
                self.consecutive_failures = 0;
                TailTick {
                    new_events: appended,
                    failed: false,
                }
            }
            LoadOutcome::Failed(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(
                    failures = self.consecutive_failures,
                    error = %err,
                    "log tail poll failed"
                );
                TailTick {
                    new_events: Vec::new(),
                    failed: true,
                }
            }
            LoadOutcome::Exhausted | LoadOutcome::InFlight | LoadOutcome::Stale => {
                self.consecutive_failures = 0;
                TailTick {
                    new_events: Vec::new(),
                    failed: false,
                }
            }
        }
    }

    /// Poll until `cancel` fires, handing each batch of new lines to `sink`.
    pub async fn follow<F>(&mut self, cancel: CancellationToken, mut sink: F)
    where
        F: FnMut(&[LogEvent]),
    {
        loop {
            let tick = self.poll_once().await;
            if !tick.new_events.is_empty() {
                sink(&tick.new_events);
            }
            let wait = self.scheduler.next_interval(self.consecutive_failures);
            debug!(wait_ms = wait.as_millis() as u64, "log tail sleeping");
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("log tail cancelled");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn failures_double_the_wait_up_to_a_cap() {
        let scheduler = PollScheduler::new(Duration::from_millis(500), Duration::ZERO, "train");
        let waits: Vec<u128> = (0..6).map(|n| scheduler.backoff(n).as_millis()).collect();
        assert_eq!(waits, vec![500, 1_000, 2_000, 4_000, 4_000, 4_000]);
    }

    #[test]
    fn zero_jitter_waits_exactly_the_backoff() {
        let mut scheduler = PollScheduler::new(Duration::from_secs(1), Duration::ZERO, "train");
        assert_eq!(scheduler.next_interval(0), Duration::from_secs(1));
        assert_eq!(scheduler.next_interval(1), Duration::from_secs(2));
    }

    #[test]
    fn jitter_stays_in_range_and_repeats_per_key() {
        let jitter = Duration::from_millis(250);
        let mut first = PollScheduler::new(Duration::from_secs(2), jitter, "run-a");
        let mut again = PollScheduler::new(Duration::from_secs(2), jitter, "run-a");
        let mut waits = Vec::new();
        for _ in 0..32 {
            let wait = first.next_interval(0);
            assert_eq!(wait, again.next_interval(0));
            assert!(wait >= Duration::from_secs(2));
            assert!(wait <= Duration::from_millis(2_250));
            waits.push(wait);
        }
        waits.dedup();
        assert!(waits.len() > 1, "jitter never varied");
    }

    #[test]
    fn scheduler_takes_cadence_from_tail_config() {
        let cfg = TailConfig {
            base_interval: Duration::ZERO,
            max_jitter: Duration::ZERO,
            max_buffered_events: 10,
        };
        let scheduler = PollScheduler::from_config(&cfg, "train");
        assert_eq!(scheduler.base(), Duration::from_millis(1));
    }
}
