//! Cooperative timer facility.
//!
//! Timers are keyed, so starting a timer that is already armed replaces it.
//! Deadlines live in a min-heap; a cancelled or replaced entry stays in the
//! heap but is recognised as stale by its sequence number and skipped, so it
//! can never fire.

use crate::types::RouterId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

/// Identifies a timer owned by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKey {
    /// Periodic Hello transmission
    Hello,
    /// One-shot Wait timer before the first election
    Wait,
    /// Periodic status republication
    Heartbeat,
    /// Per-neighbor inactivity (dead interval)
    Inactivity(RouterId),
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    seq: u64,
    period: Option<Duration>,
}

/// Set of one-shot and periodic timers
#[derive(Debug, Default)]
pub struct Timers {
    heap: BinaryHeap<Reverse<(Instant, u64, TimerKey)>>,
    armed: HashMap<TimerKey, Armed>,
    next_seq: u64,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer, replacing any timer with the same key
    pub fn start_oneshot(&mut self, key: TimerKey, at: Instant) {
        self.arm(key, at, None);
    }

    /// Arm a periodic timer whose first expiry is `first`
    pub fn start_periodic(&mut self, key: TimerKey, first: Instant, period: Duration) {
        self.arm(key, first, Some(period));
    }

    fn arm(&mut self, key: TimerKey, at: Instant, period: Option<Duration>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.armed.insert(key, Armed { seq, period });
        self.heap.push(Reverse((at, seq, key)));
    }

    /// Cancel a timer. Returns whether it was armed.
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        self.armed.remove(&key).is_some()
    }

    /// Cancel every timer
    pub fn cancel_all(&mut self) {
        self.armed.clear();
        self.heap.clear();
    }

    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.armed.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    fn is_live(&self, seq: u64, key: TimerKey) -> bool {
        self.armed.get(&key).is_some_and(|armed| armed.seq == seq)
    }

    fn prune(&mut self) {
        while let Some(Reverse((_, seq, key))) = self.heap.peek().copied() {
            if self.is_live(seq, key) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Earliest pending deadline
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.prune();
        self.heap.peek().map(|Reverse((at, _, _))| *at)
    }

    /// Pop one timer that is due at `now`.
    ///
    /// Periodic timers are re-armed before being returned. Callers handle one
    /// expiry at a time so that a handler cancelling another due timer is
    /// honoured.
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerKey> {
        self.prune();

        let Reverse((at, seq, key)) = *self.heap.peek()?;
        if at > now {
            return None;
        }
        self.heap.pop();

        match self.armed.get(&key).and_then(|armed| armed.period) {
            Some(period) => {
                let mut next = at + period;
                if next <= now {
                    // Missed cycles are skipped rather than replayed
                    next = now + period;
                }
                self.heap.push(Reverse((next, seq, key)));
            }
            None => {
                self.armed.remove(&key);
            }
        }

        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_oneshot_fires_once() {
        let t0 = Instant::now();
        let mut timers = Timers::new();
        timers.start_oneshot(TimerKey::Wait, t0 + secs(40));

        assert_eq!(timers.next_deadline(), Some(t0 + secs(40)));
        assert_eq!(timers.pop_expired(t0 + secs(39)), None);
        assert_eq!(timers.pop_expired(t0 + secs(40)), Some(TimerKey::Wait));
        assert_eq!(timers.pop_expired(t0 + secs(100)), None);
        assert!(!timers.is_armed(TimerKey::Wait));
    }

    #[test]
    fn test_periodic_rearms() {
        let t0 = Instant::now();
        let mut timers = Timers::new();
        timers.start_periodic(TimerKey::Hello, t0 + secs(10), secs(10));

        assert_eq!(timers.pop_expired(t0 + secs(10)), Some(TimerKey::Hello));
        assert_eq!(timers.next_deadline(), Some(t0 + secs(20)));
        assert_eq!(timers.pop_expired(t0 + secs(15)), None);

        // Far behind: missed cycles collapse into one expiry
        assert_eq!(timers.pop_expired(t0 + secs(55)), Some(TimerKey::Hello));
        assert_eq!(timers.pop_expired(t0 + secs(55)), None);
        assert_eq!(timers.next_deadline(), Some(t0 + secs(65)));
    }

    #[test]
    fn test_cancel_before_fire() {
        let t0 = Instant::now();
        let mut timers = Timers::new();
        timers.start_oneshot(TimerKey::Wait, t0 + secs(5));

        assert!(timers.cancel(TimerKey::Wait));
        assert!(!timers.cancel(TimerKey::Wait));
        assert_eq!(timers.next_deadline(), None);
        assert_eq!(timers.pop_expired(t0 + secs(10)), None);
    }

    #[test]
    fn test_restart_replaces_deadline() {
        let t0 = Instant::now();
        let peer: RouterId = "10.0.0.9".parse().unwrap();
        let mut timers = Timers::new();

        timers.start_oneshot(TimerKey::Inactivity(peer), t0 + secs(40));
        timers.start_oneshot(TimerKey::Inactivity(peer), t0 + secs(50));

        assert_eq!(timers.len(), 1);
        assert_eq!(timers.pop_expired(t0 + secs(45)), None);
        assert_eq!(
            timers.pop_expired(t0 + secs(50)),
            Some(TimerKey::Inactivity(peer))
        );
    }

    #[test]
    fn test_expiry_order() {
        let t0 = Instant::now();
        let mut timers = Timers::new();
        timers.start_oneshot(TimerKey::Wait, t0 + secs(3));
        timers.start_periodic(TimerKey::Hello, t0 + secs(1), secs(10));
        timers.start_periodic(TimerKey::Heartbeat, t0 + secs(2), secs(60));

        let now = t0 + secs(5);
        assert_eq!(timers.pop_expired(now), Some(TimerKey::Hello));
        assert_eq!(timers.pop_expired(now), Some(TimerKey::Heartbeat));
        assert_eq!(timers.pop_expired(now), Some(TimerKey::Wait));
        assert_eq!(timers.pop_expired(now), None);

        timers.cancel_all();
        assert!(timers.is_empty());
        assert_eq!(timers.next_deadline(), None);
    }
}
