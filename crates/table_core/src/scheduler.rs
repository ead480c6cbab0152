//! Virtual-time timer queue that drives upload ticks and notification expiry.
//!
//! Nothing here runs on its own: the owner asks for due events with
//! [`Scheduler::pop_due`] and routes them. Tests advance a [`ManualClock`];
//! the binary sleeps on tokio until [`Scheduler::next_deadline`].

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use storage::WallClock;

/// Monotonic time since the clock's origin, plus wall time for stamps.
pub trait Clock: WallClock {
    fn elapsed(&self) -> Duration;
}

pub struct SystemClock {
    origin: tokio::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemClock {
    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone)]
pub struct ManualClock {
    epoch: DateTime<Utc>,
    elapsed_nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self {
            epoch,
            elapsed_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl WallClock for ManualClock {
    fn wall_time(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.epoch + elapsed
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Scheduled callbacks, carried as data. The generation lets the receiver
/// drop events that belong to a session it has since discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    UploadTick { generation: u64 },
    UploadSettle { generation: u64 },
    NotificationExpire { generation: u64 },
    SyncSettle { generation: u64 },
}

pub struct Scheduler {
    clock: Arc<dyn Clock>,
    queue: BTreeMap<(Duration, u64), TimerEvent>,
    deadlines: HashMap<u64, Duration>,
    next_seq: u64,
    /// Deadline of the event being dispatched; timers scheduled from inside a
    /// callback are relative to it rather than to the wall clock.
    dispatching_at: Option<Duration>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
            next_seq: 0,
            dispatching_at: None,
        }
    }

    pub fn now(&self) -> Duration {
        self.dispatching_at.unwrap_or_else(|| self.clock.elapsed())
    }

    pub fn schedule(&mut self, delay: Duration, event: TimerEvent) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let deadline = self.now() + delay;
        self.queue.insert((deadline, seq), event);
        self.deadlines.insert(seq, deadline);
        TimerId(seq)
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id.0) {
            Some(deadline) => self.queue.remove(&(deadline, id.0)).is_some(),
            None => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Pops the earliest event whose deadline has passed. Events sharing a
    /// deadline come out in scheduling order.
    pub fn pop_due(&mut self) -> Option<(TimerId, TimerEvent)> {
        let now = self.clock.elapsed();
        let due = self
            .queue
            .first_key_value()
            .map(|(key, _)| *key)
            .filter(|(deadline, _)| *deadline <= now);

        let Some(key) = due else {
            self.dispatching_at = None;
            return None;
        };

        let event = self.queue.remove(&key)?;
        self.deadlines.remove(&key.1);
        self.dispatching_at = Some(key.0);
        Some((TimerId(key.1), event))
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> (ManualClock, Scheduler) {
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH);
        let scheduler = Scheduler::new(Arc::new(clock.clone()));
        (clock, scheduler)
    }

    #[test]
    fn fires_in_deadline_then_schedule_order() {
        let (clock, mut scheduler) = manual();
        scheduler.schedule(Duration::from_millis(20), TimerEvent::SyncSettle { generation: 1 });
        scheduler.schedule(Duration::from_millis(10), TimerEvent::UploadTick { generation: 1 });
        scheduler.schedule(Duration::from_millis(10), TimerEvent::UploadTick { generation: 2 });

        assert!(scheduler.pop_due().is_none());
        clock.advance(Duration::from_millis(20));

        let fired: Vec<_> = std::iter::from_fn(|| scheduler.pop_due().map(|(_, e)| e)).collect();
        assert_eq!(
            fired,
            vec![
                TimerEvent::UploadTick { generation: 1 },
                TimerEvent::UploadTick { generation: 2 },
                TimerEvent::SyncSettle { generation: 1 },
            ]
        );
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let (clock, mut scheduler) = manual();
        let id = scheduler.schedule(
            Duration::from_millis(5),
            TimerEvent::UploadTick { generation: 7 },
        );
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        clock.advance(Duration::from_secs(1));
        assert!(scheduler.pop_due().is_none());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn timers_scheduled_during_dispatch_chain_from_the_firing_deadline() {
        let (clock, mut scheduler) = manual();
        scheduler.schedule(Duration::from_millis(300), TimerEvent::UploadTick { generation: 1 });
        clock.advance(Duration::from_millis(900));

        let mut fired = 0;
        while let Some((_, event)) = scheduler.pop_due() {
            fired += 1;
            if fired < 5 {
                scheduler.schedule(Duration::from_millis(300), event);
            }
        }
        // 300, 600 and 900 are due; 1200 is not.
        assert_eq!(fired, 3);
        assert_eq!(scheduler.next_deadline(), Some(Duration::from_millis(1200)));
    }

    #[test]
    fn manual_clock_moves_wall_time() {
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH);
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.wall_time().timestamp(), 90);
    }
}
