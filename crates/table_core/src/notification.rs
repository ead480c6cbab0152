//! Single-slot, auto-expiring user notification.

use std::time::Duration;

use shared::{
    domain::Severity,
    error::DocsError,
    protocol::{NotificationView, TableIntent},
};
use tracing::debug;

use crate::scheduler::{Scheduler, TimerEvent, TimerId};

pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_millis(6000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

pub struct NotificationBus {
    /// Last published message; kept after close so the view can fade it out.
    current: Option<Notification>,
    open: bool,
    generation: u64,
    expiry: Option<TimerId>,
    timeout: Duration,
}

impl NotificationBus {
    pub fn new(timeout: Duration) -> Self {
        Self {
            current: None,
            open: false,
            generation: 0,
            expiry: None,
            timeout,
        }
    }

    /// Replaces whatever is showing and restarts the expiry timer.
    pub fn publish(
        &mut self,
        scheduler: &mut Scheduler,
        message: impl Into<String>,
        severity: Severity,
    ) {
        let message = message.into();
        debug!(?severity, %message, "notification published");

        if let Some(timer) = self.expiry.take() {
            scheduler.cancel(timer);
        }
        self.generation += 1;
        self.current = Some(Notification { message, severity });
        self.open = true;
        self.expiry = Some(scheduler.schedule(
            self.timeout,
            TimerEvent::NotificationExpire {
                generation: self.generation,
            },
        ));
    }

    pub fn publish_error(&mut self, scheduler: &mut Scheduler, error: &DocsError) {
        self.publish(scheduler, error.to_string(), Severity::Error);
    }

    pub fn dismiss(&mut self, scheduler: &mut Scheduler) {
        if let Some(timer) = self.expiry.take() {
            scheduler.cancel(timer);
        }
        self.open = false;
    }

    /// Closes the notification if `generation` is still the one showing.
    pub fn on_expire(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.open {
            return false;
        }
        self.expiry = None;
        self.open = false;
        true
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn current(&self) -> Option<&Notification> {
        if self.open {
            self.current.as_ref()
        } else {
            None
        }
    }

    pub fn view(&self) -> NotificationView {
        let (message, severity) = self
            .current
            .as_ref()
            .map(|n| (n.message.clone(), n.severity))
            .unwrap_or_else(|| (String::new(), Severity::Success));
        NotificationView {
            open: self.open,
            message,
            severity,
            on_close: TableIntent::DismissNotification,
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};

    use super::*;
    use crate::scheduler::ManualClock;

    fn setup() -> (ManualClock, Scheduler, NotificationBus) {
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH);
        let scheduler = Scheduler::new(Arc::new(clock.clone()));
        (clock, scheduler, NotificationBus::default())
    }

    fn drain(scheduler: &mut Scheduler, bus: &mut NotificationBus) {
        while let Some((_, event)) = scheduler.pop_due() {
            if let TimerEvent::NotificationExpire { generation } = event {
                bus.on_expire(generation);
            }
        }
    }

    #[test]
    fn expires_after_timeout() {
        let (clock, mut scheduler, mut bus) = setup();
        bus.publish(&mut scheduler, "saved", Severity::Success);

        clock.advance(Duration::from_millis(5999));
        drain(&mut scheduler, &mut bus);
        assert!(bus.is_open());

        clock.advance(Duration::from_millis(1));
        drain(&mut scheduler, &mut bus);
        assert!(!bus.is_open());
        assert_eq!(bus.view().message, "saved");
    }

    #[test]
    fn newer_message_replaces_and_restarts_timer() {
        let (clock, mut scheduler, mut bus) = setup();
        bus.publish(&mut scheduler, "first", Severity::Info);
        clock.advance(Duration::from_millis(4000));
        drain(&mut scheduler, &mut bus);

        bus.publish(&mut scheduler, "second", Severity::Warning);
        assert_eq!(scheduler.pending(), 1);

        clock.advance(Duration::from_millis(4000));
        drain(&mut scheduler, &mut bus);
        let current = bus.current().expect("still open");
        assert_eq!(current.message, "second");
        assert_eq!(current.severity, Severity::Warning);
    }

    #[test]
    fn dismiss_closes_and_cancels_expiry() {
        let (_clock, mut scheduler, mut bus) = setup();
        bus.publish(&mut scheduler, "oops", Severity::Error);
        bus.dismiss(&mut scheduler);

        assert!(!bus.is_open());
        assert!(bus.current().is_none());
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(bus.view().on_close, TableIntent::DismissNotification);
    }

    #[test]
    fn stale_expiry_does_not_close_newer_message() {
        let (_clock, mut scheduler, mut bus) = setup();
        bus.publish(&mut scheduler, "one", Severity::Info);
        bus.publish(&mut scheduler, "two", Severity::Info);
        assert!(!bus.on_expire(1));
        assert!(bus.is_open());
    }
}
