//! Remote synchronization: one sync in flight at a time, outcome surfaced as a notification.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::domain::Severity;
use tracing::{debug, info, warn};

use crate::scheduler::{Scheduler, TimerEvent};

pub const SYNC_SUCCESS_MESSAGE: &str = "Documents synchronized successfully!";

#[async_trait]
pub trait SyncService: Send + Sync {
    async fn sync(&self) -> Result<()>;
}

/// Stand-in for the remote: sleeps, then succeeds or fails with a fixed reason.
pub struct SimulatedSync {
    delay: Duration,
    failure: Option<String>,
}

impl SimulatedSync {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            failure: None,
        }
    }

    pub fn failing(delay: Duration, reason: impl Into<String>) -> Self {
        Self {
            delay,
            failure: Some(reason.into()),
        }
    }
}

#[async_trait]
impl SyncService for SimulatedSync {
    async fn sync(&self) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        match &self.failure {
            Some(reason) => Err(anyhow!(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Proof that the holder owns the single sync slot.
#[derive(Debug, PartialEq, Eq)]
pub struct SyncTicket {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncPhase {
    Idle,
    InFlight,
    /// Resolved, indicator still spinning until the settle timer fires.
    Settling,
}

pub struct SyncCoordinator {
    phase: SyncPhase,
    generation: u64,
    last_sync: Option<DateTime<Utc>>,
    settle_delay: Duration,
}

impl SyncCoordinator {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            phase: SyncPhase::Idle,
            generation: 0,
            last_sync: None,
            settle_delay,
        }
    }

    /// `None` while a sync is running or its indicator has not settled.
    pub fn begin(&mut self) -> Option<SyncTicket> {
        if self.phase != SyncPhase::Idle {
            debug!("sync already in progress; ignoring request");
            return None;
        }
        self.generation += 1;
        self.phase = SyncPhase::InFlight;
        info!(generation = self.generation, "sync started");
        Some(SyncTicket {
            generation: self.generation,
        })
    }

    /// Records the outcome and returns the notification to show.
    pub fn finish(
        &mut self,
        ticket: SyncTicket,
        result: Result<()>,
        now: DateTime<Utc>,
        scheduler: &mut Scheduler,
    ) -> Option<(String, Severity)> {
        if ticket.generation != self.generation || self.phase != SyncPhase::InFlight {
            warn!(generation = ticket.generation, "dropping result of superseded sync");
            return None;
        }
        self.phase = SyncPhase::Settling;
        scheduler.schedule(
            self.settle_delay,
            TimerEvent::SyncSettle {
                generation: self.generation,
            },
        );

        match result {
            Ok(()) => {
                self.last_sync = Some(now);
                info!(generation = self.generation, "sync finished");
                Some((SYNC_SUCCESS_MESSAGE.to_string(), Severity::Success))
            }
            Err(error) => {
                warn!(generation = self.generation, %error, "sync failed");
                Some((format!("Sync failed: {error}"), Severity::Error))
            }
        }
    }

    pub fn on_settle(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.phase != SyncPhase::Settling {
            return false;
        }
        self.phase = SyncPhase::Idle;
        true
    }

    pub fn is_syncing(&self) -> bool {
        self.phase != SyncPhase::Idle
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }
}
