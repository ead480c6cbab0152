//! Upload state machine: `Idle -> Uploading(p) -> Complete`, with cancel, failure and retry.
//!
//! Progress advances on scheduled ticks. Every (re)start bumps a generation
//! counter and ticks carry the generation they were scheduled under, so a
//! tick that outlives its session is recognised and dropped.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared::{
    domain::{DocumentId, DocumentPatch, FileSelection, NewDocumentInput, Tag},
    error::{DocsError, DocsResult},
    protocol::{UploadState, UploadView},
};
use tracing::{debug, info, warn};

use crate::scheduler::{Scheduler, TimerEvent, TimerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Hand the document to the repository as soon as the upload completes.
    #[default]
    OnComplete,
    /// Wait for an explicit submit.
    OnSubmit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub progress_step: u8,
    pub tick_interval: Duration,
    pub settle_delay: Duration,
    pub commit: CommitPolicy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            progress_step: 5,
            tick_interval: Duration::from_millis(300),
            settle_delay: Duration::from_millis(500),
            commit: CommitPolicy::OnComplete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadTarget {
    #[default]
    Create,
    Edit(DocumentId),
}

/// What the repository should do with a finished upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Create(NewDocumentInput),
    Update { id: DocumentId, patch: DocumentPatch },
}

/// Moves bytes for the active session. The simulated transport just adds the
/// configured step; a real one would report bytes flushed since the last poll.
pub trait UploadTransport: Send {
    /// Returns the new progress percentage, or a failure reason.
    fn advance(&mut self, file_size_bytes: u64, progress: u8, step: u8) -> Result<u8, String>;
}

#[derive(Debug, Default)]
pub struct SimulatedTransport {
    fail_at: Option<u8>,
    failures_remaining: u32,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails `times` uploads once they reach `percent`.
    pub fn failing_at(percent: u8, times: u32) -> Self {
        Self {
            fail_at: Some(percent.min(100)),
            failures_remaining: times,
        }
    }
}

impl UploadTransport for SimulatedTransport {
    fn advance(&mut self, _file_size_bytes: u64, progress: u8, step: u8) -> Result<u8, String> {
        let next = progress.saturating_add(step).min(100);
        if let Some(fail_at) = self.fail_at {
            if self.failures_remaining > 0 && progress < fail_at && next >= fail_at {
                self.failures_remaining -= 1;
                return Err(format!("connection reset at {fail_at}%"));
            }
        }
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub file_name: String,
    pub file_size_bytes: u64,
    pub description: String,
    pub tags: Vec<Tag>,
    pub target: UploadTarget,
    state: UploadState,
    generation: u64,
    committed: bool,
}

impl UploadSession {
    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn progress(&self) -> u8 {
        self.state.progress()
    }

    fn outcome(&self) -> UploadOutcome {
        match &self.target {
            UploadTarget::Create => UploadOutcome::Create(
                NewDocumentInput::new(&self.file_name, self.file_size_bytes)
                    .with_tags(self.tags.clone()),
            ),
            UploadTarget::Edit(id) => UploadOutcome::Update {
                id: id.clone(),
                patch: DocumentPatch {
                    name: Some(self.file_name.clone()),
                    tags: (!self.tags.is_empty()).then(|| self.tags.clone()),
                    ..DocumentPatch::default()
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Progressed(u8),
    Failed(DocsError),
    /// The tick belonged to a discarded or finished session.
    Stale,
}

pub struct UploadPipeline {
    config: UploadConfig,
    session: Option<UploadSession>,
    /// Target for the next session started from `Idle`.
    pending_target: UploadTarget,
    generation: u64,
    timer: Option<TimerId>,
}

impl UploadPipeline {
    pub fn new(mut config: UploadConfig) -> Self {
        config.progress_step = config.progress_step.max(1);
        Self {
            config,
            session: None,
            pending_target: UploadTarget::Create,
            generation: 0,
            timer: None,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn state(&self) -> UploadState {
        self.session
            .as_ref()
            .map(|session| session.state.clone())
            .unwrap_or(UploadState::Idle)
    }

    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    pub fn target(&self) -> &UploadTarget {
        self.session
            .as_ref()
            .map(|session| &session.target)
            .unwrap_or(&self.pending_target)
    }

    /// Points the next upload at a new document or at an existing one. A
    /// finished or failed session is discarded so its target cannot leak into
    /// the next upload.
    pub fn set_target(
        &mut self,
        target: UploadTarget,
        scheduler: &mut Scheduler,
    ) -> DocsResult<()> {
        if self.is_uploading() {
            return Err(DocsError::ConcurrentUploadRejected);
        }
        self.cancel_timer(scheduler);
        if let Some(previous) = self.session.take() {
            debug!(generation = previous.generation, "discarding finished upload session");
        }
        self.pending_target = target;
        Ok(())
    }

    pub fn is_uploading(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.state.is_uploading())
    }

    /// `Idle -> Uploading(0)`. A finished or failed session is discarded first;
    /// an upload in flight is never replaced.
    pub fn start(
        &mut self,
        selection: &FileSelection,
        scheduler: &mut Scheduler,
    ) -> DocsResult<()> {
        if self.is_uploading() {
            return Err(DocsError::ConcurrentUploadRejected);
        }
        if selection.file_name.trim().is_empty() {
            return Err(DocsError::invalid("no file chosen"));
        }
        if selection.size_bytes == 0 {
            return Err(DocsError::invalid(format!(
                "{} is empty; zero-byte files cannot be uploaded",
                selection.file_name
            )));
        }

        let (description, tags, target) = match self.session.take() {
            Some(previous) => (previous.description, previous.tags, previous.target),
            None => (String::new(), Vec::new(), self.pending_target.clone()),
        };
        self.cancel_timer(scheduler);
        self.generation += 1;
        self.session = Some(UploadSession {
            file_name: selection.file_name.clone(),
            file_size_bytes: selection.size_bytes,
            description,
            tags,
            target,
            state: UploadState::Uploading { progress: 0 },
            generation: self.generation,
            committed: false,
        });
        info!(
            file_name = %selection.file_name,
            size_bytes = selection.size_bytes,
            generation = self.generation,
            "upload started"
        );
        let tick = TimerEvent::UploadTick {
            generation: self.generation,
        };
        self.schedule(scheduler, self.config.tick_interval, tick);
        Ok(())
    }

    pub fn on_tick(
        &mut self,
        generation: u64,
        transport: &mut dyn UploadTransport,
        scheduler: &mut Scheduler,
    ) -> TickOutcome {
        let step = self.config.progress_step;
        let (file_size_bytes, progress) = match self.live_session(generation) {
            Some(UploadSession {
                state: UploadState::Uploading { progress },
                file_size_bytes,
                ..
            }) => (*file_size_bytes, *progress),
            _ => return TickOutcome::Stale,
        };
        self.timer = None;

        let advanced = transport.advance(file_size_bytes, progress, step);
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Stale;
        };
        let next = match advanced {
            Ok(next) => next.clamp(progress, 100),
            Err(reason) => {
                warn!(generation, %reason, "upload transport failed");
                session.state = UploadState::Error {
                    reason: reason.clone(),
                };
                return TickOutcome::Failed(DocsError::TransportFailure(reason));
            }
        };
        session.state = UploadState::Uploading { progress: next };
        debug!(generation, progress = next, "upload progressed");

        let (delay, event) = if next == 100 {
            (self.config.settle_delay, TimerEvent::UploadSettle { generation })
        } else {
            (self.config.tick_interval, TimerEvent::UploadTick { generation })
        };
        self.schedule(scheduler, delay, event);
        TickOutcome::Progressed(next)
    }

    /// `Uploading(100) -> Complete`. Yields the outcome to commit when the
    /// policy commits on completion.
    pub fn on_settle(&mut self, generation: u64) -> Option<UploadOutcome> {
        let commit_on_complete = self.config.commit == CommitPolicy::OnComplete;
        let session = self.live_session(generation)?;
        if session.state != (UploadState::Uploading { progress: 100 }) {
            return None;
        }
        session.state = UploadState::Complete;
        info!(file_name = %session.file_name, generation, "upload complete");

        let outcome = if commit_on_complete && !session.committed {
            session.committed = true;
            Some(session.outcome())
        } else {
            None
        };
        self.timer = None;
        outcome
    }

    /// Transport failure reported from outside the tick loop.
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        scheduler: &mut Scheduler,
    ) -> DocsResult<()> {
        let reason = reason.into();
        if !self.is_uploading() {
            return Err(DocsError::invalid("no upload in progress"));
        }
        self.cancel_timer(scheduler);
        if let Some(session) = self.session.as_mut() {
            warn!(generation = session.generation, %reason, "upload failed");
            session.state = UploadState::Error {
                reason: reason.clone(),
            };
        }
        Err(DocsError::TransportFailure(reason))
    }

    /// `Error -> Uploading(0)` under a fresh generation.
    pub fn retry(&mut self, scheduler: &mut Scheduler) -> DocsResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(DocsError::invalid("nothing to retry"));
        };
        if !matches!(session.state, UploadState::Error { .. }) {
            return Err(DocsError::invalid("only a failed upload can be retried"));
        }
        self.generation += 1;
        session.generation = self.generation;
        session.state = UploadState::Uploading { progress: 0 };
        info!(file_name = %session.file_name, generation = self.generation, "upload retried");
        let tick = TimerEvent::UploadTick {
            generation: self.generation,
        };
        self.schedule(scheduler, self.config.tick_interval, tick);
        Ok(())
    }

    /// Discards the session from any state and forgets the edit target.
    /// Returns whether there was a session.
    pub fn cancel(&mut self, scheduler: &mut Scheduler) -> bool {
        self.cancel_timer(scheduler);
        self.pending_target = UploadTarget::Create;
        let had_session = self.session.take().is_some();
        if had_session {
            info!(generation = self.generation, "upload cancelled");
        }
        had_session
    }

    /// Removes the chosen file but keeps the uploader pointed at the same target.
    pub fn reset(&mut self, scheduler: &mut Scheduler) {
        self.cancel_timer(scheduler);
        if let Some(session) = self.session.take() {
            debug!(generation = session.generation, "upload reset");
            self.pending_target = session.target;
        }
    }

    /// `Complete -> Idle`. Returns the outcome if it was not already committed.
    pub fn submit(&mut self) -> DocsResult<Option<UploadOutcome>> {
        let Some(session) = self.session.as_ref() else {
            return Err(DocsError::invalid("choose a file before submitting"));
        };
        if session.state != UploadState::Complete {
            return Err(DocsError::invalid("upload has not completed yet"));
        }
        let outcome = (!session.committed).then(|| session.outcome());
        self.session = None;
        self.pending_target = UploadTarget::Create;
        Ok(outcome)
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> DocsResult<()> {
        self.session_mut()?.description = description.into();
        Ok(())
    }

    pub fn add_tag(&mut self, tag: Tag) -> DocsResult<()> {
        if tag.label.trim().is_empty() {
            return Err(DocsError::invalid("tag label must not be empty"));
        }
        self.session_mut()?.tags.push(tag);
        Ok(())
    }

    pub fn view(&self) -> UploadView {
        let Some(session) = self.session.as_ref() else {
            return UploadView {
                file_name: None,
                state: UploadState::Idle,
                caption: String::new(),
                can_submit: false,
            };
        };
        let caption = match &session.state {
            UploadState::Idle => String::new(),
            UploadState::Uploading { progress } => format!(
                "{progress}% Uploading · {}",
                format_file_size(session.file_size_bytes)
            ),
            UploadState::Complete => "Upload complete".to_string(),
            UploadState::Error { reason } => format!("Upload failed: {reason}"),
        };
        UploadView {
            file_name: Some(session.file_name.clone()),
            state: session.state.clone(),
            caption,
            can_submit: session.state == UploadState::Complete,
        }
    }

    fn session_mut(&mut self) -> DocsResult<&mut UploadSession> {
        self.session
            .as_mut()
            .ok_or_else(|| DocsError::invalid("no upload session is open"))
    }

    fn live_session(&mut self, generation: u64) -> Option<&mut UploadSession> {
        self.session
            .as_mut()
            .filter(|session| session.generation == generation)
    }

    fn schedule(&mut self, scheduler: &mut Scheduler, delay: Duration, event: TimerEvent) {
        self.timer = Some(scheduler.schedule(delay, event));
    }

    fn cancel_timer(&mut self, scheduler: &mut Scheduler) {
        if let Some(timer) = self.timer.take() {
            scheduler.cancel(timer);
        }
    }
}

impl Default for UploadPipeline {
    fn default() -> Self {
        Self::new(UploadConfig::default())
    }
}

/// Caption size: bytes below 1 KiB, whole KB below 1 MiB, MB with two decimals above.
pub fn format_file_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if bytes < KIB {
        format!("{bytes} Bytes")
    } else if bytes < MIB {
        format!("{:.0} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    }
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
