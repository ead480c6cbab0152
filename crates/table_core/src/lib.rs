//! Stateful controller layer for the document table: selection, expansion,
//! filtering, document lifecycle, uploads, notifications and sync.
//!
//! [`DocumentTableSession`] owns every controller and is the only thing the
//! view talks to. It routes intents, cascades removals into the selection and
//! expansion sets, and pumps scheduled timers into their owners.

use std::{sync::Arc, time::Duration};

use shared::{
    domain::{
        Document, DocumentId, DocumentPatch, FileSelection, FilterOptions, NewDocumentInput,
        SelectionStatus, Severity, Tag,
    },
    error::{DocsError, DocsResult},
    protocol::{
        DownloadEntry, HeaderView, IntentOutcome, NotificationView, RowHandlers, RowView,
        TableIntent, UploadState, UploadView,
    },
};
use storage::{Repository, WallClock};
use tracing::{debug, info, warn};

pub mod config;
pub mod expansion;
pub mod filter;
pub mod notification;
pub mod scheduler;
pub mod selection;
pub mod sync;
pub mod upload;

pub use config::{load_settings, Settings};
pub use expansion::ExpansionSet;
pub use notification::NotificationBus;
pub use scheduler::{Clock, ManualClock, Scheduler, SystemClock, TimerEvent};
pub use selection::SelectionSet;
pub use sync::{SimulatedSync, SyncCoordinator, SyncService, SyncTicket};
pub use upload::{
    CommitPolicy, SimulatedTransport, TickOutcome, UploadOutcome, UploadPipeline, UploadTarget,
    UploadTransport,
};

pub const COMING_SOON_MESSAGE: &str = "This feature is coming soon!";

/// Secondary rows shown under an expanded document.
pub fn downloads_for(document: &Document) -> Vec<DownloadEntry> {
    vec![
        DownloadEntry {
            name: document.name.clone(),
            size: document.size.clone(),
            last_modified: document.last_modified.clone(),
        },
        DownloadEntry {
            name: format!("{} - Appendix", document.name),
            size: "345kb".into(),
            last_modified: document.last_modified.clone(),
        },
        DownloadEntry {
            name: format!("{} - References", document.name),
            size: "128kb".into(),
            last_modified: document.last_modified.clone(),
        },
    ]
}

pub struct DocumentTableSession {
    repository: Repository,
    filter: FilterOptions,
    selection: SelectionSet,
    expansion: ExpansionSet,
    uploader: UploadPipeline,
    uploader_open: bool,
    transport: Box<dyn UploadTransport>,
    notifications: NotificationBus,
    sync: SyncCoordinator,
    viewer: Option<DocumentId>,
    scheduler: Scheduler,
    wall_clock: Arc<dyn WallClock>,
    accepted_extensions: Vec<String>,
    soft_limit_bytes: u64,
    default_tags: Vec<Tag>,
}

impl DocumentTableSession {
    pub fn new<C>(settings: &Settings, clock: Arc<C>) -> Self
    where
        C: Clock + 'static,
    {
        let wall_clock: Arc<dyn WallClock> = clock.clone();
        Self {
            repository: Repository::new(wall_clock.clone()),
            filter: settings.default_filter(),
            selection: SelectionSet::new(),
            expansion: ExpansionSet::new(),
            uploader: UploadPipeline::new(settings.upload_config()),
            uploader_open: false,
            transport: Box::new(SimulatedTransport::new()),
            notifications: NotificationBus::new(settings.notification_timeout()),
            sync: SyncCoordinator::new(settings.sync_settle_delay()),
            viewer: None,
            scheduler: Scheduler::new(clock),
            wall_clock,
            accepted_extensions: settings.accepted_extensions.clone(),
            soft_limit_bytes: settings.upload_soft_limit_bytes,
            default_tags: settings.default_tags.clone(),
        }
    }

    pub fn with_transport(mut self, transport: Box<dyn UploadTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Publishes an error notification for a failed operation and hands the
    /// result back unchanged.
    fn surface<T>(&mut self, result: DocsResult<T>) -> DocsResult<T> {
        if let Err(error) = &result {
            warn!(code = ?error.code(), %error, "operation failed");
            self.notifications.publish_error(&mut self.scheduler, error);
        }
        result
    }

    fn notify(&mut self, message: impl Into<String>, severity: Severity) {
        self.notifications
            .publish(&mut self.scheduler, message, severity);
    }

    // Repository

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.repository.get(id)
    }

    /// Stores pre-built documents without notifying, e.g. at startup.
    pub fn seed<I>(&mut self, documents: I) -> DocsResult<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut count = 0;
        for document in documents {
            self.repository.insert(document)?;
            count += 1;
        }
        Ok(count)
    }

    /// Loads a JSON array of documents through the repository, without notifying.
    pub fn seed_json(&mut self, raw: &str) -> DocsResult<usize> {
        self.repository.load_json(raw)
    }

    pub fn add_document(&mut self, input: NewDocumentInput) -> DocsResult<Document> {
        let result = self.repository.add(input);
        let document = self.surface(result)?;
        self.notify(
            format!("\"{}\" has been added", document.name),
            Severity::Success,
        );
        Ok(document)
    }

    pub fn update_document(
        &mut self,
        id: &DocumentId,
        patch: DocumentPatch,
    ) -> DocsResult<Document> {
        let previous_name = self.repository.get(id).map(|doc| doc.name.clone());
        let result = self.repository.update(id, patch);
        let document = self.surface(result)?;
        self.expansion.on_document_updated(&document);
        self.notify(
            format!(
                "\"{}\" has been updated",
                previous_name.as_deref().unwrap_or(&document.name)
            ),
            Severity::Success,
        );
        Ok(document)
    }

    /// Removes the document and evicts it from every per-row set. Deleting an
    /// absent id does nothing.
    pub fn delete_document(&mut self, id: &DocumentId) -> Option<Document> {
        let removed = self.repository.remove(id)?;
        self.selection.on_document_removed(id);
        self.expansion.on_document_removed(id);
        if self.viewer.as_ref() == Some(id) {
            self.viewer = None;
        }
        self.notify(
            format!("\"{}\" has been deleted", removed.name),
            Severity::Success,
        );
        Some(removed)
    }

    // Filtering

    pub fn filter(&self) -> &FilterOptions {
        &self.filter
    }

    /// A malformed filter is rejected and the previous one stays active.
    pub fn set_filter(&mut self, options: FilterOptions) -> DocsResult<()> {
        let result = filter::validate(&options);
        self.surface(result)?;
        debug!(?options, "filter changed");
        self.filter = options;
        Ok(())
    }

    pub fn visible_documents(&self) -> Vec<&Document> {
        filter::apply(self.repository.list(), &self.filter)
    }

    pub fn visible_ids(&self) -> Vec<DocumentId> {
        self.visible_documents()
            .into_iter()
            .map(|doc| doc.id.clone())
            .collect()
    }

    pub fn rows(&self) -> Vec<RowView> {
        self.visible_documents()
            .into_iter()
            .map(|document| {
                let is_expanded = self.expansion.is_expanded(&document.id);
                RowView {
                    document: document.clone(),
                    is_selected: self.selection.contains(&document.id),
                    is_expanded,
                    handlers: RowHandlers::for_document(&document.id),
                    expanded_content: (is_expanded && document.is_expandable)
                        .then(|| downloads_for(document)),
                }
            })
            .collect()
    }

    pub fn header(&self) -> HeaderView {
        HeaderView {
            select_all: self.selection_status(),
            filter: self.filter.clone(),
            last_sync: self.sync.last_sync(),
            is_syncing: self.sync.is_syncing(),
        }
    }

    // Selection

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// Ignores ids that are not in the repository.
    pub fn toggle_select(&mut self, id: &DocumentId) -> bool {
        if !self.repository.contains(id) {
            debug!(document_id = %id, "ignoring selection of unknown document");
            return false;
        }
        self.selection.toggle(id);
        true
    }

    pub fn select_all_visible(&mut self) {
        let ids = self.visible_ids();
        self.selection.select_all(ids);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Header checkbox: clears when everything visible is selected, else selects all.
    pub fn toggle_select_all(&mut self) {
        if self.selection_status() == SelectionStatus::All {
            self.clear_selection();
        } else {
            self.select_all_visible();
        }
    }

    pub fn selection_status(&self) -> SelectionStatus {
        self.selection.status(&self.visible_ids())
    }

    // Expansion

    pub fn expansion(&self) -> &ExpansionSet {
        &self.expansion
    }

    pub fn toggle_expand(&mut self, id: &DocumentId) -> bool {
        match self.repository.get(id) {
            Some(document) => self.expansion.toggle(document),
            None => false,
        }
    }

    pub fn is_expanded(&self, id: &DocumentId) -> bool {
        self.expansion.is_expanded(id)
    }

    // Viewer

    pub fn view_document(&mut self, id: &DocumentId) -> DocsResult<()> {
        let result = if self.repository.contains(id) {
            Ok(())
        } else {
            Err(DocsError::not_found(id))
        };
        self.surface(result)?;
        self.viewer = Some(id.clone());
        Ok(())
    }

    pub fn close_viewer(&mut self) {
        self.viewer = None;
    }

    pub fn viewed_document(&self) -> Option<&Document> {
        self.viewer.as_ref().and_then(|id| self.repository.get(id))
    }

    // Uploads

    pub fn is_uploader_open(&self) -> bool {
        self.uploader_open
    }

    /// Opens the uploader for a new document.
    pub fn begin_add(&mut self) -> DocsResult<()> {
        let result = self
            .uploader
            .set_target(UploadTarget::Create, &mut self.scheduler);
        self.surface(result)?;
        self.uploader_open = true;
        Ok(())
    }

    /// Opens the uploader to replace an existing document's file.
    pub fn begin_edit(&mut self, id: &DocumentId) -> DocsResult<()> {
        let result = if self.repository.contains(id) {
            self.uploader
                .set_target(UploadTarget::Edit(id.clone()), &mut self.scheduler)
        } else {
            Err(DocsError::not_found(id))
        };
        self.surface(result)?;
        self.uploader_open = true;
        Ok(())
    }

    pub fn add_multiple(&mut self) {
        self.notify(COMING_SOON_MESSAGE, Severity::Info);
    }

    pub fn choose_file(&mut self, selection: FileSelection) -> DocsResult<()> {
        let result = self.uploader.start(&selection, &mut self.scheduler);
        self.surface(result)?;
        self.uploader_open = true;

        if !selection.is_accepted(&self.accepted_extensions) {
            warn!(file_name = %selection.file_name, "file type outside the accepted list");
            self.notify(
                format!("{} is not a supported file type", selection.file_name),
                Severity::Warning,
            );
        } else if selection.exceeds_soft_limit(self.soft_limit_bytes) {
            warn!(
                file_name = %selection.file_name,
                size_bytes = selection.size_bytes,
                "file exceeds soft size limit"
            );
            self.notify(
                format!(
                    "{} is larger than {}",
                    selection.file_name,
                    upload::format_file_size(self.soft_limit_bytes)
                ),
                Severity::Warning,
            );
        }
        Ok(())
    }

    pub fn set_upload_description(&mut self, description: impl Into<String>) -> DocsResult<()> {
        let result = self.uploader.set_description(description);
        self.surface(result)
    }

    pub fn add_upload_tag(&mut self, tag: Tag) -> DocsResult<()> {
        let result = self.uploader.add_tag(tag);
        self.surface(result)
    }

    pub fn report_transport_failure(&mut self, reason: impl Into<String>) -> DocsResult<()> {
        let result = self.uploader.fail(reason, &mut self.scheduler);
        self.surface(result)
    }

    pub fn retry_upload(&mut self) -> DocsResult<()> {
        let result = self.uploader.retry(&mut self.scheduler);
        self.surface(result)
    }

    /// Closes the uploader, discarding any session.
    pub fn cancel_upload(&mut self) {
        self.uploader.cancel(&mut self.scheduler);
        self.uploader_open = false;
    }

    /// Drops the chosen file but keeps the uploader open.
    pub fn reset_upload(&mut self) {
        self.uploader.reset(&mut self.scheduler);
    }

    /// Closes a completed upload, committing it first if that has not happened yet.
    pub fn submit_upload(&mut self) -> DocsResult<Option<Document>> {
        let result = self.uploader.submit();
        let outcome = self.surface(result)?;
        self.uploader_open = false;
        match outcome {
            Some(outcome) => self.commit_upload(outcome).map(Some),
            None => Ok(None),
        }
    }

    pub fn upload_state(&self) -> UploadState {
        self.uploader.state()
    }

    pub fn upload_view(&self) -> UploadView {
        self.uploader.view()
    }

    pub fn uploader(&self) -> &UploadPipeline {
        &self.uploader
    }

    fn commit_upload(&mut self, outcome: UploadOutcome) -> DocsResult<Document> {
        match outcome {
            UploadOutcome::Create(mut input) => {
                if input.tags.is_empty() {
                    input.tags = self.default_tags.clone();
                }
                self.add_document(input)
            }
            UploadOutcome::Update { id, patch } => {
                let result = self.update_document(&id, patch);
                if result.is_err() {
                    self.uploader.cancel(&mut self.scheduler);
                    self.uploader_open = false;
                }
                result
            }
        }
    }

    // Notifications

    pub fn notification(&self) -> NotificationView {
        self.notifications.view()
    }

    pub fn notifications(&self) -> &NotificationBus {
        &self.notifications
    }

    pub fn dismiss_notification(&mut self) {
        self.notifications.dismiss(&mut self.scheduler);
    }

    // Sync

    pub fn begin_sync(&mut self) -> Option<SyncTicket> {
        self.sync.begin()
    }

    pub fn finish_sync(&mut self, ticket: SyncTicket, result: anyhow::Result<()>) {
        let now = self.wall_clock.wall_time();
        if let Some((message, severity)) =
            self.sync.finish(ticket, result, now, &mut self.scheduler)
        {
            self.notify(message, severity);
        }
    }

    /// Runs one sync through `service`. Returns false if one was already running.
    pub async fn sync(&mut self, service: &dyn SyncService) -> bool {
        let Some(ticket) = self.begin_sync() else {
            return false;
        };
        let result = service.sync().await;
        self.finish_sync(ticket, result);
        true
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_syncing()
    }

    // Intents

    pub fn dispatch(&mut self, intent: TableIntent) -> IntentOutcome {
        debug!(?intent, "dispatching table intent");
        let result = match intent {
            TableIntent::ToggleSelect { document_id } => Ok(self.toggle_select(&document_id)),
            TableIntent::ToggleExpand { document_id } => Ok(self.toggle_expand(&document_id)),
            TableIntent::SelectAll => {
                self.select_all_visible();
                Ok(true)
            }
            TableIntent::ClearSelection => {
                self.clear_selection();
                Ok(true)
            }
            TableIntent::Edit { document_id } => self.begin_edit(&document_id).map(|_| true),
            TableIntent::Delete { document_id } => Ok(self.delete_document(&document_id).is_some()),
            TableIntent::View { document_id } => self.view_document(&document_id).map(|_| true),
            TableIntent::CloseViewer => {
                self.close_viewer();
                Ok(true)
            }
            TableIntent::DismissNotification => {
                self.dismiss_notification();
                Ok(true)
            }
            TableIntent::SetFilter { filter } => self.set_filter(filter).map(|_| true),
            TableIntent::AddMultiple => {
                self.add_multiple();
                Ok(true)
            }
        };
        match result {
            Ok(true) => IntentOutcome::Applied,
            Ok(false) => IntentOutcome::Ignored,
            Err(error) => IntentOutcome::Rejected(error.into()),
        }
    }

    // Timers

    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Fires every timer that is due and returns how many ran.
    pub fn run_due(&mut self) -> usize {
        let mut fired = 0;
        while let Some((_, event)) = self.scheduler.pop_due() {
            fired += 1;
            self.handle_timer(event);
        }
        fired
    }

    /// Sleeps on tokio between deadlines until `done` holds or no timers remain.
    pub async fn run_timers_until<F>(&mut self, mut done: F)
    where
        F: FnMut(&Self) -> bool,
    {
        while !done(self) {
            let Some(deadline) = self.scheduler.next_deadline() else {
                break;
            };
            let now = self.scheduler.now();
            if deadline > now {
                tokio::time::sleep(deadline - now).await;
            }
            self.run_due();
        }
    }

    fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::UploadTick { generation } => {
                match self.uploader.on_tick(
                    generation,
                    self.transport.as_mut(),
                    &mut self.scheduler,
                ) {
                    TickOutcome::Progressed(_) => {}
                    TickOutcome::Failed(error) => {
                        self.notifications.publish_error(&mut self.scheduler, &error);
                    }
                    TickOutcome::Stale => {
                        debug!(generation, "dropping stale upload tick");
                    }
                }
            }
            TimerEvent::UploadSettle { generation } => {
                if let Some(outcome) = self.uploader.on_settle(generation) {
                    if let Err(error) = self.commit_upload(outcome) {
                        warn!(%error, "upload could not be committed");
                    }
                }
            }
            TimerEvent::NotificationExpire { generation } => {
                if self.notifications.on_expire(generation) {
                    debug!(generation, "notification expired");
                }
            }
            TimerEvent::SyncSettle { generation } => {
                if self.sync.on_settle(generation) {
                    info!("sync indicator settled");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
