//! Render and intent contract between the table controllers and whatever draws them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{Document, DocumentId, FilterOptions, SelectionStatus, Severity},
    error::ApiError,
};

/// User intents forwarded by the view, routed by the session to the owning controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum TableIntent {
    ToggleSelect { document_id: DocumentId },
    ToggleExpand { document_id: DocumentId },
    SelectAll,
    ClearSelection,
    Edit { document_id: DocumentId },
    Delete { document_id: DocumentId },
    View { document_id: DocumentId },
    CloseViewer,
    DismissNotification,
    SetFilter { filter: FilterOptions },
    AddMultiple,
}

/// Per-row handler record: the intents a row emits, keyed by the row's document id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowHandlers {
    pub on_select: TableIntent,
    pub on_toggle_expand: TableIntent,
    pub on_edit: TableIntent,
    pub on_delete: TableIntent,
    pub on_view: TableIntent,
}

impl RowHandlers {
    pub fn for_document(document_id: &DocumentId) -> Self {
        Self {
            on_select: TableIntent::ToggleSelect {
                document_id: document_id.clone(),
            },
            on_toggle_expand: TableIntent::ToggleExpand {
                document_id: document_id.clone(),
            },
            on_edit: TableIntent::Edit {
                document_id: document_id.clone(),
            },
            on_delete: TableIntent::Delete {
                document_id: document_id.clone(),
            },
            on_view: TableIntent::View {
                document_id: document_id.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEntry {
    pub name: String,
    pub size: String,
    pub last_modified: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowView {
    pub document: Document,
    pub is_selected: bool,
    pub is_expanded: bool,
    pub handlers: RowHandlers,
    /// Present only for expandable documents that are expanded.
    pub expanded_content: Option<Vec<DownloadEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderView {
    pub select_all: SelectionStatus,
    pub filter: FilterOptions,
    pub last_sync: Option<DateTime<Utc>>,
    pub is_syncing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationView {
    pub open: bool,
    pub message: String,
    pub severity: Severity,
    pub on_close: TableIntent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    Uploading { progress: u8 },
    Complete,
    Error { reason: String },
}

impl UploadState {
    pub fn progress(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Uploading { progress } => *progress,
            Self::Complete => 100,
            Self::Error { .. } => 0,
        }
    }

    pub fn is_uploading(&self) -> bool {
        matches!(self, Self::Uploading { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadView {
    pub file_name: Option<String>,
    pub state: UploadState,
    /// `"45% Uploading · 9 KB"` while uploading, `"Upload complete"` once done.
    pub caption: String,
    pub can_submit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum IntentOutcome {
    Applied,
    Ignored,
    Rejected(ApiError),
}
