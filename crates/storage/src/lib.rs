//! In-memory document repository: the sole writer of document records.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use shared::{
    domain::{file_extension, Document, DocumentId, DocumentPatch, NewDocumentInput},
    error::{DocsError, DocsResult},
};
use tracing::{debug, info};
use uuid::Uuid;

const UNKNOWN_KIND: &str = "UNKNOWN";
const LAST_MODIFIED_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

/// Source of wall-clock time for `lastModified` stamps.
pub trait WallClock: Send + Sync {
    fn wall_time(&self) -> DateTime<Utc>;
}

pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Size string from a byte count: whole kilobytes (base 1024), rounded to nearest.
/// Anything under one kilobyte reads `0kb`.
pub fn format_size_kb(size_bytes: u64) -> String {
    if size_bytes < 1024 {
        return "0kb".to_string();
    }
    let kb = size_bytes / 1024 + u64::from(size_bytes % 1024 >= 512);
    format!("{kb}kb")
}

/// Uppercased extension of `file_name`, or `UNKNOWN`.
pub fn document_kind(file_name: &str) -> String {
    file_extension(file_name)
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| UNKNOWN_KIND.to_string())
}

pub fn format_last_modified(at: DateTime<Utc>) -> String {
    at.format(LAST_MODIFIED_FORMAT).to_string()
}

pub struct Repository {
    documents: Vec<Document>,
    /// Every id ever handed out or inserted, live or deleted.
    issued: HashSet<DocumentId>,
    clock: Arc<dyn WallClock>,
}

impl Default for Repository {
    fn default() -> Self {
        Self::new(Arc::new(SystemWallClock))
    }
}

impl Repository {
    pub fn new(clock: Arc<dyn WallClock>) -> Self {
        Self {
            documents: Vec::new(),
            issued: HashSet::new(),
            clock,
        }
    }

    fn next_id(&mut self) -> DocumentId {
        loop {
            let id = DocumentId::new(format!("doc-{}", Uuid::new_v4().simple()));
            if self.issued.insert(id.clone()) {
                return id;
            }
        }
    }

    pub fn add(&mut self, input: NewDocumentInput) -> DocsResult<Document> {
        if input.file_name.trim().is_empty() {
            return Err(DocsError::invalid("file name must not be empty"));
        }

        let document = Document {
            id: self.next_id(),
            kind: document_kind(&input.file_name),
            size: format_size_kb(input.size_bytes),
            last_modified: format_last_modified(self.clock.wall_time()),
            name: input.file_name,
            tags: input.tags,
            is_expandable: input.is_expandable,
        };
        info!(document_id = %document.id, name = %document.name, "document added");
        self.documents.push(document.clone());
        Ok(document)
    }

    /// Stores a fully formed document, e.g. seed data. Ids may never be reused.
    pub fn insert(&mut self, document: Document) -> DocsResult<Document> {
        if document.id.as_str().is_empty() {
            return Err(DocsError::invalid("document id must not be empty"));
        }
        if !self.issued.insert(document.id.clone()) {
            return Err(DocsError::invalid(format!(
                "document id {} has already been used",
                document.id
            )));
        }
        debug!(document_id = %document.id, "document inserted");
        self.documents.push(document.clone());
        Ok(document)
    }

    pub fn update(&mut self, id: &DocumentId, patch: DocumentPatch) -> DocsResult<Document> {
        let document = self
            .documents
            .iter_mut()
            .find(|doc| &doc.id == id)
            .ok_or_else(|| DocsError::not_found(id))?;

        if let Some(name) = patch.name {
            document.name = name;
        }
        if let Some(kind) = patch.kind {
            document.kind = kind;
        }
        if let Some(size) = patch.size {
            document.size = size;
        }
        if let Some(tags) = patch.tags {
            document.tags = tags;
        }
        if let Some(is_expandable) = patch.is_expandable {
            document.is_expandable = is_expandable;
        }
        info!(document_id = %id, "document updated");
        Ok(document.clone())
    }

    /// Idempotent: removing an absent id returns `None`.
    pub fn remove(&mut self, id: &DocumentId) -> Option<Document> {
        let index = self.documents.iter().position(|doc| &doc.id == id)?;
        let removed = self.documents.remove(index);
        info!(document_id = %id, "document removed");
        Some(removed)
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.iter().find(|doc| &doc.id == id)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.get(id).is_some()
    }

    pub fn list(&self) -> &[Document] {
        &self.documents
    }

    pub fn ids(&self) -> Vec<DocumentId> {
        self.documents.iter().map(|doc| doc.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Loads seed documents from a JSON array, returning how many were stored.
    pub fn load_json(&mut self, raw: &str) -> DocsResult<usize> {
        let documents: Vec<Document> = serde_json::from_str(raw)
            .map_err(|err| DocsError::invalid(format!("malformed document seed: {err}")))?;
        let count = documents.len();
        for document in documents {
            self.insert(document)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
