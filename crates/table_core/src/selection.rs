use std::collections::HashSet;

use shared::domain::{DocumentId, SelectionStatus};

/// Ids of the currently selected rows. Callers keep it a subset of the
/// repository by forwarding removals to [`SelectionSet::on_document_removed`].
#[derive(Debug, Default, Clone)]
pub struct SelectionSet {
    ids: HashSet<DocumentId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `id` is selected afterwards.
    pub fn toggle(&mut self, id: &DocumentId) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.clone());
            true
        }
    }

    pub fn select_all<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = DocumentId>,
    {
        self.ids = ids.into_iter().collect();
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn status(&self, all_ids: &[DocumentId]) -> SelectionStatus {
        if self.ids.is_empty() {
            return SelectionStatus::None;
        }
        let all: HashSet<&DocumentId> = all_ids.iter().collect();
        if all.len() == self.ids.len() && self.ids.iter().all(|id| all.contains(id)) {
            SelectionStatus::All
        } else {
            SelectionStatus::Some
        }
    }

    pub fn on_document_removed(&mut self, id: &DocumentId) {
        self.ids.remove(id);
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
