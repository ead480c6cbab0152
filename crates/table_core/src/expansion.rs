use std::collections::HashSet;

use shared::domain::{Document, DocumentId};

/// Ids of expanded rows. Only expandable documents are ever admitted.
#[derive(Debug, Default, Clone)]
pub struct ExpansionSet {
    ids: HashSet<DocumentId>,
}

impl ExpansionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the row open or closed. Non-expandable documents are left alone;
    /// returns whether the set changed.
    pub fn toggle(&mut self, document: &Document) -> bool {
        if !document.is_expandable {
            return false;
        }
        if !self.ids.remove(&document.id) {
            self.ids.insert(document.id.clone());
        }
        true
    }

    pub fn is_expanded(&self, id: &DocumentId) -> bool {
        self.ids.contains(id)
    }

    pub fn on_document_removed(&mut self, id: &DocumentId) {
        self.ids.remove(id);
    }

    /// Drops the row if an edit made it non-expandable.
    pub fn on_document_updated(&mut self, document: &Document) {
        if !document.is_expandable {
            self.ids.remove(&document.id);
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, is_expandable: bool) -> Document {
        Document {
            id: DocumentId::new(id),
            name: id.to_string(),
            kind: "PDF".into(),
            size: "0kb".into(),
            last_modified: String::new(),
            tags: Vec::new(),
            is_expandable,
        }
    }

    #[test]
    fn double_toggle_restores_prior_state() {
        let a = doc("a", true);
        let b = doc("b", true);
        let mut expansion = ExpansionSet::new();
        expansion.toggle(&b);

        assert!(expansion.toggle(&a));
        assert!(expansion.is_expanded(&a.id));
        assert!(expansion.toggle(&a));
        assert!(!expansion.is_expanded(&a.id));
        assert!(expansion.is_expanded(&b.id));
        assert_eq!(expansion.len(), 1);
    }

    #[test]
    fn non_expandable_documents_never_enter() {
        let flat = doc("flat", false);
        let mut expansion = ExpansionSet::new();
        assert!(!expansion.toggle(&flat));
        assert!(!expansion.toggle(&flat));
        assert!(expansion.is_empty());
    }

    #[test]
    fn update_to_non_expandable_evicts() {
        let mut document = doc("a", true);
        let mut expansion = ExpansionSet::new();
        expansion.toggle(&document);

        document.is_expandable = false;
        expansion.on_document_updated(&document);
        assert!(!expansion.is_expanded(&document.id));
    }
}
