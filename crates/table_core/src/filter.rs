//! Tag-based filtering of the document list.

use shared::{
    domain::{Document, FilterOptions},
    error::{DocsError, DocsResult},
};

/// A document passes when, for each constrained field, some tag has a label equal
/// to the field name (ignoring case) and a value equal to the filter value (exactly).
pub fn matches(document: &Document, filter: &FilterOptions) -> bool {
    filter.constraints().into_iter().all(|(field, expected)| {
        document
            .tags
            .iter()
            .any(|tag| tag.label.eq_ignore_ascii_case(field) && tag.value == expected)
    })
}

/// Input order is preserved. An unconstrained filter passes everything through.
pub fn apply<'a>(documents: &'a [Document], filter: &FilterOptions) -> Vec<&'a Document> {
    if filter.is_unconstrained() {
        return documents.iter().collect();
    }
    documents
        .iter()
        .filter(|document| matches(document, filter))
        .collect()
}

/// Rejects fields that are set but blank, or padded with whitespace; neither
/// could ever equal a tag value the user meant.
pub fn validate(filter: &FilterOptions) -> DocsResult<()> {
    let fields = [
        ("brand", Some(filter.brand.as_str())),
        ("category", filter.category.as_deref()),
    ];
    for (name, value) in fields {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            continue;
        };
        if value.trim().is_empty() {
            return Err(DocsError::invalid(format!("filter field '{name}' is blank")));
        }
        if value.trim() != value {
            return Err(DocsError::invalid(format!(
                "filter field '{name}' has surrounding whitespace: {value:?}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::{DocumentId, Tag};

    fn doc(id: &str, tags: &[(&str, &str)]) -> Document {
        Document {
            id: DocumentId::new(id),
            name: format!("{id}.pdf"),
            kind: "PDF".into(),
            size: "1kb".into(),
            last_modified: String::new(),
            tags: tags.iter().map(|(l, v)| Tag::new(*l, *v)).collect(),
            is_expandable: false,
        }
    }

    fn ids(documents: Vec<&Document>) -> Vec<&str> {
        documents.into_iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn keeps_only_documents_matching_every_field_in_order() {
        let documents = vec![
            doc("a", &[("Brand", "HAL"), ("Category", "Medical")]),
            doc("b", &[("Brand", "HAL"), ("Category", "Finance")]),
            doc("c", &[("category", "Medical"), ("BRAND", "HAL")]),
        ];
        let filter = FilterOptions::new("HAL", Some("Medical".into()));
        assert_eq!(ids(apply(&documents, &filter)), vec!["a", "c"]);
    }

    #[test]
    fn values_are_case_sensitive() {
        let documents = vec![doc("a", &[("Brand", "hal")])];
        assert!(apply(&documents, &FilterOptions::new("HAL", None)).is_empty());
    }

    #[test]
    fn brand_only_filter_ignores_category() {
        let documents = vec![
            doc("a", &[("Brand", "HAL")]),
            doc("b", &[("Brand", "HAL"), ("Category", "Legal")]),
            doc("c", &[("Team", "HAL")]),
        ];
        assert_eq!(
            ids(apply(&documents, &FilterOptions::new("HAL", None))),
            vec!["a", "b"]
        );
    }

    #[test]
    fn duplicate_labels_match_any_value() {
        let documents = vec![doc("a", &[("Brand", "ACME"), ("Brand", "HAL")])];
        assert_eq!(apply(&documents, &FilterOptions::new("HAL", None)).len(), 1);
    }

    #[test]
    fn empty_filter_is_identity() {
        let documents = vec![doc("a", &[]), doc("b", &[("Brand", "HAL")])];
        assert_eq!(
            ids(apply(&documents, &FilterOptions::default())),
            vec!["a", "b"]
        );
    }

    #[test]
    fn blank_or_padded_fields_are_malformed() {
        assert!(validate(&FilterOptions::new("HAL", Some("Medical".into()))).is_ok());
        assert!(validate(&FilterOptions::new("", None)).is_ok());
        assert!(matches!(
            validate(&FilterOptions::new("   ", None)),
            Err(DocsError::InvalidInput(_))
        ));
        assert!(matches!(
            validate(&FilterOptions::new("HAL", Some(" Medical".into()))),
            Err(DocsError::InvalidInput(_))
        ));
    }
}
