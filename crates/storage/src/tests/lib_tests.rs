use super::*;
use chrono::TimeZone;
use shared::domain::Tag;

struct FixedClock(DateTime<Utc>);

impl WallClock for FixedClock {
    fn wall_time(&self) -> DateTime<Utc> {
        self.0
    }
}

fn repository() -> Repository {
    let at = Utc
        .with_ymd_and_hms(2025, 2, 26, 14, 5, 9)
        .single()
        .expect("valid timestamp");
    Repository::new(Arc::new(FixedClock(at)))
}

fn seeded(id: &str, name: &str) -> Document {
    Document {
        id: DocumentId::new(id),
        name: name.to_string(),
        kind: document_kind(name),
        size: "1kb".into(),
        last_modified: "2/1/2025, 9:00:00 AM".into(),
        tags: Vec::new(),
        is_expandable: false,
    }
}

#[test]
fn add_derives_kind_size_and_timestamp() {
    let mut repo = repository();
    let doc = repo
        .add(NewDocumentInput::new("spec.pdf", 9216))
        .expect("add");
    assert_eq!(doc.kind, "PDF");
    assert_eq!(doc.size, "9kb");
    assert_eq!(doc.last_modified, "2/26/2025, 2:05:09 PM");
    assert!(doc.is_expandable);
    assert_eq!(repo.list(), &[doc]);
}

#[test]
fn size_rounds_to_nearest_kilobyte() {
    assert_eq!(format_size_kb(0), "0kb");
    assert_eq!(format_size_kb(1023), "0kb");
    assert_eq!(format_size_kb(1024), "1kb");
    assert_eq!(format_size_kb(1535), "1kb");
    assert_eq!(format_size_kb(1536), "2kb");
    assert_eq!(format_size_kb(10 * 1024 * 1024), "10240kb");
    assert_eq!(format_size_kb(u64::MAX), "18014398509481984kb");
    assert_eq!(format_size_kb(u64::MAX - 512), "18014398509481983kb");
}

#[test]
fn kind_falls_back_to_unknown_without_extension() {
    assert_eq!(document_kind("README"), "UNKNOWN");
    assert_eq!(document_kind("archive.tar.gz"), "GZ");
    assert_eq!(document_kind("data.Json"), "JSON");
}

#[test]
fn rapid_adds_get_distinct_ids() {
    let mut repo = repository();
    let ids: HashSet<_> = (0..200)
        .map(|i| {
            repo.add(NewDocumentInput::new(format!("file-{i}.txt"), 10))
                .expect("add")
                .id
        })
        .collect();
    assert_eq!(ids.len(), 200);
}

#[test]
fn add_rejects_blank_file_name() {
    let mut repo = repository();
    let err = repo
        .add(NewDocumentInput::new("   ", 10))
        .expect_err("blank name");
    assert!(matches!(err, DocsError::InvalidInput(_)));
    assert!(repo.is_empty());
}

#[test]
fn update_merges_patch_and_keeps_other_fields() {
    let mut repo = repository();
    let doc = repo
        .add(NewDocumentInput::new("a.pdf", 2048).with_tags(vec![Tag::new("Brand", "HAL")]))
        .expect("add");

    let updated = repo
        .update(
            &doc.id,
            DocumentPatch {
                name: Some("renamed.pdf".into()),
                ..DocumentPatch::default()
            },
        )
        .expect("update");

    assert_eq!(updated.name, "renamed.pdf");
    assert_eq!(updated.kind, doc.kind);
    assert_eq!(updated.size, doc.size);
    assert_eq!(updated.tags, doc.tags);
    assert_eq!(updated.last_modified, doc.last_modified);
}

#[test]
fn update_missing_id_is_not_found() {
    let mut repo = repository();
    let err = repo
        .update(&DocumentId::new("ghost"), DocumentPatch::default())
        .expect_err("missing");
    assert_eq!(
        err,
        DocsError::NotFound {
            id: DocumentId::new("ghost")
        }
    );
}

#[test]
fn remove_is_idempotent_and_preserves_order() {
    let mut repo = repository();
    let a = repo.add(NewDocumentInput::new("a.txt", 1)).expect("a");
    let b = repo.add(NewDocumentInput::new("b.txt", 1)).expect("b");
    let c = repo.add(NewDocumentInput::new("c.txt", 1)).expect("c");

    assert_eq!(repo.remove(&b.id).map(|d| d.id), Some(b.id.clone()));
    assert!(repo.remove(&b.id).is_none());
    assert_eq!(repo.ids(), vec![a.id, c.id]);
}

#[test]
fn deleted_ids_cannot_be_reinserted() {
    let mut repo = repository();
    repo.insert(seeded("doc-1", "one.pdf")).expect("insert");
    repo.remove(&DocumentId::new("doc-1"));

    let err = repo
        .insert(seeded("doc-1", "again.pdf"))
        .expect_err("reused id");
    assert!(matches!(err, DocsError::InvalidInput(_)));
    assert!(repo.is_empty());
}

#[test]
fn load_json_inserts_seed_documents() {
    let mut repo = repository();
    let raw = r#"[
        {"id": "d1", "name": "HAL.pdf", "type": "PDF", "size": "12kb",
         "lastModified": "2/26/2025", "tags": [{"label": "Brand", "value": "HAL"}],
         "isExpandable": true},
        {"id": "d2", "name": "notes.txt", "type": "TXT", "size": "1kb",
         "lastModified": "2/26/2025"}
    ]"#;
    assert_eq!(repo.load_json(raw).expect("seed"), 2);
    assert_eq!(repo.len(), 2);
    assert!(!repo.get(&DocumentId::new("d2")).expect("d2").is_expandable);

    assert!(matches!(
        repo.load_json("{not json"),
        Err(DocsError::InvalidInput(_))
    ));
}
