use std::{sync::Arc, time::Duration};

use chrono::{TimeZone, Utc};
use shared::{
    domain::{FileSelection, FilterOptions, NewDocumentInput, SelectionStatus, Severity, Tag},
    protocol::{IntentOutcome, TableIntent, UploadState},
};
use table_core::{DocumentTableSession, ManualClock, Settings};

#[test]
fn table_session_acceptance() {
    let epoch = Utc
        .with_ymd_and_hms(2025, 3, 4, 9, 30, 0)
        .single()
        .expect("valid timestamp");
    let clock = ManualClock::new(epoch);
    let mut session = DocumentTableSession::new(&Settings::default(), Arc::new(clock.clone()));

    for (name, category) in [
        ("trial.pdf", "Medical"),
        ("budget.xlsx", "Finance"),
        ("survey.csv", "Medical"),
    ] {
        session
            .add_document(NewDocumentInput::new(name, 4096).with_tags(vec![
                Tag::new("Brand", "HAL"),
                Tag::new("Category", category),
            ]))
            .expect("add document");
    }
    assert_eq!(session.notification().message, "\"survey.csv\" has been added");

    let names: Vec<_> = session.rows().into_iter().map(|r| r.document.name).collect();
    assert_eq!(names, vec!["trial.pdf", "survey.csv"]);

    assert_eq!(session.dispatch(TableIntent::SelectAll), IntentOutcome::Applied);
    assert_eq!(session.header().select_all, SelectionStatus::All);

    session.begin_add().expect("open uploader");
    session
        .choose_file(FileSelection::new("labs.pdf", 2048))
        .expect("start upload");
    for _ in 0..20 {
        clock.advance(Duration::from_millis(300));
        session.run_due();
    }
    clock.advance(Duration::from_millis(500));
    session.run_due();
    assert_eq!(session.upload_state(), UploadState::Complete);

    let labs = session
        .repository()
        .list()
        .iter()
        .find(|doc| doc.name == "labs.pdf")
        .cloned()
        .expect("uploaded document");
    assert_eq!(labs.last_modified, "3/4/2025, 9:30:06 AM");

    // The new document lacks Brand/Category tags, so it is hidden and the
    // header no longer counts as fully selected once the filter is lifted.
    assert_eq!(session.rows().len(), 2);
    session
        .set_filter(FilterOptions::new("", None))
        .expect("clear filter");
    assert_eq!(session.rows().len(), 4);
    assert_eq!(session.header().select_all, SelectionStatus::Some);

    assert_eq!(
        session.dispatch(TableIntent::Delete {
            document_id: labs.id.clone()
        }),
        IntentOutcome::Applied
    );
    let note = session.notification();
    assert_eq!(note.message, "\"labs.pdf\" has been deleted");
    assert_eq!(note.severity, Severity::Success);

    clock.advance(Duration::from_secs(6));
    session.run_due();
    assert!(!session.notification().open);
}
