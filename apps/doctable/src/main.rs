use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::{
    domain::{FileSelection, FilterOptions, NewDocumentInput, Tag},
    protocol::{TableIntent, UploadState},
};
use table_core::{
    load_settings, DocumentTableSession, Settings, SimulatedSync, SimulatedTransport, SystemClock,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "doctable", about = "Document table controller driven from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the rows visible under a filter.
    List {
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// JSON array of documents to load instead of the sample set.
        #[arg(long)]
        seed: Option<PathBuf>,
    },
    /// Run one simulated upload and print the resulting document.
    Upload {
        #[arg(long)]
        file: String,
        #[arg(long)]
        size: u64,
        /// Drop the connection halfway through.
        #[arg(long)]
        fail: bool,
    },
    /// Walk through selection, expansion, sync and upload on the sample set.
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = load_settings();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Command::List {
            brand,
            category,
            seed,
        } => list(&settings, brand, category, seed),
        Command::Upload { file, size, fail } => upload(&settings, file, size, fail).await,
        Command::Demo => demo(&settings).await,
    }
}

fn new_session(settings: &Settings) -> DocumentTableSession {
    DocumentTableSession::new(settings, Arc::new(SystemClock::new()))
}

fn sample_documents() -> Vec<NewDocumentInput> {
    vec![
        NewDocumentInput::new("Clinical Trial Summary.pdf", 482_304).with_tags(vec![
            Tag::new("Brand", "HAL"),
            Tag::new("Category", "Medical"),
        ]),
        NewDocumentInput::new("Quarterly Budget.xlsx", 91_136).with_tags(vec![
            Tag::new("Brand", "HAL"),
            Tag::new("Category", "Finance"),
        ]),
        NewDocumentInput::new("Patient Survey.csv", 20_480).with_tags(vec![
            Tag::new("Brand", "HAL"),
            Tag::new("Category", "Medical"),
        ]),
    ]
}

fn load_seed(session: &mut DocumentTableSession, seed: Option<PathBuf>) -> Result<()> {
    match seed {
        Some(path) => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read seed file '{}'", path.display()))?;
            let count = session
                .seed_json(&raw)
                .with_context(|| format!("failed to load seed file '{}'", path.display()))?;
            info!(count, path = %path.display(), "seeded documents");
        }
        None => {
            for input in sample_documents() {
                session.add_document(input)?;
            }
        }
    }
    Ok(())
}

fn print_rows(session: &DocumentTableSession) -> Result<()> {
    let header = session.header();
    println!(
        "filter brand={} category={} selection={:?}",
        header.filter.brand,
        header.filter.category.as_deref().unwrap_or("-"),
        header.select_all
    );
    for row in session.rows() {
        let doc = &row.document;
        let tags: Vec<String> = doc
            .tags
            .iter()
            .map(|tag| format!("{}:{}", tag.label, tag.value))
            .collect();
        println!(
            "[{}]{} {:<32} {:<5} {:>8}  {}  {}",
            if row.is_selected { "x" } else { " " },
            if row.is_expanded { "-" } else { "+" },
            doc.name,
            doc.kind,
            doc.size,
            doc.last_modified,
            tags.join(", ")
        );
        for entry in row.expanded_content.iter().flatten() {
            println!("      {:<40} {:>8}", entry.name, entry.size);
        }
    }
    Ok(())
}

fn list(
    settings: &Settings,
    brand: Option<String>,
    category: Option<String>,
    seed: Option<PathBuf>,
) -> Result<()> {
    let mut session = new_session(settings);
    load_seed(&mut session, seed)?;

    let defaults = settings.default_filter();
    let category = category.or(defaults.category);
    let filter = FilterOptions::new(brand.unwrap_or(defaults.brand), category);
    session.set_filter(filter)?;
    print_rows(&session)
}

/// Pumps timers until the upload settles, printing each caption change.
async fn drive_upload(session: &mut DocumentTableSession) -> UploadState {
    let mut last_caption = String::new();
    loop {
        let view = session.upload_view();
        if view.caption != last_caption {
            println!("{}", view.caption);
            last_caption = view.caption;
        }
        match view.state {
            UploadState::Uploading { .. } => {}
            state => return state,
        }
        let Some(deadline) = session.next_deadline() else {
            return session.upload_state();
        };
        let now = session.scheduler().now();
        if deadline > now {
            tokio::time::sleep(deadline - now).await;
        }
        session.run_due();
    }
}

async fn upload(settings: &Settings, file: String, size: u64, fail: bool) -> Result<()> {
    let mut session = new_session(settings);
    if fail {
        session = session.with_transport(Box::new(SimulatedTransport::failing_at(50, 1)));
    }
    session.begin_add()?;
    session.choose_file(FileSelection::new(file, size))?;
    let notice = session.notification();
    if notice.open {
        println!("{:?}: {}", notice.severity, notice.message);
    }

    match drive_upload(&mut session).await {
        UploadState::Complete => {
            // The document is committed on the settle tick unless the policy waits for submit.
            let committed = session.submit_upload()?;
            let document = committed
                .or_else(|| session.repository().list().last().cloned())
                .context("upload finished without a document")?;
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
        UploadState::Error { reason } => bail!("upload failed: {reason}"),
        other => bail!("upload stopped in state {other:?}"),
    }
}

async fn demo(settings: &Settings) -> Result<()> {
    let mut session = new_session(settings);
    load_seed(&mut session, None)?;
    print_rows(&session)?;

    println!("\n> select all, expand the first row");
    session.dispatch(TableIntent::SelectAll);
    if let Some(first) = session.visible_ids().into_iter().next() {
        session.dispatch(TableIntent::ToggleExpand { document_id: first });
    }
    print_rows(&session)?;

    println!("\n> sync");
    let service = SimulatedSync::new(Duration::from_millis(800));
    session.sync(&service).await;
    println!("{}", session.notification().message);
    session.run_timers_until(|s| !s.is_syncing()).await;

    println!("\n> upload Lab Results.pdf");
    session.begin_add()?;
    session.choose_file(FileSelection::new("Lab Results.pdf", 250_000))?;
    drive_upload(&mut session).await;
    session.submit_upload()?;
    println!("{}", session.notification().message);

    println!("\n> delete the first row");
    if let Some(first) = session.visible_ids().into_iter().next() {
        session.dispatch(TableIntent::Delete { document_id: first });
        println!("{}", session.notification().message);
    }
    print_rows(&session)
}
