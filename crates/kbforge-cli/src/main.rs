//! KBForge CLI: ingest files into a knowledge base and browse generated content.
//!
//! Set KBFORGE_API_KEY and KBFORGE_API_URL (or API_URL). Uses X-API-Key auth.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use kbforge_api_client::ApiClient;
use kbforge_cli::{candidate_from_path, init_tracing, print_batch_table, print_json, truncate_string};
use kbforge_core::models::{
    ContentType, GroupBy, LibraryFilter, Platform, SortOrder, UploadState, Verdict,
};
use kbforge_core::IngestConfig;
use kbforge_infra::{LogNotifier, NotificationGateway};
use kbforge_library::{ContentLibrary, LoadOutcome};
use kbforge_processing::mbox::ReaderSource;
use kbforge_processing::upload::{UploadDestination, UploadEvent, UploadOrchestrator};
use kbforge_processing::MboxStreamParser;

#[derive(Parser)]
#[command(name = "kbforge", about = "Knowledge-base ingestion and content library CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and upload files into a knowledge base
    Ingest {
        /// Knowledge base identifier
        #[arg(long = "kb")]
        knowledge_base: String,
        /// Address that counts as "sent by me" in mail archives (repeatable)
        #[arg(long = "self", value_name = "ADDRESS")]
        self_addresses: Vec<String>,
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Load the content library and print the grouped view as JSON
    Library {
        /// Server-side content type filter: video, written, carousel
        #[arg(long)]
        r#type: Option<ContentType>,
        /// Local platform filter, e.g. linkedin, x, tiktok
        #[arg(long)]
        platform: Option<Platform>,
        /// Sort order: asc or desc
        #[arg(long, default_value = "desc")]
        sort: SortOrder,
        /// Grouping: none, platform or date
        #[arg(long, default_value = "none")]
        group: GroupBy,
        /// Number of pages to load
        #[arg(long, default_value = "1")]
        pages: u32,
    },
    /// Send good/bad feedback for a generated item
    Feedback {
        /// Content item ID
        content_id: String,
        /// good or bad
        verdict: Verdict,
    },
    /// Parse a mail archive locally and print extraction statistics
    ScanMbox {
        /// Path to the .mbox file
        file: PathBuf,
        /// Address that counts as "sent by me" (repeatable)
        #[arg(long = "self", value_name = "ADDRESS")]
        self_addresses: Vec<String>,
        /// Print one line per extracted message
        #[arg(long)]
        list: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = IngestConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Ingest {
            knowledge_base,
            self_addresses,
            files,
        } => {
            config
                .mbox_self_addresses
                .extend(self_addresses.iter().map(|a| a.trim().to_lowercase()));
            config.validate()?;
            let ok = ingest(&config, knowledge_base, files).await?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Library {
            r#type,
            platform,
            sort,
            group,
            pages,
        } => {
            let client = Arc::new(api_client(&config)?);
            let library = ContentLibrary::new(client.clone(), client, config.library_page_size);
            library.set_sort(sort).await;
            library.set_group_by(group).await;
            library
                .set_filter(LibraryFilter {
                    content_type: r#type,
                    platform,
                })
                .await?;

            // A content type filter already fetched the first page.
            let mut loaded = u32::from(r#type.is_some());
            while loaded < pages {
                match library.load_more().await? {
                    LoadOutcome::Exhausted => break,
                    _ => loaded += 1,
                }
            }

            print_json(&library.view(chrono::Utc::now()).await)?;
        }
        Commands::Feedback {
            content_id,
            verdict,
        } => {
            let client = api_client(&config)?;
            client.submit_feedback(&content_id, verdict).await?;
            print_json(&serde_json::json!({ "success": true, "content_id": content_id }))?;
        }
        Commands::ScanMbox {
            file,
            self_addresses,
            list,
        } => {
            config
                .mbox_self_addresses
                .extend(self_addresses.iter().map(|a| a.trim().to_lowercase()));
            config.validate()?;
            if config.mbox_self_addresses.is_empty() {
                anyhow::bail!("No self addresses configured. Pass --self or set MBOX_SELF_ADDRESSES");
            }

            let source = ReaderSource::open(&file, config.mbox_read_chunk_bytes)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let mut parser = MboxStreamParser::from_config(source, &config);
            while let Some(message) = parser.next_message().await? {
                if list {
                    println!(
                        "{:>12}  {:<25}  {}",
                        message.offset,
                        message
                            .date
                            .map(|d| d.to_rfc3339())
                            .unwrap_or_else(|| "-".to_string()),
                        truncate_string(message.subject.as_deref().unwrap_or("(no subject)"), 60)
                    );
                }
            }
            print_json(&parser.stats())?;
        }
    }

    Ok(())
}

fn api_client(config: &IngestConfig) -> anyhow::Result<ApiClient> {
    ApiClient::from_config(config)
        .context("Failed to create API client. Set KBFORGE_API_KEY and KBFORGE_API_URL (or API_URL)")
}

/// Upload `files`; returns whether every file completed.
async fn ingest(
    config: &IngestConfig,
    knowledge_base: String,
    files: Vec<PathBuf>,
) -> anyhow::Result<bool> {
    let client = Arc::new(api_client(config)?);

    let mut candidates = Vec::with_capacity(files.len());
    for path in &files {
        candidates.push(candidate_from_path(path).await?);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut orchestrator =
        UploadOrchestrator::new(client, UploadDestination::new(knowledge_base), config)
            .with_events(tx);
    orchestrator.add(candidates);

    let cancel = orchestrator.batch_cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling uploads");
            cancel.cancel();
        }
    });

    let gateway = NotificationGateway::new(Arc::new(LogNotifier::new()));
    let reporter = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let UploadEvent::Progress {
                id,
                percent,
                phase,
                indeterminate,
            } = &event
            {
                if *indeterminate {
                    tracing::info!(file_id = %id, phase = phase.label(), "Waiting for server");
                } else {
                    tracing::debug!(file_id = %id, percent, phase = phase.label(), "Progress");
                }
            }
            gateway.notify_upload_event(&event);
        }
    });

    let summary = orchestrator.run().await;
    let files = orchestrator.files().to_vec();
    drop(orchestrator);
    let _ = reporter.await;

    print_batch_table(&files);
    // Files rejected at validation never enter the run summary.
    let failed = files
        .iter()
        .filter(|f| f.state == UploadState::Failed)
        .count();
    if failed > 0 {
        eprintln!("{} of {} files failed", failed, files.len());
    }
    tracing::debug!(completed = summary.completed.len(), "Batch finished");
    Ok(failed == 0)
}
