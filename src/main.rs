use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use versecast::batch::{process_books, write_run_stats, BatchConfig};
use versecast::character_verse::{CharacterVerseRecord, InMemoryCharacterVerse};
use versecast::discovery::{collect_discovered_files, DiscoveryConfig};
use versecast::quote_system::QuotationSystem;

#[derive(Parser, Debug)]
#[command(name = "versecast")]
#[command(about = "Quote attribution for multi-voice dramatized Scripture scripts")]
#[command(version)]
struct Args {
    /// Root directory to scan for *.blocks.json book documents
    root_dir: PathBuf,

    /// Quotation system configuration (JSON)
    #[arg(long)]
    quote_system: PathBuf,

    /// Expected-speaker data records (JSON); empty lookup when omitted
    #[arg(long)]
    character_verses: Option<PathBuf>,

    /// Re-parse books whose output files already exist
    #[arg(long)]
    overwrite_all: bool,

    /// Abort on first error
    #[arg(long)]
    fail_fast: bool,

    /// Suppress console progress bars
    #[arg(long)]
    no_progress: bool,

    /// Stats output file path
    #[arg(long, default_value = "run_stats.json")]
    stats_out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // WHY: structured JSON logging enables observability and debugging in production
    tracing_subscriber::fmt()
        .with_target(false)
        .json()
        .init();

    let args = Args::parse();

    info!("Starting versecast");
    info!(?args, "Parsed CLI arguments");

    // WHY: validate root directory exists early to fail fast with clear error
    if !args.root_dir.exists() {
        anyhow::bail!("Root directory does not exist: {}", args.root_dir.display());
    }

    if !args.root_dir.is_dir() {
        anyhow::bail!("Root path is not a directory: {}", args.root_dir.display());
    }

    let system: QuotationSystem = {
        let raw = tokio::fs::read_to_string(&args.quote_system).await?;
        serde_json::from_str(&raw)?
    };
    info!(levels = system.levels().len(), "Loaded quotation system");

    let lookup = match &args.character_verses {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await?;
            let records: Vec<CharacterVerseRecord> = serde_json::from_str(&raw)?;
            let lookup = InMemoryCharacterVerse::from_records(records);
            info!(entries = lookup.len(), "Loaded expected-speaker data");
            lookup
        }
        None => {
            info!("No expected-speaker data supplied; all quotes will need review");
            InMemoryCharacterVerse::new()
        }
    };

    // Discover and validate book documents
    let discovery_config = DiscoveryConfig {
        fail_fast: args.fail_fast,
    };

    info!("Starting document discovery in: {}", args.root_dir.display());
    let discovered = collect_discovered_files(&args.root_dir, discovery_config).await?;

    let valid_paths: Vec<PathBuf> = discovered
        .iter()
        .filter(|f| f.error.is_none())
        .map(|f| f.path.clone())
        .collect();
    let invalid_count = discovered.len() - valid_paths.len();

    info!(
        "Document discovery completed: {} total, {} valid",
        discovered.len(),
        valid_paths.len()
    );

    println!(
        "versecast v{} - Found {} book documents ({} with issues)",
        env!("CARGO_PKG_VERSION"),
        discovered.len(),
        invalid_count
    );

    if valid_paths.is_empty() {
        println!("Nothing to process.");
        return Ok(());
    }

    let progress = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(valid_paths.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} books {msg}")
                .expect("static template is valid"),
        );
        bar
    };

    let batch_config = BatchConfig {
        fail_fast: args.fail_fast,
        overwrite_all: args.overwrite_all,
    };
    let stats = process_books(
        &valid_paths,
        Arc::new(system),
        Arc::new(lookup),
        batch_config,
        Some(progress.clone()),
    )
    .await?;
    progress.finish_and_clear();

    let mut processed = 0u64;
    let mut skipped = 0u64;
    let mut failed = 0u64;
    let mut total_blocks = 0u64;
    let mut total_unresolved = 0u64;

    for book in &stats {
        match book.status.as_str() {
            "success" => processed += 1,
            "skipped" => skipped += 1,
            _ => failed += 1,
        }
        total_blocks += book.blocks_out;
        total_unresolved += book.unresolved_blocks;
    }

    write_run_stats(&args.stats_out, &stats).await?;

    println!("Quote attribution complete:");
    println!("  Processed: {processed} books");
    if skipped > 0 {
        println!("  Skipped (output exists): {skipped} books");
    }
    if failed > 0 {
        println!("  Failed: {failed} books");
    }
    println!("  Total output blocks: {total_blocks}");
    println!("  Blocks needing review: {total_unresolved}");
    println!("  Stats written to: {}", args.stats_out.display());

    info!(
        processed,
        skipped, failed, total_blocks, total_unresolved, "versecast run complete"
    );

    Ok(())
}
