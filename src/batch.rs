// WHY: books are independent parses over a read-only lookup, so the batch
// layer fans out per-book tasks and only aggregates stats afterwards

use anyhow::Result;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{info, warn};

use crate::character_verse::CharacterVerseLookup;
use crate::document_io::{load_blocks, store_blocks};
use crate::quote_parser::QuoteParser;
use crate::quote_system::QuotationSystem;

/// Configuration for batch processing behavior
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    /// Abort on first error instead of recording and continuing
    pub fail_fast: bool,
    /// Re-parse books whose output file already exists
    pub overwrite_all: bool,
}

/// Per-book processing statistics
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BookStats {
    /// Input document path
    pub path: String,
    /// Blocks in the input document
    pub blocks_in: u64,
    /// Blocks after parsing
    pub blocks_out: u64,
    /// Output blocks assigned a non-narrator speaker
    pub quote_blocks: u64,
    /// Output blocks carrying a review sentinel
    pub unresolved_blocks: u64,
    /// Total processing time in milliseconds
    pub processing_time_ms: u64,
    /// Parse time in milliseconds (subset of processing_time_ms)
    pub parse_time_ms: u64,
    /// Processing status (success, skipped, failed)
    pub status: String,
    /// Error message if processing failed
    pub error: Option<String>,
}

/// Output path for a parsed document: `GEN.blocks.json` -> `GEN.voices.json`
pub fn output_path_for(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name.strip_suffix(".blocks.json").unwrap_or(&name);
    input.with_file_name(format!("{stem}.voices.json"))
}

/// Parse a batch of book documents concurrently.
///
/// Each book is an independent parse over the shared read-only lookup;
/// concurrency is capped at the CPU count. Results preserve input order.
pub async fn process_books(
    paths: &[PathBuf],
    system: Arc<QuotationSystem>,
    lookup: Arc<dyn CharacterVerseLookup>,
    config: BatchConfig,
    progress: Option<ProgressBar>,
) -> Result<Vec<BookStats>> {
    let concurrency = num_cpus::get().max(1);
    info!(
        books = paths.len(),
        concurrency, "starting batch quote parse"
    );

    let results: Vec<Result<BookStats>> = stream::iter(paths.iter().cloned())
        .map(|path| {
            let system = Arc::clone(&system);
            let lookup = Arc::clone(&lookup);
            let config = config.clone();
            let progress = progress.clone();
            async move {
                let result = process_one_book(&path, &system, lookup.as_ref(), &config).await;
                if let Some(bar) = progress {
                    bar.inc(1);
                }
                result
            }
        })
        .buffered(concurrency)
        .collect()
        .await;

    let mut stats = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(book_stats) => stats.push(book_stats),
            Err(e) => {
                if config.fail_fast {
                    return Err(e);
                }
                warn!("Book processing error (continuing): {}", e);
            }
        }
    }

    info!(
        processed = stats.iter().filter(|s| s.status == "success").count(),
        skipped = stats.iter().filter(|s| s.status == "skipped").count(),
        failed = stats.iter().filter(|s| s.status == "failed").count(),
        "batch quote parse complete"
    );
    Ok(stats)
}

async fn process_one_book(
    path: &Path,
    system: &QuotationSystem,
    lookup: &dyn CharacterVerseLookup,
    config: &BatchConfig,
) -> Result<BookStats> {
    let start = std::time::Instant::now();
    let output = output_path_for(path);

    if !config.overwrite_all && tokio::fs::try_exists(&output).await.unwrap_or(false) {
        return Ok(BookStats {
            path: path.display().to_string(),
            blocks_in: 0,
            blocks_out: 0,
            quote_blocks: 0,
            unresolved_blocks: 0,
            processing_time_ms: start.elapsed().as_millis() as u64,
            parse_time_ms: 0,
            status: "skipped".to_string(),
            error: None,
        });
    }

    let blocks = match load_blocks(path).await {
        Ok(blocks) => blocks,
        Err(e) => {
            let error_msg = format!("Failed to load {}: {}", path.display(), e);
            if config.fail_fast {
                anyhow::bail!(error_msg);
            }
            warn!("{}", error_msg);
            return Ok(BookStats {
                path: path.display().to_string(),
                blocks_in: 0,
                blocks_out: 0,
                quote_blocks: 0,
                unresolved_blocks: 0,
                processing_time_ms: start.elapsed().as_millis() as u64,
                parse_time_ms: 0,
                status: "failed".to_string(),
                error: Some(error_msg),
            });
        }
    };

    let parse_start = std::time::Instant::now();
    let parser = QuoteParser::new(system, lookup);
    let parsed = parser.parse(&blocks);
    let parse_time_ms = parse_start.elapsed().as_millis() as u64;

    let quote_blocks = parsed.iter().filter(|b| b.is_quote()).count() as u64;
    let unresolved_blocks = parsed
        .iter()
        .filter(|b| b.character.as_ref().is_some_and(|c| c.needs_review()))
        .count() as u64;

    store_blocks(&output, &parsed).await?;

    Ok(BookStats {
        path: path.display().to_string(),
        blocks_in: blocks.len() as u64,
        blocks_out: parsed.len() as u64,
        quote_blocks,
        unresolved_blocks,
        processing_time_ms: start.elapsed().as_millis() as u64,
        parse_time_ms,
        status: "success".to_string(),
        error: None,
    })
}

/// Write run statistics as JSON lines for downstream tooling
pub async fn write_run_stats(stats_path: &Path, stats: &[BookStats]) -> Result<()> {
    let file = tokio::fs::File::create(stats_path).await?;
    let mut writer = BufWriter::new(file);

    for book in stats {
        let line = serde_json::to_string(book)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    writer.flush().await?;
    Ok(())
}
