use anyhow::Result;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

use crate::block::Block;

/// Configuration for document reading behavior
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Whether to fail fast on first error or continue processing
    pub fail_fast: bool,
    /// Buffer size for async reading (default: 8KB)
    pub buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            buffer_size: 8192, // WHY: 8KB is optimal for most filesystems and network storage
        }
    }
}

/// Statistics for document reading operations
#[derive(Debug, Clone)]
pub struct ReadStats {
    pub file_path: String,
    pub blocks_read: u64,
    pub bytes_read: u64,
    pub duration_ms: u64,
    pub read_error: Option<String>,
}

/// Async reader for block-document JSON files
pub struct DocumentReader {
    config: ReaderConfig,
}

impl DocumentReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    /// Read a block document with async buffered I/O.
    /// Returns the blocks and final read statistics.
    pub async fn read_document<P: AsRef<Path>>(
        &self,
        file_path: P,
    ) -> Result<(Vec<Block>, ReadStats)> {
        let path = file_path.as_ref();
        let start_time = std::time::Instant::now();

        debug!("Starting async read of document: {}", path.display());

        // WHY: early validation prevents partial processing and provides clear error context
        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                let error_msg = format!("Failed to open document {}: {}", path.display(), e);
                warn!("{}", error_msg);

                let stats = ReadStats {
                    file_path: path.display().to_string(),
                    blocks_read: 0,
                    bytes_read: 0,
                    duration_ms: start_time.elapsed().as_millis() as u64,
                    read_error: Some(error_msg.clone()),
                };

                if self.config.fail_fast {
                    return Err(anyhow::anyhow!(error_msg));
                } else {
                    return Ok((Vec::new(), stats));
                }
            }
        };

        let mut reader = BufReader::with_capacity(self.config.buffer_size, file);
        let mut contents = String::new();
        if let Err(e) = reader.read_to_string(&mut contents).await {
            let error_msg = format!("Failed to read document {}: {}", path.display(), e);
            warn!("{}", error_msg);

            let stats = ReadStats {
                file_path: path.display().to_string(),
                blocks_read: 0,
                bytes_read: 0,
                duration_ms: start_time.elapsed().as_millis() as u64,
                read_error: Some(error_msg.clone()),
            };

            if self.config.fail_fast {
                return Err(anyhow::anyhow!(error_msg));
            } else {
                return Ok((Vec::new(), stats));
            }
        }

        let blocks: Vec<Block> = match serde_json::from_str(&contents) {
            Ok(blocks) => blocks,
            Err(e) => {
                let error_msg = format!("Malformed block document {}: {}", path.display(), e);
                warn!("{}", error_msg);

                let stats = ReadStats {
                    file_path: path.display().to_string(),
                    blocks_read: 0,
                    bytes_read: contents.len() as u64,
                    duration_ms: start_time.elapsed().as_millis() as u64,
                    read_error: Some(error_msg.clone()),
                };

                if self.config.fail_fast {
                    return Err(anyhow::anyhow!(error_msg));
                } else {
                    return Ok((Vec::new(), stats));
                }
            }
        };

        let stats = ReadStats {
            file_path: path.display().to_string(),
            blocks_read: blocks.len() as u64,
            bytes_read: contents.len() as u64,
            duration_ms: start_time.elapsed().as_millis() as u64,
            read_error: None,
        };

        info!(
            "Successfully read {}: {} blocks, {} bytes in {}ms",
            path.display(),
            stats.blocks_read,
            stats.bytes_read,
            stats.duration_ms
        );

        Ok((blocks, stats))
    }
}

/// Convenience function for reading a block document with default configuration
/// WHY: Simplifies common use case for integration tests and external callers
pub async fn load_blocks<P: AsRef<Path>>(file_path: P) -> Result<Vec<Block>> {
    let reader = DocumentReader::new(ReaderConfig::default());
    let (blocks, stats) = reader.read_document(file_path).await?;
    if let Some(error) = stats.read_error {
        anyhow::bail!(error);
    }
    Ok(blocks)
}

/// Write a block document as pretty-printed JSON with async buffered I/O
pub async fn store_blocks<P: AsRef<Path>>(file_path: P, blocks: &[Block]) -> Result<()> {
    let path = file_path.as_ref();
    let json = serde_json::to_vec_pretty(blocks)?;

    let file = File::create(path).await?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&json).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    debug!("Wrote {} blocks to {}", blocks.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{StyleCategory, VerseNum};
    use tempfile::TempDir;

    fn sample_blocks() -> Vec<Block> {
        vec![
            Block::new(StyleCategory::ProseParagraph, "GEN", 1, VerseNum::single(1))
                .with_text("In the beginning."),
            Block::new(StyleCategory::ProseParagraph, "GEN", 1, VerseNum::single(2))
                .with_text("The earth was formless."),
        ]
    }

    #[tokio::test]
    async fn test_store_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gen.blocks.json");

        let blocks = sample_blocks();
        store_blocks(&path, &blocks).await.unwrap();
        let loaded = load_blocks(&path).await.unwrap();

        assert_eq!(loaded, blocks);
    }

    #[tokio::test]
    async fn test_read_document_stats() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gen.blocks.json");
        store_blocks(&path, &sample_blocks()).await.unwrap();

        let reader = DocumentReader::new(ReaderConfig::default());
        let (blocks, stats) = reader.read_document(&path).await.unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(stats.blocks_read, 2);
        assert!(stats.bytes_read > 0);
        assert!(stats.read_error.is_none());
    }

    #[tokio::test]
    async fn test_read_nonexistent_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.blocks.json");

        let reader = DocumentReader::new(ReaderConfig::default());
        let (blocks, stats) = reader.read_document(&path).await.unwrap();

        assert!(blocks.is_empty());
        assert!(stats.read_error.is_some());
    }

    #[tokio::test]
    async fn test_read_nonexistent_document_fail_fast() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.blocks.json");

        let reader = DocumentReader::new(ReaderConfig {
            fail_fast: true,
            ..Default::default()
        });
        let result = reader.read_document(&path).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_malformed_document_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.blocks.json");
        tokio::fs::write(&path, "not json at all").await.unwrap();

        let reader = DocumentReader::new(ReaderConfig::default());
        let (blocks, stats) = reader.read_document(&path).await.unwrap();

        assert!(blocks.is_empty());
        assert!(stats.read_error.unwrap().contains("Malformed"));
    }
}
