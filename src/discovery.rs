use anyhow::Result;
use futures::stream::{Stream, StreamExt};
use glob::glob;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Configuration for book-document discovery behavior
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    /// Whether to fail fast on first error or continue processing
    pub fail_fast: bool,
}

/// Result of document discovery validation
#[derive(Debug, Clone)]
pub struct FileValidation {
    pub path: PathBuf,
    pub error: Option<String>,
}

/// Discovers all files matching `**/*.blocks.json` recursively under the
/// given root directory. Returns an async stream of validated file paths.
///
/// # Arguments
/// * `root_dir` - Root directory to search recursively
/// * `config` - Discovery configuration (fail_fast behavior)
pub fn discover_files(
    root_dir: impl AsRef<Path>,
    config: DiscoveryConfig,
) -> impl Stream<Item = Result<FileValidation>> {
    let root_path = root_dir.as_ref().to_path_buf();

    // WHY: using async_stream would be cleaner but adds dependency;
    // futures::stream provides sufficient async iteration capabilities
    futures::stream::unfold(
        DiscoveryState::new(root_path, config),
        |mut state| async move { state.next_file().await.map(|result| (result, state)) },
    )
}

/// Internal state for document discovery iteration
struct DiscoveryState {
    root_dir: PathBuf,
    config: DiscoveryConfig,
    glob_iter: Option<glob::Paths>,
}

impl DiscoveryState {
    fn new(root_dir: PathBuf, config: DiscoveryConfig) -> Self {
        Self {
            root_dir,
            config,
            glob_iter: None,
        }
    }

    async fn next_file(&mut self) -> Option<Result<FileValidation>> {
        // Initialize glob iterator on first call
        if self.glob_iter.is_none() {
            let pattern = format!("{}/**/*.blocks.json", self.root_dir.display());
            debug!("Starting document discovery with pattern: {}", pattern);

            match glob(&pattern) {
                Ok(paths) => {
                    self.glob_iter = Some(paths);
                    info!(
                        "Document discovery initialized for root: {}",
                        self.root_dir.display()
                    );
                }
                Err(e) => {
                    return Some(Err(anyhow::anyhow!("Failed to create glob pattern: {}", e)));
                }
            }
        }

        if let Some(ref mut glob_iter) = self.glob_iter {
            match glob_iter.next() {
                Some(glob_result) => match glob_result {
                    Ok(path) => {
                        debug!("Found document: {}", path.display());
                        Some(self.validate_file(path).await)
                    }
                    Err(e) => {
                        let error_msg = format!("Glob iteration error: {e}");
                        warn!("{}", error_msg);

                        if self.config.fail_fast {
                            Some(Err(anyhow::anyhow!(error_msg)))
                        } else {
                            // Continue to next file on non-fatal glob errors
                            Box::pin(self.next_file()).await
                        }
                    }
                },
                None => {
                    info!("Document discovery completed");
                    None
                }
            }
        } else {
            None
        }
    }

    async fn validate_file(&self, path: PathBuf) -> Result<FileValidation> {
        debug!("Validating document: {}", path.display());

        match fs::metadata(&path).await {
            Ok(metadata) => {
                if !metadata.is_file() {
                    let error = format!("Path is not a file: {}", path.display());
                    warn!("{}", error);
                    return Ok(FileValidation {
                        path,
                        error: Some(error),
                    });
                }
            }
            Err(e) => {
                let error = format!("Cannot access file {}: {}", path.display(), e);
                warn!("{}", error);

                if self.config.fail_fast {
                    return Err(anyhow::anyhow!(error));
                } else {
                    return Ok(FileValidation {
                        path,
                        error: Some(error),
                    });
                }
            }
        }

        // Skip pre-validation - JSON validation happens naturally during processing
        Ok(FileValidation { path, error: None })
    }
}

/// Collect all discovered documents into a Vec for easier processing
pub async fn collect_discovered_files(
    root_dir: impl AsRef<Path>,
    config: DiscoveryConfig,
) -> Result<Vec<FileValidation>> {
    let mut files = Vec::new();
    let mut stream = Box::pin(discover_files(root_dir, config));

    while let Some(result) = stream.next().await {
        match result {
            Ok(validation) => {
                files.push(validation);
            }
            Err(e) => {
                return Err(e);
            }
        }
    }

    info!("Discovered {} documents total", files.len());
    let valid_count = files.iter().filter(|f| f.error.is_none()).count();
    let invalid_count = files.len() - valid_count;

    if invalid_count > 0 {
        warn!("Found {} documents with validation issues", invalid_count);
    }

    info!(
        "Document discovery summary: {} valid, {} invalid",
        valid_count, invalid_count
    );

    Ok(files)
}

/// Convenience function to find all valid book documents (only paths)
/// WHY: Simplifies common use case for integration tests and external callers
pub async fn find_book_documents<P: AsRef<Path>>(root_dir: P) -> Result<Vec<PathBuf>> {
    let config = DiscoveryConfig::default();
    let validations = collect_discovered_files(root_dir, config).await?;

    let valid_files: Vec<PathBuf> = validations
        .into_iter()
        .filter(|v| v.error.is_none())
        .map(|v| v.path)
        .collect();

    Ok(valid_files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_file(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
        let file_path = dir.join(name);
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file_path, content).await?;
        Ok(file_path)
    }

    #[tokio::test]
    async fn test_discover_files_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let config = DiscoveryConfig::default();

        let files = collect_discovered_files(temp_dir.path(), config)
            .await
            .unwrap();
        assert_eq!(files.len(), 0);
    }

    #[tokio::test]
    async fn test_discover_files_matching_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let config = DiscoveryConfig::default();

        // Create test files - some matching, some not
        create_test_file(temp_dir.path(), "GEN.blocks.json", "[]")
            .await
            .unwrap();
        create_test_file(temp_dir.path(), "nt/MAT.blocks.json", "[]")
            .await
            .unwrap();
        create_test_file(temp_dir.path(), "GEN.json", "[]").await.unwrap();
        create_test_file(temp_dir.path(), "notes.txt", "notes").await.unwrap();

        let files = collect_discovered_files(temp_dir.path(), config)
            .await
            .unwrap();
        assert_eq!(files.len(), 2);

        let file_names: Vec<String> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(file_names.contains(&"GEN.blocks.json".to_string()));
        assert!(file_names.contains(&"MAT.blocks.json".to_string()));
    }

    #[tokio::test]
    async fn test_find_book_documents_filters_invalid() {
        let temp_dir = TempDir::new().unwrap();

        create_test_file(temp_dir.path(), "GEN.blocks.json", "[]")
            .await
            .unwrap();
        create_test_file(temp_dir.path(), "EXO.blocks.json", "[]")
            .await
            .unwrap();

        let files = find_book_documents(temp_dir.path()).await.unwrap();
        assert_eq!(files.len(), 2);
    }
}
