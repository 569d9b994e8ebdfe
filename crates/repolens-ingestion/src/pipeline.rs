//! Ingestion pipeline: snapshot, filter, embed, store
//!
//! One run works on a point-in-time clone of the repository in a
//! temporary directory, removed on every exit path. Content problems
//! (binary, oversize, unreadable) skip the file and continue; collaborator
//! problems (embedding service, primary store) fail the attempt and come
//! back as `JobOutcome::Failure` for the scheduler's retry policy.

use async_trait::async_trait;
use chrono::Utc;
use ignore::WalkBuilder;
use repolens_common::CorrelationId;
use repolens_config::IngestionSettings;
use repolens_embeddings::EmbeddingProvider;
use repolens_meta_data::{EmbeddingRecord, IngestionJob, SourceStore, generate_record_id};
use repolens_storage::StorageCoordinator;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{IngestionError, IngestionResult};
use crate::scheduler::JobRunner;

/// Summary of one successful ingestion run
#[derive(Debug, Clone)]
pub struct IngestionReport {
    pub source_id: String,
    /// HEAD commit the snapshot was taken at
    pub revision: String,
    pub files_embedded: usize,
    pub files_skipped: usize,
    pub records_written: usize,
}

/// Discriminated outcome crossing the scheduler boundary
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Success(IngestionReport),
    Failure(String),
}

/// Normalize a clone URL or local path into a stable source identifier
#[must_use]
pub fn source_id_from_locator(locator: &str) -> String {
    let stripped = locator
        .trim_end_matches('/')
        .trim_end_matches(".git");
    let without_scheme = stripped
        .split_once("://")
        .map_or(stripped, |(_, rest)| rest);
    without_scheme.trim_start_matches('/').to_string()
}

/// One file selected for embedding
struct ContentUnit {
    unit_path: String,
    content: String,
    language: Option<String>,
}

fn language_from_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    let language = match ext {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "cs" => "csharp",
        "php" => "php",
        "sh" | "bash" => "shell",
        "sql" => "sql",
        "md" => "markdown",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "json" => "json",
        _ => return None,
    };
    Some(language.to_string())
}

/// Pipeline wired to the embedding provider and the storage coordinator
pub struct IngestionPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    storage: Arc<StorageCoordinator>,
    sources: Arc<dyn SourceStore>,
    settings: IngestionSettings,
    embed_batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        storage: Arc<StorageCoordinator>,
        sources: Arc<dyn SourceStore>,
        settings: IngestionSettings,
        embed_batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            storage,
            sources,
            settings,
            embed_batch_size: embed_batch_size.max(1),
        }
    }

    async fn execute(&self, job: &IngestionJob) -> IngestionResult<IngestionReport> {
        let correlation_id = CorrelationId::new();
        let source_id = source_id_from_locator(&job.repository_locator);

        // TempDir removes the clone on every exit path, including errors.
        let snapshot_dir = tempfile::tempdir()?;
        let locator = job.repository_locator.clone();
        let destination = snapshot_dir.path().to_path_buf();
        // git2 blocks; keep it off the worker threads.
        let revision = tokio::task::spawn_blocking(move || clone_snapshot(&locator, &destination))
            .await
            .map_err(|e| IngestionError::Other(format!("snapshot task failed: {e}")))??;
        info!(
            correlation_id = %correlation_id,
            source_id = %source_id,
            revision = %revision,
            "Snapshot taken"
        );

        let (units, skipped) = self.collect_units(snapshot_dir.path());
        let mut records_written = 0;
        let mut files_embedded = 0;

        for batch in units.chunks(self.embed_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|u| u.content.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;

            let now = Utc::now();
            let records: Vec<EmbeddingRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(unit, vector)| EmbeddingRecord {
                    id: generate_record_id(&source_id, &unit.unit_path),
                    source_id: source_id.clone(),
                    unit_path: unit.unit_path.clone(),
                    content: unit.content.clone(),
                    language: unit.language.clone(),
                    revision: revision.clone(),
                    vector,
                    updated_at: now,
                })
                .collect();

            self.storage.write(&records, &correlation_id).await?;
            records_written += records.len();
            files_embedded += batch.len();
        }

        self.sources
            .record_processed(&source_id, &revision, Utc::now())
            .await?;

        Ok(IngestionReport {
            source_id,
            revision,
            files_embedded,
            files_skipped: skipped,
            records_written,
        })
    }

    /// Walk the snapshot and pick embeddable files. Content problems skip
    /// the unit, never the job.
    fn collect_units(&self, root: &Path) -> (Vec<ContentUnit>, usize) {
        let mut units = Vec::new();
        let mut skipped = 0;

        let walker = WalkBuilder::new(root)
            .hidden(false)
            .filter_entry(|entry| entry.file_name() != ".git")
            .build();

        for entry in walker {
            let Ok(entry) = entry else {
                skipped += 1;
                continue;
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let unit_path = relative.to_string_lossy().replace('\\', "/");

            if let Some(ext) = path.extension().and_then(|e| e.to_str())
                && self
                    .settings
                    .excluded_extensions
                    .iter()
                    .any(|excluded| excluded.eq_ignore_ascii_case(ext))
            {
                debug!("Skipping excluded extension: {unit_path}");
                skipped += 1;
                continue;
            }

            match entry.metadata() {
                Ok(meta) if meta.len() > self.settings.max_file_bytes => {
                    warn!(
                        "Skipping oversize file {unit_path} ({} bytes)",
                        meta.len()
                    );
                    skipped += 1;
                    continue;
                }
                Ok(_) => {}
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            }

            match std::fs::read_to_string(path) {
                Ok(content) if content.trim().is_empty() => {
                    skipped += 1;
                }
                Ok(content) => {
                    units.push(ContentUnit {
                        language: language_from_extension(path),
                        unit_path,
                        content,
                    });
                }
                // Not valid UTF-8 or unreadable: treat as binary.
                Err(_) => {
                    debug!("Skipping unreadable or binary file: {unit_path}");
                    skipped += 1;
                }
            }
        }

        units.sort_by(|a, b| a.unit_path.cmp(&b.unit_path));
        (units, skipped)
    }
}

/// Clone the repository and return the HEAD commit SHA
fn clone_snapshot(locator: &str, destination: &Path) -> IngestionResult<String> {
    let repository = git2::Repository::clone(locator, destination)?;
    let head = repository.head()?.peel_to_commit()?;
    Ok(head.id().to_string())
}

#[async_trait]
impl JobRunner for IngestionPipeline {
    async fn run(&self, job: &IngestionJob) -> JobOutcome {
        match self.execute(job).await {
            Ok(report) => JobOutcome::Success(report),
            Err(e) => {
                let reason = match &e {
                    IngestionError::Snapshot(msg) => format!("snapshot failed: {msg}"),
                    other => other.to_string(),
                };
                JobOutcome::Failure(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_strips_scheme_and_git_suffix() {
        assert_eq!(
            source_id_from_locator("https://git.example.com/team/app.git"),
            "git.example.com/team/app"
        );
        assert_eq!(
            source_id_from_locator("https://git.example.com/team/app"),
            "git.example.com/team/app"
        );
    }

    #[test]
    fn source_id_keeps_local_paths_stable() {
        assert_eq!(
            source_id_from_locator("/srv/mirrors/team/app"),
            "srv/mirrors/team/app"
        );
    }

    #[test]
    fn language_detection_covers_common_extensions() {
        assert_eq!(
            language_from_extension(Path::new("src/main.rs")).as_deref(),
            Some("rust")
        );
        assert_eq!(
            language_from_extension(Path::new("docs/guide.md")).as_deref(),
            Some("markdown")
        );
        assert_eq!(language_from_extension(Path::new("logo.png")), None);
    }
}
