//! Pipeline behavior against a real git fixture and in-memory stores

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::Utc;
use repolens_config::IngestionSettings;
use repolens_embeddings::MockEmbeddingProvider;
use repolens_ingestion::scheduler::JobRunner;
use repolens_ingestion::{IngestionPipeline, JobOutcome, source_id_from_locator};
use repolens_meta_data::{
    EmbeddingStore, IngestionJob, JobStatus, MockEmbeddingStore, MockSourceStore, SourceStore,
};
use repolens_storage::{StorageCoordinator, StorageMode};
use repolens_vector_data::MockVectorStorage;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Build a committed git repository from `(path, bytes)` pairs
fn fixture_repo(files: &[(&str, &[u8])]) -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init(dir.path()).unwrap();

    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }

    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let signature = git2::Signature::now("Fixture", "fixture@example.com").unwrap();
    let commit = repo
        .commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])
        .unwrap();
    drop(tree);

    (dir, commit.to_string())
}

struct PipelineHarness {
    pipeline: IngestionPipeline,
    primary: Arc<MockEmbeddingStore>,
    vector: Arc<MockVectorStorage>,
    sources: Arc<MockSourceStore>,
    provider: Arc<MockEmbeddingProvider>,
}

fn harness(settings: IngestionSettings) -> PipelineHarness {
    let primary = Arc::new(MockEmbeddingStore::new());
    let vector = Arc::new(MockVectorStorage::new());
    let sources = Arc::new(MockSourceStore::new());
    let provider = Arc::new(MockEmbeddingProvider::new(4));
    let storage = Arc::new(StorageCoordinator::new(
        primary.clone(),
        vector.clone(),
        StorageMode::Hybrid,
    ));
    let pipeline = IngestionPipeline::new(
        provider.clone(),
        storage,
        sources.clone(),
        settings,
        8,
    );
    PipelineHarness {
        pipeline,
        primary,
        vector,
        sources,
        provider,
    }
}

fn job_for(path: &Path) -> IngestionJob {
    let now = Utc::now();
    IngestionJob {
        job_id: Uuid::new_v4(),
        processing_id: Uuid::new_v4(),
        repository_locator: path.to_string_lossy().to_string(),
        status: JobStatus::Processing,
        attempts: 1,
        max_attempts: 3,
        priority: 0,
        created_at: now,
        updated_at: now,
        started_at: Some(now),
        completed_at: None,
        last_error: None,
    }
}

fn default_settings() -> IngestionSettings {
    IngestionSettings {
        max_file_bytes: 1024,
        excluded_extensions: vec!["png".to_string(), "bin".to_string()],
    }
}

#[tokio::test]
async fn ingests_a_snapshot_into_both_stores() {
    let (repo, head) = fixture_repo(&[
        ("src/main.rs", b"fn main() { println!(\"hi\"); }"),
        ("src/lib.rs", b"pub fn add(a: i32, b: i32) -> i32 { a + b }"),
        ("README.md", b"# fixture"),
    ]);
    let harness = harness(default_settings());
    let job = job_for(repo.path());

    let outcome = harness.pipeline.run(&job).await;
    let JobOutcome::Success(report) = outcome else {
        panic!("expected success");
    };

    assert_eq!(report.revision, head);
    assert_eq!(report.files_embedded, 3);
    assert_eq!(report.records_written, 3);
    assert_eq!(harness.primary.count_all().await.unwrap(), 3);
    assert_eq!(harness.vector.point_count(), 3);

    let source_id = source_id_from_locator(&job.repository_locator);
    let meta = harness.sources.get(&source_id).await.unwrap().unwrap();
    assert_eq!(meta.last_revision, head);

    let page = harness.primary.list_page(None, 10).await.unwrap();
    let rust_file = page.iter().find(|r| r.unit_path == "src/main.rs").unwrap();
    assert_eq!(rust_file.language.as_deref(), Some("rust"));
    assert_eq!(rust_file.revision, head);
}

#[tokio::test]
async fn content_problems_skip_the_unit_and_continue() {
    let big = vec![b'x'; 2048];
    let (repo, _head) = fixture_repo(&[
        ("keep.rs", b"fn keep() {}"),
        ("big.rs", big.as_slice()),
        ("logo.png", &[0x89, 0x50, 0x4e, 0x47]),
        ("blob", &[0x00, 0xff, 0xfe, 0x00]),
    ]);
    let harness = harness(default_settings());

    let outcome = harness.pipeline.run(&job_for(repo.path())).await;
    let JobOutcome::Success(report) = outcome else {
        panic!("expected success");
    };

    assert_eq!(report.files_embedded, 1);
    assert_eq!(report.files_skipped, 3);
    let page = harness.primary.list_page(None, 10).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].unit_path, "keep.rs");
}

#[tokio::test]
async fn embedding_failure_fails_the_attempt_without_partial_source_state() {
    let (repo, _head) = fixture_repo(&[("main.rs", b"fn main() {}")]);
    let harness = harness(default_settings());
    harness.provider.fail_next();

    let job = job_for(repo.path());
    let outcome = harness.pipeline.run(&job).await;
    assert!(matches!(outcome, JobOutcome::Failure(_)));

    assert_eq!(harness.primary.count_all().await.unwrap(), 0);
    let source_id = source_id_from_locator(&job.repository_locator);
    assert!(harness.sources.get(&source_id).await.unwrap().is_none());
}

#[tokio::test]
async fn reingestion_overwrites_instead_of_duplicating() {
    let (repo, _head) = fixture_repo(&[("a.rs", b"fn a() {}"), ("b.rs", b"fn b() {}")]);
    let harness = harness(default_settings());
    let job = job_for(repo.path());

    for _ in 0..2 {
        let outcome = harness.pipeline.run(&job).await;
        assert!(matches!(outcome, JobOutcome::Success(_)));
    }

    assert_eq!(harness.primary.count_all().await.unwrap(), 2);
    assert_eq!(harness.vector.point_count(), 2);
}

#[tokio::test]
async fn unreachable_repository_is_a_failure_outcome() {
    let harness = harness(default_settings());
    let mut job = job_for(Path::new("/nonexistent/repository/path"));
    job.repository_locator = "/nonexistent/repository/path".to_string();

    let outcome = harness.pipeline.run(&job).await;
    let JobOutcome::Failure(reason) = outcome else {
        panic!("expected failure");
    };
    assert!(reason.contains("snapshot failed"));
}
