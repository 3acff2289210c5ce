//! Single-vector semantic snapshots: the first run records, later runs compare.

use crate::embeddings::{meets_threshold, util::cosine_similarity, SimilarityScorer};
use crate::errors::{EvalError, Result};
use crate::model::clamp_unit;
use crate::storage::files::{read_json_opt, record_path, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SNAPSHOT_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub model: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotCheck {
    /// No snapshot existed; one was written from the current text.
    Created,
    Compared {
        similarity: f64,
        threshold: f64,
        passed: bool,
        snapshot_text: String,
    },
}

impl SnapshotCheck {
    pub fn passed(&self) -> bool {
        match self {
            SnapshotCheck::Created => true,
            SnapshotCheck::Compared { passed, .. } => *passed,
        }
    }

    /// `SnapshotMismatch` for a failed comparison, `None` otherwise.
    pub fn mismatch(&self, snapshot_id: &str, actual: &str) -> Option<EvalError> {
        match self {
            SnapshotCheck::Compared {
                similarity,
                threshold,
                passed: false,
                snapshot_text,
            } => Some(EvalError::SnapshotMismatch {
                snapshot_id: snapshot_id.to_string(),
                similarity: *similarity,
                threshold: *threshold,
                actual: actual.to_string(),
                snapshot: snapshot_text.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self, id: &str) -> Result<Option<Snapshot>> {
        read_json_opt(&record_path(&self.dir, id))
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        write_json_atomic(&record_path(&self.dir, &snapshot.id), snapshot)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        match std::fs::remove_file(record_path(&self.dir, id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn check(
        &self,
        scorer: &SimilarityScorer,
        actual: &str,
        snapshot_id: &str,
        threshold: f64,
    ) -> Result<SnapshotCheck> {
        let Some(snapshot) = self.load(snapshot_id)? else {
            let embedding = scorer.get_embedding(actual, None, true).await?;
            self.save(&Snapshot {
                id: snapshot_id.to_string(),
                text: actual.to_string(),
                embedding: embedding.to_vec(),
                model: scorer.default_model().to_string(),
                created_at: chrono::Utc::now().to_rfc3339(),
            })?;
            tracing::info!(
                event = "vouch.snapshot.created",
                snapshot_id = %snapshot_id,
                "no snapshot for '{}'; recorded current output",
                snapshot_id
            );
            return Ok(SnapshotCheck::Created);
        };

        let model = (!snapshot.model.is_empty()).then_some(snapshot.model.as_str());
        let current = scorer.get_embedding(actual, model, true).await?;
        let similarity = clamp_unit(cosine_similarity(&current, &snapshot.embedding)?);
        Ok(SnapshotCheck::Compared {
            similarity,
            threshold,
            passed: meets_threshold(similarity, threshold),
            snapshot_text: snapshot.text,
        })
    }

    pub async fn assert_matches(
        &self,
        scorer: &SimilarityScorer,
        actual: &str,
        snapshot_id: &str,
        threshold: f64,
    ) -> Result<()> {
        let check = self.check(scorer, actual, snapshot_id, threshold).await?;
        match check.mismatch(snapshot_id, actual) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cache::EmbeddingCache;
    use crate::providers::embedder::fake::HashingEmbedder;
    use std::sync::Arc;

    fn scorer() -> SimilarityScorer {
        SimilarityScorer::new(
            Some(Arc::new(HashingEmbedder::default())),
            EmbeddingCache::new(32),
            "hash-256",
            true,
        )
    }

    #[tokio::test]
    async fn first_call_records_then_compares() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = SnapshotStore::new(dir.path());
        let s = scorer();

        let first = store.check(&s, "the build passed", "ci", 0.9).await?;
        assert_eq!(first, SnapshotCheck::Created);
        let saved = store.load("ci")?.expect("snapshot written");
        assert_eq!(saved.text, "the build passed");
        assert_eq!(saved.model, "hash-256");

        store.assert_matches(&s, "The build passed!", "ci", 0.9).await?;

        let err = store
            .assert_matches(&s, "deployment rolled back", "ci", 0.9)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "SnapshotMismatch");
        Ok(())
    }

    #[tokio::test]
    async fn delete_reports_presence() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = SnapshotStore::new(dir.path());
        store.check(&scorer(), "x", "gone", 0.9).await?;
        assert!(store.delete("gone")?);
        assert!(!store.delete("gone")?);
        Ok(())
    }
}
