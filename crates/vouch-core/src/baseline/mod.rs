pub mod regression;

use crate::errors::{EvalError, Result};
use crate::model::{QualityMetrics, ScoringSource};
use crate::storage::files::{read_json_opt, record_path, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const BASELINE_SCHEMA_VERSION: u32 = 1;

/// A stored "known good" output plus its quality scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Baseline {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub id: String,
    pub text: String,
    pub metrics: QualityMetrics,
    #[serde(default)]
    pub scoring: ScoringSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
}

fn default_schema_version() -> u32 {
    BASELINE_SCHEMA_VERSION
}

impl Baseline {
    pub fn new(id: &str, text: &str, metrics: QualityMetrics, scoring: ScoringSource) -> Self {
        let now = Utc::now();
        Self {
            schema_version: BASELINE_SCHEMA_VERSION,
            id: id.to_string(),
            text: text.to_string(),
            metrics,
            scoring,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn get_score(&self, metric: crate::model::MetricName) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }

    /// True when every metric in `candidate` that the baseline also has is at
    /// least as good. Metrics the baseline lacks count as improvements.
    pub fn is_improved_by(&self, candidate: &QualityMetrics) -> bool {
        candidate
            .iter()
            .all(|(m, score)| self.metrics.get(m).map_or(true, |b| *score >= *b))
    }
}

/// One JSON file per baseline id under a directory.
#[derive(Debug)]
pub struct BaselineStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl BaselineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `Ok(None)` when no baseline exists for `id`.
    pub fn load(&self, id: &str) -> Result<Option<Baseline>> {
        let baseline: Option<Baseline> = read_json_opt(&record_path(&self.dir, id))?;
        if let Some(b) = &baseline {
            if b.schema_version != BASELINE_SCHEMA_VERSION {
                return Err(EvalError::Storage(format!(
                    "unsupported baseline schema version {} for '{}'",
                    b.schema_version, id
                )));
            }
        }
        Ok(baseline)
    }

    pub fn save(&self, baseline: &Baseline) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        write_json_atomic(&record_path(&self.dir, &baseline.id), baseline)
    }

    /// Writes `baseline` only if no record exists yet; returns whichever record
    /// is stored afterwards.
    pub fn create_if_absent(&self, baseline: Baseline) -> Result<(Baseline, bool)> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = self.load(&baseline.id)? {
            return Ok((existing, false));
        }
        write_json_atomic(&record_path(&self.dir, &baseline.id), &baseline)?;
        Ok((baseline, true))
    }

    /// Replaces the stored text and metrics when `metrics` is no worse than the
    /// stored scores on every shared metric, bumping `version`.
    ///
    /// The comparison runs against the record as stored at write time, so two
    /// racing updates cannot both pass against a stale copy.
    pub fn update_if_improved(
        &self,
        id: &str,
        text: &str,
        metrics: &QualityMetrics,
        scoring: ScoringSource,
    ) -> Result<Option<Baseline>> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut current) = self.load(id)? else {
            return Ok(None);
        };
        if !current.is_improved_by(metrics) {
            return Ok(None);
        }
        current.text = text.to_string();
        current.metrics = metrics.clone();
        current.scoring = scoring;
        current.version += 1;
        current.updated_at = Utc::now();
        write_json_atomic(&record_path(&self.dir, id), &current)?;
        Ok(Some(current))
    }

    /// All baselines, most recently updated first.
    pub fn list(&self) -> Result<Vec<Baseline>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json_opt::<Baseline>(&path) {
                Ok(Some(b)) => out.push(b),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        event = "vouch.baseline.unreadable",
                        path = %path.display(),
                        error = %e,
                    );
                }
            }
        }
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    /// Removes a baseline. Returns false when there was nothing to remove.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::remove_file(record_path(&self.dir, id)) {
            Ok(()) => {
                tracing::info!(event = "vouch.baseline.deleted", baseline_id = %id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
