// Persistence seam for accepted candidates
// The validator calls a sink only after every language passed

use crate::error::SinkError;
use crate::executor::AcceptReport;
use async_trait::async_trait;
use gavel_common::ProblemCandidate;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[async_trait]
pub trait CandidateSink: Send + Sync {
    async fn store(
        &self,
        candidate: &ProblemCandidate,
        report: &AcceptReport,
    ) -> Result<(), SinkError>;
}

#[derive(Serialize)]
struct StoredCandidate<'a> {
    candidate: &'a ProblemCandidate,
    validation: &'a AcceptReport,
}

/// Writes each accepted candidate as `<dir>/<slug>-<timestamp>.json`
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    dir: PathBuf,
}

impl JsonDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, candidate: &ProblemCandidate, report: &AcceptReport) -> PathBuf {
        self.dir.join(format!(
            "{}-{}.json",
            slugify(&candidate.title),
            report.finished_at.format("%Y%m%dT%H%M%S")
        ))
    }
}

#[async_trait]
impl CandidateSink for JsonDirSink {
    async fn store(
        &self,
        candidate: &ProblemCandidate,
        report: &AcceptReport,
    ) -> Result<(), SinkError> {
        let io_error = |path: &Path, source| SinkError::Io {
            path: path.display().to_string(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let path = self.path_for(candidate, report);
        let payload = serde_json::to_string_pretty(&StoredCandidate {
            candidate,
            validation: report,
        })?;
        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| io_error(&path, e))?;

        info!(path = %path.display(), run_id = %report.run_id, "Candidate stored");
        Ok(())
    }
}

/// Lower-case ASCII slug; empty titles become "problem"
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "problem".to_string()
    } else {
        slug
    }
}
