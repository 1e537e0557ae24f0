use std::path::{Path, PathBuf};

use ::time::{format_description::well_known, macros::format_description, OffsetDateTime};
use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::types::{RunSummary, StepRecord};

/// Explicit state of one run: where artifacts go, when it started, and the
/// steps recorded so far. Passed to every component instead of living in globals.
#[derive(Debug)]
pub struct RunContext {
    run_dir: PathBuf,
    started_at: OffsetDateTime,
    steps: Vec<StepRecord>,
}

impl RunContext {
    /// Create `<root>/<prefix>_<YYYYmmdd_HHMMSS>` and return a context bound to it.
    pub fn create(root: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let started_at = OffsetDateTime::now_utc();
        let run_dir = root
            .as_ref()
            .join(format!("{prefix}_{}", dir_stamp(started_at)));
        std::fs::create_dir_all(&run_dir)
            .with_context(|| format!("failed to create results directory: {}", run_dir.display()))?;
        info!(dir = %run_dir.display(), "results directory ready");
        Ok(Self {
            run_dir,
            started_at,
            steps: Vec::new(),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.run_dir.join(file_name)
    }

    /// Header timestamp for reports.
    pub fn generated_at(&self) -> String {
        header_stamp(self.started_at)
    }

    pub fn record(&mut self, step: StepRecord) {
        debug!(step = %step.title, status = %step.status, "step recorded");
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_steps(&self.steps)
    }

    /// Persist the summary counts as `summary.json` next to the reports.
    pub fn write_summary(&self) -> Result<PathBuf> {
        let path = self.path("summary.json");
        let body = serde_json::json!({
            "started_at": now_rfc3339_at(self.started_at),
            "summary": self.summary(),
            "steps": self.steps.len(),
        });
        let file = std::fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &body)?;
        Ok(path)
    }
}

/// RFC3339 UTC timestamp of the current instant.
pub fn now_rfc3339() -> String {
    now_rfc3339_at(OffsetDateTime::now_utc())
}

fn now_rfc3339_at(t: OffsetDateTime) -> String {
    t.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

fn dir_stamp(t: OffsetDateTime) -> String {
    t.format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| String::from("19700101_000000"))
}

fn header_stamp(t: OffsetDateTime) -> String {
    t.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second] UTC"
    ))
    .unwrap_or_else(|_| String::from("1970-01-01 00:00:00 UTC"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::time::macros::datetime;

    #[test]
    fn stamps_are_zero_padded() {
        let t = datetime!(2024-03-05 07:08:09 UTC);
        assert_eq!(dir_stamp(t), "20240305_070809");
        assert_eq!(header_stamp(t), "2024-03-05 07:08:09 UTC");
        assert_eq!(now_rfc3339_at(t), "2024-03-05T07:08:09Z");
    }
}
