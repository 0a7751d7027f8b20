//! Append-only incident log.
//!
//! Aborted sessions add one markdown table row with the map, exit code, last
//! loop and snapshot path. The header is written when the file is created.

use crate::session::SessionReport;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

const HEADER: &str = "# Sortie Incidents\n\n| Timestamp | Map | Exit | Loop | Details | Snapshot |\n| --- | --- | --- | --- | --- | --- |\n";

/// Appends aborted sessions to `incidents.md` under the diagnostics directory.
pub struct IncidentLog {
    dir: PathBuf,
}

impl IncidentLog {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("incidents.md")
    }

    /// Where the frame snapshot for an incident on `map` should go.
    pub fn snapshot_path(&self, map: &str) -> PathBuf {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
        self.dir.join("snapshots").join(format!("{map}-{stamp}.png"))
    }

    /// Logs one incident row.
    pub fn record(&self, report: &SessionReport, snapshot: Option<&Path>) {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let (loop_name, details) = report
            .abort_reason
            .as_ref()
            .map(|r| (r.loop_name.clone().unwrap_or_else(|| "-".to_string()), r.message.clone()))
            .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
        let snapshot = snapshot.map_or_else(|| "-".to_string(), |p| p.display().to_string());
        let row = format!(
            "| {} | {} | {} | {} | {} | {} |",
            timestamp,
            report.map,
            report.exit_code,
            loop_name,
            details.replace('|', "\\|"),
            snapshot
        );

        if let Err(e) = self.append(&row) {
            warn!(error = %e, path = %self.path().display(), "Failed to write incident log");
        }
    }

    fn append(&self, row: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path();
        if !path.exists() {
            fs::write(&path, HEADER)?;
        }
        let mut file = fs::OpenOptions::new().append(true).open(&path)?;
        writeln!(file, "{row}")
    }
}
