//! Orchestrator status artifacts.
//!
//! After every sortie the running counters are rewritten to a JSON file for
//! tooling and a markdown summary for people. Write failures are logged and
//! never stop the run.

use serde::Serialize;
use sortie_proto::ExitCode;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Running totals across sorties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SortieStats {
    pub sorties: u32,
    /// Sorties that ended in a repeatable way (boss, retreat-after-N).
    pub combats_done: u32,
    /// Sorties that ended the run early.
    pub combats_attempted: u32,
    pub commissions: u32,
    pub victories: u32,
    pub defeats: u32,
    pub last_exit_code: Option<ExitCode>,
}

impl SortieStats {
    pub fn record_victory(&mut self) {
        self.victories += 1;
    }

    pub fn record_defeat(&mut self) {
        self.defeats += 1;
    }

    pub fn record_commission(&mut self) {
        self.commissions += 1;
    }
}

#[derive(Debug, Serialize)]
struct SortieStatus<'a> {
    map: &'a str,
    updated_at: String,
    elapsed_seconds: u64,
    stats: &'a SortieStats,
}

/// Rewrites `.sortie-status.json` and `.sortie-status.md` after each session.
pub struct StatusManager {
    dir: PathBuf,
}

impl StatusManager {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn json_path(&self) -> PathBuf {
        self.dir.join(".sortie-status.json")
    }

    pub fn markdown_path(&self) -> PathBuf {
        self.dir.join(".sortie-status.md")
    }

    pub fn update(&self, map: &str, stats: &SortieStats, elapsed_seconds: u64) {
        let status = SortieStatus {
            map,
            updated_at: chrono::Utc::now().to_rfc3339(),
            elapsed_seconds,
            stats,
        };

        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!(error = %e, dir = %self.dir.display(), "Cannot create status directory");
            return;
        }

        match serde_json::to_string_pretty(&status) {
            Ok(json) => {
                if let Err(e) = fs::write(self.json_path(), json) {
                    warn!(error = %e, "Failed to write status JSON");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize status"),
        }

        if let Err(e) = fs::write(self.markdown_path(), Self::format_markdown(&status)) {
            warn!(error = %e, "Failed to write status markdown");
        }
        debug!(sorties = stats.sorties, "Status artifacts updated");
    }

    fn format_markdown(status: &SortieStatus<'_>) -> String {
        let last = status
            .stats
            .last_exit_code
            .map_or("none", |code| code.as_str());
        format!(
            "# Sortie Status\n\n\
             - **Map:** {}\n\
             - **Updated:** {}\n\
             - **Elapsed:** {}s\n\n\
             ## Totals\n\n\
             - **Sorties:** {}\n\
             - **Combats done:** {}\n\
             - **Combats attempted:** {}\n\
             - **Victories / defeats:** {} / {}\n\
             - **Commissions seen:** {}\n\
             - **Last exit:** {}\n",
            status.map,
            status.updated_at,
            status.elapsed_seconds,
            status.stats.sorties,
            status.stats.combats_done,
            status.stats.combats_attempted,
            status.stats.victories,
            status.stats.defeats,
            status.stats.commissions,
            last,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_update_writes_both_artifacts() {
        let dir = TempDir::new().unwrap();
        let manager = StatusManager::new(dir.path());
        let mut stats = SortieStats {
            sorties: 3,
            combats_done: 2,
            last_exit_code: Some(ExitCode::BossDefeated),
            ..SortieStats::default()
        };
        stats.record_victory();
        stats.record_commission();

        manager.update("3-4", &stats, 120);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(manager.json_path()).unwrap()).unwrap();
        assert_eq!(json["map"], "3-4");
        assert_eq!(json["stats"]["victories"], 1);
        assert_eq!(json["stats"]["last_exit_code"], "boss_defeated");

        let md = fs::read_to_string(manager.markdown_path()).unwrap();
        assert!(md.contains("- **Sorties:** 3"));
        assert!(md.contains("- **Last exit:** boss_defeated"));
    }

    #[test]
    fn test_update_overwrites_previous_status() {
        let dir = TempDir::new().unwrap();
        let manager = StatusManager::new(dir.path());
        manager.update("E-C1", &SortieStats::default(), 1);
        manager.update("E-D3", &SortieStats::default(), 2);
        let md = fs::read_to_string(manager.markdown_path()).unwrap();
        assert!(md.contains("E-D3"));
        assert!(!md.contains("E-C1"));
    }
}
