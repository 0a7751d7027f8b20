//! `sortie replay`: runs scenario fixtures and checks their expectations.

use anyhow::{Context, Result, bail};
use clap::Parser;
use sortie_core::testing::{Fixture, ScenarioRunner, list_fixtures};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// A fixture file, or a directory of `.yaml` fixtures
    pub path: PathBuf,

    /// Write incident logs and status files here
    #[arg(long, value_name = "DIR")]
    pub diagnostics: Option<PathBuf>,
}

pub fn execute(args: &ReplayArgs) -> Result<()> {
    let fixtures = if args.path.is_dir() {
        list_fixtures(&args.path).with_context(|| format!("Failed to list {}", args.path.display()))?
    } else {
        vec![args.path.clone()]
    };
    if fixtures.is_empty() {
        bail!("no fixtures found in {}", args.path.display());
    }

    let mut failed = 0;
    for path in &fixtures {
        if !replay_one(path, args.diagnostics.as_deref())? {
            failed += 1;
        }
    }
    info!(total = fixtures.len(), failed, "Replay finished");
    if failed > 0 {
        bail!("{failed} of {} fixtures did not meet their expectations", fixtures.len());
    }
    Ok(())
}

/// Returns false if the replay did not match the fixture's expectations.
fn replay_one(path: &Path, diagnostics: Option<&Path>) -> Result<bool> {
    let fixture = Fixture::from_file(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let expect = fixture.expect.clone();
    let result = ScenarioRunner::replay(fixture, diagnostics)
        .with_context(|| format!("Failed to replay {}", path.display()))?;

    let kills = result.report().map_or(0, |r| r.kills_count);
    let termination = result.termination_reason().map_or("-", |t| t.as_str());
    let problems = result.mismatches(&expect);
    let verdict = if problems.is_empty() { "ok" } else { "FAILED" };
    println!(
        "{verdict:<6} {:<28} exit={} termination={termination} kills={kills} taps={} captures={}",
        result.name(),
        result.exit_code(),
        result.taps().len(),
        result.captures(),
    );
    for problem in &problems {
        println!("         - {problem}");
    }
    Ok(problems.is_empty())
}
