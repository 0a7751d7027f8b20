//! `sortie maps`: prints the built-in strategy table with configured overrides.

use anyhow::Result;
use clap::Parser;
use sortie_core::{MapStrategy, SortieConfig, StrategyTable};

#[derive(Parser, Debug)]
pub struct MapsArgs {
    /// Only show maps whose id starts with this prefix (e.g. "E-" or "6-")
    #[arg(long)]
    pub prefix: Option<String>,
}

pub fn execute(config: &SortieConfig, args: &MapsArgs) -> Result<()> {
    let table = StrategyTable::builtin().with_overrides(&config.strategies);
    println!("{:<6} {:>5} {:<22} {:<7} {}", "MAP", "KILLS", "BUDGET", "ANCHOR", "OPENING");
    for strategy in table
        .iter()
        .filter(|s| args.prefix.as_deref().is_none_or(|p| s.map.starts_with(p)))
    {
        println!("{}", row(strategy));
    }
    Ok(())
}

fn row(strategy: &MapStrategy) -> String {
    let budget = format!("{} {:?}", strategy.movement_budget, strategy.budget_policy);
    let anchor = if strategy.anchor.is_some() { "yes" } else { "-" };
    let opening = if strategy.opening.is_empty() {
        "-".to_string()
    } else {
        strategy
            .opening
            .iter()
            .map(|step| format!("{step:?}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "{:<6} {:>5} {:<22} {:<7} {}",
        strategy.map, strategy.kills_before_boss, budget, anchor, opening
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_shows_abort_policy_and_anchor() {
        let table = StrategyTable::builtin();
        let row = row(table.get("2-1").unwrap());
        assert!(row.starts_with("2-1"));
        assert!(row.contains("Abort"));
        assert!(row.contains("yes"));
    }

    #[test]
    fn test_row_lists_opening_steps() {
        let table = StrategyTable::builtin();
        let row = row(table.get("5-1").unwrap());
        assert!(row.contains("CollectMysteryNode, SwitchFleet"));
    }
}
