use anyhow::{Context as _, Result};
use colored::Colorize;
use ledger::{Ledger, TargetRecord};
use std::path::{Path, PathBuf};

use crate::Context;
use crate::cli::StatusArgs;
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context, args: StatusArgs) -> Result<()> {
    let db_path = match args.db {
        Some(path) => paths::expand(&path.to_string_lossy()),
        None => PathBuf::from(ledger::FILE_NAME),
    };
    let records = load(&db_path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        ui::warn(&format!("No archived targets in {}", db_path.display()));
        return Ok(());
    }

    ui::header("Archive Status");
    ui::kv("Store", &db_path.display().to_string());
    println!();
    for record in &records {
        let symbol = if record.is_success() {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "{} {} (compress={}, rc={})",
            symbol,
            record.name.bold(),
            record.compress_scheme.as_deref().unwrap_or("none"),
            record.exit_code
        );
        if ctx.verbose > 0 {
            let mut names: Vec<&String> = record.sources.values().collect();
            names.sort();
            for name in names {
                ui::dim(&format!("    {name}"));
            }
        }
    }
    Ok(())
}

/// Read every record; a missing store reads as empty
fn load(db_path: &Path) -> Result<Vec<TargetRecord>> {
    if !db_path.exists() {
        log::debug!("No store at {}", db_path.display());
        return Ok(Vec::new());
    }
    let ledger = Ledger::open(db_path)
        .with_context(|| format!("Failed to open store {}", db_path.display()))?;
    Ok(ledger.list()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_missing_store_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("absent.db");
        assert!(load(&path).unwrap().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_lists_records() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(ledger::FILE_NAME);
        let mut ledger = Ledger::open(&path).unwrap();
        ledger
            .insert(&TargetRecord {
                name: "out.tar".into(),
                compress_scheme: Some("tar".into()),
                command_format: "true".into(),
                exit_code: 0,
                sources: BTreeMap::from([("abc".to_string(), "a.txt".to_string())]),
            })
            .unwrap();
        drop(ledger);

        let records = load(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "out.tar");
    }
}
