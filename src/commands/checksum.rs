use anyhow::{Context as _, Result};
use colored::Colorize;

use crate::cli::ChecksumArgs;

pub fn run(args: &ChecksumArgs) -> Result<()> {
    let entries = ::checksum::scan(&args.path, &args.method)
        .with_context(|| format!("Failed to fingerprint {}", args.path.display()))?;

    for entry in &entries {
        let path = if entry.path.as_os_str().is_empty() {
            args.path.display().to_string()
        } else {
            entry.path.display().to_string()
        };
        match &entry.checksum {
            Some(sum) => println!("{}  {}  {}", sum, mode(entry.mode).dimmed(), path),
            None => println!("{}  {}/", "-".dimmed(), path.bold()),
        }
    }
    Ok(())
}

fn mode(mode: Option<u32>) -> String {
    mode.map_or_else(|| "-".to_string(), |m| format!("{:04o}", m & 0o7777))
}
