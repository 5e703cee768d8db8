use crate::paths::{ENV_CYCLE_POINT, ENV_SUITE_DIR, ENV_SUITE_NAME};
use archkit::ChecksumMethod;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arkive")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Incremental archiving of suite outputs", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Archive every changed target
    Run(RunArgs),

    /// List targets recorded in the store
    Status(StatusArgs),

    /// Print the fingerprints of a file or directory
    Checksum(ChecksumArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Configuration file [default: <suite dir>/arch.toml]
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Suite name; nothing is archived without one
    #[arg(long, env = ENV_SUITE_NAME)]
    pub suite: Option<String>,

    /// Suite working directory [default: <run dir>/<suite>]
    #[arg(long, env = ENV_SUITE_DIR)]
    pub suite_dir: Option<PathBuf>,

    /// Cycle point for rename templates
    #[arg(long, env = ENV_CYCLE_POINT)]
    pub cycle: Option<String>,

    /// Store file [default: <suite dir>/.arkive-arch.db]
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Targets to process in parallel (overrides the config)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Per-command timeout in seconds (overrides the config)
    #[arg(long)]
    pub timeout: Option<f64>,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Store file [default: ./.arkive-arch.db]
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ChecksumArgs {
    /// File or directory to fingerprint
    pub path: PathBuf,

    /// Fingerprint method
    #[arg(short, long, default_value_t = ChecksumMethod::Blake3)]
    pub method: ChecksumMethod,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "arkive", "-v", "run", "--suite", "s", "--cycle", "2024", "-j", "4", "--timeout", "1.5",
        ]);
        assert_eq!(cli.verbose, 1);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.suite.as_deref(), Some("s"));
        assert_eq!(args.cycle.as_deref(), Some("2024"));
        assert_eq!(args.jobs, Some(4));
        assert_eq!(args.timeout, Some(1.5));
    }

    #[test]
    fn test_parse_checksum_method() {
        let cli = Cli::parse_from(["arkive", "checksum", "some/path", "--method", "mtime+size"]);
        let Command::Checksum(args) = cli.command else {
            panic!("expected checksum");
        };
        assert_eq!(args.method, ChecksumMethod::MtimeSize);
    }
}
