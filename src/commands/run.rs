use anyhow::{Context as _, Result, bail};
use archkit::{
    ArchConfig, Engine, EventSink, RunContext, RunOptions, RunSummary, SchemeRegistry, Severity,
    Stream, Target, TargetStatus,
};
use colored::Colorize;
use std::process::ExitCode;
use std::time::Duration;

use crate::Context;
use crate::cli::RunArgs;
use crate::paths;
use crate::ui;

/// Renders run events on the terminal
pub struct ConsoleSink {
    quiet: bool,
}

impl ConsoleSink {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl EventSink for ConsoleSink {
    fn on_target(&self, target: &Target) {
        if self.quiet && target.status == TargetStatus::Unchanged {
            return;
        }
        let line = target.to_string();
        let mut lines = line.lines();
        if let Some(first) = lines.next() {
            // First line starts with the plain status symbol
            let rest = first.get(target.status.symbol().len()..).unwrap_or_default();
            println!("{}{}", ui::status_symbol(target.status), rest);
        }
        for source in lines {
            println!("{}", source.dimmed());
        }
    }

    fn on_output(&self, target: &str, stream: Stream, severity: Severity, text: &str) {
        let label = format!("[{target}] {}", match stream {
            Stream::Stdout => "out",
            Stream::Stderr => "err",
        });
        let body = ui::indent(text, "    ");
        match severity {
            Severity::Error => eprintln!("{}\n{}", label.red(), body.red()),
            Severity::Warn => eprintln!("{}\n{}", label.yellow(), body.yellow()),
            Severity::Info if !self.quiet => println!("{}\n{}", label.dimmed(), body.dimmed()),
            Severity::Info => {}
        }
    }

    fn on_error(&self, target: &str, message: &str) {
        ui::error(&format!("{target}: {message}"));
    }

    fn on_pruned(&self, count: usize) {
        if !self.quiet {
            ui::dim(&format!("Removed {count} stale target(s) from the store"));
        }
    }
}

pub fn run(ctx: &Context, args: RunArgs) -> Result<ExitCode> {
    let Some(suite) = args.suite.as_deref() else {
        log::info!("{} is not set, nothing to archive", paths::ENV_SUITE_NAME);
        return Ok(ExitCode::SUCCESS);
    };

    let work_dir = paths::suite_dir(suite, args.suite_dir.as_deref())?;
    let config_path = paths::config_file(args.config.as_deref(), &work_dir);
    let config = ArchConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let mut options = RunOptions::from_settings(&config.settings);
    options.db_path = args.db.as_deref().map(|p| paths::expand(&p.to_string_lossy()));
    if let Some(jobs) = args.jobs {
        if jobs == 0 {
            bail!("--jobs must be at least 1");
        }
        options.jobs = jobs;
    }
    if let Some(secs) = args.timeout {
        if !secs.is_finite() || secs <= 0.0 {
            bail!("--timeout must be a positive number of seconds");
        }
        options.command_timeout = Some(Duration::from_secs_f64(secs));
    }

    let run_ctx = RunContext {
        suite_name: Some(suite.to_string()),
        work_dir,
        cycle: args.cycle,
    };

    let sink = ConsoleSink::new(ctx.quiet);
    let summary = Engine::new(SchemeRegistry::builtin(), &sink)
        .run(&config, &run_ctx, &options)
        .with_context(|| format!("Archiving suite {suite} failed"))?;

    report(ctx, &summary);
    Ok(exit_code(&summary))
}

fn report(ctx: &Context, summary: &RunSummary) {
    if ctx.quiet && summary.is_success() {
        return;
    }
    let text = format!(
        "{} unchanged, {} fresh, {} failed",
        summary.unchanged, summary.fresh, summary.failed
    );
    if summary.cancelled > 0 {
        ui::warn(&format!("{text}, {} cancelled", summary.cancelled));
    } else if summary.failures() > 0 {
        ui::error(&text);
    } else {
        ui::success(&text);
    }
}

/// Failed plus cancelled targets, clamped to a valid process exit code
fn exit_code(summary: &RunSummary) -> ExitCode {
    let count = (summary.failures() + summary.cancelled).min(usize::from(u8::MAX));
    ExitCode::from(u8::try_from(count).unwrap_or(u8::MAX))
}
