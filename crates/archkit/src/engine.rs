//! Run orchestration - classify, prune, stage, run and record

use crate::compress::SchemeRegistry;
use crate::config::{ArchConfig, RunSettings};
use crate::error::{Error, Result};
use crate::events::{EventSink, Severity, Stream};
use crate::model::{Target, TargetStatus};
use crate::resolve::Resolver;
use crate::runner::{CancelToken, CommandOutput, CommandRunner, Termination};
use crate::stage::Stage;
use crate::template;
use ledger::Ledger;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Environment a run executes in
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Suite identifier; without one the run does nothing
    pub suite_name: Option<String>,
    /// Directory sources are resolved against and commands run in
    pub work_dir: PathBuf,
    /// Cycle point for rename templates
    pub cycle: Option<String>,
}

/// Knobs for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub jobs: usize,
    pub command_timeout: Option<Duration>,
    /// Store location; defaults to [`ledger::FILE_NAME`] in the work dir
    pub db_path: Option<PathBuf>,
    /// Parent of the staging workspaces; defaults to the system temp dir
    pub stage_root: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_settings(&RunSettings::default())
    }
}

impl RunOptions {
    pub fn from_settings(settings: &RunSettings) -> Self {
        Self {
            jobs: settings.jobs,
            command_timeout: settings.command_timeout,
            db_path: None,
            stage_root: None,
        }
    }
}

/// Aggregate outcome of a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub unchanged: usize,
    pub fresh: usize,
    pub failed: usize,
    /// Changed targets never started because the run was cancelled
    pub cancelled: usize,
    /// Stale targets removed from the store
    pub pruned: usize,
    /// Every resolved target with its final status
    pub targets: Vec<Target>,
}

impl RunSummary {
    /// Number of targets whose archive command ended non-zero
    pub fn failures(&self) -> usize {
        self.targets.iter().filter(|t| t.exit_code != 0).count()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0 && self.cancelled == 0
    }
}

/// Archive engine
pub struct Engine<'a> {
    registry: SchemeRegistry,
    sink: &'a dyn EventSink,
    cancel: CancelToken,
}

impl<'a> Engine<'a> {
    pub fn new(registry: SchemeRegistry, sink: &'a dyn EventSink) -> Self {
        Self {
            registry,
            sink,
            cancel: CancelToken::new(),
        }
    }

    /// Share a cancellation token with the caller
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Execute one archiving run
    ///
    /// Returns an error only for fatal conditions: configuration mistakes
    /// (raised before the store is touched) and store failures. Failed
    /// archive commands are reported in the summary.
    pub fn run(&self, config: &ArchConfig, ctx: &RunContext, options: &RunOptions) -> Result<RunSummary> {
        let Some(suite) = ctx.suite_name.as_deref() else {
            log::info!("No suite name set, nothing to archive");
            return Ok(RunSummary::default());
        };

        let base = std::path::absolute(&ctx.work_dir).map_err(|e| Error::io(&ctx.work_dir, e))?;
        let method = config.settings.checksum_method;
        let resolver = Resolver {
            base_dir: &base,
            cycle: ctx.cycle.as_deref(),
            checksum: &method,
            registry: &self.registry,
        };
        let mut targets = resolver.resolve_all(&config.targets)?;
        log::info!("Archiving {} target(s) for suite {}", targets.len(), suite);

        let db_path = options
            .db_path
            .clone()
            .unwrap_or_else(|| base.join(ledger::FILE_NAME));
        let mut ledger = Ledger::open(&db_path)?;
        ledger.bind_checksum_method(method.as_str())?;

        let mut summary = RunSummary::default();
        for target in &mut targets {
            let unchanged = ledger
                .lookup(&target.name)?
                .is_some_and(|record| target.matches(&record));
            if unchanged {
                target.status = TargetStatus::Unchanged;
                self.sink.on_target(target);
            }
        }

        summary.pruned = ledger.delete_all_except(targets.iter().map(|t| t.name.as_str()))?;
        if summary.pruned > 0 {
            self.sink.on_pruned(summary.pruned);
        }

        let worker = Worker {
            engine: self,
            ledger: Mutex::new(ledger),
            runner: CommandRunner::new(options.command_timeout),
            base: &base,
            stage_root: options.stage_root.as_deref(),
        };
        let pending = targets.iter().filter(|t| t.status == TargetStatus::Pending).count();
        if options.jobs > 1 && pending > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.jobs)
                .build()
                .map_err(|e| Error::ThreadPool(e.to_string()))?;
            pool.install(|| {
                targets
                    .par_iter_mut()
                    .filter(|t| t.status == TargetStatus::Pending)
                    .try_for_each(|t| worker.process(t))
            })?;
        } else {
            for target in targets.iter_mut().filter(|t| t.status == TargetStatus::Pending) {
                worker.process(target)?;
            }
        }

        for target in &targets {
            match target.status {
                TargetStatus::Unchanged => summary.unchanged += 1,
                TargetStatus::Fresh => summary.fresh += 1,
                TargetStatus::Failed => summary.failed += 1,
                TargetStatus::Pending => summary.cancelled += 1,
            }
        }
        summary.targets = targets;

        log::info!(
            "Run complete: {} unchanged, {} fresh, {} failed, {} cancelled, {} pruned",
            summary.unchanged,
            summary.fresh,
            summary.failed,
            summary.cancelled,
            summary.pruned
        );
        Ok(summary)
    }
}

/// Per-run state shared by the workers
struct Worker<'e, 'a> {
    engine: &'e Engine<'a>,
    ledger: Mutex<Ledger>,
    runner: CommandRunner,
    base: &'e Path,
    stage_root: Option<&'e Path>,
}

impl Worker<'_, '_> {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Regenerate one changed target
    ///
    /// Only store errors escape; everything else marks the target failed.
    fn process(&self, target: &mut Target) -> Result<()> {
        let sink = self.engine.sink;
        if self.engine.cancel.is_cancelled() {
            log::warn!("Cancelled before start: {}", target.name);
            sink.on_target(target);
            return Ok(());
        }

        // Recorded as failed until the command says otherwise
        let mut record = target.to_record();
        record.exit_code = 1;
        self.ledger().replace(&record)?;

        let exit_code = match self.execute(target) {
            Ok(output) => {
                self.report(target, &output);
                output.exit_code
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                sink.on_error(&target.name, &e.to_string());
                1
            }
        };

        target.exit_code = exit_code;
        target.status = if exit_code == 0 {
            TargetStatus::Fresh
        } else {
            TargetStatus::Failed
        };
        self.ledger().update_exit_code(&target.name, exit_code)?;
        sink.on_target(target);
        Ok(())
    }

    fn execute(&self, target: &mut Target) -> Result<CommandOutput> {
        let stage = Stage::new(self.stage_root)?;
        let sources = stage.prepare(target, &self.engine.registry)?;
        let command = template::render_command(&target.command_format, &sources, &target.name)
            .map_err(|e| Error::config(&target.name, "command-format", e))?;
        log::info!("{}: {}", target.name, command);
        self.runner
            .run(&command, self.base, &self.engine.cancel)
            .map_err(|e| Error::io(self.base, e))
    }

    fn report(&self, target: &Target, output: &CommandOutput) {
        let sink = self.engine.sink;
        let stderr_severity = if output.success() {
            Severity::Warn
        } else {
            Severity::Error
        };
        if !output.stdout.is_empty() {
            sink.on_output(&target.name, Stream::Stdout, Severity::Info, &output.stdout);
        }
        if !output.stderr.is_empty() {
            sink.on_output(&target.name, Stream::Stderr, stderr_severity, &output.stderr);
        }

        match output.termination {
            Termination::Exited => {}
            Termination::TimedOut => {
                let secs = self.runner.timeout().unwrap_or_default().as_secs_f64();
                sink.on_error(&target.name, &format!("command timed out after {secs}s"));
            }
            Termination::Cancelled => sink.on_error(&target.name, "command killed by cancellation"),
        }
    }
}
