//! Run events
//!
//! The engine reports every target outcome and all captured command
//! output through an [`EventSink`], so callers decide how to present
//! them (console, log, or tests).

use crate::model::Target;

/// Which stream a piece of command output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// How prominently an event should be surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Receiver for run events
///
/// Sinks are shared between worker threads in parallel runs.
pub trait EventSink: Send + Sync {
    /// A target reached its final status for this run
    fn on_target(&self, target: &Target);

    /// Output captured from a target's archive command
    fn on_output(&self, target: &str, stream: Stream, severity: Severity, text: &str);

    /// A target failed for a reason other than its command's exit code
    fn on_error(&self, target: &str, message: &str);

    /// Stale targets were removed from the store
    fn on_pruned(&self, _count: usize) {}
}

/// Sink that discards everything
pub struct NoEvents;

impl EventSink for NoEvents {
    fn on_target(&self, _target: &Target) {}
    fn on_output(&self, _target: &str, _stream: Stream, _severity: Severity, _text: &str) {}
    fn on_error(&self, _target: &str, _message: &str) {}
}

/// Sink that forwards events to the `log` facade
pub struct LogSink;

impl EventSink for LogSink {
    fn on_target(&self, target: &Target) {
        log::info!("{}", target);
    }

    fn on_output(&self, target: &str, stream: Stream, severity: Severity, text: &str) {
        let level = match severity {
            Severity::Info => log::Level::Info,
            Severity::Warn => log::Level::Warn,
            Severity::Error => log::Level::Error,
        };
        log::log!(level, "{} [{:?}] {}", target, stream, text.trim_end());
    }

    fn on_error(&self, target: &str, message: &str) {
        log::error!("{}: {}", target, message);
    }

    fn on_pruned(&self, count: usize) {
        log::info!("Pruned {} stale target(s)", count);
    }
}
