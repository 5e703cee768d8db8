//! Incremental archiving engine
//!
//! Given a set of named archive targets, each built from globbed source
//! files, `archkit` works out which targets changed since the previous
//! run, regenerates only those, and records the outcome so the next run
//! can skip them again.
//!
//! # Pipeline
//!
//! 1. [`config`] reads `arch:*` sections into [`config::TargetSpec`]s
//! 2. [`resolve`] expands globs and fingerprints every source
//! 3. [`engine`] compares each target with the [`ledger`] snapshot and
//!    prunes targets that are no longer declared
//! 4. [`stage`] renames and compresses changed targets in a temporary
//!    workspace
//! 5. [`runner`] executes the archive command and the result is recorded
//!
//! # Example
//!
//! ```no_run
//! use archkit::{ArchConfig, Engine, LogSink, RunContext, RunOptions, SchemeRegistry};
//! use std::path::Path;
//!
//! let config = ArchConfig::load(Path::new("arch.toml"))?;
//! let ctx = RunContext {
//!     suite_name: Some("my-suite".into()),
//!     work_dir: "/srv/suites/my-suite".into(),
//!     cycle: Some("20240101T0000Z".into()),
//! };
//! let options = RunOptions::from_settings(&config.settings);
//! let summary = Engine::new(SchemeRegistry::builtin(), &LogSink).run(&config, &ctx, &options)?;
//! std::process::exit(summary.failures().min(255) as i32);
//! # Ok::<(), archkit::Error>(())
//! ```

pub mod compress;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod resolve;
pub mod runner;
pub mod stage;
pub mod template;

pub use compress::{CompressionScheme, SchemeRegistry};
pub use config::{ArchConfig, RunSettings, TargetSpec};
pub use engine::{Engine, RunContext, RunOptions, RunSummary};
pub use error::{Error, Result};
pub use events::{EventSink, LogSink, NoEvents, Severity, Stream};
pub use model::{Source, Target, TargetStatus};
pub use runner::{CancelMode, CancelToken};

pub use checksum::ChecksumMethod;
