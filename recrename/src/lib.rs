//! Identify, verify and rename recorded ISDB transport stream files.
//!
//! A recording is scanned for its service and present event, matched
//! against a program guide, optionally checked for timing and packet
//! drops, and moved to a path built from a macro template such as
//! `${title}([ 第${count2}話])`.
//!
//! # Pipeline
//! - [`correlator`]: service and event identification from PAT/SDT/EIT or SIT
//! - [`matcher`]: guide lookup and candidate selection
//! - [`clock`]: start time and duration measurement from TDT/TOT and PCR
//! - [`continuity`]: continuity counter drop detection
//! - [`macros`]: template expansion
//! - [`orchestrator`]: the per-file state machine tying them together

pub mod clock;
pub mod config;
pub mod continuity;
pub mod correlator;
pub mod error;
pub mod fs_ops;
pub mod macros;
pub mod matcher;
pub mod normalize;
pub mod orchestrator;
pub mod sanitize;
pub mod scan;

pub use config::{load_config, ConfigError, ConfigFile, DuplicatePolicy, Options, RunOptions};
pub use error::{FailureCategory, RenameError, Result};
pub use macros::MacroSet;
pub use orchestrator::{RenameOutcome, Renamer};
