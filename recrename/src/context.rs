use std::path::PathBuf;

use clap::Parser;
use recrename::config::{packet_format, ConfigError, DuplicatePolicy, Options};

/// recrename - rename recorded TS files from broadcast and guide metadata
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Args {
    /// Recordings to process, in order
    #[arg(required = true, value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Configuration file path.{n}
    /// Defaults to `recrename.toml` in the working directory if present.
    #[arg(short = 'f', long)]
    pub config: Option<PathBuf>,

    /// Output parent directory (default: the input's directory)
    #[arg(short, long)]
    pub parent: Option<PathBuf>,

    /// Directory template, relative to the parent
    #[arg(long)]
    pub dir: Option<String>,

    /// File name template, without extension
    #[arg(long)]
    pub file: Option<String>,

    /// Directory template used when processing fails
    #[arg(long)]
    pub error_dir: Option<String>,

    /// File name template used when processing fails
    #[arg(long)]
    pub error_file: Option<String>,

    /// Packet unit size: 188, 192 or 204
    #[arg(long, value_name = "BYTES")]
    pub packet_size: Option<usize>,

    /// Fail instead of renaming when the target exists
    #[arg(long)]
    pub strict: bool,

    /// Fail when the service is not in the channel table
    #[arg(long)]
    pub check_service: bool,

    /// Verify the recording covers the whole program
    #[arg(long)]
    pub check_time: bool,

    /// Fail on packet drops
    #[arg(long)]
    pub check_drop: bool,

    /// Log the target without moving anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory where log files are stored
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl Args {
    /// Apply command line overrides on top of the configuration file.
    pub fn apply_to(&self, options: &mut Options) -> Result<(), ConfigError> {
        if let Some(parent) = &self.parent {
            options.parent = Some(parent.clone());
        }
        if let Some(dir) = &self.dir {
            options.dir = dir.clone();
        }
        if let Some(file) = &self.file {
            options.file = file.clone();
        }
        if let Some(error_dir) = &self.error_dir {
            options.error_dir = Some(error_dir.clone());
        }
        if let Some(error_file) = &self.error_file {
            options.error_file = Some(error_file.clone());
        }
        if let Some(size) = self.packet_size {
            options.format = packet_format(size)?;
        }
        if self.strict {
            options.duplicate = DuplicatePolicy::Strict;
        }
        options.check_service |= self.check_service;
        options.check_time |= self.check_time;
        options.check_drop |= self.check_drop;
        options.dry_run |= self.dry_run;
        Ok(())
    }
}
