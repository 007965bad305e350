//! Configuration file and per-run options.
//!
//! The TOML file provides the base [`Options`]. For every recording the
//! matched channel table entry and keywords fold their overrides into an
//! immutable [`RunOptions`].

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use recrename_ts::PacketFormat;
use serde::Deserialize;
use thiserror::Error;

use crate::matcher::RetryPolicy;
use crate::normalize::{to_half, Replacement};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "recrename.toml";
/// Default file name template.
pub const DEFAULT_FILE_TEMPLATE: &str =
    "${title}([ 第${count2}話])([ 「${subTitle}」])([ (${userChannelName})])";
/// Default dir template.
pub const DEFAULT_DIR_TEMPLATE: &str = "${title}";
/// Extensions accepted by default.
pub const DEFAULT_EXTENSIONS: [&str; 4] = ["ts", "m2ts", "mts", "m2t"];
/// Default `usr` sent to the guide.
pub const DEFAULT_GUIDE_USER: &str = "recrename";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unsupported packet size: {0} (expected 188, 192 or 204)")]
    PacketSize(usize),
}

/// What to do when the target already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail with `target_exists`.
    Strict,
    /// Append a random suffix to the file name.
    #[default]
    Disambiguate,
}

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub check: CheckSection,
    #[serde(default)]
    pub time: TimeSection,
    #[serde(default)]
    pub input: InputSection,
    #[serde(default)]
    pub guide: GuideSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub replace: Vec<Replacement>,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub keywords: Vec<KeywordEntry>,
}

#[derive(Debug, Deserialize, Default)]
pub struct OutputSection {
    pub parent: Option<PathBuf>,
    pub dir: Option<String>,
    pub file: Option<String>,
    pub error_dir: Option<String>,
    pub error_file: Option<String>,
    pub duplicate: Option<DuplicatePolicy>,
    pub dry_run: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CheckSection {
    pub service: Option<bool>,
    pub time: Option<bool>,
    pub drop: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TimeSection {
    pub start_offset: Option<i64>,
    pub duration_offset: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct InputSection {
    pub packet_size: Option<usize>,
    pub extensions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GuideSection {
    pub user: Option<String>,
    pub base_url: Option<String>,
    pub retry_delay_secs: Option<u64>,
    pub retry_attempts: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingSection {
    pub log_dir: Option<PathBuf>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

/// Option overrides carried by channel table entries and keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Overrides {
    pub check_time: Option<bool>,
    pub strict_duplicate: Option<bool>,
    pub check_drop: Option<bool>,
    pub start_offset: Option<i64>,
    pub duration_offset: Option<i64>,
}

/// Channel table entry, matched against the broadcast service name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceEntry {
    /// Substring of the service name, compared half-width.
    pub name: String,
    /// Guide channel id.
    pub channel_id: Option<u32>,
    /// Name exposed as `${userChannelName}`.
    pub channel_name: Option<String>,
    #[serde(flatten)]
    pub overrides: Overrides,
}

impl ServiceEntry {
    pub fn matches(&self, service_name: &str) -> bool {
        to_half(service_name).contains(&to_half(&self.name))
    }
}

/// Keyword entry, matched against the event name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeywordEntry {
    pub name: String,
    /// Replacement for the keyword in the event name.
    pub replace: Option<String>,
    #[serde(flatten)]
    pub overrides: Overrides,
}

impl KeywordEntry {
    pub fn matches(&self, event_name: &str) -> bool {
        !self.name.is_empty() && event_name.contains(&self.name)
    }
}

/// Base options shared by every input.
#[derive(Debug, Clone)]
pub struct Options {
    pub parent: Option<PathBuf>,
    pub dir: String,
    pub file: String,
    pub error_dir: Option<String>,
    pub error_file: Option<String>,
    pub duplicate: DuplicatePolicy,
    pub dry_run: bool,
    pub check_service: bool,
    pub check_time: bool,
    pub check_drop: bool,
    pub start_offset: i64,
    pub duration_offset: i64,
    pub format: PacketFormat,
    pub extensions: Vec<String>,
    pub replacements: Vec<Replacement>,
    pub services: Vec<ServiceEntry>,
    pub keywords: Vec<KeywordEntry>,
    pub guide_user: String,
    pub guide_base_url: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            parent: None,
            dir: DEFAULT_DIR_TEMPLATE.to_string(),
            file: DEFAULT_FILE_TEMPLATE.to_string(),
            error_dir: None,
            error_file: None,
            duplicate: DuplicatePolicy::default(),
            dry_run: false,
            check_service: false,
            check_time: false,
            check_drop: false,
            start_offset: 0,
            duration_offset: 0,
            format: PacketFormat::TS,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            replacements: Vec::new(),
            services: Vec::new(),
            keywords: Vec::new(),
            guide_user: DEFAULT_GUIDE_USER.to_string(),
            guide_base_url: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Map a packet size to its format.
pub fn packet_format(size: usize) -> Result<PacketFormat, ConfigError> {
    PacketFormat::from_unit_size(size).ok_or(ConfigError::PacketSize(size))
}

impl Options {
    /// Base options from a parsed configuration file.
    pub fn from_config(config: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let output = &config.output;
        let check = &config.check;

        let format = match config.input.packet_size {
            Some(size) => packet_format(size)?,
            None => defaults.format,
        };

        let retry = RetryPolicy {
            attempts: config.guide.retry_attempts.unwrap_or(defaults.retry.attempts).max(1),
            delay: config
                .guide
                .retry_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry.delay),
        };

        Ok(Self {
            parent: output.parent.clone(),
            dir: output.dir.clone().unwrap_or(defaults.dir),
            file: output.file.clone().unwrap_or(defaults.file),
            error_dir: output.error_dir.clone(),
            error_file: output.error_file.clone(),
            duplicate: output.duplicate.unwrap_or(defaults.duplicate),
            dry_run: output.dry_run.unwrap_or(defaults.dry_run),
            check_service: check.service.unwrap_or(defaults.check_service),
            check_time: check.time.unwrap_or(defaults.check_time),
            check_drop: check.drop.unwrap_or(defaults.check_drop),
            start_offset: config.time.start_offset.unwrap_or(defaults.start_offset),
            duration_offset: config.time.duration_offset.unwrap_or(defaults.duration_offset),
            format,
            extensions: config
                .input
                .extensions
                .clone()
                .unwrap_or(defaults.extensions),
            replacements: config.replace.clone(),
            services: config.services.clone(),
            keywords: config.keywords.clone(),
            guide_user: config.guide.user.clone().unwrap_or(defaults.guide_user),
            guide_base_url: config.guide.base_url.clone(),
            retry,
        })
    }

    /// Whether failures are routed to the error templates.
    pub fn has_error_output(&self) -> bool {
        self.error_dir.is_some() || self.error_file.is_some()
    }

    /// Whether `extension` (without the dot) is accepted.
    pub fn accepts_extension(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }

    /// First channel table entry matching `service_name`.
    pub fn find_service(&self, service_name: &str) -> Option<&ServiceEntry> {
        self.services.iter().find(|s| s.matches(service_name))
    }

    /// Keywords contained in `event_name`, in configuration order.
    pub fn matching_keywords(&self, event_name: &str) -> Vec<&KeywordEntry> {
        self.keywords.iter().filter(|k| k.matches(event_name)).collect()
    }

    /// Global replacements followed by the replacements of `keywords`.
    pub fn replacements_with(&self, keywords: &[&KeywordEntry]) -> Vec<Replacement> {
        let mut replacements = self.replacements.clone();
        replacements.extend(
            keywords
                .iter()
                .filter_map(|k| k.replace.as_ref().map(|r| Replacement::new(&k.name, r))),
        );
        replacements
    }
}

/// Checks and offsets in effect for one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub check_time: bool,
    pub check_drop: bool,
    pub duplicate: DuplicatePolicy,
    pub start_offset: i64,
    pub duration_offset: i64,
}

impl RunOptions {
    /// Base values with `overrides` applied in order; later ones win.
    pub fn fold<'a>(base: &Options, overrides: impl IntoIterator<Item = &'a Overrides>) -> Self {
        let initial = Self {
            check_time: base.check_time,
            check_drop: base.check_drop,
            duplicate: base.duplicate,
            start_offset: base.start_offset,
            duration_offset: base.duration_offset,
        };

        overrides.into_iter().fold(initial, |run, o| Self {
            check_time: o.check_time.unwrap_or(run.check_time),
            check_drop: o.check_drop.unwrap_or(run.check_drop),
            duplicate: match o.strict_duplicate {
                Some(true) => DuplicatePolicy::Strict,
                Some(false) => DuplicatePolicy::Disambiguate,
                None => run.duplicate,
            },
            start_offset: o.start_offset.unwrap_or(run.start_offset),
            duration_offset: o.duration_offset.unwrap_or(run.duration_offset),
        })
    }
}

/// Read and parse a configuration file.
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}
