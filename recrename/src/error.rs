//! Error types for the rename pipeline.

use std::fmt;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use recrename_guide::GuideError;
use thiserror::Error;

/// Closed set of failure categories. The string form is what the `${error}`
/// macro expands to on the error path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    InvalidInput,
    InformationNotFound,
    ServiceNotRecognized,
    ProgramNotFound,
    NoClockReference,
    StartTimeMismatch,
    DurationTooShort,
    TargetExists,
    PacketDropDetected,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::InvalidInput => "invalid_input",
            FailureCategory::InformationNotFound => "information_not_found",
            FailureCategory::ServiceNotRecognized => "service_not_recognized",
            FailureCategory::ProgramNotFound => "program_not_found",
            FailureCategory::NoClockReference => "no_clock_reference",
            FailureCategory::StartTimeMismatch => "start_time_mismatch",
            FailureCategory::DurationTooShort => "duration_too_short",
            FailureCategory::TargetExists => "target_exists",
            FailureCategory::PacketDropDetected => "packet_drop_detected",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can end the processing of one recording.
#[derive(Error, Debug)]
pub enum RenameError {
    /// The input path does not exist.
    #[error("Can't find input: {0}")]
    InputMissing(PathBuf),

    /// The input exists but is not a regular file.
    #[error("Input is not a regular file: {0}")]
    InputNotFile(PathBuf),

    /// The input is an empty file.
    #[error("Input is empty: {0}")]
    InputEmpty(PathBuf),

    /// The input extension is not in the accepted list.
    #[error("Extension not accepted: {0:?}")]
    ExtensionNotAllowed(String),

    /// Reading the input failed part way.
    #[error("Failed to read {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The stream ended before the program could be identified.
    #[error("Can't find information")]
    InformationNotFound,

    /// The identification window or packet budget ran out.
    #[error("Can't find information within {packets} packets")]
    InformationWindowExceeded { packets: u64 },

    /// The service is not in the channel table and service checking is on.
    #[error("Can't find service: {0}")]
    ServiceNotRecognized(String),

    /// No guide entry matched the recording.
    #[error("Can't find program: {0}")]
    ProgramNotFound(String),

    /// The guide could not be reached after retrying.
    #[error("Guide unavailable: {0}")]
    GuideUnavailable(#[source] GuideError),

    /// No PCR or wall-clock anchor where one was needed.
    #[error("Can't find clock reference at {0}")]
    NoClockReference(&'static str),

    /// The recording started after the program did.
    #[error("Invalid start time (actual: {actual}, program: {program}, offset: {offset_secs} sec)")]
    StartTimeMismatch {
        actual: DateTime<FixedOffset>,
        program: DateTime<FixedOffset>,
        offset_secs: i64,
    },

    /// The recording is shorter than the program.
    #[error("Invalid duration (actual: {actual_secs} sec, program: {program_secs} sec, offset: {offset_secs} sec)")]
    DurationTooShort {
        actual_secs: i64,
        program_secs: i64,
        offset_secs: i64,
    },

    /// The target exists and duplicates are not allowed.
    #[error("File already exists: {0}")]
    TargetExists(PathBuf),

    /// A continuity counter error was found.
    #[error("Find drop at PID 0x{0:04X}")]
    PacketDropDetected(u16),

    /// Creating the output directories failed.
    #[error("Can't make output folder {path}: {source}")]
    MakeDirectories {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Moving the input to its target failed.
    #[error("Can't rename {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RenameError {
    /// Category of the failure, `None` when the error path can't recover it.
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            RenameError::InputMissing(_)
            | RenameError::InputNotFile(_)
            | RenameError::MakeDirectories { .. }
            | RenameError::Move { .. } => None,
            RenameError::InputEmpty(_)
            | RenameError::ExtensionNotAllowed(_)
            | RenameError::ReadInput { .. } => Some(FailureCategory::InvalidInput),
            RenameError::InformationNotFound | RenameError::InformationWindowExceeded { .. } => {
                Some(FailureCategory::InformationNotFound)
            }
            RenameError::ServiceNotRecognized(_) => Some(FailureCategory::ServiceNotRecognized),
            RenameError::ProgramNotFound(_) | RenameError::GuideUnavailable(_) => {
                Some(FailureCategory::ProgramNotFound)
            }
            RenameError::NoClockReference(_) => Some(FailureCategory::NoClockReference),
            RenameError::StartTimeMismatch { .. } => Some(FailureCategory::StartTimeMismatch),
            RenameError::DurationTooShort { .. } => Some(FailureCategory::DurationTooShort),
            RenameError::TargetExists(_) => Some(FailureCategory::TargetExists),
            RenameError::PacketDropDetected(_) => Some(FailureCategory::PacketDropDetected),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RenameError>;
