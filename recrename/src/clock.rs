//! PCR based start time and duration measurement.
//!
//! The PCR base is a 33-bit 90 kHz counter that wraps around roughly every
//! 26.5 hours. The recording start is derived from the first wall-clock
//! anchor (TDT/TOT) minus the PCR time elapsed before it. The duration is the
//! distance between the first PCR of the file and the last PCR found in its
//! trailing window.

use std::ops::ControlFlow;
use std::path::Path;

use chrono::{DateTime, Duration, FixedOffset};
use log::{debug, info};
use recrename_guide::CandidateProgram;
use recrename_ts::{DecodedPacket, DecodedSection, PacketFormat, TsSink};

use crate::error::{RenameError, Result};
use crate::scan::{align_to_packet, scan_file};

/// Modulus of the PCR base.
pub const PCR_WRAP: u64 = 1 << 33;
/// PCR base ticks per millisecond.
pub const PCR_TICKS_PER_MS: u64 = 90;
/// Packets covered by the head and tail windows of the duration scan.
pub const WINDOW_PACKETS: u64 = 65535;

/// Ticks from `earlier` to `later`, across at most one wraparound.
pub fn elapsed_ticks(later: u64, earlier: u64) -> u64 {
    ((later % PCR_WRAP) + PCR_WRAP - (earlier % PCR_WRAP)) % PCR_WRAP
}

/// Elapsed time between two PCR samples.
pub fn elapsed(later: u64, earlier: u64) -> Duration {
    Duration::milliseconds((elapsed_ticks(later, earlier) / PCR_TICKS_PER_MS) as i64)
}

/// Records PCRs until the first TDT or TOT.
#[derive(Debug, Default)]
pub struct StartClock {
    first_pcr: Option<u64>,
    latest_pcr: Option<u64>,
    anchor: Option<DateTime<FixedOffset>>,
}

impl StartClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anchor(&self) -> Option<DateTime<FixedOffset>> {
        self.anchor
    }

    /// Wall-clock time of the first PCR, or the anchor itself when no PCR
    /// preceded it.
    pub fn actual_start(&self) -> Option<DateTime<FixedOffset>> {
        let anchor = self.anchor?;
        match (self.first_pcr, self.latest_pcr) {
            (Some(first), Some(latest)) => Some(anchor - elapsed(latest, first)),
            _ => Some(anchor),
        }
    }
}

impl TsSink for StartClock {
    fn on_packet(&mut self, packet: &DecodedPacket) -> ControlFlow<()> {
        if let Some(pcr) = packet.pcr {
            self.first_pcr.get_or_insert(pcr);
            self.latest_pcr = Some(pcr);
        }
        ControlFlow::Continue(())
    }

    fn on_section(&mut self, section: &DecodedSection) -> ControlFlow<()> {
        match section.jst_time() {
            Some(time) => {
                self.anchor = Some(time);
                ControlFlow::Break(())
            }
            None => ControlFlow::Continue(()),
        }
    }
}

/// Collects the first and last PCR of a scanned range.
#[derive(Debug, Default)]
pub struct PcrScanner {
    stop_at_first: bool,
    first: Option<u64>,
    last: Option<u64>,
}

impl PcrScanner {
    /// Scanner that stops at the first PCR.
    pub fn first_only() -> Self {
        Self {
            stop_at_first: true,
            ..Self::default()
        }
    }

    /// Scanner that keeps the last PCR of the whole range.
    pub fn through() -> Self {
        Self::default()
    }

    pub fn first(&self) -> Option<u64> {
        self.first
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }
}

impl TsSink for PcrScanner {
    fn on_packet(&mut self, packet: &DecodedPacket) -> ControlFlow<()> {
        let Some(pcr) = packet.pcr else {
            return ControlFlow::Continue(());
        };
        self.first.get_or_insert(pcr);
        self.last = Some(pcr);

        if self.stop_at_first {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

/// Find when the recording actually started.
pub async fn measure_start(path: &Path, size: u64, format: PacketFormat) -> Result<DateTime<FixedOffset>> {
    let mut clock = StartClock::new();
    scan_file(path, 0..size, format, true, &mut clock, |_, _| {}).await?;

    let start = clock
        .actual_start()
        .ok_or(RenameError::NoClockReference("start"))?;
    debug!("Wall-clock anchor {:?}, recording start {}", clock.anchor(), start);
    Ok(start)
}

/// Measure the recording length from the head and tail PCR windows.
pub async fn measure_duration(path: &Path, size: u64, format: PacketFormat) -> Result<Duration> {
    let window = format.unit_size() as u64 * WINDOW_PACKETS;

    let mut head = PcrScanner::first_only();
    scan_file(path, 0..window.min(size), format, false, &mut head, |_, _| {}).await?;
    let first = head.first().ok_or(RenameError::NoClockReference("start"))?;

    let tail_start = align_to_packet(size.saturating_sub(window), format);
    let mut tail = PcrScanner::through();
    scan_file(path, tail_start..size, format, false, &mut tail, |_, _| {}).await?;
    let last = tail.last().ok_or(RenameError::NoClockReference("end"))?;

    Ok(elapsed(last, first))
}

/// Compare the measured recording against the program's guide times.
pub fn verify_timing(
    actual_start: DateTime<FixedOffset>,
    actual_duration: Duration,
    program: &CandidateProgram,
    start_offset_secs: i64,
    duration_offset_secs: i64,
) -> Result<()> {
    if actual_start > program.start_time + Duration::seconds(start_offset_secs) {
        return Err(RenameError::StartTimeMismatch {
            actual: actual_start,
            program: program.start_time,
            offset_secs: start_offset_secs,
        });
    }

    let program_duration = program.end_time - program.start_time;
    if actual_duration < program_duration + Duration::seconds(duration_offset_secs) {
        return Err(RenameError::DurationTooShort {
            actual_secs: actual_duration.num_seconds(),
            program_secs: program_duration.num_seconds(),
            offset_secs: duration_offset_secs,
        });
    }

    info!(
        "Time check passed (start {}, {} sec)",
        actual_start,
        actual_duration.num_seconds()
    );
    Ok(())
}
