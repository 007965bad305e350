//! Packet drop detection over the whole recording.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::Path;

use log::{info, warn};
use recrename_ts::{DecodedPacket, PacketFormat, TsSink};

use crate::error::{RenameError, Result};
use crate::scan::scan_file;

/// PIDs below this carry PSI/SI tables and are not checked.
pub const FIRST_CHECKED_PID: u16 = 0x30;

/// Continuity counter tracker that stops at the first drop.
#[derive(Debug, Default)]
pub struct ContinuityMonitor {
    last_cc: HashMap<u16, u8>,
    packets_total: u64,
    packets_error: u64,
    dropped_pid: Option<u16>,
}

impl ContinuityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// PID of the first drop found.
    pub fn dropped_pid(&self) -> Option<u16> {
        self.dropped_pid
    }

    pub fn packets_total(&self) -> u64 {
        self.packets_total
    }

    pub fn packets_error(&self) -> u64 {
        self.packets_error
    }
}

impl TsSink for ContinuityMonitor {
    fn on_packet(&mut self, packet: &DecodedPacket) -> ControlFlow<()> {
        self.packets_total += 1;
        if packet.transport_error {
            self.packets_error += 1;
        }

        if packet.pid < FIRST_CHECKED_PID {
            return ControlFlow::Continue(());
        }
        let Some(cc) = packet.continuity_counter else {
            return ControlFlow::Continue(());
        };

        let previous = self.last_cc.insert(packet.pid, cc);
        if packet.discontinuity {
            return ControlFlow::Continue(());
        }

        match previous {
            // duplicate packet
            Some(prev) if prev == cc => ControlFlow::Continue(()),
            Some(prev) if (prev + 1) & 0x0F != cc => {
                self.dropped_pid = Some(packet.pid);
                ControlFlow::Break(())
            }
            _ => ControlFlow::Continue(()),
        }
    }
}

/// Stream the whole file and fail on the first continuity error.
pub async fn check_drops<P>(path: &Path, size: u64, format: PacketFormat, progress: P) -> Result<()>
where
    P: FnMut(u64, u64),
{
    let mut monitor = ContinuityMonitor::new();
    scan_file(path, 0..size, format, false, &mut monitor, progress).await?;

    if let Some(pid) = monitor.dropped_pid() {
        warn!("Find drop at PID 0x{:04X}", pid);
        return Err(RenameError::PacketDropDetected(pid));
    }

    info!(
        "No drop in {} packets ({} with transport errors)",
        monitor.packets_total(),
        monitor.packets_error()
    );
    Ok(())
}
