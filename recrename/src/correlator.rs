//! Program identification from broadcast tables.
//!
//! PAT, SDT and EIT sections arrive interleaved and repeat at different
//! rates. The correlator first collects the stream structure (network,
//! stream and service ids plus service names), locks onto the first
//! advertised service and then waits for its present event. Partial TS
//! recordings carry a SIT instead, which names the program directly.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use log::{debug, info};
use recrename_ts::{
    DecodedPacket, DecodedSection, EitTable, PacketFormat, PatTable, SdtTable, SitTable, TsSink,
};

use crate::error::{RenameError, Result};
use crate::scan::{align_to_packet, scan_file};

/// Default packet budget for identification.
pub const DEFAULT_MAX_PACKETS: u64 = 5_000_000;
/// SIT window as per-mille of the estimated packet count.
const SIT_WINDOW_START_PERMILLE: u64 = 20;
const SIT_WINDOW_END_PERMILLE: u64 = 50;

/// The service a recording belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceIdentity {
    pub original_network_id: u16,
    pub transport_stream_id: u16,
    pub service_id: u16,
}

/// The program found in a recording, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramIdentity {
    pub service_name: String,
    pub event_name: String,
    pub start_time: DateTime<FixedOffset>,
    /// Declared duration in seconds.
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelatorState {
    CollectingStructure,
    AwaitingEvent(ServiceIdentity),
    Resolved(ProgramIdentity),
    Failed { packets: u64 },
}

/// Packet limits of one identification scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelatorConfig {
    /// SIT sections before this packet index are ignored.
    pub sit_window_start: u64,
    /// After this packet index a seen-but-unusable SIT ends the search.
    pub sit_window_end: u64,
    /// Overall packet budget.
    pub max_packets: u64,
}

impl CorrelatorConfig {
    /// Limits for a scan of about `estimated_packets` packets.
    pub fn for_packets(estimated_packets: u64) -> Self {
        Self {
            sit_window_start: estimated_packets * SIT_WINDOW_START_PERMILLE / 1000,
            sit_window_end: estimated_packets * SIT_WINDOW_END_PERMILLE / 1000,
            max_packets: DEFAULT_MAX_PACKETS,
        }
    }
}

/// Identification state machine, driven as a [`TsSink`].
#[derive(Debug)]
pub struct MetadataCorrelator {
    config: CorrelatorConfig,
    state: CorrelatorState,
    packets: u64,
    sit_seen: bool,
    original_network_id: Option<u16>,
    transport_stream_id: Option<u16>,
    service_id: Option<u16>,
    services: HashMap<u16, String>,
}

impl MetadataCorrelator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self {
            config,
            state: CorrelatorState::CollectingStructure,
            packets: 0,
            sit_seen: false,
            original_network_id: None,
            transport_stream_id: None,
            service_id: None,
            services: HashMap::new(),
        }
    }

    pub fn state(&self) -> &CorrelatorState {
        &self.state
    }

    fn is_done(&self) -> bool {
        matches!(
            self.state,
            CorrelatorState::Resolved(_) | CorrelatorState::Failed { .. }
        )
    }

    /// Consume the correlator once the input is exhausted or it stopped.
    pub fn finish(self) -> Result<ProgramIdentity> {
        match self.state {
            CorrelatorState::Resolved(identity) => Ok(identity),
            CorrelatorState::Failed { packets } => Err(RenameError::InformationWindowExceeded { packets }),
            _ => Err(RenameError::InformationNotFound),
        }
    }

    fn on_pat(&mut self, pat: &PatTable) {
        if self.transport_stream_id.is_none() {
            self.transport_stream_id = Some(pat.transport_stream_id);
        }
        if self.service_id.is_none() {
            self.service_id = pat.first_service_id();
        }
    }

    fn on_sdt(&mut self, sdt: &SdtTable) {
        if self.original_network_id.is_none() {
            self.original_network_id = Some(sdt.original_network_id);
        }
        for service in &sdt.services {
            self.services
                .entry(service.service_id)
                .or_insert_with(|| service.service_name().unwrap_or_default().to_string());
        }
    }

    fn try_lock_service(&mut self) {
        let (Some(onid), Some(tsid), Some(sid)) = (
            self.original_network_id,
            self.transport_stream_id,
            self.service_id,
        ) else {
            return;
        };
        if !self.services.contains_key(&sid) {
            return;
        }

        let identity = ServiceIdentity {
            original_network_id: onid,
            transport_stream_id: tsid,
            service_id: sid,
        };
        debug!(
            "Service locked: onid 0x{:04X}, tsid 0x{:04X}, sid 0x{:04X}",
            onid, tsid, sid
        );
        self.state = CorrelatorState::AwaitingEvent(identity);
    }

    fn on_eit(&mut self, eit: &EitTable, service: ServiceIdentity) {
        if eit.service_id != service.service_id
            || eit.transport_stream_id != service.transport_stream_id
            || eit.original_network_id != service.original_network_id
        {
            return;
        }
        let Some(event) = eit.present_event() else {
            return;
        };
        let (Some(short_event), Some(start_time)) = (&event.short_event, event.start_time) else {
            return;
        };

        self.resolve(ProgramIdentity {
            service_name: self
                .services
                .get(&service.service_id)
                .cloned()
                .unwrap_or_default(),
            event_name: short_event.event_name.clone(),
            start_time,
            duration: event.duration,
        });
    }

    fn on_sit(&mut self, sit: &SitTable) {
        self.sit_seen = true;
        if self.packets < self.config.sit_window_start || self.packets > self.config.sit_window_end {
            return;
        }

        let Some(service) = sit.services.first() else {
            return;
        };
        let (Some(descriptor), Some(short_event), Some(time)) = (
            &service.service_descriptor,
            &service.short_event,
            &service.partial_ts_time,
        ) else {
            return;
        };
        let Some(start_time) = time.event_start_time else {
            return;
        };

        self.resolve(ProgramIdentity {
            service_name: descriptor.service_name.clone(),
            event_name: short_event.event_name.clone(),
            start_time,
            duration: time.event_duration,
        });
    }

    fn resolve(&mut self, identity: ProgramIdentity) {
        info!(
            "Information: service {:?}, event {:?}, start {}",
            identity.service_name, identity.event_name, identity.start_time
        );
        self.state = CorrelatorState::Resolved(identity);
    }

    fn fail(&mut self) -> ControlFlow<()> {
        self.state = CorrelatorState::Failed {
            packets: self.packets,
        };
        ControlFlow::Break(())
    }

    fn flow(&self) -> ControlFlow<()> {
        if self.is_done() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

impl TsSink for MetadataCorrelator {
    fn on_packet(&mut self, _packet: &DecodedPacket) -> ControlFlow<()> {
        if self.is_done() {
            return ControlFlow::Break(());
        }

        self.packets += 1;
        if self.packets > self.config.max_packets
            || (self.sit_seen && self.packets > self.config.sit_window_end)
        {
            return self.fail();
        }
        ControlFlow::Continue(())
    }

    fn on_section(&mut self, section: &DecodedSection) -> ControlFlow<()> {
        if self.is_done() {
            return ControlFlow::Break(());
        }

        let collecting = self.state == CorrelatorState::CollectingStructure;
        match section {
            DecodedSection::Sit(sit) => self.on_sit(sit),
            DecodedSection::Pat(pat) if collecting => {
                self.on_pat(pat);
                self.try_lock_service();
            }
            DecodedSection::Sdt(sdt) if collecting => {
                self.on_sdt(sdt);
                self.try_lock_service();
            }
            DecodedSection::Eit(eit) => {
                if let CorrelatorState::AwaitingEvent(service) = self.state {
                    self.on_eit(eit, service);
                }
            }
            _ => {}
        }
        self.flow()
    }
}

/// Identify the program, scanning from the middle of the file.
pub async fn extract_identity(path: &Path, size: u64, format: PacketFormat) -> Result<ProgramIdentity> {
    let start = align_to_packet(size / 2, format);
    let estimated_packets = (size - start) / format.unit_size() as u64;
    let mut correlator = MetadataCorrelator::new(CorrelatorConfig::for_packets(estimated_packets));

    let outcome = scan_file(path, start..size, format, true, &mut correlator, |_, _| {}).await?;
    debug!(
        "Identification scan read {} packets, state {:?}",
        outcome.packets,
        correlator.state()
    );
    correlator.finish()
}
