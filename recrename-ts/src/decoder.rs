//! Push decoder: raw bytes in, packet and section records out.
//!
//! Bytes are fed in arbitrary chunks. Every complete packet unit is parsed
//! and delivered to the [`TsSink`], followed by any PSI/SI section it
//! completed. When the sink answers [`ControlFlow::Break`] the decoder stops
//! and never calls the sink again.

use std::collections::HashMap;
use std::ops::ControlFlow;

use chrono::{DateTime, FixedOffset};
use log::trace;

use super::eit::EitTable;
use super::packet::{PacketFormat, TsPacket, SYNC_BYTE};
use super::pat::PatTable;
use super::psi::{PsiSection, SectionCollector};
use super::sdt::SdtTable;
use super::sit::SitTable;
use super::time::{TdtTable, TotTable};
use super::{pid, table_id};

/// One decoded packet, reduced to what the recording checks need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPacket {
    /// Packet identifier.
    pub pid: u16,
    /// Continuity counter, `None` for packets without payload and null packets.
    pub continuity_counter: Option<u8>,
    /// 33-bit PCR base, when the adaptation field carries one.
    pub pcr: Option<u64>,
    /// Adaptation field discontinuity indicator.
    pub discontinuity: bool,
    /// Transport error indicator.
    pub transport_error: bool,
}

/// A decoded PSI/SI section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedSection {
    Pat(PatTable),
    Sdt(SdtTable),
    Eit(EitTable),
    Tdt(TdtTable),
    Tot(TotTable),
    Sit(SitTable),
}

impl DecodedSection {
    /// Wall-clock time carried by TDT and TOT sections.
    pub fn jst_time(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            DecodedSection::Tdt(tdt) => Some(tdt.jst_time),
            DecodedSection::Tot(tot) => Some(tot.jst_time),
            _ => None,
        }
    }
}

/// Receiver of decoded records.
pub trait TsSink {
    /// Called for every packet, before the sections it completes.
    fn on_packet(&mut self, _packet: &DecodedPacket) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// Called for every complete section with a valid CRC.
    fn on_section(&mut self, _section: &DecodedSection) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl<S: TsSink + ?Sized> TsSink for &mut S {
    fn on_packet(&mut self, packet: &DecodedPacket) -> ControlFlow<()> {
        (**self).on_packet(packet)
    }

    fn on_section(&mut self, section: &DecodedSection) -> ControlFlow<()> {
        (**self).on_section(section)
    }
}

/// Configuration for the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Packet unit layout of the input.
    pub format: PacketFormat,
    /// Whether to reassemble and deliver sections. Packet-only consumers
    /// (drop detection) turn this off.
    pub sections: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            format: PacketFormat::TS,
            sections: true,
        }
    }
}

/// Stateful push decoder.
#[derive(Debug)]
pub struct TsDecoder {
    config: DecoderConfig,
    pending: Vec<u8>,
    collectors: HashMap<u16, SectionCollector>,
    packets: u64,
    stopped: bool,
}

impl TsDecoder {
    /// Create a new decoder.
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            collectors: HashMap::new(),
            packets: 0,
            stopped: false,
        }
    }

    /// Number of packets delivered so far.
    pub fn packets_decoded(&self) -> u64 {
        self.packets
    }

    /// Whether the sink has asked to stop.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Feed a chunk of bytes. Bytes of an incomplete trailing unit are kept
    /// for the next call.
    pub fn feed<S: TsSink + ?Sized>(&mut self, data: &[u8], sink: &mut S) -> ControlFlow<()> {
        if self.stopped {
            return ControlFlow::Break(());
        }

        self.pending.extend_from_slice(data);
        let unit_size = self.config.format.unit_size();
        let sync_offset = self.config.format.sync_offset();

        let mut offset = 0;
        let mut result = ControlFlow::Continue(());
        while offset + unit_size <= self.pending.len() {
            if self.pending[offset + sync_offset] != SYNC_BYTE {
                // lost sync
                offset += 1;
                continue;
            }

            let unit = &self.pending[offset..offset + unit_size];
            let flow = match self.config.format.packet_of(unit).map(TsPacket::parse) {
                Some(Ok(packet)) => Self::deliver(
                    &self.config,
                    &mut self.collectors,
                    &mut self.packets,
                    &packet,
                    sink,
                ),
                _ => ControlFlow::Continue(()),
            };
            offset += unit_size;

            if flow.is_break() {
                self.stopped = true;
                result = ControlFlow::Break(());
                break;
            }
        }

        if self.stopped {
            self.pending = Vec::new();
            self.collectors.clear();
        } else {
            self.pending.drain(..offset);
        }
        result
    }

    fn deliver<S: TsSink + ?Sized>(
        config: &DecoderConfig,
        collectors: &mut HashMap<u16, SectionCollector>,
        packets: &mut u64,
        packet: &TsPacket,
        sink: &mut S,
    ) -> ControlFlow<()> {
        let header = &packet.header;
        *packets += 1;

        let carries_counter = header.has_payload() && header.pid != pid::NULL;
        sink.on_packet(&DecodedPacket {
            pid: header.pid,
            continuity_counter: carries_counter.then_some(header.continuity_counter),
            pcr: packet.pcr(),
            discontinuity: packet.discontinuity(),
            transport_error: header.transport_error,
        })?;

        if !config.sections
            || !is_section_pid(header.pid)
            || header.transport_error
            || header.is_scrambled()
            || !header.has_payload()
        {
            return ControlFlow::Continue(());
        }

        let collector = collectors.entry(header.pid).or_default();
        if packet.discontinuity() {
            collector.clear();
        }

        for raw in collector.push(packet.payload, header.continuity_counter, header.payload_unit_start) {
            if let Some(section) = decode_section(header.pid, &raw) {
                sink.on_section(&section)?;
            }
        }

        ControlFlow::Continue(())
    }
}

fn is_section_pid(pid_val: u16) -> bool {
    matches!(
        pid_val,
        pid::PAT
            | pid::SDT
            | pid::EIT
            | pid::EIT_TERRESTRIAL_H
            | pid::EIT_TERRESTRIAL_M
            | pid::TDT
            | pid::SIT
    )
}

fn decode_section(pid_val: u16, raw: &[u8]) -> Option<DecodedSection> {
    let section = match PsiSection::parse(raw) {
        Ok(section) => section,
        Err(e) => {
            trace!("PID 0x{:04X}: dropping section: {}", pid_val, e);
            return None;
        }
    };

    if !section.verify_crc() {
        trace!(
            "PID 0x{:04X}: CRC mismatch on table 0x{:02X}",
            pid_val,
            section.header.table_id
        );
        return None;
    }
    if !section.header.current_next_indicator {
        return None;
    }

    let decoded = match (pid_val, section.header.table_id) {
        (pid::PAT, table_id::PAT) => PatTable::parse(&section).map(DecodedSection::Pat),
        (pid::SDT, table_id::SDT_ACTUAL) => SdtTable::parse(&section).map(DecodedSection::Sdt),
        (pid::EIT | pid::EIT_TERRESTRIAL_H | pid::EIT_TERRESTRIAL_M, table_id::EIT_PF_ACTUAL) => {
            EitTable::parse(&section).map(DecodedSection::Eit)
        }
        (pid::TDT, table_id::TDT) => TdtTable::parse(&section).map(DecodedSection::Tdt),
        (pid::TDT, table_id::TOT) => TotTable::parse(&section).map(DecodedSection::Tot),
        (pid::SIT, table_id::SIT) => SitTable::parse(&section).map(DecodedSection::Sit),
        _ => return None,
    };

    match decoded {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            trace!("PID 0x{:04X}: {}", pid_val, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eit::tests::eit_body;
    use crate::psi::tests::long_section;
    use crate::sdt::tests::sdt_body;

    #[derive(Default)]
    struct Recorder {
        packets: Vec<DecodedPacket>,
        sections: Vec<DecodedSection>,
        stop_after_packets: Option<usize>,
        stop_on_section: bool,
    }

    impl TsSink for Recorder {
        fn on_packet(&mut self, packet: &DecodedPacket) -> ControlFlow<()> {
            self.packets.push(*packet);
            match self.stop_after_packets {
                Some(limit) if self.packets.len() >= limit => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        }

        fn on_section(&mut self, section: &DecodedSection) -> ControlFlow<()> {
            self.sections.push(section.clone());
            if self.stop_on_section {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }
    }

    /// Packetize one section on `pid`, starting at continuity counter `cc`.
    fn packetize(pid_val: u16, section: &[u8], cc: u8) -> Vec<[u8; 188]> {
        let mut stream = vec![0u8];
        stream.extend_from_slice(section);

        stream
            .chunks(184)
            .enumerate()
            .map(|(i, chunk)| {
                let mut packet = [0xFFu8; 188];
                packet[0] = SYNC_BYTE;
                packet[1] = (if i == 0 { 0x40 } else { 0x00 }) | (pid_val >> 8) as u8;
                packet[2] = pid_val as u8;
                packet[3] = 0x10 | ((cc + i as u8) & 0x0F);
                packet[4..4 + chunk.len()].copy_from_slice(chunk);
                packet
            })
            .collect()
    }

    fn pcr_packet(pid_val: u16, pcr_base: u64) -> [u8; 188] {
        let mut packet = [0xFFu8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = (pid_val >> 8) as u8;
        packet[2] = pid_val as u8;
        packet[3] = 0x20;
        packet[4] = 183;
        packet[5] = 0x10;
        packet[6] = (pcr_base >> 25) as u8;
        packet[7] = (pcr_base >> 17) as u8;
        packet[8] = (pcr_base >> 9) as u8;
        packet[9] = (pcr_base >> 1) as u8;
        packet[10] = ((pcr_base & 0x01) << 7) as u8 | 0x7E;
        packet[11] = 0x00;
        packet
    }

    #[test]
    fn test_feed_delivers_packets_and_sections() {
        let pat = long_section(table_id::PAT, 0x7FE1, 0, &[0x04, 0x00, 0xE1, 0xF0]);
        let mut bytes = Vec::new();
        for packet in packetize(pid::PAT, &pat, 0) {
            bytes.extend_from_slice(&packet);
        }
        bytes.extend_from_slice(&pcr_packet(0x01FF, 0x1_2345_6789));

        let mut decoder = TsDecoder::new(DecoderConfig::default());
        let mut sink = Recorder::default();
        assert!(decoder.feed(&bytes, &mut sink).is_continue());

        assert_eq!(sink.packets.len(), 2);
        assert_eq!(sink.packets[0].continuity_counter, Some(0));
        assert_eq!(sink.packets[1].pcr, Some(0x1_2345_6789));
        assert_eq!(sink.packets[1].continuity_counter, None);
        match &sink.sections[..] {
            [DecodedSection::Pat(pat)] => assert_eq!(pat.first_service_id(), Some(0x0400)),
            other => panic!("unexpected sections: {:?}", other),
        }
    }

    #[test]
    fn test_feed_split_across_chunks() {
        let body = sdt_body(0x7FE0, &[(0x0400, &b"\x0EA"[..]); 20]);
        let sdt = long_section(table_id::SDT_ACTUAL, 0x7FE1, 0, &body);
        let mut bytes = Vec::new();
        for packet in packetize(pid::SDT, &sdt, 5) {
            bytes.extend_from_slice(&packet);
        }
        assert!(bytes.len() > 188);

        let mut decoder = TsDecoder::new(DecoderConfig::default());
        let mut sink = Recorder::default();
        for chunk in bytes.chunks(100) {
            assert!(decoder.feed(chunk, &mut sink).is_continue());
        }

        assert_eq!(decoder.packets_decoded(), (bytes.len() / 188) as u64);
        match &sink.sections[..] {
            [DecodedSection::Sdt(sdt)] => assert_eq!(sdt.services.len(), 20),
            other => panic!("unexpected sections: {:?}", other),
        }
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut bytes = vec![0x00, 0x12, 0x47 ^ 0xFF];
        bytes.extend_from_slice(&pcr_packet(0x0100, 90_000));
        bytes.extend_from_slice(&pcr_packet(0x0100, 180_000));

        let mut decoder = TsDecoder::new(DecoderConfig::default());
        let mut sink = Recorder::default();
        decoder.feed(&bytes, &mut sink);

        let pcrs: Vec<_> = sink.packets.iter().filter_map(|p| p.pcr).collect();
        assert_eq!(pcrs, vec![90_000, 180_000]);
    }

    #[test]
    fn test_m2ts_units() {
        let mut bytes = Vec::new();
        for base in [1u64, 2] {
            bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
            bytes.extend_from_slice(&pcr_packet(0x0100, base));
        }

        let config = DecoderConfig {
            format: PacketFormat::M2TS,
            sections: false,
        };
        let mut decoder = TsDecoder::new(config);
        let mut sink = Recorder::default();
        decoder.feed(&bytes, &mut sink);
        assert_eq!(sink.packets.len(), 2);
    }

    #[test]
    fn test_break_is_final() {
        let mut bytes = Vec::new();
        for base in 0..4u64 {
            bytes.extend_from_slice(&pcr_packet(0x0100, base));
        }

        let mut decoder = TsDecoder::new(DecoderConfig::default());
        let mut sink = Recorder {
            stop_after_packets: Some(2),
            ..Default::default()
        };
        assert!(decoder.feed(&bytes, &mut sink).is_break());
        assert!(decoder.is_stopped());
        assert_eq!(sink.packets.len(), 2);

        assert!(decoder.feed(&bytes, &mut sink).is_break());
        assert_eq!(sink.packets.len(), 2);
    }

    #[test]
    fn test_break_from_section() {
        let body = eit_body(1, 4, [0xC0, 0x79, 0x12, 0x45, 0x00], [0x00, 0x30, 0x00], b"\x43\x35");
        let eit = long_section(table_id::EIT_PF_ACTUAL, 0x0400, 0, &body);
        let mut bytes = Vec::new();
        for packet in packetize(pid::EIT, &eit, 0) {
            bytes.extend_from_slice(&packet);
        }
        bytes.extend_from_slice(&pcr_packet(0x0100, 1));

        let mut decoder = TsDecoder::new(DecoderConfig::default());
        let mut sink = Recorder {
            stop_on_section: true,
            ..Default::default()
        };
        assert!(decoder.feed(&bytes, &mut sink).is_break());
        assert_eq!(sink.sections.len(), 1);
        assert!(sink.packets.iter().all(|p| p.pcr.is_none()));
    }

    #[test]
    fn test_corrupt_section_is_dropped() {
        let mut pat = long_section(table_id::PAT, 0x7FE1, 0, &[0x04, 0x00, 0xE1, 0xF0]);
        let last = pat.len() - 1;
        pat[last] ^= 0xFF;
        let mut bytes = Vec::new();
        for packet in packetize(pid::PAT, &pat, 0) {
            bytes.extend_from_slice(&packet);
        }

        let mut decoder = TsDecoder::new(DecoderConfig::default());
        let mut sink = Recorder::default();
        decoder.feed(&bytes, &mut sink);
        assert!(sink.sections.is_empty());
        assert_eq!(sink.packets.len(), 1);
    }
}
