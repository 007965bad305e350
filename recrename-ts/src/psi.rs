//! PSI (Program Specific Information) section parsing.
//!
//! This module handles common PSI section header parsing, CRC validation
//! and the reassembly of sections spread over several TS packets.

use super::table_id;

/// PSI section header (common to all PSI tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsiHeader {
    /// Table ID.
    pub table_id: u8,
    /// Section syntax indicator.
    pub section_syntax_indicator: bool,
    /// Section length (12 bits).
    pub section_length: u16,
    /// Table ID extension (for long sections).
    pub table_id_extension: u16,
    /// Version number (5 bits).
    pub version_number: u8,
    /// Current/next indicator.
    pub current_next_indicator: bool,
    /// Section number.
    pub section_number: u8,
    /// Last section number.
    pub last_section_number: u8,
}

/// A parsed PSI section.
#[derive(Debug, Clone)]
pub struct PsiSection<'a> {
    /// Section header.
    pub header: PsiHeader,
    /// Section data (after header, before CRC).
    pub data: &'a [u8],
    /// CRC32 value, absent for the TDT.
    pub crc32: Option<u32>,
    raw: &'a [u8],
}

impl<'a> PsiSection<'a> {
    /// Parse a PSI section from raw bytes starting at table_id.
    pub fn parse(data: &'a [u8]) -> Result<Self, &'static str> {
        if data.len() < 3 {
            return Err("Section too short for header");
        }

        let table_id = data[0];
        let section_syntax_indicator = data[1] & 0x80 != 0;
        let section_length = ((data[1] as u16 & 0x0F) << 8) | data[2] as u16;

        if section_length < 5 {
            return Err("Section length too small");
        }

        let total_length = 3 + section_length as usize;
        if data.len() < total_length {
            return Err("Incomplete section data");
        }

        let header = if section_syntax_indicator {
            if total_length < 12 {
                return Err("Section too short for extended header");
            }

            PsiHeader {
                table_id,
                section_syntax_indicator,
                section_length,
                table_id_extension: ((data[3] as u16) << 8) | data[4] as u16,
                version_number: (data[5] >> 1) & 0x1F,
                current_next_indicator: data[5] & 0x01 != 0,
                section_number: data[6],
                last_section_number: data[7],
            }
        } else {
            PsiHeader {
                table_id,
                section_syntax_indicator,
                section_length,
                table_id_extension: 0,
                version_number: 0,
                current_next_indicator: true,
                section_number: 0,
                last_section_number: 0,
            }
        };

        // The TDT is the only short section without a trailing CRC.
        let has_crc = table_id != table_id::TDT;
        let data_start = if section_syntax_indicator { 8 } else { 3 };
        let data_end = if has_crc {
            total_length - 4
        } else {
            total_length
        };

        if data_end < data_start {
            return Err("No data in section");
        }

        let crc32 = has_crc.then(|| {
            u32::from_be_bytes([
                data[total_length - 4],
                data[total_length - 3],
                data[total_length - 2],
                data[total_length - 1],
            ])
        });

        Ok(PsiSection {
            header,
            data: &data[data_start..data_end],
            crc32,
            raw: &data[..total_length],
        })
    }

    /// Verify the CRC32 of the section. Sections without a CRC always pass.
    pub fn verify_crc(&self) -> bool {
        match self.crc32 {
            Some(crc) => crc32_mpeg2(&self.raw[..self.raw.len() - 4]) == crc,
            None => true,
        }
    }

    /// Get the total section length including header and CRC.
    pub fn total_length(&self) -> usize {
        3 + self.header.section_length as usize
    }
}

/// Reassembles sections carried on one PID.
///
/// A payload can finish one section and start the next, can carry several
/// small sections back to back, and is padded with 0xFF stuffing after the
/// last one.
#[derive(Debug, Default)]
pub struct SectionCollector {
    buffer: Vec<u8>,
    last_cc: Option<u8>,
}

impl SectionCollector {
    /// Create a new section collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partial section and forget the continuity state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.last_cc = None;
    }

    /// Add the payload of one TS packet, returning every section it completed.
    pub fn push(&mut self, payload: &[u8], cc: u8, payload_unit_start: bool) -> Vec<Vec<u8>> {
        let mut complete = Vec::new();

        if let Some(last) = self.last_cc {
            if cc == last {
                // repeated packet
                return complete;
            }
            if cc != (last + 1) & 0x0F {
                self.buffer.clear();
            }
        }
        self.last_cc = Some(cc);

        if payload_unit_start {
            let Some((&pointer, rest)) = payload.split_first() else {
                return complete;
            };
            let pointer = pointer as usize;
            if pointer > rest.len() {
                self.buffer.clear();
                return complete;
            }

            if !self.buffer.is_empty() {
                self.buffer.extend_from_slice(&rest[..pointer]);
                self.drain_complete(&mut complete);
            }

            self.buffer.clear();
            self.buffer.extend_from_slice(&rest[pointer..]);
            self.drain_complete(&mut complete);
        } else if !self.buffer.is_empty() {
            self.buffer.extend_from_slice(payload);
            self.drain_complete(&mut complete);
        }

        complete
    }

    fn drain_complete(&mut self, out: &mut Vec<Vec<u8>>) {
        loop {
            match self.buffer.first() {
                None => return,
                Some(&0xFF) => {
                    self.buffer.clear();
                    return;
                }
                Some(_) => {}
            }
            if self.buffer.len() < 3 {
                return;
            }

            let length = 3 + (((self.buffer[1] as usize & 0x0F) << 8) | self.buffer[2] as usize);
            if self.buffer.len() < length {
                return;
            }

            out.push(self.buffer.drain(..length).collect());
        }
    }

    /// Check if collector holds a partial section.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Calculate CRC32 for MPEG-2 (polynomial 0x04C11DB7).
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    static CRC_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = (i as u32) << 24;
            let mut j = 0;
            while j < 8 {
                if crc & 0x80000000 != 0 {
                    crc = (crc << 1) ^ 0x04C11DB7;
                } else {
                    crc <<= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    data.iter().fold(0xFFFFFFFFu32, |crc, &byte| {
        (crc << 8) ^ CRC_TABLE[((crc >> 24) ^ byte as u32) as usize]
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a long-form section with a valid CRC around `body`.
    pub(crate) fn long_section(table_id: u8, extension: u16, section_number: u8, body: &[u8]) -> Vec<u8> {
        let section_length = 5 + body.len() + 4;
        let mut section = vec![
            table_id,
            0xB0 | ((section_length >> 8) as u8 & 0x0F),
            section_length as u8,
            (extension >> 8) as u8,
            extension as u8,
            0xC1, // version 0, current
            section_number,
            section_number,
        ];
        section.extend_from_slice(body);
        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    #[test]
    fn test_crc32_empty() {
        assert_eq!(crc32_mpeg2(&[]), 0xFFFFFFFF);
    }

    #[test]
    fn test_crc32_known_pat() {
        // PAT, TSID 1, program 1 -> PMT 0x1000
        let section = [
            0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xF0, 0x00,
        ];
        let crc = crc32_mpeg2(&section);
        let mut full = section.to_vec();
        full.extend_from_slice(&crc.to_be_bytes());
        // Running the CRC over the whole section including its CRC yields zero.
        assert_eq!(crc32_mpeg2(&full), 0);
    }

    #[test]
    fn test_parse_long_section_and_verify() {
        let raw = long_section(0x00, 0x7FE1, 0, &[0x04, 0x08, 0xE1, 0xF0]);
        let section = PsiSection::parse(&raw).unwrap();
        assert_eq!(section.header.table_id_extension, 0x7FE1);
        assert_eq!(section.data, &[0x04, 0x08, 0xE1, 0xF0]);
        assert!(section.verify_crc());

        let mut broken = raw.clone();
        broken[9] ^= 0x01;
        assert!(!PsiSection::parse(&broken).unwrap().verify_crc());
    }

    #[test]
    fn test_parse_tdt_without_crc() {
        let raw = [0x70, 0x70, 0x05, 0xE3, 0x5A, 0x21, 0x30, 0x00];
        let section = PsiSection::parse(&raw).unwrap();
        assert_eq!(section.crc32, None);
        assert_eq!(section.data.len(), 5);
        assert!(section.verify_crc());
    }

    #[test]
    fn test_collector_single_packet() {
        let raw = long_section(0x00, 1, 0, &[0x00, 0x01, 0xF0, 0x00]);
        let mut payload = vec![0u8];
        payload.extend_from_slice(&raw);
        payload.resize(184, 0xFF);

        let mut collector = SectionCollector::new();
        let sections = collector.push(&payload, 0, true);
        assert_eq!(sections, vec![raw]);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_collector_spanning_packets() {
        let body = vec![0x11u8; 300];
        let raw = long_section(0x42, 1, 0, &body);

        let mut first = vec![0u8];
        first.extend_from_slice(&raw[..183]);
        let second = &raw[183..];

        let mut collector = SectionCollector::new();
        assert!(collector.push(&first, 3, true).is_empty());
        assert!(!collector.is_empty());
        let sections = collector.push(second, 4, false);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0], raw);
    }

    #[test]
    fn test_collector_drops_partial_on_discontinuity() {
        let raw = long_section(0x42, 1, 0, &vec![0x11u8; 300]);
        let mut first = vec![0u8];
        first.extend_from_slice(&raw[..183]);

        let mut collector = SectionCollector::new();
        collector.push(&first, 3, true);
        assert!(collector.push(&raw[183..], 6, false).is_empty());
        assert!(collector.is_empty());
    }

    #[test]
    fn test_collector_pointer_field_finishes_previous() {
        let a = long_section(0x4E, 1, 0, &vec![0x22u8; 200]);
        let b = long_section(0x4E, 1, 1, &[0x33; 8]);

        let mut first = vec![0u8];
        first.extend_from_slice(&a[..183]);
        let rest = &a[183..];
        let mut second = vec![rest.len() as u8];
        second.extend_from_slice(rest);
        second.extend_from_slice(&b);
        second.resize(184, 0xFF);

        let mut collector = SectionCollector::new();
        assert!(collector.push(&first, 0, true).is_empty());
        let sections = collector.push(&second, 1, true);
        assert_eq!(sections, vec![a, b]);
    }

    #[test]
    fn test_collector_ignores_repeated_packet() {
        let raw = long_section(0x42, 1, 0, &vec![0x11u8; 300]);
        let mut first = vec![0u8];
        first.extend_from_slice(&raw[..183]);

        let mut collector = SectionCollector::new();
        collector.push(&first, 9, true);
        assert!(collector.push(&first, 9, true).is_empty());
        assert_eq!(collector.push(&raw[183..], 10, false), vec![raw]);
    }
}
