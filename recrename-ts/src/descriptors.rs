//! Descriptor parsing for PSI/SI tables.
//!
//! Only the descriptors needed to name a recording are decoded: the service
//! descriptor (SDT, SIT), the short event descriptor (EIT, SIT) and the ISDB
//! partial transport stream time descriptor (SIT).

use chrono::{DateTime, FixedOffset};

use crate::arib::decode_arib_string;
use crate::time::{decode_bcd_duration, decode_mjd_time};

/// Service descriptor (0x48).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Service type.
    pub service_type: u8,
    /// Service provider name.
    pub provider_name: String,
    /// Service name.
    pub service_name: String,
}

impl ServiceDescriptor {
    /// Parse a service descriptor from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, &'static str> {
        if data.len() < 3 {
            return Err("Service descriptor too short");
        }

        let service_type = data[0];
        let provider_name_length = data[1] as usize;

        if data.len() < 2 + provider_name_length + 1 {
            return Err("Invalid provider name length");
        }

        let provider_name = decode_arib_string(&data[2..2 + provider_name_length]);

        let service_name_offset = 2 + provider_name_length;
        let service_name_length = data[service_name_offset] as usize;

        if data.len() < service_name_offset + 1 + service_name_length {
            return Err("Invalid service name length");
        }

        let service_name = decode_arib_string(
            &data[service_name_offset + 1..service_name_offset + 1 + service_name_length],
        );

        Ok(ServiceDescriptor {
            service_type,
            provider_name,
            service_name,
        })
    }
}

/// Short event descriptor (0x4D).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortEventDescriptor {
    /// ISO 639 language code, usually "jpn".
    pub language: String,
    /// Event (program) name.
    pub event_name: String,
    /// Free text describing the event.
    pub text: String,
}

impl ShortEventDescriptor {
    /// Parse a short event descriptor from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, &'static str> {
        if data.len() < 5 {
            return Err("Short event descriptor too short");
        }

        let language = String::from_utf8_lossy(&data[0..3]).into_owned();
        let name_length = data[3] as usize;
        let name_end = 4 + name_length;
        if data.len() < name_end + 1 {
            return Err("Invalid event name length");
        }

        let text_length = data[name_end] as usize;
        let text_start = name_end + 1;
        if data.len() < text_start + text_length {
            return Err("Invalid text length");
        }

        Ok(ShortEventDescriptor {
            language,
            event_name: decode_arib_string(&data[4..name_end]),
            text: decode_arib_string(&data[text_start..text_start + text_length]),
        })
    }
}

/// Partial transport stream time descriptor (0xC3).
///
/// Carried in the SIT of partial TS recordings in place of the EIT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialTsTimeDescriptor {
    /// Event version number.
    pub event_version_number: u8,
    /// Start time of the current event, `None` when undefined.
    pub event_start_time: Option<DateTime<FixedOffset>>,
    /// Duration of the current event in seconds, `None` when undefined.
    pub event_duration: Option<u32>,
    /// Offset to apply to the JST time, in seconds.
    pub offset: i32,
    /// Current JST time, when the JST time flag is set.
    pub jst_time: Option<DateTime<FixedOffset>>,
}

impl PartialTsTimeDescriptor {
    /// Parse a partial TS time descriptor from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, &'static str> {
        if data.len() < 13 {
            return Err("Partial TS time descriptor too short");
        }

        let offset_seconds = decode_bcd_duration(&data[9..12]).unwrap_or(0) as i32;
        let flags = data[12];
        // offset_flag set: the offset is subtracted
        let offset = if flags & 0x04 != 0 {
            -offset_seconds
        } else {
            offset_seconds
        };

        let jst_time = if flags & 0x01 != 0 && data.len() >= 18 {
            decode_mjd_time(&data[13..18])
        } else {
            None
        };

        Ok(PartialTsTimeDescriptor {
            event_version_number: data[0],
            event_start_time: decode_mjd_time(&data[1..6]),
            event_duration: decode_bcd_duration(&data[6..9]),
            offset,
            jst_time,
        })
    }
}

/// Parse descriptors from a descriptor loop.
pub fn parse_descriptor_loop(data: &[u8]) -> Vec<(u8, &[u8])> {
    let mut descriptors = Vec::new();
    let mut offset = 0;

    while offset + 2 <= data.len() {
        let tag = data[offset];
        let length = data[offset + 1] as usize;
        offset += 2;

        if offset + length > data.len() {
            break;
        }

        descriptors.push((tag, &data[offset..offset + length]));
        offset += length;
    }

    descriptors
}

/// Find the first descriptor with `tag` in a descriptor loop.
pub fn find_descriptor(data: &[u8], tag: u8) -> Option<&[u8]> {
    parse_descriptor_loop(data)
        .into_iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, d)| d)
}
