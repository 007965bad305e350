//! EIT (Event Information Table) parsing.
//!
//! Only the present/following tables matter for naming a recording: section
//! 0 describes the event on air, section 1 the next one.

use chrono::{DateTime, FixedOffset};

use super::descriptors::{find_descriptor, ShortEventDescriptor};
use super::psi::PsiSection;
use super::time::{decode_bcd_duration, decode_mjd_time};
use super::{descriptor_tag, table_id};

/// One event in an EIT section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EitEvent {
    /// Event ID.
    pub event_id: u16,
    /// Start time, `None` when undefined.
    pub start_time: Option<DateTime<FixedOffset>>,
    /// Duration in seconds, `None` when undefined.
    pub duration: Option<u32>,
    /// Running status.
    pub running_status: u8,
    /// Free CA mode.
    pub free_ca_mode: bool,
    /// Parsed short event descriptor.
    pub short_event: Option<ShortEventDescriptor>,
}

impl EitEvent {
    /// Event name from the short event descriptor.
    pub fn event_name(&self) -> Option<&str> {
        self.short_event.as_ref().map(|d| d.event_name.as_str())
    }
}

/// Parsed EIT section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EitTable {
    /// Table ID (0x4E..=0x6F).
    pub table_id: u8,
    /// Service ID the events belong to.
    pub service_id: u16,
    /// Transport stream ID.
    pub transport_stream_id: u16,
    /// Original network ID.
    pub original_network_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Section number; 0 is "present" in a p/f table.
    pub section_number: u8,
    /// Events.
    pub events: Vec<EitEvent>,
}

impl EitTable {
    /// Parse an EIT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        if !(table_id::EIT_PF_ACTUAL..=0x6F).contains(&section.header.table_id) {
            return Err("Not an EIT section");
        }

        let data = section.data;
        if data.len() < 6 {
            return Err("EIT data too short");
        }

        let mut eit = EitTable {
            table_id: section.header.table_id,
            service_id: section.header.table_id_extension,
            transport_stream_id: u16::from_be_bytes([data[0], data[1]]),
            original_network_id: u16::from_be_bytes([data[2], data[3]]),
            version_number: section.header.version_number,
            section_number: section.header.section_number,
            events: Vec::new(),
        };

        let mut offset = 6;
        while offset + 12 <= data.len() {
            let event = &data[offset..];
            let descriptors_length = ((event[10] as usize & 0x0F) << 8) | event[11] as usize;
            offset += 12;

            if offset + descriptors_length > data.len() {
                break;
            }
            let descriptors = &data[offset..offset + descriptors_length];
            offset += descriptors_length;

            eit.events.push(EitEvent {
                event_id: u16::from_be_bytes([event[0], event[1]]),
                start_time: decode_mjd_time(&event[2..7]),
                duration: decode_bcd_duration(&event[7..10]),
                running_status: (event[10] >> 5) & 0x07,
                free_ca_mode: event[10] & 0x10 != 0,
                short_event: find_descriptor(descriptors, descriptor_tag::SHORT_EVENT)
                    .and_then(|d| ShortEventDescriptor::parse(d).ok()),
            });
        }

        Ok(eit)
    }

    /// Present/following table of the stream it was received in.
    pub fn is_actual_present_following(&self) -> bool {
        self.table_id == table_id::EIT_PF_ACTUAL
    }

    /// The event on air, when this is the "present" section.
    pub fn present_event(&self) -> Option<&EitEvent> {
        if self.is_actual_present_following() && self.section_number == 0 {
            self.events.first()
        } else {
            None
        }
    }
}
