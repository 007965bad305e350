//! SIT (Selection Information Table) parsing.
//!
//! Partial transport streams written by BS/CS recorders replace the EIT
//! and SDT with a SIT: each service entry carries its service descriptor,
//! the short event descriptor of the current program and a partial TS time
//! descriptor holding the event start time and duration.

use super::descriptors::{
    find_descriptor, PartialTsTimeDescriptor, ServiceDescriptor, ShortEventDescriptor,
};
use super::psi::PsiSection;
use super::{descriptor_tag, table_id};

/// Service entry in the SIT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitService {
    /// Service ID.
    pub service_id: u16,
    /// Running status.
    pub running_status: u8,
    /// Service descriptor, if present.
    pub service_descriptor: Option<ServiceDescriptor>,
    /// Short event descriptor of the current event, if present.
    pub short_event: Option<ShortEventDescriptor>,
    /// Partial TS time descriptor, if present.
    pub partial_ts_time: Option<PartialTsTimeDescriptor>,
}

/// Parsed SIT section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitTable {
    /// Version number.
    pub version_number: u8,
    /// Transmission info descriptor loop, raw.
    pub transmission_info: Vec<u8>,
    /// Services.
    pub services: Vec<SitService>,
}

impl SitTable {
    /// Parse a SIT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        if section.header.table_id != table_id::SIT {
            return Err("Not a SIT section");
        }

        let data = section.data;
        if data.len() < 2 {
            return Err("SIT data too short");
        }

        let info_length = ((data[0] as usize & 0x0F) << 8) | data[1] as usize;
        if 2 + info_length > data.len() {
            return Err("Invalid transmission info length");
        }

        let mut sit = SitTable {
            version_number: section.header.version_number,
            transmission_info: data[2..2 + info_length].to_vec(),
            services: Vec::new(),
        };

        let mut offset = 2 + info_length;
        while offset + 4 <= data.len() {
            let service_id = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let running_status = (data[offset + 2] >> 4) & 0x07;
            let loop_length = ((data[offset + 2] as usize & 0x0F) << 8) | data[offset + 3] as usize;
            offset += 4;

            if offset + loop_length > data.len() {
                break;
            }
            let descriptors = &data[offset..offset + loop_length];
            offset += loop_length;

            sit.services.push(SitService {
                service_id,
                running_status,
                service_descriptor: find_descriptor(descriptors, descriptor_tag::SERVICE)
                    .and_then(|d| ServiceDescriptor::parse(d).ok()),
                short_event: find_descriptor(descriptors, descriptor_tag::SHORT_EVENT)
                    .and_then(|d| ShortEventDescriptor::parse(d).ok()),
                partial_ts_time: find_descriptor(descriptors, descriptor_tag::PARTIAL_TS_TIME)
                    .and_then(|d| PartialTsTimeDescriptor::parse(d).ok()),
            });
        }

        Ok(sit)
    }
}
