//! SDT (Service Description Table) parsing.
//!
//! The SDT is transmitted on PID 0x0011 and carries the original network ID
//! together with the display name of each service.

use super::descriptors::{find_descriptor, ServiceDescriptor};
use super::psi::PsiSection;
use super::{descriptor_tag, table_id};

/// Service entry in the SDT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdtService {
    /// Service ID (program number).
    pub service_id: u16,
    /// EIT present/following flag.
    pub eit_present_following_flag: bool,
    /// Running status.
    pub running_status: u8,
    /// Free CA mode.
    pub free_ca_mode: bool,
    /// Parsed service descriptor.
    pub service_descriptor: Option<ServiceDescriptor>,
}

impl SdtService {
    /// Service name from the service descriptor.
    pub fn service_name(&self) -> Option<&str> {
        self.service_descriptor
            .as_ref()
            .map(|d| d.service_name.as_str())
    }
}

/// Parsed SDT (Service Description Table).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdtTable {
    /// Whether this describes the stream it was received in (0x42).
    pub actual: bool,
    /// Transport stream ID.
    pub transport_stream_id: u16,
    /// Original network ID.
    pub original_network_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Section number.
    pub section_number: u8,
    /// Services.
    pub services: Vec<SdtService>,
}

impl SdtTable {
    /// Parse a SDT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        let actual = match section.header.table_id {
            table_id::SDT_ACTUAL => true,
            table_id::SDT_OTHER => false,
            _ => return Err("Not a SDT section"),
        };

        let data = section.data;
        if data.len() < 3 {
            return Err("SDT data too short");
        }

        let mut sdt = SdtTable {
            actual,
            transport_stream_id: section.header.table_id_extension,
            original_network_id: u16::from_be_bytes([data[0], data[1]]),
            version_number: section.header.version_number,
            section_number: section.header.section_number,
            services: Vec::new(),
        };

        // data[2] is reserved
        let mut offset = 3;
        while offset + 5 <= data.len() {
            let service_id = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let eit_present_following_flag = data[offset + 2] & 0x01 != 0;
            let running_status = (data[offset + 3] >> 5) & 0x07;
            let free_ca_mode = data[offset + 3] & 0x10 != 0;
            let descriptors_length =
                ((data[offset + 3] as usize & 0x0F) << 8) | data[offset + 4] as usize;

            offset += 5;

            if offset + descriptors_length > data.len() {
                break;
            }

            let descriptors = &data[offset..offset + descriptors_length];
            offset += descriptors_length;

            sdt.services.push(SdtService {
                service_id,
                eit_present_following_flag,
                running_status,
                free_ca_mode,
                service_descriptor: find_descriptor(descriptors, descriptor_tag::SERVICE)
                    .and_then(|d| ServiceDescriptor::parse(d).ok()),
            });
        }

        Ok(sdt)
    }

    /// Find service by service ID.
    pub fn find_service(&self, service_id: u16) -> Option<&SdtService> {
        self.services.iter().find(|s| s.service_id == service_id)
    }
}
