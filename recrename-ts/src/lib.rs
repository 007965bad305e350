//! MPEG-TS packet and ARIB PSI/SI section decoder.
//!
//! This crate turns the raw bytes of a recorded ISDB transport stream into
//! typed packet and section records, and pushes them into a [`TsSink`].
//!
//! # Supported Tables
//! - PAT (Program Association Table) - PID 0x0000
//! - SDT (Service Description Table) - PID 0x0011
//! - EIT present/following (Event Information Table) - PID 0x0012
//! - TDT / TOT (Time and Date / Time Offset Table) - PID 0x0014
//! - SIT (Selection Information Table) - PID 0x001F, partial TS recordings
//!
//! # Usage
//! ```ignore
//! use recrename_ts::{DecoderConfig, TsDecoder, TsSink};
//!
//! let mut decoder = TsDecoder::new(DecoderConfig::default());
//! if decoder.feed(&chunk, &mut sink).is_break() {
//!     // the sink asked to stop
//! }
//! ```

pub mod arib;
mod decoder;
mod descriptors;
mod eit;
mod packet;
mod pat;
mod psi;
mod sdt;
mod sit;
pub mod time;

pub use decoder::{DecodedPacket, DecodedSection, DecoderConfig, TsDecoder, TsSink};
pub use descriptors::{
    find_descriptor, parse_descriptor_loop, PartialTsTimeDescriptor, ServiceDescriptor,
    ShortEventDescriptor,
};
pub use eit::{EitEvent, EitTable};
pub use packet::{AdaptationField, PacketFormat, TsHeader, TsPacket, SYNC_BYTE, TS_PACKET_SIZE};
pub use pat::{PatEntry, PatTable};
pub use psi::{crc32_mpeg2, PsiHeader, PsiSection, SectionCollector};
pub use sdt::{SdtService, SdtTable};
pub use sit::{SitService, SitTable};
pub use time::{TdtTable, TotTable};

/// Well-known PIDs in MPEG-TS.
pub mod pid {
    /// Program Association Table PID.
    pub const PAT: u16 = 0x0000;
    /// Service Description Table (actual) PID.
    pub const SDT: u16 = 0x0011;
    /// Event Information Table PID.
    pub const EIT: u16 = 0x0012;
    /// Time and Date Table PID.
    pub const TDT: u16 = 0x0014;
    /// Selection Information Table PID (partial transport streams).
    pub const SIT: u16 = 0x001F;
    /// Event Information Table PID used by some terrestrial broadcasters.
    pub const EIT_TERRESTRIAL_H: u16 = 0x0026;
    /// Event Information Table PID used by some terrestrial broadcasters.
    pub const EIT_TERRESTRIAL_M: u16 = 0x0027;
    /// Null packet PID (stuffing).
    pub const NULL: u16 = 0x1FFF;
}

/// Table IDs for PSI/SI tables.
pub mod table_id {
    /// Program Association Section.
    pub const PAT: u8 = 0x00;
    /// Service Description Section - actual.
    pub const SDT_ACTUAL: u8 = 0x42;
    /// Service Description Section - other.
    pub const SDT_OTHER: u8 = 0x46;
    /// Event Information Section - actual, present/following.
    pub const EIT_PF_ACTUAL: u8 = 0x4E;
    /// Event Information Section - other, present/following.
    pub const EIT_PF_OTHER: u8 = 0x4F;
    /// Time and Date Section.
    pub const TDT: u8 = 0x70;
    /// Time Offset Section.
    pub const TOT: u8 = 0x73;
    /// Selection Information Section.
    pub const SIT: u8 = 0x7F;
}

/// Descriptor tags used in PSI/SI tables.
pub mod descriptor_tag {
    /// Service descriptor.
    pub const SERVICE: u8 = 0x48;
    /// Short event descriptor.
    pub const SHORT_EVENT: u8 = 0x4D;
    /// Partial transport stream time descriptor (ISDB).
    pub const PARTIAL_TS_TIME: u8 = 0xC3;
}
