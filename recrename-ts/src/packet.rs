//! MPEG-TS packet parsing.
//!
//! Recordings come in three container flavours: plain 188-byte packets,
//! 192-byte BDAV units carrying a 4-byte timestamp prefix, and 204-byte
//! units carrying 16 bytes of Reed-Solomon parity after the packet.

/// TS packet size in bytes.
pub const TS_PACKET_SIZE: usize = 188;

/// TS sync byte (0x47).
pub const SYNC_BYTE: u8 = 0x47;

/// Layout of one packet unit in the recorded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketFormat {
    unit_size: usize,
}

impl PacketFormat {
    /// Plain 188-byte packets.
    pub const TS: Self = Self { unit_size: 188 };
    /// 192-byte units with a 4-byte timestamp in front of every packet.
    pub const M2TS: Self = Self { unit_size: 192 };
    /// 204-byte units with 16 parity bytes after every packet.
    pub const FEC: Self = Self { unit_size: 204 };

    /// Look up the format for a unit size, `None` for anything but 188/192/204.
    pub fn from_unit_size(unit_size: usize) -> Option<Self> {
        match unit_size {
            188 => Some(Self::TS),
            192 => Some(Self::M2TS),
            204 => Some(Self::FEC),
            _ => None,
        }
    }

    /// Size of one unit in the file.
    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    /// Offset of the sync byte inside one unit.
    pub fn sync_offset(&self) -> usize {
        if self.unit_size == 192 {
            4
        } else {
            0
        }
    }

    /// The 188-byte packet inside a unit starting at `unit[0]`.
    pub fn packet_of<'a>(&self, unit: &'a [u8]) -> Option<&'a [u8]> {
        let start = self.sync_offset();
        unit.get(start..start + TS_PACKET_SIZE)
    }
}

impl Default for PacketFormat {
    fn default() -> Self {
        Self::TS
    }
}

/// Parsed TS packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    /// Transport error indicator.
    pub transport_error: bool,
    /// Payload unit start indicator.
    pub payload_unit_start: bool,
    /// Packet Identifier (13 bits).
    pub pid: u16,
    /// Transport scrambling control (2 bits).
    pub scrambling_control: u8,
    /// Adaptation field control (2 bits).
    pub adaptation_field_control: u8,
    /// Continuity counter (4 bits).
    pub continuity_counter: u8,
}

impl TsHeader {
    /// Check if packet has adaptation field.
    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control & 0x02 != 0
    }

    /// Check if packet has payload.
    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0x01 != 0
    }

    /// Check if packet is scrambled.
    pub fn is_scrambled(&self) -> bool {
        self.scrambling_control != 0
    }
}

/// Adaptation field data, limited to what recording checks look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdaptationField {
    /// Adaptation field length.
    pub length: u8,
    /// Discontinuity indicator.
    pub discontinuity: bool,
    /// Random access indicator.
    pub random_access: bool,
    /// 33-bit PCR base (90 kHz), if present.
    pub pcr_base: Option<u64>,
    /// 9-bit PCR extension (27 MHz remainder), if present.
    pub pcr_extension: Option<u16>,
}

/// A parsed TS packet.
#[derive(Debug, Clone)]
pub struct TsPacket<'a> {
    /// Packet header.
    pub header: TsHeader,
    /// Adaptation field (if present).
    pub adaptation_field: Option<AdaptationField>,
    /// Payload data.
    pub payload: &'a [u8],
}

impl<'a> TsPacket<'a> {
    /// Parse a TS packet from the 188 bytes starting at the sync byte.
    pub fn parse(data: &'a [u8]) -> Result<Self, &'static str> {
        if data.len() < TS_PACKET_SIZE {
            return Err("Packet too short");
        }

        if data[0] != SYNC_BYTE {
            return Err("Invalid sync byte");
        }

        let header = TsHeader {
            transport_error: data[1] & 0x80 != 0,
            payload_unit_start: data[1] & 0x40 != 0,
            pid: ((data[1] as u16 & 0x1F) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_control: (data[3] >> 4) & 0x03,
            continuity_counter: data[3] & 0x0F,
        };

        let mut offset = 4;
        let adaptation_field = if header.has_adaptation_field() {
            let af_length = data[4] as usize;
            offset = 5 + af_length;

            let mut af = AdaptationField {
                length: data[4],
                ..Default::default()
            };

            if af_length > 0 {
                let flags = data[5];
                af.discontinuity = flags & 0x80 != 0;
                af.random_access = flags & 0x40 != 0;

                // flags byte + 6 PCR bytes
                if flags & 0x10 != 0 && af_length >= 7 {
                    let base = ((data[6] as u64) << 25)
                        | ((data[7] as u64) << 17)
                        | ((data[8] as u64) << 9)
                        | ((data[9] as u64) << 1)
                        | ((data[10] as u64) >> 7);
                    let ext = ((data[10] as u16 & 0x01) << 8) | data[11] as u16;
                    af.pcr_base = Some(base);
                    af.pcr_extension = Some(ext);
                }
            }

            Some(af)
        } else {
            None
        };

        let payload = if header.has_payload() && offset < TS_PACKET_SIZE {
            &data[offset..TS_PACKET_SIZE]
        } else {
            &[]
        };

        Ok(TsPacket {
            header,
            adaptation_field,
            payload,
        })
    }

    /// The 33-bit PCR base carried by this packet, if any.
    pub fn pcr(&self) -> Option<u64> {
        self.adaptation_field.and_then(|af| af.pcr_base)
    }

    /// Discontinuity indicator of the adaptation field.
    pub fn discontinuity(&self) -> bool {
        self.adaptation_field.map_or(false, |af| af.discontinuity)
    }
}
