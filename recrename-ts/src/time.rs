//! ARIB date/time encoding and the TDT/TOT tables.
//!
//! Broadcast times are 40-bit fields: a 16-bit Modified Julian Date followed
//! by six BCD digits `hhmmss`, always in JST. Durations are six BCD digits.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, TimeZone};

use super::psi::PsiSection;
use super::table_id;

/// Offset of JST from UTC, in seconds.
pub const JST_OFFSET_SECS: i32 = 9 * 3600;

/// The JST (+09:00) offset all ARIB times are expressed in.
pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).expect("JST offset is within +-24h")
}

fn bcd(byte: u8) -> Option<u32> {
    let (high, low) = (byte >> 4, byte & 0x0F);
    (high <= 9 && low <= 9).then(|| (high * 10 + low) as u32)
}

/// Decode a 40-bit MJD + BCD time. `None` when undefined (all ones) or invalid.
pub fn decode_mjd_time(data: &[u8]) -> Option<DateTime<FixedOffset>> {
    let data = data.get(..5)?;
    if data.iter().all(|&b| b == 0xFF) {
        return None;
    }

    let mjd = ((data[0] as u64) << 8) | data[1] as u64;
    let date = NaiveDate::from_ymd_opt(1858, 11, 17)?.checked_add_days(Days::new(mjd))?;
    let time = NaiveTime::from_hms_opt(bcd(data[2])?, bcd(data[3])?, bcd(data[4])?)?;

    jst().from_local_datetime(&date.and_time(time)).single()
}

/// Decode a 24-bit BCD `hhmmss` duration into seconds. `None` when undefined.
pub fn decode_bcd_duration(data: &[u8]) -> Option<u32> {
    let data = data.get(..3)?;
    if data.iter().all(|&b| b == 0xFF) {
        return None;
    }

    Some(bcd(data[0])? * 3600 + bcd(data[1])? * 60 + bcd(data[2])?)
}

/// Parsed TDT (Time and Date Table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TdtTable {
    /// Current time in JST.
    pub jst_time: DateTime<FixedOffset>,
}

impl TdtTable {
    /// Parse a TDT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        if section.header.table_id != table_id::TDT {
            return Err("Not a TDT section");
        }

        let jst_time = decode_mjd_time(section.data).ok_or("Invalid TDT time")?;
        Ok(TdtTable { jst_time })
    }
}

/// Parsed TOT (Time Offset Table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotTable {
    /// Current time in JST.
    pub jst_time: DateTime<FixedOffset>,
    /// Descriptor loop (local time offset descriptors), raw.
    pub descriptors: Vec<u8>,
}

impl TotTable {
    /// Parse a TOT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        if section.header.table_id != table_id::TOT {
            return Err("Not a TOT section");
        }

        let data = section.data;
        if data.len() < 7 {
            return Err("TOT data too short");
        }

        let jst_time = decode_mjd_time(&data[..5]).ok_or("Invalid TOT time")?;
        let loop_length = ((data[5] as usize & 0x0F) << 8) | data[6] as usize;
        let end = (7 + loop_length).min(data.len());

        Ok(TotTable {
            jst_time,
            descriptors: data[7..end].to_vec(),
        })
    }
}
