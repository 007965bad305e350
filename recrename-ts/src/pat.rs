//! PAT (Program Association Table) parsing.
//!
//! The PAT is transmitted on PID 0x0000. Besides the program list it is
//! where the transport stream ID of a recording comes from.

use super::psi::PsiSection;
use super::table_id;

/// A single PAT entry (program number and PMT PID).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    /// Program number, identical to the service ID.
    pub program_number: u16,
    /// PID of the PMT for this program.
    pub pid: u16,
}

/// Parsed PAT (Program Association Table).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatTable {
    /// Transport stream ID.
    pub transport_stream_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Programs in transmission order, NIT entry excluded.
    pub programs: Vec<PatEntry>,
    /// NIT PID (if present in PAT).
    pub nit_pid: Option<u16>,
}

impl PatTable {
    /// Parse a PAT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        if section.header.table_id != table_id::PAT {
            return Err("Not a PAT section");
        }

        let data = section.data;
        if data.len() % 4 != 0 {
            return Err("Invalid PAT data length");
        }

        let mut pat = PatTable {
            transport_stream_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            ..Default::default()
        };

        for chunk in data.chunks_exact(4) {
            let program_number = u16::from_be_bytes([chunk[0], chunk[1]]);
            let pid = ((chunk[2] as u16 & 0x1F) << 8) | chunk[3] as u16;

            if program_number == 0 {
                pat.nit_pid = Some(pid);
            } else {
                pat.programs.push(PatEntry {
                    program_number,
                    pid,
                });
            }
        }

        Ok(pat)
    }

    /// The first advertised service, which is the one a recording is named after.
    pub fn first_service_id(&self) -> Option<u16> {
        self.programs.first().map(|p| p.program_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::tests::long_section;

    #[test]
    fn test_parse_pat() {
        let raw = long_section(
            table_id::PAT,
            0x7FE1,
            0,
            &[
                // NIT: number=0x0000, PID=0x0010
                0x00, 0x00, 0xE0, 0x10,
                // Program 1: number=0x0400, PID=0x01F0
                0x04, 0x00, 0xE1, 0xF0,
                // Program 2: number=0x0401, PID=0x01F1
                0x04, 0x01, 0xE1, 0xF1,
            ],
        );
        let section = PsiSection::parse(&raw).unwrap();
        let pat = PatTable::parse(&section).unwrap();

        assert_eq!(pat.transport_stream_id, 0x7FE1);
        assert_eq!(pat.nit_pid, Some(0x0010));
        assert_eq!(pat.programs.len(), 2);
        assert_eq!(pat.programs[1], PatEntry { program_number: 0x0401, pid: 0x01F1 });
        assert_eq!(pat.first_service_id(), Some(0x0400));
    }

    #[test]
    fn test_pat_rejects_ragged_entries() {
        let raw = long_section(table_id::PAT, 1, 0, &[0x04, 0x00, 0xE1]);
        let section = PsiSection::parse(&raw).unwrap();
        assert!(PatTable::parse(&section).is_err());
    }

    #[test]
    fn test_pat_without_programs() {
        let raw = long_section(table_id::PAT, 1, 0, &[0x00, 0x00, 0xE0, 0x10]);
        let section = PsiSection::parse(&raw).unwrap();
        let pat = PatTable::parse(&section).unwrap();
        assert_eq!(pat.first_service_id(), None);
    }
}
