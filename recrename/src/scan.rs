//! Feeding a byte range of a recording through the decoder.

use std::io::SeekFrom;
use std::ops::{ControlFlow, Range};
use std::path::Path;

use log::trace;
use recrename_ts::{DecoderConfig, PacketFormat, TsDecoder, TsSink};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{RenameError, Result};

/// Upper bound of one read, before rounding down to whole packets.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Summary of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// The sink asked to stop before the end of the range.
    pub stopped: bool,
    /// Bytes read from the range.
    pub bytes_read: u64,
    /// Packets handed to the sink.
    pub packets: u64,
}

/// Round `offset` down to a packet boundary.
pub fn align_to_packet(offset: u64, format: PacketFormat) -> u64 {
    let unit = format.unit_size() as u64;
    offset - offset % unit
}

fn chunk_size(format: PacketFormat) -> usize {
    let unit = format.unit_size();
    (CHUNK_SIZE / unit).max(1) * unit
}

/// Read `range` of `path` in bounded chunks and push it through a decoder
/// into `sink`. `progress` receives (bytes read, range length) after every
/// chunk.
pub async fn scan_file<S, P>(
    path: &Path,
    range: Range<u64>,
    format: PacketFormat,
    sections: bool,
    sink: &mut S,
    mut progress: P,
) -> Result<ScanOutcome>
where
    S: TsSink + ?Sized,
    P: FnMut(u64, u64),
{
    let read_error = |source| RenameError::ReadInput {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).await.map_err(read_error)?;
    file.seek(SeekFrom::Start(range.start)).await.map_err(read_error)?;

    let total = range.end.saturating_sub(range.start);
    let mut decoder = TsDecoder::new(DecoderConfig { format, sections });
    let mut buffer = vec![0u8; chunk_size(format)];
    let mut bytes_read = 0u64;
    let mut stopped = false;

    while bytes_read < total {
        let want = (total - bytes_read).min(buffer.len() as u64) as usize;
        let n = file.read(&mut buffer[..want]).await.map_err(read_error)?;
        if n == 0 {
            break;
        }
        bytes_read += n as u64;

        let flow = decoder.feed(&buffer[..n], sink);
        progress(bytes_read, total);
        if let ControlFlow::Break(()) = flow {
            stopped = true;
            break;
        }
    }

    trace!(
        "Scanned {} bytes ({} packets) of {} from offset {}",
        bytes_read,
        decoder.packets_decoded(),
        path.display(),
        range.start
    );

    Ok(ScanOutcome {
        stopped,
        bytes_read,
        packets: decoder.packets_decoded(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use recrename_ts::{DecodedPacket, SYNC_BYTE};
    use std::io::Write;

    /// A 188-byte packet with a payload on `pid`.
    pub(crate) fn payload_packet(pid: u16, cc: u8) -> [u8; 188] {
        let mut packet = [0xFFu8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = (pid >> 8) as u8 & 0x1F;
        packet[2] = pid as u8;
        packet[3] = 0x10 | (cc & 0x0F);
        packet
    }

    /// A 188-byte adaptation-only packet carrying a PCR.
    pub(crate) fn pcr_packet(pid: u16, pcr_base: u64) -> [u8; 188] {
        let mut packet = [0xFFu8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = (pid >> 8) as u8 & 0x1F;
        packet[2] = pid as u8;
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

    /// Split one PSI section into packets on `pid`.
    pub(crate) fn section_packets(pid: u16, section: &[u8], cc: u8) -> Vec<[u8; 188]> {
        let mut stream = vec![0u8];
        stream.extend_from_slice(section);

        stream
            .chunks(184)
            .enumerate()
            .map(|(i, chunk)| {
                let mut packet = payload_packet(pid, cc.wrapping_add(i as u8));
                if i == 0 {
                    packet[1] |= 0x40;
                }
                packet[4..4 + chunk.len()].copy_from_slice(chunk);
                packet
            })
            .collect()
    }

    pub(crate) fn write_packets(packets: &[[u8; 188]]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".ts").tempfile().unwrap();
        for packet in packets {
            file.write_all(packet).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[derive(Default)]
    struct Counter {
        packets: Vec<u16>,
        stop_after: Option<usize>,
    }

    impl TsSink for Counter {
        fn on_packet(&mut self, packet: &DecodedPacket) -> ControlFlow<()> {
            self.packets.push(packet.pid);
            match self.stop_after {
                Some(limit) if self.packets.len() >= limit => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        }
    }

    #[test]
    fn test_align_and_chunk() {
        assert_eq!(align_to_packet(1000, PacketFormat::TS), 940);
        assert_eq!(align_to_packet(384, PacketFormat::M2TS), 384);
        assert_eq!(chunk_size(PacketFormat::TS) % 188, 0);
        assert!(chunk_size(PacketFormat::FEC) <= CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_scan_range_and_progress() {
        let packets: Vec<_> = (0..10u16).map(|i| payload_packet(0x100 + i, 0)).collect();
        let file = write_packets(&packets);

        let mut sink = Counter::default();
        let mut reports = Vec::new();
        let outcome = scan_file(
            file.path(),
            188 * 4..188 * 10,
            PacketFormat::TS,
            false,
            &mut sink,
            |done, total| reports.push((done, total)),
        )
        .await
        .unwrap();

        assert!(!outcome.stopped);
        assert_eq!(outcome.packets, 6);
        assert_eq!(sink.packets.first(), Some(&0x104));
        assert_eq!(reports.last(), Some(&(188 * 6, 188 * 6)));
    }

    #[tokio::test]
    async fn test_scan_stops_on_break() {
        let packets: Vec<_> = (0..10u16).map(|i| payload_packet(0x100, i as u8)).collect();
        let file = write_packets(&packets);

        let mut sink = Counter {
            stop_after: Some(3),
            ..Default::default()
        };
        let outcome = scan_file(file.path(), 0..188 * 10, PacketFormat::TS, false, &mut sink, |_, _| {})
            .await
            .unwrap();

        assert!(outcome.stopped);
        assert_eq!(sink.packets.len(), 3);
    }

    #[tokio::test]
    async fn test_scan_missing_file() {
        let mut sink = Counter::default();
        let err = scan_file(
            Path::new("/nonexistent/recording.ts"),
            0..188,
            PacketFormat::TS,
            false,
            &mut sink,
            |_, _| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RenameError::ReadInput { .. }));
    }
}
