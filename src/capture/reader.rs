use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use pcap::{Capture, Offline};
use std::path::{Path, PathBuf};

use crate::capture::parser::{LinkKind, PacketParser};
use crate::models::packet::Packet;
use crate::utils::error::{AppError, AppResult};

/// A finite, ordered stream of decoded packets. `Ok(None)` marks the end.
pub trait PacketSource {
    fn next_packet(&mut self) -> AppResult<Option<Packet>>;
}

impl PacketSource for std::vec::IntoIter<Packet> {
    fn next_packet(&mut self) -> AppResult<Option<Packet>> {
        Ok(self.next())
    }
}

/// Packets read back from a pcap file
pub struct PcapFileSource {
    path: PathBuf,
    capture: Capture<Offline>,
    /// None when the link type is not supported; packets are then only counted
    parser: Option<PacketParser>,
    decode_errors: u64,
}

impl PcapFileSource {
    /// Open a capture file
    pub fn open(path: &Path) -> AppResult<Self> {
        if !path.is_file() {
            return Err(AppError::CaptureFileMissing(path.to_path_buf()));
        }

        let capture = Capture::from_file(path).map_err(|source| AppError::CaptureOpen {
            path: path.to_path_buf(),
            source,
        })?;

        let linktype = capture.get_datalink();
        let parser = match LinkKind::from_linktype(linktype.0) {
            Some(link) => {
                info!("Reading {} ({:?} framing)", path.display(), link);
                Some(PacketParser::new(link))
            }
            None => {
                warn!(
                    "Unsupported link type {} in {}, packets will be counted but not decoded",
                    linktype.0,
                    path.display()
                );
                None
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            capture,
            parser,
            decode_errors: 0,
        })
    }

    /// Frames that could not be decoded so far
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }
}

impl PacketSource for PcapFileSource {
    fn next_packet(&mut self) -> AppResult<Option<Packet>> {
        let raw = match self.capture.next_packet() {
            Ok(raw) => raw,
            Err(pcap::Error::NoMorePackets) => return Ok(None),
            Err(source) => {
                return Err(AppError::CaptureOpen {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let ts = raw.header.ts;
        let timestamp = record_timestamp(ts.tv_sec as i64, ts.tv_usec as i64).ok_or_else(|| {
            AppError::CaptureOpen {
                path: self.path.clone(),
                source: pcap::Error::PcapError(format!(
                    "record has an invalid timestamp ({}s {}us)",
                    ts.tv_sec, ts.tv_usec
                )),
            }
        })?;

        let packet = match &self.parser {
            Some(parser) => match parser.parse_packet(raw.data, timestamp) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!("Undecodable frame of {} bytes: {}", raw.data.len(), e);
                    self.decode_errors += 1;
                    Packet::opaque(timestamp, raw.data.len())
                }
            },
            None => Packet::opaque(timestamp, raw.data.len()),
        };

        Ok(Some(packet))
    }
}

/// Record time from a pcap header; `None` when the fields are out of range
fn record_timestamp(secs: i64, usecs: i64) -> Option<DateTime<Utc>> {
    if !(0..1_000_000).contains(&usecs) {
        return None;
    }
    DateTime::from_timestamp(secs, u32::try_from(usecs * 1000).ok()?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capture::parser::tests::ethernet_tcp_frame;
    use pcap::{Linktype, PacketHeader};

    /// Write a capture file through libpcap, one `(secs, usecs, frame)` record each
    pub(crate) fn write_records(path: &Path, linktype: u32, records: &[(u32, u32, Vec<u8>)]) {
        let dead = Capture::dead(Linktype(linktype as i32)).unwrap();
        let mut savefile = dead.savefile(path).unwrap();
        for (secs, usecs, frame) in records {
            let header = PacketHeader {
                ts: libc::timeval {
                    tv_sec: *secs as _,
                    tv_usec: *usecs as _,
                },
                caplen: frame.len() as u32,
                len: frame.len() as u32,
            };
            savefile.write(&pcap::Packet::new(&header, frame));
        }
        savefile.flush().unwrap();
    }

    /// Capture file with every frame stamped a quarter second past `secs`
    pub(crate) fn write_pcap(path: &Path, linktype: u32, frames: &[(u32, Vec<u8>)]) {
        let records: Vec<_> = frames
            .iter()
            .map(|(secs, frame)| (*secs, 250_000, frame.clone()))
            .collect();
        write_records(path, linktype, &records);
    }

    #[test]
    fn reads_packets_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.pcap");
        write_pcap(
            &path,
            1,
            &[
                (1_700_000_000, ethernet_tcp_frame([10, 0, 0, 5], 22133, b"get a/open\r\n")),
                (1_700_000_001, vec![0u8; 8]),
                (1_700_000_002, ethernet_tcp_frame([10, 0, 0, 6], 22133, b"get b/open\r\n")),
            ],
        );

        let mut source = PcapFileSource::open(&path).unwrap();
        let first = source.next_packet().unwrap().unwrap();
        let second = source.next_packet().unwrap().unwrap();
        let third = source.next_packet().unwrap().unwrap();
        assert!(source.next_packet().unwrap().is_none());

        assert_eq!(first.payload_bytes(), b"get a/open\r\n");
        assert_eq!(first.timestamp.timestamp_subsec_millis(), 250);
        assert!(!second.has_tcp_payload());
        assert_eq!(third.source_ip, Some("10.0.0.6".parse().unwrap()));
        assert!(first.timestamp < third.timestamp);
        assert_eq!(source.decode_errors(), 1);
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = PcapFileSource::open(&dir.path().join("absent.pcap")).err().unwrap();
        assert!(matches!(err, AppError::CaptureFileMissing(_)));
    }

    #[test]
    fn garbage_file_cannot_be_opened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pcap");
        std::fs::write(&path, b"this is not a capture file at all").unwrap();

        let err = PcapFileSource::open(&path).err().unwrap();
        assert!(matches!(err, AppError::CaptureOpen { .. }));
    }

    #[test]
    fn record_timestamps_are_range_checked() {
        let ts = record_timestamp(1_700_000_000, 250_000).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_micros(), 250_000);

        assert!(record_timestamp(0, 1_000_000).is_none());
        assert!(record_timestamp(0, -16).is_none());
        assert!(record_timestamp(i64::MAX, 0).is_none());
    }

    #[test]
    fn corrupt_record_time_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.pcap");
        write_records(
            &path,
            1,
            &[
                (1_700_000_000, 250_000, ethernet_tcp_frame([10, 0, 0, 5], 22133, b"get a/open\r\n")),
                (1_700_000_001, 0xFFFF_FFF0, ethernet_tcp_frame([10, 0, 0, 5], 22133, b"get a/open\r\n")),
            ],
        );

        let mut source = PcapFileSource::open(&path).unwrap();
        assert!(source.next_packet().unwrap().is_some());
        let err = source.next_packet().err().unwrap();
        assert!(matches!(err, AppError::CaptureOpen { .. }));
        assert_eq!(err.exit_code(), 9);
    }

    #[test]
    fn in_memory_sources_end_normally() {
        let mut source = vec![Packet::opaque(Utc::now(), 60)].into_iter();
        assert!(source.next_packet().unwrap().is_some());
        assert!(source.next_packet().unwrap().is_none());
    }
}
