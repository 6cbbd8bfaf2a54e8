pub mod aggregator;
pub mod classifier;
pub mod percentile;
pub mod report;

use log::debug;

use crate::capture::reader::PacketSource;
use crate::models::stats::RunStats;
use crate::utils::error::AppResult;
use aggregator::Aggregator;

/// Drain a packet source into the aggregator, preserving source order
pub fn analyze<S: PacketSource>(source: &mut S, mut aggregator: Aggregator) -> AppResult<RunStats> {
    while let Some(packet) = source.next_packet()? {
        aggregator.observe(&packet);
    }

    let stats = aggregator.into_stats();
    debug!(
        "Analyzed {} packets ({} with data, {} matched)",
        stats.count_total, stats.count_with_data, stats.count_matched
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::parser::tests::ethernet_tcp_frame;
    use crate::capture::reader::tests::write_pcap;
    use crate::capture::reader::PcapFileSource;
    use crate::models::operation::Operation;

    #[test]
    fn capture_file_to_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q1.pcap");
        write_pcap(
            &path,
            1,
            &[
                (1_700_000_000, ethernet_tcp_frame([10, 0, 0, 5], 22133, b"set jobs 0 0 5\r\nhello\r\n")),
                (1_700_000_001, ethernet_tcp_frame([10, 0, 0, 6], 22133, b"get jobs/t=500\r\n")),
                (1_700_000_002, ethernet_tcp_frame([10, 0, 0, 6], 22133, b"")),
            ],
        );

        let mut source = PcapFileSource::open(&path).unwrap();
        let stats = analyze(&mut source, Aggregator::new(None, true)).unwrap();

        assert_eq!(stats.count_total, 3);
        assert_eq!(stats.count_with_data, 2);
        assert_eq!(stats.totals.matched[Operation::Set], 1);
        assert_eq!(stats.totals.matched[Operation::Get], 1);
        assert_eq!(stats.sizes["jobs"], vec![5]);
    }
}
