use chrono::{DateTime, Utc};
use log::{log_enabled, trace, Level};
use regex::bytes::Regex;
use std::net::IpAddr;

use crate::analysis::classifier::{self, Classification};
use crate::models::operation::Operation;
use crate::models::packet::Packet;
use crate::models::stats::RunStats;

/// Folds packets from one capture into a `RunStats`, in stream order
pub struct Aggregator {
    stats: RunStats,
    filter: Option<Regex>,
    track_sizes: bool,
}

impl Aggregator {
    /// Create an aggregator with an optional content filter
    pub fn new(filter: Option<Regex>, track_sizes: bool) -> Self {
        Self {
            stats: RunStats::new(),
            filter,
            track_sizes,
        }
    }

    /// Read-only view of the accumulated statistics
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn into_stats(self) -> RunStats {
        self.stats
    }

    /// Account for one packet from the source
    pub fn observe(&mut self, packet: &Packet) {
        self.record_packet(packet.timestamp);

        if !packet.has_tcp_payload() {
            return;
        }
        let source = match packet.source_ip {
            Some(ip) => ip,
            None => return,
        };

        let payload = packet.payload_bytes();
        let classification = classifier::classify(payload);
        let matched = self.matches_filter(payload);
        self.record_data_packet(&classification, source, packet.timestamp, payload, matched);
    }

    /// Whether the payload passes the content filter; no filter passes everything
    pub fn matches_filter(&self, payload: &[u8]) -> bool {
        self.filter.as_ref().map_or(true, |re| re.is_match(payload))
    }

    /// Count any packet and widen the capture time bounds
    pub fn record_packet(&mut self, timestamp: DateTime<Utc>) {
        let stats = &mut self.stats;
        stats.count_total += 1;
        if stats.first_seen.is_none() {
            stats.first_seen = Some(timestamp);
        }
        stats.last_seen = Some(timestamp);
    }

    /// Count a classified data packet under the totals and, when it passed the filter,
    /// under its host, its queue and the queue's size samples
    pub fn record_data_packet(
        &mut self,
        classification: &Classification,
        source: IpAddr,
        timestamp: DateTime<Utc>,
        payload: &[u8],
        matched: bool,
    ) {
        let op = classification.operation;
        let stats = &mut self.stats;

        stats.count_with_data += 1;
        stats.totals.all.increment(op);

        if !matched {
            stats.count_filtered += 1;
            stats.totals.filtered.increment(op);
            return;
        }

        stats.count_matched += 1;
        stats.totals.matched.increment(op);
        stats.per_host.increment(source, op);
        if stats.first_matched.is_none() {
            stats.first_matched = Some(timestamp);
        }
        stats.last_matched = Some(timestamp);

        let queue = match &classification.queue {
            Some(queue) => queue,
            None => return,
        };
        stats.per_queue.increment(queue.clone(), op);

        if self.track_sizes && op == Operation::Set {
            match classifier::parse_set_size(payload) {
                Some(size) => stats.sizes.entry(queue.clone()).or_default().push(size),
                None => {
                    if log_enabled!(Level::Trace) {
                        trace!("Unparseable set for queue {} from {}", queue, source);
                    }
                    stats.parse_failures.insert(queue.clone());
                }
            }
        }
    }
}
