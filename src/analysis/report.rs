use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use crate::analysis::percentile::{self, is_small_sample, percentile_label};
use crate::models::operation::{OpCounts, Operation};
use crate::models::stats::RunStats;

const COLUMN_WIDTH: usize = 7;
const SMALL_SAMPLE_MARKER: &str = "*";

/// Which report sections to render
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub summary: bool,
    pub hosts: bool,
    pub queues: bool,
    pub sizes: bool,
    /// Normalized (ascending, deduplicated) percentiles
    pub percentiles: Vec<f64>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            summary: true,
            hosts: true,
            queues: true,
            sizes: false,
            percentiles: vec![50.0, 90.0, 99.0],
        }
    }
}

/// Text report for one capture
pub struct Report<'a> {
    pub host: &'a str,
    pub stats: &'a RunStats,
    pub options: &'a ReportOptions,
    /// Display names for source addresses; unnamed addresses print numerically
    pub host_names: &'a HashMap<IpAddr, String>,
}

/// Render the report for one host's capture
pub fn render(
    host: &str,
    stats: &RunStats,
    options: &ReportOptions,
    host_names: &HashMap<IpAddr, String>,
) -> String {
    Report {
        host,
        stats,
        options,
        host_names,
    }
    .to_string()
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats;
        writeln!(f, "=== {} ===", self.host)?;
        writeln!(
            f,
            "{} packets, {} with data, {} matched, {} filtered",
            stats.count_total, stats.count_with_data, stats.count_matched, stats.count_filtered
        )?;

        if stats.count_matched == 0 {
            return Ok(());
        }

        if let (Some(first), Some(last)) = (stats.first_seen, stats.last_seen) {
            writeln!(f, "capture: {} to {} ({:.3}s)", timestamp(first), timestamp(last), seconds(first, last))?;
        }
        if let (Some(first), Some(last)) = (stats.first_matched, stats.last_matched) {
            let elapsed = seconds(first, last);
            write!(f, "matched: {} to {} ({:.3}s", timestamp(first), timestamp(last), elapsed)?;
            if elapsed > 0.0 {
                write!(f, ", {:.1} packets/s", stats.count_matched as f64 / elapsed)?;
            }
            writeln!(f, ")")?;
        }

        if self.options.summary {
            self.summary_table(f)?;
        }
        if self.options.hosts {
            self.host_table(f)?;
        }
        if self.options.queues {
            self.queue_table(f)?;
        }
        if self.options.sizes {
            self.size_table(f)?;
        }
        Ok(())
    }
}

impl Report<'_> {
    fn summary_table(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let totals = &self.stats.totals;
        let rows = [
            ("all".to_string(), &totals.all),
            ("matched".to_string(), &totals.matched),
            ("filtered".to_string(), &totals.filtered),
        ];
        writeln!(f)?;
        op_table(f, "packets", &rows)
    }

    fn host_table(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<(String, &OpCounts)> = self
            .stats
            .per_host
            .sorted()
            .into_iter()
            .map(|(addr, counts)| {
                let label = self
                    .host_names
                    .get(addr)
                    .cloned()
                    .unwrap_or_else(|| addr.to_string());
                (label, counts)
            })
            .collect();
        writeln!(f)?;
        op_table(f, "host", &rows)
    }

    fn queue_table(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<(String, &OpCounts)> = self
            .stats
            .per_queue
            .sorted()
            .into_iter()
            .map(|(queue, counts)| (queue.clone(), counts))
            .collect();
        writeln!(f)?;
        op_table(f, "queue", &rows)
    }

    fn size_table(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let percentiles = &self.options.percentiles;
        let queues = self.stats.sorted_sizes();

        let mut rows = Vec::with_capacity(queues.len());
        let mut small = Vec::new();
        for (queue, samples) in &queues {
            let mut label = (*queue).clone();
            if is_small_sample(samples.len()) {
                label.push_str(SMALL_SAMPLE_MARKER);
                small.push(queue.as_str());
            }
            rows.push((label, percentile::percentile_values(samples, percentiles)));
        }

        let headers: Vec<String> = percentiles.iter().map(|p| percentile_label(*p)).collect();
        writeln!(f)?;
        table_header(f, &headers, "enqueue size", rows.iter().map(|(l, _)| l.len()))?;
        for (label, values) in &rows {
            for value in values {
                write!(f, "{:>width$} ", value, width = COLUMN_WIDTH)?;
            }
            writeln!(f, "{}", label)?;
        }

        if !small.is_empty() {
            writeln!(
                f,
                "{} fewer than {} samples: {}",
                SMALL_SAMPLE_MARKER,
                percentile::SMALL_SAMPLE_COUNT,
                small.join(", ")
            )?;
        }
        if !self.stats.parse_failures.is_empty() {
            let failed: Vec<&str> = self.stats.parse_failures.iter().map(|q| q.as_str()).collect();
            writeln!(f, "unparseable set commands for: {}", failed.join(", "))?;
        }
        Ok(())
    }
}

/// Header row, then a divider sized to the widest label
fn table_header<I>(f: &mut fmt::Formatter<'_>, columns: &[String], label: &str, label_widths: I) -> fmt::Result
where
    I: Iterator<Item = usize>,
{
    for column in columns {
        write!(f, "{:>width$} ", column, width = COLUMN_WIDTH)?;
    }
    writeln!(f, "{}", label)?;

    let label_width = label_widths.fold(label.len(), usize::max);
    for _ in columns {
        write!(f, "{} ", "-".repeat(COLUMN_WIDTH))?;
    }
    writeln!(f, "{}", "-".repeat(label_width))
}

fn op_table(f: &mut fmt::Formatter<'_>, label: &str, rows: &[(String, &OpCounts)]) -> fmt::Result {
    let columns: Vec<String> = Operation::ALL.iter().map(|op| op.to_string()).collect();
    table_header(f, &columns, label, rows.iter().map(|(l, _)| l.len()))?;
    for (name, counts) in rows {
        for (_, count) in counts.iter() {
            write!(f, "{:>width$} ", count, width = COLUMN_WIDTH)?;
        }
        writeln!(f, "{}", name)?;
    }
    Ok(())
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

fn seconds(first: DateTime<Utc>, last: DateTime<Utc>) -> f64 {
    last.signed_duration_since(first).num_milliseconds() as f64 / 1000.0
}
