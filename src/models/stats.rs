use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::net::IpAddr;

use crate::models::operation::{OpCounts, Operation};

/// Per-key operation counters (keyed by host address or queue name)
#[derive(Debug, Clone)]
pub struct TallyBucket<K: Hash + Eq> {
    counts: HashMap<K, OpCounts>,
}

impl<K: Hash + Eq> Default for TallyBucket<K> {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq + Ord + Clone> TallyBucket<K> {
    /// Counters for `key`, inserting a zeroed set on first observation
    pub fn entry(&mut self, key: K) -> &mut OpCounts {
        self.counts.entry(key).or_insert_with(OpCounts::default)
    }

    pub fn increment(&mut self, key: K, op: Operation) {
        self.entry(key).increment(op);
    }

    pub fn get(&self, key: &K) -> Option<&OpCounts> {
        self.counts.get(key)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Entries sorted ascending by key
    pub fn sorted(&self) -> Vec<(&K, &OpCounts)> {
        let mut entries: Vec<_> = self.counts.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

/// Totals over every data packet, split by the content filter outcome
#[derive(Debug, Clone, Default)]
pub struct TotalsBucket {
    pub all: OpCounts,
    pub matched: OpCounts,
    pub filtered: OpCounts,
}

/// Everything learned from one capture
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Every packet read from the capture
    pub count_total: u64,

    /// TCP packets carrying a payload
    pub count_with_data: u64,

    /// Data packets rejected by the content filter
    pub count_filtered: u64,

    /// Data packets accepted by the content filter
    pub count_matched: u64,

    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub first_matched: Option<DateTime<Utc>>,
    pub last_matched: Option<DateTime<Utc>>,

    pub totals: TotalsBucket,

    /// Matched packets per source address
    pub per_host: TallyBucket<IpAddr>,

    /// Matched packets per queue name
    pub per_queue: TallyBucket<String>,

    /// Enqueue sizes per queue, in arrival order
    pub sizes: HashMap<String, Vec<u64>>,

    /// Queues with a `set` whose size could not be parsed
    pub parse_failures: BTreeSet<String>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues with size samples, sorted by name, each with an ascending copy of its samples
    pub fn sorted_sizes(&self) -> Vec<(&String, Vec<u64>)> {
        let mut queues: Vec<_> = self
            .sizes
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(queue, samples)| {
                let mut sorted = samples.clone();
                sorted.sort_unstable();
                (queue, sorted)
            })
            .collect();
        queues.sort_by(|a, b| a.0.cmp(b.0));
        queues
    }
}
