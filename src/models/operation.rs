use std::fmt;
use std::ops::{Index, IndexMut};

/// Queue protocol command categories, in report column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Set,
    Get,
    Monitor,
    Delete,
    Flush,
    Other,
}

impl Operation {
    /// All operations in column order
    pub const ALL: [Operation; 6] = [
        Operation::Set,
        Operation::Get,
        Operation::Monitor,
        Operation::Delete,
        Operation::Flush,
        Operation::Other,
    ];

    /// Protocol verb for this operation
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Set => "set",
            Operation::Get => "get",
            Operation::Monitor => "monitor",
            Operation::Delete => "delete",
            Operation::Flush => "flush",
            Operation::Other => "other",
        }
    }

    /// Look up an operation by its exact (case-sensitive) verb
    pub fn from_verb(verb: &[u8]) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str().as_bytes() == verb)
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One counter per operation. Always holds all six, zeroed on creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts([u64; 6]);

impl OpCounts {
    pub fn increment(&mut self, op: Operation) {
        self.0[op.index()] += 1;
    }

    /// Sum over all operations
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    /// Counters paired with their operation, in column order
    pub fn iter(&self) -> impl Iterator<Item = (Operation, u64)> + '_ {
        Operation::ALL.iter().map(move |op| (*op, self.0[op.index()]))
    }
}

impl Index<Operation> for OpCounts {
    type Output = u64;

    fn index(&self, op: Operation) -> &u64 {
        &self.0[op.index()]
    }
}

impl IndexMut<Operation> for OpCounts {
    fn index_mut(&mut self, op: Operation) -> &mut u64 {
        &mut self.0[op.index()]
    }
}
