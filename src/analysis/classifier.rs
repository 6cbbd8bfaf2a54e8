use lazy_static::lazy_static;
use log::{log_enabled, trace, Level};
use regex::bytes::Regex;

use crate::models::operation::Operation;

lazy_static! {
    /// `<verb> <queue>` followed by a space or slash, at the start of the payload
    static ref COMMAND: Regex =
        Regex::new(r"^([A-Za-z]+) ([A-Za-z0-9\-_$%+:]+)[ /]").expect("command pattern");

    /// A complete `set <queue> <flags> <expiry> <bytes>` line
    static ref SET_COMMAND: Regex =
        Regex::new(r"^set [A-Za-z0-9\-_$%+:]+ [0-9]+ [0-9]+ ([0-9]+)\r?\n").expect("set pattern");
}

/// Shape of the first command line in a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandShape<'a> {
    Matched { verb: &'a [u8], token: &'a [u8] },
    Unmatched,
}

/// Operation and queue a payload addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub operation: Operation,
    pub queue: Option<String>,
}

impl Classification {
    pub fn unmatched() -> Self {
        Self {
            operation: Operation::Other,
            queue: None,
        }
    }
}

/// Find the `<verb> <token>` prefix of a payload
pub fn command_shape(payload: &[u8]) -> CommandShape<'_> {
    match COMMAND.captures(payload) {
        Some(caps) => match (caps.get(1), caps.get(2)) {
            (Some(verb), Some(token)) => CommandShape::Matched {
                verb: verb.as_bytes(),
                token: token.as_bytes(),
            },
            _ => CommandShape::Unmatched,
        },
        None => CommandShape::Unmatched,
    }
}

/// Classify a payload by operation and queue name.
///
/// Payloads that do not look like a command are `other` with no queue; an
/// unknown verb in a command-shaped line is `other` but keeps its queue.
pub fn classify(payload: &[u8]) -> Classification {
    let classification = match command_shape(payload) {
        CommandShape::Matched { verb, token } => Classification {
            operation: Operation::from_verb(verb).unwrap_or(Operation::Other),
            queue: Some(String::from_utf8_lossy(token).into_owned()),
        },
        CommandShape::Unmatched => Classification::unmatched(),
    };

    if log_enabled!(Level::Trace) {
        trace!(
            "Classified {} byte payload as {} (queue: {:?})",
            payload.len(),
            classification.operation,
            classification.queue
        );
    }

    classification
}

/// Byte count of a complete `set` command, if the payload carries one
pub fn parse_set_size(payload: &[u8]) -> Option<u64> {
    let caps = SET_COMMAND.captures(payload)?;
    let digits = caps.get(1)?.as_bytes();
    std::str::from_utf8(digits).ok()?.parse().ok()
}
