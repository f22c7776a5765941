use std::fmt;
use std::path::PathBuf;

use tracestitch_types::CanonicalEvent;
use tracing::warn;

use crate::Result;

/// One ordered record stream of a capture: a single (domain, thread) file,
/// possibly one piece of a ring-buffer chain or one cut.
///
/// Contract:
/// - `next_event` yields records with non-decreasing `timestamp`
/// - end of data, zero padding and truncated tails are `Ok(None)`
/// - an `Err` ends this partition only; the caller moves on
pub trait SourceReader: Send {
    fn partition(&self) -> &PartitionDescriptor;

    fn next_event(&mut self) -> Result<Option<CanonicalEvent>>;

    /// Bytes (or records, for in-memory streams) consumed so far
    fn position(&self) -> u64;

    fn size(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionFormat {
    Sea,
    Jsonl,
    Memory,
}

impl fmt::Display for PartitionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionFormat::Sea => write!(f, "sea"),
            PartitionFormat::Jsonl => write!(f, "jsonl"),
            PartitionFormat::Memory => write!(f, "memory"),
        }
    }
}

/// Where a partition lives and what its file name says about it
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionDescriptor {
    pub domain: String,
    pub thread_id: i64,
    pub path: Option<PathBuf>,
    pub cut: Option<String>,
    pub ring: Option<String>,
    pub format: PartitionFormat,
    pub size: u64,

    /// Timestamp of the first record; None for an empty partition
    pub first_timestamp: Option<u64>,
}

impl PartitionDescriptor {
    /// Pieces of one ring-buffer chain share this key
    pub fn chain_key(&self) -> (String, i64, Option<String>) {
        (self.domain.clone(), self.thread_id, self.cut.clone())
    }

    pub fn label(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => format!("{}/{}", self.domain, self.thread_id),
        }
    }
}

/// Clamps a record that goes back in time to the previous timestamp.
///
/// Keeps the per-partition ordering guarantee even when a decoder slips.
#[derive(Debug, Default)]
pub struct OrderGuard {
    last: Option<u64>,
}

impl OrderGuard {
    pub fn admit(&mut self, partition: &PartitionDescriptor, event: &mut CanonicalEvent) {
        if let Some(last) = self.last
            && event.timestamp < last
        {
            warn!(
                partition = %partition.label(),
                timestamp = event.timestamp,
                previous = last,
                "record goes back in time, clamping"
            );
            event.timestamp = last;
        }
        self.last = Some(event.timestamp);
    }
}
