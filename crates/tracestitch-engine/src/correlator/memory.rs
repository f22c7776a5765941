//! Heap attribution for allocator counters.
//!
//! Counters in the `Memory` domain carry the live block count for one block
//! size, named like `blocks<64>`. The change since the previous sample of
//! that size is charged to the innermost task open on the thread, and the
//! bytes it represents to every task enclosing it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Domain whose counters are allocator block counts
pub const MEMORY_DOMAIN: &str = "Memory";

/// Counter emitted in [`MemoryMode::Total`] with the running byte total
pub const MEMORY_TOTAL_COUNTER: &str = "CRT:Memory:Total(bytes)";

/// Task argument holding the attribution of a completed task
pub const MEMORY_ARG: &str = "CRT:Memory(size,count)";

/// How allocator counters appear in the output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    /// One throttled counter with the bytes held across all sizes
    #[default]
    Total,
    /// Every per-size sample as it was recorded
    Detailed,
}

/// Block size encoded in a counter name: the number between `<` and `>`
pub fn block_size(name: &str) -> Option<u64> {
    let (_, rest) = name.split_once('<')?;
    let (size, _) = rest.split_once('>')?;
    size.trim().parse().ok()
}

/// Memory charged to one open task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryUsage {
    blocks: BTreeMap<u64, f64>,
    children: f64,
}

impl MemoryUsage {
    /// Blocks of `size` allocated (or freed, when negative) while innermost
    pub fn charge(&mut self, size: u64, count: f64) {
        *self.blocks.entry(size).or_default() += count;
    }

    /// Bytes allocated by tasks nested inside this one
    pub fn charge_children(&mut self, bytes: f64) {
        self.children += bytes;
    }

    pub fn total(&self) -> f64 {
        self.blocks
            .iter()
            .map(|(size, count)| *size as f64 * count)
            .sum()
    }

    pub fn children(&self) -> f64 {
        self.children
    }

    /// `{"<size>": count, ..., "TOTAL": bytes, "CHILDREN": bytes}`; sizes
    /// whose changes cancel out are left out
    pub fn to_value(&self) -> Value {
        let mut breakdown = Map::new();
        for (size, count) in self.blocks.iter().filter(|(_, c)| **c != 0.0) {
            breakdown.insert(size.to_string(), Value::from(*count));
        }
        breakdown.insert("TOTAL".to_string(), Value::from(self.total()));
        breakdown.insert("CHILDREN".to_string(), Value::from(self.children));
        Value::Object(breakdown)
    }
}

/// Last block count per size and the bytes held across all of them
#[derive(Debug, Default)]
pub struct MemoryTracker {
    counts: HashMap<u64, f64>,
    total: f64,
    last_emitted: Option<f64>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the new block count for `size`; returns the change since the
    /// previous sample of that size
    pub fn record(&mut self, size: u64, count: f64) -> f64 {
        let previous = self.counts.insert(size, count).unwrap_or(0.0);
        let delta = count - previous;
        self.total += delta * size as f64;
        delta
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Whether a total sample at `time` may be emitted: the first one always
    /// is, later ones only once more than `interval` has passed
    pub fn due(&mut self, time: f64, interval: f64) -> bool {
        let due = self.last_emitted.is_none_or(|last| time - last > interval);
        if due {
            self.last_emitted = Some(time);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_size_from_name() {
        assert_eq!(block_size("blocks<64>"), Some(64));
        assert_eq!(block_size("<4096>"), Some(4096));
        assert_eq!(block_size("heap"), None);
        assert_eq!(block_size("blocks<big>"), None);
        assert_eq!(block_size("blocks<64"), None);
    }

    #[test]
    fn test_tracker_charges_change_since_last_sample() {
        let mut tracker = MemoryTracker::new();
        assert_eq!(tracker.record(16, 3.0), 3.0);
        assert_eq!(tracker.record(32, 1.0), 1.0);
        assert_eq!(tracker.record(16, 1.0), -2.0);
        assert_eq!(tracker.total(), 16.0 + 32.0);
    }

    #[test]
    fn test_total_samples_are_throttled() {
        let mut tracker = MemoryTracker::new();
        assert!(tracker.due(10.0, 5.0));
        assert!(!tracker.due(15.0, 5.0));
        assert!(tracker.due(15.5, 5.0));
        assert!(!tracker.due(15.5, 0.0));
    }

    #[test]
    fn test_usage_breakdown() {
        let mut usage = MemoryUsage::default();
        usage.charge(16, 2.0);
        usage.charge(8, 1.0);
        usage.charge(8, -1.0);
        usage.charge_children(64.0);
        assert_eq!(
            usage.to_value(),
            json!({"16": 2.0, "TOTAL": 32.0, "CHILDREN": 64.0})
        );
    }
}
