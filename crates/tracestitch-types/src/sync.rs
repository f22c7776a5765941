use serde::{Deserialize, Serialize};

/// The same physical instant observed in two clock domains.
///
/// `source` is in the capture's raw units, `target` in the reference clock's.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncAnchor {
    pub source: u64,
    pub target: f64,
}

impl SyncAnchor {
    pub fn new(source: u64, target: f64) -> Self {
        Self { source, target }
    }
}
