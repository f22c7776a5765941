use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What is known about how a capture was recorded.
///
/// Gates leftover repair: only ring-buffer, cut or time-windowed captures may
/// have begins and ends synthesized at their edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureInfo {
    pub pid: i64,

    #[serde(default)]
    pub ring_buffer: bool,

    #[serde(default)]
    pub cuts: BTreeSet<String>,

    /// Replay was restricted to a time window
    #[serde(default)]
    pub windowed: bool,
}

impl CaptureInfo {
    pub fn complete(pid: i64) -> Self {
        Self {
            pid,
            ..Self::default()
        }
    }

    pub fn allows_leftover_repair(&self) -> bool {
        self.ring_buffer || !self.cuts.is_empty() || self.windowed
    }
}

/// Scheduler-visible state of one thread at a context switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadState {
    pub tid: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prio: Option<i32>,
}

/// One scheduler switch, in raw capture time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSwitch {
    pub time: u64,
    pub cpu: u32,
    pub prev: ThreadState,
    pub next: ThreadState,
}
