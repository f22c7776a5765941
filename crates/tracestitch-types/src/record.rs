use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::CanonicalEvent;

/// Kind of a completed, emit-ready record handed to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Task,
    Frame,
    Marker,
    Counter,
    ObjectNew,
    ObjectSnapshot,
    ObjectDelete,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Task => "task",
            TaskKind::Frame => "frame",
            TaskKind::Marker => "marker",
            TaskKind::Counter => "counter",
            TaskKind::ObjectNew => "object_new",
            TaskKind::ObjectSnapshot => "object_snapshot",
            TaskKind::ObjectDelete => "object_delete",
        }
    }

    /// Records of these kinds carry a duration; the rest are instants
    pub fn has_duration(self) -> bool {
        matches!(self, TaskKind::Task | TaskKind::Frame)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A canonical event with its timestamp converted to output time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub event: CanonicalEvent,

    /// Output-domain time
    pub time: f64,

    /// True when leftover repair made this endpoint up
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

impl TimedEvent {
    pub fn new(event: CanonicalEvent, time: f64) -> Self {
        Self {
            event,
            time,
            synthetic: false,
        }
    }

    pub fn synthetic(event: CanonicalEvent, time: f64) -> Self {
        Self {
            event,
            time,
            synthetic: true,
        }
    }
}
