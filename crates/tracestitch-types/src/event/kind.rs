use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RequiredField;
use crate::record::TaskKind;

/// Closed set of record kinds a decoder may produce.
///
/// The numeric codes are the ones used by the native `.sea` record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskBegin,
    TaskEnd,
    TaskBeginOverlapped,
    TaskEndOverlapped,
    MetadataAdd,
    Marker,
    Counter,
    FrameBegin,
    FrameEnd,
    ObjectNew,
    ObjectSnapshot,
    ObjectDelete,
    Relation,
}

const ALL_KINDS: [EventKind; 13] = [
    EventKind::TaskBegin,
    EventKind::TaskEnd,
    EventKind::TaskBeginOverlapped,
    EventKind::TaskEndOverlapped,
    EventKind::MetadataAdd,
    EventKind::Marker,
    EventKind::Counter,
    EventKind::FrameBegin,
    EventKind::FrameEnd,
    EventKind::ObjectNew,
    EventKind::ObjectSnapshot,
    EventKind::ObjectDelete,
    EventKind::Relation,
];

impl EventKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        ALL_KINDS.get(code as usize).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::TaskBegin => "task_begin",
            EventKind::TaskEnd => "task_end",
            EventKind::TaskBeginOverlapped => "task_begin_overlapped",
            EventKind::TaskEndOverlapped => "task_end_overlapped",
            EventKind::MetadataAdd => "metadata_add",
            EventKind::Marker => "marker",
            EventKind::Counter => "counter",
            EventKind::FrameBegin => "frame_begin",
            EventKind::FrameEnd => "frame_end",
            EventKind::ObjectNew => "object_new",
            EventKind::ObjectSnapshot => "object_snapshot",
            EventKind::ObjectDelete => "object_delete",
            EventKind::Relation => "relation",
        }
    }

    pub fn is_begin(self) -> bool {
        matches!(
            self,
            EventKind::TaskBegin | EventKind::TaskBeginOverlapped | EventKind::FrameBegin
        )
    }

    pub fn is_end(self) -> bool {
        matches!(
            self,
            EventKind::TaskEnd | EventKind::TaskEndOverlapped | EventKind::FrameEnd
        )
    }

    /// End kind that closes a begin of this kind
    pub fn end_kind(self) -> Option<EventKind> {
        match self {
            EventKind::TaskBegin => Some(EventKind::TaskEnd),
            EventKind::TaskBeginOverlapped => Some(EventKind::TaskEndOverlapped),
            EventKind::FrameBegin => Some(EventKind::FrameEnd),
            _ => None,
        }
    }

    /// Whether a begin of kind `self` may be closed by an end of kind `end`.
    ///
    /// Task begins and ends pair across the stack/overlapped split so that a
    /// task whose id became known late can still be matched.
    pub fn is_closed_by(self, end: EventKind) -> bool {
        match end {
            EventKind::TaskEnd | EventKind::TaskEndOverlapped => {
                matches!(self, EventKind::TaskBegin | EventKind::TaskBeginOverlapped)
            }
            EventKind::FrameEnd => self == EventKind::FrameBegin,
            _ => false,
        }
    }

    /// Kind of completed record this event contributes to
    pub fn task_kind(self) -> Option<TaskKind> {
        match self {
            EventKind::TaskBegin
            | EventKind::TaskEnd
            | EventKind::TaskBeginOverlapped
            | EventKind::TaskEndOverlapped => Some(TaskKind::Task),
            EventKind::FrameBegin | EventKind::FrameEnd => Some(TaskKind::Frame),
            EventKind::Marker => Some(TaskKind::Marker),
            EventKind::Counter => Some(TaskKind::Counter),
            EventKind::ObjectNew => Some(TaskKind::ObjectNew),
            EventKind::ObjectSnapshot => Some(TaskKind::ObjectSnapshot),
            EventKind::ObjectDelete => Some(TaskKind::ObjectDelete),
            EventKind::MetadataAdd | EventKind::Relation => None,
        }
    }

    /// Fields that must be present for a record of this kind to be usable
    pub fn required_fields(self) -> &'static [RequiredField] {
        match self {
            EventKind::TaskBeginOverlapped | EventKind::TaskEndOverlapped => &[RequiredField::Id],
            EventKind::ObjectNew | EventKind::ObjectSnapshot | EventKind::ObjectDelete => {
                &[RequiredField::Id]
            }
            EventKind::Relation => &[RequiredField::Id, RequiredField::ParentId],
            EventKind::Counter => &[RequiredField::Name, RequiredField::Delta],
            EventKind::MetadataAdd => &[RequiredField::Name],
            EventKind::TaskBegin
            | EventKind::TaskEnd
            | EventKind::FrameBegin
            | EventKind::FrameEnd
            | EventKind::Marker => &[],
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Visual scope of a marker.
///
/// `Task` markers are not instants: two of them sharing an id delimit a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarkerScope {
    Global,
    TrackGroup,
    Track,
    Task,
    Marker,
    #[default]
    Unknown,
}

impl MarkerScope {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "global" => MarkerScope::Global,
            "track_group" => MarkerScope::TrackGroup,
            "track" => MarkerScope::Track,
            "task" => MarkerScope::Task,
            "marker" => MarkerScope::Marker,
            _ => MarkerScope::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_header_values() {
        for kind in ALL_KINDS {
            assert_eq!(EventKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(EventKind::TaskBegin.code(), 0);
        assert_eq!(EventKind::FrameBegin.code(), 7);
        assert_eq!(EventKind::Relation.code(), 12);
        assert_eq!(EventKind::from_code(13), None);
    }

    #[test]
    fn test_end_matching() {
        assert!(EventKind::TaskBegin.is_closed_by(EventKind::TaskEnd));
        assert!(EventKind::TaskBeginOverlapped.is_closed_by(EventKind::TaskEnd));
        assert!(EventKind::TaskBegin.is_closed_by(EventKind::TaskEndOverlapped));
        assert!(!EventKind::FrameBegin.is_closed_by(EventKind::TaskEnd));
        assert!(EventKind::FrameBegin.is_closed_by(EventKind::FrameEnd));
        assert!(!EventKind::Marker.is_closed_by(EventKind::FrameEnd));
    }

    #[test]
    fn test_marker_scope_parse() {
        assert_eq!(MarkerScope::parse("task"), MarkerScope::Task);
        assert_eq!(MarkerScope::parse(" global "), MarkerScope::Global);
        assert_eq!(MarkerScope::parse("whatever"), MarkerScope::Unknown);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&EventKind::TaskBeginOverlapped).unwrap();
        assert_eq!(json, "\"task_begin_overlapped\"");
        let kind: EventKind = serde_json::from_str("\"object_snapshot\"").unwrap();
        assert_eq!(kind, EventKind::ObjectSnapshot);
    }
}
