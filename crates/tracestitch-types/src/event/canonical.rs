use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::kind::{EventKind, MarkerScope};
use crate::error::{MalformedRecord, RequiredField};

/// The unit record flowing from decoders through the correlator.
///
/// `timestamp` is in the partition's own clock domain. Conversion to output
/// time happens only at the sink boundary (see [`crate::TimedEvent`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub domain: String,
    pub process_id: i64,
    pub thread_id: i64,
    pub timestamp: u64,
    pub kind: EventKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Correlation key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,

    /// Counter value, metadata magnitude, or turbo-task duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Code address for tasks recorded without a name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<MarkerScope>,
}

impl CanonicalEvent {
    pub fn new(domain: impl Into<String>, kind: EventKind, timestamp: u64) -> Self {
        Self {
            domain: domain.into(),
            process_id: 0,
            thread_id: 0,
            timestamp,
            kind,
            name: None,
            id: None,
            parent_id: None,
            args: Map::new(),
            delta: None,
            data: None,
            pointer: None,
            scope: None,
        }
    }

    pub fn with_thread(mut self, process_id: i64, thread_id: i64) -> Self {
        self.process_id = process_id;
        self.thread_id = thread_id;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_pointer(mut self, pointer: u64) -> Self {
        self.pointer = Some(pointer);
        self
    }

    pub fn with_scope(mut self, scope: MarkerScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Label used by sinks: the name, else the code pointer, else a placeholder
    pub fn display_name(&self) -> String {
        match (&self.name, self.pointer) {
            (Some(name), _) => name.clone(),
            (None, Some(ptr)) => format!("func<0x{:X}>", ptr),
            (None, None) => "<unknown>".to_string(),
        }
    }

    /// Negative process or thread ids denote synthetic tracks (GPU engines, global lanes)
    pub fn is_virtual_track(&self) -> bool {
        self.process_id < 0 || self.thread_id < 0
    }

    pub fn is_task_marker(&self) -> bool {
        self.kind == EventKind::Marker && self.scope == Some(MarkerScope::Task)
    }

    /// Check the fields the record's kind cannot do without.
    pub fn validate(&self) -> std::result::Result<(), MalformedRecord> {
        for field in self.kind.required_fields() {
            let present = match field {
                RequiredField::Name => self.name.is_some(),
                RequiredField::Id => self.id.is_some(),
                RequiredField::ParentId => self.parent_id.is_some(),
                RequiredField::Delta => self.delta.is_some(),
            };
            if !present {
                return Err(MalformedRecord {
                    kind: self.kind,
                    missing: *field,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_id_for_overlapped() {
        let event = CanonicalEvent::new("gpu", EventKind::TaskBeginOverlapped, 10);
        let err = event.validate().unwrap_err();
        assert_eq!(err.missing, RequiredField::Id);
        assert_eq!(
            err.to_string(),
            "task_begin_overlapped record is missing `id`"
        );

        let event = event.with_id(3);
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_validate_relation_needs_both_endpoints() {
        let event = CanonicalEvent::new("d", EventKind::Relation, 0).with_id(1);
        assert_eq!(event.validate().unwrap_err().missing, RequiredField::ParentId);
    }

    #[test]
    fn test_validate_counter_needs_name_and_delta() {
        let event = CanonicalEvent::new("d", EventKind::Counter, 0).with_delta(1.0);
        assert_eq!(event.validate().unwrap_err().missing, RequiredField::Name);
        let event = event.with_name("fps");
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_plain_tasks_and_frames_need_nothing() {
        assert!(CanonicalEvent::new("d", EventKind::TaskEnd, 0).validate().is_ok());
        assert!(CanonicalEvent::new("d", EventKind::FrameBegin, 0).validate().is_ok());
    }

    #[test]
    fn test_display_name_falls_back_to_pointer() {
        let event = CanonicalEvent::new("d", EventKind::TaskBegin, 0).with_pointer(0xBEEF);
        assert_eq!(event.display_name(), "func<0xBEEF>");
        assert_eq!(
            CanonicalEvent::new("d", EventKind::TaskBegin, 0).display_name(),
            "<unknown>"
        );
    }

    #[test]
    fn test_virtual_track() {
        let event = CanonicalEvent::new("gpu", EventKind::TaskBegin, 0).with_thread(7, -1);
        assert!(event.is_virtual_track());
        let event = CanonicalEvent::new("cpu", EventKind::TaskBegin, 0).with_thread(7, 8);
        assert!(!event.is_virtual_track());
    }

    #[test]
    fn test_deserialize_minimal_line() {
        let line = r#"{"domain":"d","process_id":1,"thread_id":2,"timestamp":5,"kind":"task_begin","name":"X"}"#;
        let event: CanonicalEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.kind, EventKind::TaskBegin);
        assert_eq!(event.name.as_deref(), Some("X"));
        assert!(event.args.is_empty());
        assert_eq!(event.id, None);
    }
}
