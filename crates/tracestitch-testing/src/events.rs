//! Terse builders for canonical records.
//!
//! Records are built in [`DOMAIN`] with process and thread 0. The capture
//! writers in [`crate::fixtures`] move them onto the partition they are
//! written to.

use tracestitch_types::{CanonicalEvent, EventKind, MarkerScope};

pub const DOMAIN: &str = "app";

pub fn begin(ts: u64, name: &str) -> CanonicalEvent {
    CanonicalEvent::new(DOMAIN, EventKind::TaskBegin, ts).with_name(name)
}

pub fn end(ts: u64) -> CanonicalEvent {
    CanonicalEvent::new(DOMAIN, EventKind::TaskEnd, ts)
}

/// A named end, which leftover repair can pair with a made-up begin
pub fn named_end(ts: u64, name: &str) -> CanonicalEvent {
    end(ts).with_name(name)
}

pub fn begin_overlapped(ts: u64, name: &str, id: u64) -> CanonicalEvent {
    CanonicalEvent::new(DOMAIN, EventKind::TaskBeginOverlapped, ts)
        .with_name(name)
        .with_id(id)
}

pub fn end_overlapped(ts: u64, id: u64) -> CanonicalEvent {
    CanonicalEvent::new(DOMAIN, EventKind::TaskEndOverlapped, ts).with_id(id)
}

pub fn marker(ts: u64, name: &str, scope: MarkerScope) -> CanonicalEvent {
    CanonicalEvent::new(DOMAIN, EventKind::Marker, ts)
        .with_name(name)
        .with_scope(scope)
}

pub fn counter(ts: u64, name: &str, value: f64) -> CanonicalEvent {
    CanonicalEvent::new(DOMAIN, EventKind::Counter, ts)
        .with_name(name)
        .with_delta(value)
}

/// Relation `name` from the task with `parent` to the task with `id`
pub fn relation(ts: u64, name: &str, id: u64, parent: u64) -> CanonicalEvent {
    CanonicalEvent::new(DOMAIN, EventKind::Relation, ts)
        .with_name(name)
        .with_id(id)
        .with_parent(parent)
}

pub fn metadata(ts: u64, name: &str, id: u64, value: f64) -> CanonicalEvent {
    CanonicalEvent::new(DOMAIN, EventKind::MetadataAdd, ts)
        .with_name(name)
        .with_id(id)
        .with_delta(value)
}

pub fn frame_begin(ts: u64, name: &str) -> CanonicalEvent {
    CanonicalEvent::new(DOMAIN, EventKind::FrameBegin, ts).with_name(name)
}

pub fn frame_end(ts: u64) -> CanonicalEvent {
    CanonicalEvent::new(DOMAIN, EventKind::FrameEnd, ts)
}
