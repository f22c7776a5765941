//! Task correlator: turns the merged record stream into completed tasks.
//!
//! Two matching disciplines coexist. Plain tasks and frames without an id
//! nest per (domain, thread) and close LIFO. Overlapped tasks, frames with an
//! id and task markers close by correlation key, in any order.

mod counters;
mod leftovers;
mod memory;
mod relations;
mod state;

pub use counters::{CounterSampler, WindowSample};
pub use memory::{
    MEMORY_ARG, MEMORY_DOMAIN, MEMORY_TOTAL_COUNTER, MemoryMode, MemoryTracker, MemoryUsage,
    block_size,
};
pub use state::{ContextKey, CorrelationKey, OpenTask, OpenTaskState};

use serde_json::{Map, Value};
use std::collections::HashMap;
use tracestitch_types::{CanonicalEvent, CaptureInfo, EventKind, TaskKind, TimedEvent};
use tracing::{debug, trace, warn};

use crate::diagnostics::Diagnostics;
use crate::sink::Sink;
use crate::timesync::TimeMapping;
use crate::Result;
use relations::RelationBook;

/// Name given to begins recorded with neither a name nor a code pointer
pub const UNKNOWN_TASK_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatorConfig {
    /// Average counters over windows of this many raw units
    pub sampling_window: Option<u64>,
    /// Fail on unmatched records in captures that cannot be repaired
    pub strict: bool,
    /// How allocator counters are emitted
    pub memory: MemoryMode,
    /// Least output time between two memory total samples
    pub memory_interval: f64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            sampling_window: None,
            strict: true,
            memory: MemoryMode::default(),
            memory_interval: 0.0,
        }
    }
}

/// Smallest and largest timestamp seen, in raw units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeBounds {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl TimeBounds {
    pub fn observe(&mut self, timestamp: u64) {
        self.min = Some(self.min.map_or(timestamp, |m| m.min(timestamp)));
        self.max = Some(self.max.map_or(timestamp, |m| m.max(timestamp)));
    }
}

/// Correlation state for one capture (or one cut of it).
///
/// Feed records in global time order with [`Correlator::ingest`], then call
/// [`Correlator::finalize`] exactly once.
pub struct Correlator {
    capture: CaptureInfo,
    mapping: TimeMapping,
    config: CorrelatorConfig,
    state: OpenTaskState,
    sampler: Option<CounterSampler>,
    memory: MemoryTracker,
    relations: RelationBook,
    parked_args: HashMap<(ContextKey, u64), Map<String, Value>>,
    orphans: Vec<CanonicalEvent>,
    bounds: TimeBounds,
    diagnostics: Diagnostics,
}

impl Correlator {
    pub fn new(capture: CaptureInfo, mapping: TimeMapping, config: CorrelatorConfig) -> Self {
        let sampler = config.sampling_window.map(CounterSampler::new);
        Self {
            capture,
            mapping,
            config,
            state: OpenTaskState::new(),
            sampler,
            memory: MemoryTracker::new(),
            relations: RelationBook::default(),
            parked_args: HashMap::new(),
            orphans: Vec::new(),
            bounds: TimeBounds::default(),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn mapping(&self) -> &TimeMapping {
        &self.mapping
    }

    pub fn bounds(&self) -> TimeBounds {
        self.bounds
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn open_tasks(&self) -> usize {
        self.state.open_count()
    }

    /// The stream was cut short before its end.
    ///
    /// Its right edge is then a window edge, so tasks still open at
    /// finalize are closed at the last observed time instead of rejected.
    pub fn mark_truncated(&mut self) {
        if !self.capture.windowed {
            debug!(open = self.state.open_count(), "stream truncated, leftovers will be repaired");
        }
        self.capture.windowed = true;
    }

    pub fn ingest(&mut self, event: CanonicalEvent, sink: &mut dyn Sink) -> Result<()> {
        self.diagnostics.events += 1;

        if let Err(err) = event.validate() {
            warn!(
                domain = %event.domain,
                thread_id = event.thread_id,
                timestamp = event.timestamp,
                "dropping malformed record: {}",
                err
            );
            self.diagnostics.malformed += 1;
            return Ok(());
        }

        self.bounds.observe(event.timestamp);
        trace!(kind = %event.kind, timestamp = event.timestamp, "ingest");

        match event.kind {
            EventKind::TaskBegin | EventKind::TaskBeginOverlapped | EventKind::FrameBegin => {
                self.on_begin(event, sink)
            }
            EventKind::TaskEnd | EventKind::TaskEndOverlapped | EventKind::FrameEnd => {
                self.on_end(event, sink)
            }
            EventKind::MetadataAdd => self.on_metadata(event, sink),
            EventKind::Marker if event.is_task_marker() => self.on_task_marker(event, sink),
            EventKind::Marker => self.emit_point(TaskKind::Marker, event, sink),
            EventKind::Counter => self.on_counter(event, sink),
            EventKind::ObjectNew => self.emit_point(TaskKind::ObjectNew, event, sink),
            EventKind::ObjectDelete => self.emit_point(TaskKind::ObjectDelete, event, sink),
            EventKind::ObjectSnapshot => self.on_snapshot(event, sink),
            EventKind::Relation => self.on_relation(event, sink),
        }
    }

    /// Flush sampled counters, drop unresolved relations and repair or
    /// reject leftovers.
    pub fn finalize(mut self, sink: &mut dyn Sink) -> Result<Diagnostics> {
        if let Some(sampler) = self.sampler.as_mut() {
            let samples = sampler.flush();
            self.emit_window_samples(samples, sink)?;
        }

        let dropped = self.relations.drop_pending();
        if dropped > 0 {
            warn!(dropped, "relations with unresolved endpoints dropped");
            self.diagnostics.relations_dropped += dropped as u64;
        }

        self.handle_leftovers(sink)?;

        debug!(diagnostics = %self.diagnostics, "correlation finished");
        Ok(self.diagnostics)
    }

    fn timed(&self, event: CanonicalEvent) -> TimedEvent {
        let time = self.mapping.convert(event.timestamp);
        TimedEvent::new(event, time)
    }

    fn take_parked_args(&mut self, ctx: &ContextKey, event: &mut CanonicalEvent) {
        let Some(id) = event.id else {
            return;
        };
        if let Some(args) = self.parked_args.remove(&(ctx.clone(), id)) {
            event.args.extend(args);
        }
    }

    fn on_begin(&mut self, mut event: CanonicalEvent, sink: &mut dyn Sink) -> Result<()> {
        if event.name.is_none() && event.pointer.is_none() {
            event.name = Some(UNKNOWN_TASK_NAME.to_string());
        }
        let ctx = ContextKey::of(&event);
        self.take_parked_args(&ctx, &mut event);

        // overlapped begins without an id never get here; validate() drops them
        let id = event.id;
        match (event.kind, id) {
            (EventKind::TaskBeginOverlapped, Some(id)) | (EventKind::FrameBegin, Some(id)) => {
                self.state.push_keyed(ctx, CorrelationKey::Id(id), event)
            }
            _ => self.state.push_stack(ctx, event),
        }

        match id {
            Some(id) => self.retry_relations(id, sink),
            None => Ok(()),
        }
    }

    fn on_end(&mut self, event: CanonicalEvent, sink: &mut dyn Sink) -> Result<()> {
        if event.delta.is_some() {
            return self.on_turbo_task(event, sink);
        }

        let ctx = ContextKey::of(&event);
        let matched = match (event.kind, event.id) {
            (EventKind::TaskEndOverlapped, Some(id)) | (EventKind::FrameEnd, Some(id)) => {
                self.state.pop_by_id(&ctx, id, event.kind)
            }
            _ => self.state.pop_stack(&ctx, event.kind),
        };

        match matched {
            Some(open) => {
                let kind = open.begin.kind.task_kind().unwrap_or(TaskKind::Task);
                if let Some(id) = open.begin.id {
                    self.relations.remember_closed(id, &open.begin);
                }
                let begin = self.timed(open.into_begin());
                let end = self.timed(event);
                self.diagnostics.tasks_completed += 1;
                sink.complete_task(kind, &begin, &end)
            }
            None => {
                self.diagnostics.unmatched_ends += 1;
                if event.name.is_some() || event.pointer.is_some() {
                    debug!(
                        domain = %event.domain,
                        thread_id = event.thread_id,
                        timestamp = event.timestamp,
                        "end without begin, kept for repair"
                    );
                    self.orphans.push(event);
                } else {
                    debug!(
                        domain = %event.domain,
                        thread_id = event.thread_id,
                        timestamp = event.timestamp,
                        "nameless end without begin dropped"
                    );
                    self.diagnostics.dropped_orphans += 1;
                }
                Ok(())
            }
        }
    }

    /// An end carrying its own duration: a complete task on its own
    fn on_turbo_task(&mut self, mut event: CanonicalEvent, sink: &mut dyn Sink) -> Result<()> {
        let delta = event.delta.unwrap_or_default().max(0.0);
        if event.name.is_none() && event.pointer.is_none() {
            event.name = Some(UNKNOWN_TASK_NAME.to_string());
        }
        let ctx = ContextKey::of(&event);
        self.take_parked_args(&ctx, &mut event);

        let end_raw = event.timestamp as f64 + delta;
        self.bounds.observe(end_raw.ceil() as u64);

        let begin = self.timed(event.clone());
        let mut end = event;
        end.timestamp = end_raw.round() as u64;
        let end = TimedEvent::new(end, self.mapping.convert_raw(end_raw));

        self.diagnostics.tasks_completed += 1;
        sink.complete_task(TaskKind::Task, &begin, &end)
    }

    fn on_task_marker(&mut self, event: CanonicalEvent, sink: &mut dyn Sink) -> Result<()> {
        let ctx = ContextKey::of(&event);
        match self.state.pop_marker(&ctx, event.id) {
            Some(open) => {
                let begin = self.timed(open.into_begin());
                let end = self.timed(event);
                self.diagnostics.tasks_completed += 1;
                sink.complete_task(TaskKind::Task, &begin, &end)
            }
            None => {
                let key = CorrelationKey::Marker(event.id);
                self.state.push_keyed(ctx, key, event);
                Ok(())
            }
        }
    }

    fn on_counter(&mut self, event: CanonicalEvent, sink: &mut dyn Sink) -> Result<()> {
        if let Some(sampler) = self.sampler.as_mut() {
            let value = event.delta.unwrap_or_default();
            self.diagnostics.counter_samples_aggregated += 1;
            let samples = sampler.add(event, value);
            return self.emit_window_samples(samples, sink);
        }

        if event.domain == MEMORY_DOMAIN
            && let Some(size) = event.name.as_deref().and_then(block_size)
        {
            return self.on_memory(size, event, sink);
        }
        self.emit_point(TaskKind::Counter, event, sink)
    }

    /// A live block count for one block size
    fn on_memory(
        &mut self,
        size: u64,
        mut event: CanonicalEvent,
        sink: &mut dyn Sink,
    ) -> Result<()> {
        let delta = self.memory.record(size, event.delta.unwrap_or_default());
        self.diagnostics.memory_samples += 1;

        let mut open = self.state.open_on_thread_mut(event.thread_id);
        if let Some((innermost, parents)) = open.split_last_mut() {
            innermost.memory.get_or_insert_default().charge(size, delta);
            for parent in parents {
                parent
                    .memory
                    .get_or_insert_default()
                    .charge_children(delta * size as f64);
            }
        }

        match self.config.memory {
            MemoryMode::Detailed => self.emit_point(TaskKind::Counter, event, sink),
            MemoryMode::Total => {
                let time = self.mapping.convert(event.timestamp);
                if !self.memory.due(time, self.config.memory_interval) {
                    trace!(size, "memory total throttled");
                    return Ok(());
                }
                event.name = Some(MEMORY_TOTAL_COUNTER.to_string());
                event.delta = Some(self.memory.total());
                self.emit_point(TaskKind::Counter, event, sink)
            }
        }
    }

    fn emit_window_samples(&mut self, samples: Vec<WindowSample>, sink: &mut dyn Sink) -> Result<()> {
        for sample in samples {
            let mut event = sample.template;
            event.timestamp = sample.midpoint.floor() as u64;
            event.delta = Some(sample.mean);
            let record = TimedEvent::new(event, self.mapping.convert_raw(sample.midpoint));
            self.diagnostics.counter_windows_flushed += 1;
            self.diagnostics.point_events += 1;
            sink.complete_task(TaskKind::Counter, &record, &record)?;
        }
        Ok(())
    }

    fn on_snapshot(&mut self, mut event: CanonicalEvent, sink: &mut dyn Sink) -> Result<()> {
        if let Some(state) = event.data.take() {
            let snapshot = event
                .args
                .entry("snapshot")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(fields) = snapshot {
                for pair in state.split(',').filter(|p| !p.is_empty()) {
                    match pair.split_once('=') {
                        Some((key, value)) => {
                            fields.insert(key.trim().to_string(), Value::String(value.to_string()));
                        }
                        None => debug!(pair, "snapshot field without a value"),
                    }
                }
            }
        }
        self.emit_point(TaskKind::ObjectSnapshot, event, sink)
    }

    fn emit_point(&mut self, kind: TaskKind, mut event: CanonicalEvent, sink: &mut dyn Sink) -> Result<()> {
        let ctx = ContextKey::of(&event);
        self.take_parked_args(&ctx, &mut event);
        let record = self.timed(event);
        self.diagnostics.point_events += 1;
        sink.complete_task(kind, &record, &record)
    }

    fn on_metadata(&mut self, event: CanonicalEvent, sink: &mut dyn Sink) -> Result<()> {
        let Some(id) = event.id else {
            let record = self.timed(event);
            return sink.global_metadata(&record);
        };

        let name = event.name.clone().unwrap_or_default();
        let value = metadata_value(&event);
        let ctx = ContextKey::of(&event);

        match self.state.lookup_mut(&ctx, id) {
            Some(begin) => {
                begin.args.insert(name, value);
            }
            None => {
                trace!(id, name = %name, "metadata for a task not open yet, parking");
                self.diagnostics.metadata_parked += 1;
                self.parked_args
                    .entry((ctx, id))
                    .or_default()
                    .insert(name, value);
            }
        }
        Ok(())
    }
}

/// Value of a metadata record: its number, else its data, else a null pointer
fn metadata_value(event: &CanonicalEvent) -> Value {
    if let Some(delta) = event.delta
        && let Some(number) = serde_json::Number::from_f64(delta)
    {
        return Value::Number(number);
    }
    match &event.data {
        Some(data) => Value::String(data.clone()),
        None => Value::String("0x0".to_string()),
    }
}
