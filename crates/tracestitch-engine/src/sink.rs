use serde::Serialize;
use tracestitch_types::{TaskKind, ThreadState, TimedEvent};

use crate::Result;

/// Receiver of emit-ready records.
///
/// Every record handed over is fully resolved and already converted to output
/// time. Implementations hold no correlation logic.
pub trait Sink {
    /// A completed record. Point events (markers, counters, objects) arrive
    /// with `begin` and `end` being the same record.
    fn complete_task(&mut self, kind: TaskKind, begin: &TimedEvent, end: &TimedEvent)
    -> Result<()>;

    /// A resolved relation; `start` is the earlier endpoint
    fn relation(&mut self, link: &TimedEvent, start: &TimedEvent, finish: &TimedEvent)
    -> Result<()>;

    fn global_metadata(&mut self, record: &TimedEvent) -> Result<()>;

    fn context_switch(
        &mut self,
        _time: f64,
        _cpu: u32,
        _prev: &ThreadState,
        _next: &ThreadState,
    ) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One call received by a [`CollectingSink`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Emitted {
    Task {
        kind: TaskKind,
        begin: TimedEvent,
        end: TimedEvent,
    },
    Relation {
        link: TimedEvent,
        start: TimedEvent,
        finish: TimedEvent,
    },
    Metadata {
        record: TimedEvent,
    },
    ContextSwitch {
        time: f64,
        cpu: u32,
        prev: ThreadState,
        next: ThreadState,
    },
}

/// Sink that keeps everything in memory, in call order
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub records: Vec<Emitted>,
    pub finished: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// (kind, name, begin time, end time) of every completed record
    pub fn spans(&self) -> Vec<(TaskKind, String, f64, f64)> {
        self.records
            .iter()
            .filter_map(|r| match r {
                Emitted::Task { kind, begin, end } => {
                    Some((*kind, begin.event.display_name(), begin.time, end.time))
                }
                _ => None,
            })
            .collect()
    }

    /// (start time, finish time) of every relation
    pub fn relations(&self) -> Vec<(f64, f64)> {
        self.records
            .iter()
            .filter_map(|r| match r {
                Emitted::Relation { start, finish, .. } => Some((start.time, finish.time)),
                _ => None,
            })
            .collect()
    }

    /// One line per record, stable enough for snapshot tests
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            let line = match record {
                Emitted::Task { kind, begin, end } => format!(
                    "{} {}/{} {} [{} .. {}]{}",
                    kind,
                    begin.event.domain,
                    begin.event.thread_id,
                    begin.event.display_name(),
                    begin.time,
                    end.time,
                    if begin.synthetic || end.synthetic {
                        " repaired"
                    } else {
                        ""
                    }
                ),
                Emitted::Relation {
                    link,
                    start,
                    finish,
                } => format!(
                    "relation {} {} -> {} [{} .. {}]",
                    link.event.display_name(),
                    start.event.display_name(),
                    finish.event.display_name(),
                    start.time,
                    finish.time
                ),
                Emitted::Metadata { record } => format!(
                    "metadata {}/{} {} = {}",
                    record.event.domain,
                    record.event.thread_id,
                    record.event.display_name(),
                    record
                        .event
                        .data
                        .clone()
                        .or_else(|| record.event.delta.map(|d| d.to_string()))
                        .unwrap_or_default()
                ),
                Emitted::ContextSwitch {
                    time,
                    cpu,
                    prev,
                    next,
                } => format!("switch cpu{} {} -> {} at {}", cpu, prev.tid, next.tid, time),
            };
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

impl Sink for CollectingSink {
    fn complete_task(&mut self, kind: TaskKind, begin: &TimedEvent, end: &TimedEvent) -> Result<()> {
        self.records.push(Emitted::Task {
            kind,
            begin: begin.clone(),
            end: end.clone(),
        });
        Ok(())
    }

    fn relation(&mut self, link: &TimedEvent, start: &TimedEvent, finish: &TimedEvent) -> Result<()> {
        self.records.push(Emitted::Relation {
            link: link.clone(),
            start: start.clone(),
            finish: finish.clone(),
        });
        Ok(())
    }

    fn global_metadata(&mut self, record: &TimedEvent) -> Result<()> {
        self.records.push(Emitted::Metadata {
            record: record.clone(),
        });
        Ok(())
    }

    fn context_switch(
        &mut self,
        time: f64,
        cpu: u32,
        prev: &ThreadState,
        next: &ThreadState,
    ) -> Result<()> {
        self.records.push(Emitted::ContextSwitch {
            time,
            cpu,
            prev: prev.clone(),
            next: next.clone(),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
