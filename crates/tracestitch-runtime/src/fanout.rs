use tracestitch_engine::{Result, Sink};
use tracestitch_types::{TaskKind, ThreadState, TimedEvent};
use tracing::trace;

use crate::config::Limits;

/// Filters applied to completed records before they reach the sinks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub limits: Limits,
    pub remove_args: bool,
    pub distinct: bool,
}

/// Identity of a completed record, for `distinct`
#[derive(Debug, Clone, PartialEq)]
struct TaskIdentity {
    kind: TaskKind,
    domain: String,
    thread_id: i64,
    name: String,
    begin: f64,
    end: f64,
}

impl TaskIdentity {
    fn of(kind: TaskKind, begin: &TimedEvent, end: &TimedEvent) -> Self {
        Self {
            kind,
            domain: begin.event.domain.clone(),
            thread_id: begin.event.thread_id,
            name: begin.event.display_name(),
            begin: begin.time,
            end: end.time,
        }
    }
}

/// Forwards every call to all sinks, applying [`FilterOptions`] on the way.
pub struct FanOut<'a> {
    sinks: Vec<&'a mut dyn Sink>,
    options: FilterOptions,
    last: Option<TaskIdentity>,
    suppressed: u64,
}

impl<'a> FanOut<'a> {
    pub fn new(sinks: Vec<&'a mut dyn Sink>, options: FilterOptions) -> Self {
        Self {
            sinks,
            options,
            last: None,
            suppressed: 0,
        }
    }

    /// Records held back by the limits or `distinct`
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    fn in_limits(&self, begin: &TimedEvent, end: &TimedEvent) -> bool {
        let limits = &self.options.limits;
        !limits.is_set()
            || limits.contains(begin.event.timestamp)
            || limits.contains(end.event.timestamp)
    }
}

fn without_args(record: &TimedEvent) -> TimedEvent {
    let mut record = record.clone();
    record.event.args.clear();
    record
}

impl Sink for FanOut<'_> {
    fn complete_task(&mut self, kind: TaskKind, begin: &TimedEvent, end: &TimedEvent) -> Result<()> {
        if !self.in_limits(begin, end) {
            self.suppressed += 1;
            return Ok(());
        }

        if self.options.distinct {
            let identity = TaskIdentity::of(kind, begin, end);
            if self.last.as_ref() == Some(&identity) {
                trace!(name = %identity.name, "identical consecutive record suppressed");
                self.suppressed += 1;
                return Ok(());
            }
            self.last = Some(identity);
        }

        if self.options.remove_args {
            let begin = without_args(begin);
            let end = without_args(end);
            for sink in self.sinks.iter_mut() {
                sink.complete_task(kind, &begin, &end)?;
            }
            return Ok(());
        }

        for sink in self.sinks.iter_mut() {
            sink.complete_task(kind, begin, end)?;
        }
        Ok(())
    }

    fn relation(&mut self, link: &TimedEvent, start: &TimedEvent, finish: &TimedEvent) -> Result<()> {
        if !self.in_limits(start, finish) {
            self.suppressed += 1;
            return Ok(());
        }
        for sink in self.sinks.iter_mut() {
            sink.relation(link, start, finish)?;
        }
        Ok(())
    }

    fn global_metadata(&mut self, record: &TimedEvent) -> Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.global_metadata(record)?;
        }
        Ok(())
    }

    fn context_switch(
        &mut self,
        time: f64,
        cpu: u32,
        prev: &ThreadState,
        next: &ThreadState,
    ) -> Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.context_switch(time, cpu, prev, next)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.finish()?;
        }
        Ok(())
    }
}
