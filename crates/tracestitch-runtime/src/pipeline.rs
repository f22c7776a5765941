use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracestitch_engine::{Correlator, Diagnostics, Sink, TimeMapping, compute_time_sync};
use tracestitch_providers::{Capture, SourceReader};
use tracestitch_types::{CanonicalEvent, CaptureInfo, ContextSwitch, EventKind, TimedEvent};
use tracing::{debug, info, trace, warn};

use crate::Result;
use crate::config::Config;
use crate::fanout::{FanOut, FilterOptions};
use crate::merge::MergeScheduler;
use crate::plan::{CutSelection, PlannedRun, plan_runs};
use crate::prefetch::PrefetchReader;

/// Domain of the naming records emitted after replay
pub const METADATA_DOMAIN: &str = "tracestitch";

const PROGRESS_EVERY: u64 = 10_000;

/// Outcome of one replay
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub capture: String,
    pub cut: Option<String>,
    pub partitions: usize,
    pub failed_partitions: usize,
    pub records: u64,
    /// Records outside the limits or from foreign processes
    pub filtered: u64,
    /// Completed records held back by the sink filters
    pub suppressed: u64,
    /// Replay stopped early on request
    pub stopped: bool,
    pub mapping: TimeMapping,
    pub diagnostics: Diagnostics,
}

/// Everything a replay needs besides its readers
#[derive(Debug, Clone)]
pub struct ReplaySource {
    pub name: String,
    pub cut: Option<String>,
    pub info: CaptureInfo,
    pub mapping: TimeMapping,
    pub threads: BTreeMap<i64, String>,
    pub processes: BTreeMap<i64, String>,
    pub context_switches: Vec<ContextSwitch>,
}

impl ReplaySource {
    pub fn new(name: impl Into<String>, info: CaptureInfo) -> Self {
        Self {
            name: name.into(),
            cut: None,
            info,
            mapping: TimeMapping::identity(),
            threads: BTreeMap::new(),
            processes: BTreeMap::new(),
            context_switches: Vec::new(),
        }
    }
}

/// Drives captures from readers to sinks.
///
/// Readers -> merge -> correlator -> fan-out. One pipeline can run many
/// captures; each run owns its own correlator, so runs share nothing but the
/// configuration and the stop flag.
pub struct Pipeline {
    config: Config,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Setting this flag stops reading; correlation still finalizes
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Explicit mapping from the configuration, else derived from anchors
    pub fn mapping_for(&self, capture: &Capture) -> TimeMapping {
        match &self.config.sync {
            Some(sync) => {
                debug!(capture = %capture.name(), "using configured time mapping");
                sync.mapping()
            }
            None => compute_time_sync(&capture.anchors, self.config.target_scale),
        }
    }

    pub fn plan(&self, capture: &Capture) -> Vec<PlannedRun> {
        let cuts = CutSelection::from_list(self.config.cuts.as_deref());
        plan_runs(capture, &cuts, &self.config.limits)
    }

    /// Every planned run of `capture`, with sinks made per run
    pub fn run_capture<F>(&self, capture: &Capture, make_sinks: F) -> Result<Vec<CaptureReport>>
    where
        F: Fn(&Capture, &PlannedRun) -> Result<Vec<Box<dyn Sink>>>,
    {
        let runs = self.plan(capture);
        if runs.is_empty() {
            warn!(capture = %capture.name(), "nothing to replay");
        }

        let mut reports = Vec::with_capacity(runs.len());
        for run in &runs {
            let mut sinks = make_sinks(capture, run)?;
            reports.push(self.run(capture, run, sink_refs(&mut sinks))?);
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
        }
        Ok(reports)
    }

    /// Replay one planned run of a discovered capture
    pub fn run(
        &self,
        capture: &Capture,
        run: &PlannedRun,
        sinks: Vec<&mut dyn Sink>,
    ) -> Result<CaptureReport> {
        let mut info = capture.info.clone();
        if let Some(cut) = &run.cut {
            info.cuts = BTreeSet::from([cut.clone()]);
        }

        let context_switches = capture.load_context_switches().unwrap_or_else(|err| {
            warn!(capture = %capture.name(), "context switches unreadable: {}", err);
            Vec::new()
        });

        let mut readers = Vec::with_capacity(run.partitions.len());
        for partition in &run.partitions {
            match capture.open_partition(partition) {
                Ok(reader) => readers.push(reader),
                Err(err) => warn!(partition = %partition.label(), "cannot open partition: {}", err),
            }
        }

        let source = ReplaySource {
            name: capture.name(),
            cut: run.cut.clone(),
            info,
            mapping: self.mapping_for(capture),
            threads: capture.threads.clone(),
            processes: capture.processes.clone(),
            context_switches,
        };
        self.replay(source, readers, sinks)
    }

    /// Merge `readers`, correlate and hand the results to `sinks`
    pub fn replay(
        &self,
        source: ReplaySource,
        readers: Vec<Box<dyn SourceReader>>,
        sinks: Vec<&mut dyn Sink>,
    ) -> Result<CaptureReport> {
        let ReplaySource {
            name,
            cut,
            mut info,
            mapping,
            threads,
            processes,
            context_switches,
        } = source;

        let limits = self.config.limits;
        if limits.is_set() {
            info.windowed = true;
        }
        let pid = info.pid;

        let mut fanout = FanOut::new(
            sinks,
            FilterOptions {
                limits,
                remove_args: self.config.remove_args,
                distinct: self.config.distinct,
            },
        );

        for switch in context_switches.iter().filter(|s| limits.contains(s.time)) {
            fanout.context_switch(
                mapping.convert(switch.time),
                switch.cpu,
                &switch.prev,
                &switch.next,
            )?;
        }

        let mut merge = MergeScheduler::new();
        for reader in readers {
            merge.register(self.prefetched(reader)?);
        }
        let partitions = merge.registered();
        let total_size = merge.total_size();
        info!(capture = %name, cut = ?cut, partitions, total_size, "replay started");

        let mut correlator = Correlator::new(info, mapping, self.config.correlator_config());
        let mut records = 0u64;
        let mut filtered = 0u64;
        let mut stopped = false;

        while let Some(event) = merge.next() {
            if self.stop.load(Ordering::Relaxed) {
                info!(capture = %name, records, "stop requested, finishing with what was read");
                stopped = true;
                break;
            }

            records += 1;
            if records % PROGRESS_EVERY == 0 {
                debug!(
                    capture = %name,
                    records,
                    position = merge.position(),
                    total_size,
                    "replay progress"
                );
            }

            if !self.admit(&event, pid) {
                filtered += 1;
                continue;
            }
            correlator.ingest(event, &mut fanout)?;
        }

        // a stop or a partition that ended early leaves the stream cut short
        if stopped || merge.failed() > 0 {
            correlator.mark_truncated();
        }
        let bounds = correlator.bounds();
        let diagnostics = correlator.finalize(&mut fanout)?;

        let first = bounds.min.unwrap_or_default();
        emit_naming(&mut fanout, pid, first, mapping.convert(first), &threads, &processes)?;

        let suppressed = fanout.suppressed();
        fanout.finish()?;

        info!(capture = %name, cut = ?cut, %diagnostics, "replay finished");
        Ok(CaptureReport {
            capture: name,
            cut,
            partitions,
            failed_partitions: merge.failed(),
            records,
            filtered,
            suppressed,
            stopped,
            mapping,
            diagnostics,
        })
    }

    fn prefetched(&self, reader: Box<dyn SourceReader>) -> Result<Box<dyn SourceReader>> {
        if self.config.prefetch == 0 {
            return Ok(reader);
        }
        Ok(Box::new(PrefetchReader::spawn(reader, self.config.prefetch)?))
    }

    fn admit(&self, event: &CanonicalEvent, pid: i64) -> bool {
        if !self.config.limits.contains(event.timestamp) {
            return false;
        }
        // negative pids are virtual tracks and always belong
        if self.config.strip_aliens && event.process_id >= 0 && event.process_id != pid {
            trace!(process_id = event.process_id, "record from another process stripped");
            return false;
        }
        true
    }
}

fn sink_refs(sinks: &mut [Box<dyn Sink>]) -> Vec<&mut dyn Sink> {
    sinks.iter_mut().map(|s| s.as_mut() as &mut dyn Sink).collect()
}

/// `__process__` and `__thread__` records naming what the capture saw
fn emit_naming(
    sink: &mut dyn Sink,
    pid: i64,
    timestamp: u64,
    time: f64,
    threads: &BTreeMap<i64, String>,
    processes: &BTreeMap<i64, String>,
) -> tracestitch_engine::Result<()> {
    let naming = |process_id: i64, thread_id: i64, key: &str, value: &str| {
        let event = CanonicalEvent::new(METADATA_DOMAIN, EventKind::MetadataAdd, timestamp)
            .with_thread(process_id, thread_id)
            .with_name(key)
            .with_data(value);
        TimedEvent::new(event, time)
    };

    for (process_id, name) in processes {
        sink.global_metadata(&naming(*process_id, -1, "__process__", name))?;
    }
    for (thread_id, name) in threads {
        sink.global_metadata(&naming(pid, *thread_id, "__thread__", name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use tracestitch_engine::{CollectingSink, Emitted};
    use tracestitch_providers::MemoryReader;
    use tracestitch_types::ThreadState;

    fn ev(kind: EventKind, ts: u64) -> CanonicalEvent {
        CanonicalEvent::new("d", kind, ts).with_thread(1, 7)
    }

    fn reader(events: Vec<CanonicalEvent>) -> Box<dyn SourceReader> {
        Box::new(MemoryReader::new("d", 7, events))
    }

    fn replay(
        config: Config,
        source: ReplaySource,
        readers: Vec<Box<dyn SourceReader>>,
    ) -> (CollectingSink, Result<CaptureReport>) {
        let mut sink = CollectingSink::new();
        let sinks: Vec<&mut dyn Sink> = vec![&mut sink];
        let report = Pipeline::new(config).replay(source, readers, sinks);
        (sink, report)
    }

    fn tasks(sink: &CollectingSink) -> Vec<(String, f64, f64)> {
        sink.spans()
            .into_iter()
            .filter(|(kind, ..)| *kind == tracestitch_types::TaskKind::Task)
            .map(|(_, name, b, e)| (name, b, e))
            .collect()
    }

    #[test]
    fn test_partitions_merge_into_nested_tasks() {
        let readers = vec![
            reader(vec![
                ev(EventKind::TaskBegin, 1).with_name("X"),
                ev(EventKind::TaskEnd, 5),
            ]),
            reader(vec![
                ev(EventKind::TaskBegin, 2).with_name("Y"),
                ev(EventKind::TaskEnd, 3),
            ]),
            reader(vec![
                ev(EventKind::Counter, 4).with_name("load").with_delta(0.5),
            ]),
        ];
        let (sink, report) = replay(
            Config::default(),
            ReplaySource::new("mem", CaptureInfo::complete(1)),
            readers,
        );

        assert_eq!(
            tasks(&sink),
            vec![("Y".to_string(), 2.0, 3.0), ("X".to_string(), 1.0, 5.0)]
        );
        let report = report.unwrap();
        assert_eq!(report.records, 5);
        assert_eq!(report.partitions, 3);
        assert_eq!(report.diagnostics.tasks_completed, 2);
        assert!(sink.finished);
    }

    #[test]
    fn test_limits_window_the_capture_and_enable_repair() {
        let readers = vec![reader(vec![
            ev(EventKind::TaskBegin, 1).with_name("before"),
            ev(EventKind::TaskBegin, 12).with_name("inside"),
            ev(EventKind::TaskEnd, 15),
            ev(EventKind::TaskEnd, 18).with_name("before"),
            ev(EventKind::Marker, 30).with_name("after"),
        ])];
        let config = Config {
            limits: Limits::new(Some(10), Some(20)),
            ..Config::default()
        };
        let (sink, report) = replay(config, ReplaySource::new("mem", CaptureInfo::complete(1)), readers);

        // the end at 18 lost its begin to the window and is repaired at the left bound
        assert_eq!(
            tasks(&sink),
            vec![("inside".to_string(), 12.0, 15.0), ("before".to_string(), 12.0, 18.0)]
        );
        let report = report.unwrap();
        assert_eq!(report.filtered, 2);
        assert_eq!(report.diagnostics.repaired_begins, 1);
    }

    #[test]
    fn test_strip_aliens_keeps_own_and_virtual_tracks() {
        let readers = vec![reader(vec![
            ev(EventKind::Marker, 1).with_name("own"),
            ev(EventKind::Marker, 2).with_name("alien").with_thread(99, 7),
            ev(EventKind::Marker, 3).with_name("gpu").with_thread(-1, -1),
        ])];
        let config = Config {
            strip_aliens: true,
            ..Config::default()
        };
        let (sink, report) = replay(config, ReplaySource::new("mem", CaptureInfo::complete(1)), readers);

        let names: Vec<String> = sink.spans().into_iter().map(|(_, name, ..)| name).collect();
        assert_eq!(names, vec!["own", "gpu"]);
        assert_eq!(report.unwrap().filtered, 1);
    }

    #[test]
    fn test_strict_failure_surfaces_as_engine_error() {
        let readers = vec![reader(vec![ev(EventKind::TaskBegin, 1).with_name("open")])];
        let (sink, report) = replay(
            Config::default(),
            ReplaySource::new("mem", CaptureInfo::complete(1)),
            readers,
        );
        assert!(matches!(report, Err(crate::Error::Engine(_))));
        assert!(!sink.finished);
    }

    #[test]
    fn test_stop_flag_still_finalizes() {
        let readers = vec![reader(vec![
            ev(EventKind::TaskBegin, 1).with_name("long"),
            ev(EventKind::TaskEnd, 9),
        ])];
        let config = Config {
            strict: false,
            ..Config::default()
        };
        let pipeline = Pipeline::new(config);
        pipeline.stop_flag().store(true, Ordering::Relaxed);

        let mut sink = CollectingSink::new();
        let sinks: Vec<&mut dyn Sink> = vec![&mut sink];
        let report = pipeline
            .replay(ReplaySource::new("mem", CaptureInfo::complete(1)), readers, sinks)
            .unwrap();
        assert!(report.stopped);
        assert_eq!(report.records, 0);
        assert!(sink.finished);
    }

    /// Sets the stop flag when asked for its `trip_at`-th record
    struct Tripping {
        inner: MemoryReader,
        stop: Arc<AtomicBool>,
        calls: usize,
        trip_at: usize,
    }

    impl SourceReader for Tripping {
        fn partition(&self) -> &tracestitch_providers::PartitionDescriptor {
            self.inner.partition()
        }

        fn next_event(&mut self) -> tracestitch_providers::Result<Option<CanonicalEvent>> {
            self.calls += 1;
            if self.calls == self.trip_at {
                self.stop.store(true, Ordering::Relaxed);
            }
            self.inner.next_event()
        }

        fn position(&self) -> u64 {
            self.inner.position()
        }

        fn size(&self) -> u64 {
            self.inner.size()
        }
    }

    /// Yields `left` records, then a decoding error
    struct Breaking {
        inner: MemoryReader,
        left: usize,
    }

    impl SourceReader for Breaking {
        fn partition(&self) -> &tracestitch_providers::PartitionDescriptor {
            self.inner.partition()
        }

        fn next_event(&mut self) -> tracestitch_providers::Result<Option<CanonicalEvent>> {
            if self.left == 0 {
                return Err(tracestitch_providers::Error::Format("bad record".to_string()));
            }
            self.left -= 1;
            self.inner.next_event()
        }

        fn position(&self) -> u64 {
            self.inner.position()
        }

        fn size(&self) -> u64 {
            self.inner.size()
        }
    }

    #[test]
    fn test_stop_mid_replay_repairs_open_tasks_in_strict_mode() {
        let pipeline = Pipeline::new(Config::default());
        let events = vec![
            ev(EventKind::TaskBegin, 1).with_name("long"),
            ev(EventKind::Marker, 4).with_name("tick"),
            ev(EventKind::Marker, 6).with_name("unread"),
            ev(EventKind::TaskEnd, 9),
        ];
        let tripping: Box<dyn SourceReader> = Box::new(Tripping {
            inner: MemoryReader::new("d", 7, events),
            stop: pipeline.stop_flag(),
            calls: 0,
            trip_at: 4,
        });

        let mut sink = CollectingSink::new();
        let sinks: Vec<&mut dyn Sink> = vec![&mut sink];
        let report = pipeline
            .replay(
                ReplaySource::new("mem", CaptureInfo::complete(1)),
                vec![tripping],
                sinks,
            )
            .unwrap();

        assert!(report.stopped);
        assert_eq!(report.records, 2);
        assert_eq!(report.diagnostics.repaired_ends, 1);
        // closed at the last record read, not at the end it never saw
        assert_eq!(tasks(&sink), vec![("long".to_string(), 1.0, 4.0)]);
        assert!(sink.finished);
    }

    #[test]
    fn test_partition_ending_early_repairs_instead_of_failing() {
        let readers: Vec<Box<dyn SourceReader>> = vec![
            Box::new(Breaking {
                inner: MemoryReader::new(
                    "d",
                    7,
                    vec![
                        ev(EventKind::TaskBegin, 1).with_name("cut"),
                        ev(EventKind::TaskEnd, 8),
                    ],
                ),
                left: 1,
            }),
            reader(vec![ev(EventKind::Marker, 5).with_name("m").with_thread(1, 8)]),
        ];
        let (sink, report) = replay(
            Config::default(),
            ReplaySource::new("mem", CaptureInfo::complete(1)),
            readers,
        );

        let report = report.unwrap();
        assert_eq!(report.failed_partitions, 1);
        assert_eq!(tasks(&sink), vec![("cut".to_string(), 1.0, 5.0)]);
        assert!(sink.finished);
    }

    #[test]
    fn test_naming_metadata_and_context_switches() {
        let mut source = ReplaySource::new("mem", CaptureInfo::complete(1));
        source.mapping = TimeMapping::explicit(0.0, 100.0, 1.0);
        source.processes.insert(1, "game".to_string());
        source.threads.insert(7, "render".to_string());
        source.context_switches.push(ContextSwitch {
            time: 3,
            cpu: 2,
            prev: ThreadState {
                tid: 7,
                name: None,
                state: Some("S".to_string()),
                prio: None,
            },
            next: ThreadState {
                tid: 8,
                name: None,
                state: None,
                prio: Some(120),
            },
        });
        let readers = vec![reader(vec![ev(EventKind::Marker, 5).with_name("m")])];

        let (sink, report) = replay(Config::default(), source, readers);
        report.unwrap();

        assert_eq!(
            sink.transcript(),
            "switch cpu2 7 -> 8 at 103\n\
             marker d/7 m [105 .. 105]\n\
             metadata tracestitch/-1 __process__ = game\n\
             metadata tracestitch/7 __thread__ = render\n"
        );
        let naming: Vec<i64> = sink
            .records
            .iter()
            .filter_map(|r| match r {
                Emitted::Metadata { record } => Some(record.event.process_id),
                _ => None,
            })
            .collect();
        assert_eq!(naming, vec![1, 1]);
    }

    #[test]
    fn test_prefetch_matches_inline_replay() {
        let events = || {
            (0..50)
                .flat_map(|i| {
                    [
                        ev(EventKind::TaskBegin, i * 2).with_name(format!("t{}", i)),
                        ev(EventKind::TaskEnd, i * 2 + 1),
                    ]
                })
                .collect::<Vec<_>>()
        };
        let config = Config {
            prefetch: 8,
            ..Config::default()
        };
        let (prefetched, _) = replay(
            config,
            ReplaySource::new("mem", CaptureInfo::complete(1)),
            vec![reader(events())],
        );
        let (inline, _) = replay(
            Config::default(),
            ReplaySource::new("mem", CaptureInfo::complete(1)),
            vec![reader(events())],
        );
        assert_eq!(prefetched.records, inline.records);
        assert_eq!(tasks(&inline).len(), 50);
    }
}
