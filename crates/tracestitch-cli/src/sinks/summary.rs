use owo_colors::OwoColorize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracestitch_engine::{Result, Sink};
use tracestitch_types::{TaskKind, ThreadState, TimedEvent};

/// count / total / min / max over a series of values
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub count: u64,
    pub total: f64,
    pub min: f64,
    pub max: f64,
}

impl Stats {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.total += value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

type Key = (String, String);

/// Per-domain, per-name statistics of one run
#[derive(Debug, Default)]
pub struct Summary {
    /// Durations of tasks and frames
    pub durations: BTreeMap<Key, Stats>,
    /// Counter values
    pub counters: BTreeMap<Key, Stats>,
    /// Markers and object events
    pub instants: BTreeMap<Key, u64>,
    pub relations: u64,
    pub metadata: u64,
    pub context_switches: u64,
}

impl Summary {
    pub fn record(&mut self, kind: TaskKind, begin: &TimedEvent, end: &TimedEvent) {
        let key = (begin.event.domain.clone(), begin.event.display_name());
        match kind {
            TaskKind::Task | TaskKind::Frame => {
                self.durations.entry(key).or_default().add(end.time - begin.time)
            }
            TaskKind::Counter => {
                let value = begin.event.delta.unwrap_or_default();
                self.counters.entry(key).or_default().add(value)
            }
            _ => *self.instants.entry(key).or_default() += 1,
        }
    }

    /// Render as text; `color` adds terminal colours
    pub fn render(&self, title: &str, color: bool) -> String {
        let paint_heading = |s: &str| {
            if color {
                s.bold().to_string()
            } else {
                s.to_string()
            }
        };
        let paint_name = |s: &str| {
            if color {
                s.cyan().to_string()
            } else {
                s.to_string()
            }
        };

        let mut out = String::new();
        let _ = writeln!(out, "{}", paint_heading(&format!("summary: {}", title)));

        if !self.durations.is_empty() {
            let _ = writeln!(out, "{}", paint_heading("tasks"));
            for ((domain, name), stats) in &self.durations {
                let _ = writeln!(
                    out,
                    "  {} count={} total={} min={} max={} mean={}",
                    paint_name(&format!("{}/{}", domain, name)),
                    stats.count,
                    stats.total,
                    stats.min,
                    stats.max,
                    stats.mean()
                );
            }
        }

        if !self.counters.is_empty() {
            let _ = writeln!(out, "{}", paint_heading("counters"));
            for ((domain, name), stats) in &self.counters {
                let _ = writeln!(
                    out,
                    "  {} samples={} min={} max={} mean={}",
                    paint_name(&format!("{}/{}", domain, name)),
                    stats.count,
                    stats.min,
                    stats.max,
                    stats.mean()
                );
            }
        }

        if !self.instants.is_empty() {
            let _ = writeln!(out, "{}", paint_heading("instants"));
            for ((domain, name), count) in &self.instants {
                let _ = writeln!(
                    out,
                    "  {} count={}",
                    paint_name(&format!("{}/{}", domain, name)),
                    count
                );
            }
        }

        let _ = writeln!(
            out,
            "relations={} metadata={} context_switches={}",
            self.relations, self.metadata, self.context_switches
        );
        out
    }
}

/// Collects a [`Summary`] and writes it when the run finishes
pub struct SummarySink {
    path: PathBuf,
    echo: bool,
    summary: Summary,
}

impl SummarySink {
    /// The file is created right away so a bad path fails before replay
    pub fn create(path: &Path, echo: bool) -> io::Result<Self> {
        fs::write(path, "")?;
        Ok(Self {
            path: path.to_path_buf(),
            echo,
            summary: Summary::default(),
        })
    }

    fn title(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().trim_end_matches(".summary.txt").to_string())
            .unwrap_or_default()
    }
}

impl Sink for SummarySink {
    fn complete_task(&mut self, kind: TaskKind, begin: &TimedEvent, end: &TimedEvent) -> Result<()> {
        self.summary.record(kind, begin, end);
        Ok(())
    }

    fn relation(&mut self, _link: &TimedEvent, _start: &TimedEvent, _finish: &TimedEvent) -> Result<()> {
        self.summary.relations += 1;
        Ok(())
    }

    fn global_metadata(&mut self, _record: &TimedEvent) -> Result<()> {
        self.summary.metadata += 1;
        Ok(())
    }

    fn context_switch(
        &mut self,
        _time: f64,
        _cpu: u32,
        _prev: &ThreadState,
        _next: &ThreadState,
    ) -> Result<()> {
        self.summary.context_switches += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let title = self.title();
        fs::write(&self.path, self.summary.render(&title, false))?;
        if self.echo {
            print!("{}", self.summary.render(&title, true));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracestitch_types::{CanonicalEvent, EventKind};

    fn timed(kind: EventKind, name: &str, ts: u64) -> TimedEvent {
        TimedEvent::new(CanonicalEvent::new("cpu", kind, ts).with_name(name), ts as f64)
    }

    #[test]
    fn test_stats_per_domain_and_name() {
        let mut summary = Summary::default();
        for (b, e) in [(0, 4), (10, 12), (20, 29)] {
            summary.record(
                TaskKind::Task,
                &timed(EventKind::TaskBegin, "draw", b),
                &timed(EventKind::TaskEnd, "draw", e),
            );
        }
        for value in [1.0, 5.0] {
            let sample = TimedEvent::new(
                CanonicalEvent::new("cpu", EventKind::Counter, 3)
                    .with_name("queue")
                    .with_delta(value),
                3.0,
            );
            summary.record(TaskKind::Counter, &sample, &sample);
        }
        let vsync = timed(EventKind::Marker, "vsync", 8);
        summary.record(TaskKind::Marker, &vsync, &vsync);

        let draw = summary.durations[&("cpu".to_string(), "draw".to_string())];
        assert_eq!(draw.count, 3);
        assert_eq!(draw.total, 15.0);
        assert_eq!(draw.min, 2.0);
        assert_eq!(draw.max, 9.0);
        assert_eq!(draw.mean(), 5.0);

        insta::assert_snapshot!("summary_plain", summary.render("trace", false).trim_end());
    }
}
