use serde::Serialize;
use std::fmt;

/// Counters describing what the correlator had to drop, park or repair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub events: u64,
    pub malformed: u64,
    pub tasks_completed: u64,
    pub point_events: u64,
    pub unmatched_ends: u64,
    /// Nameless ends without a begin that no repair can place
    pub dropped_orphans: u64,
    pub repaired_begins: u64,
    pub repaired_ends: u64,
    /// Leftovers of a complete capture discarded in lenient mode,
    /// nameless ends included
    pub dropped_unmatched: u64,
    pub unpaired_markers: u64,
    pub relations_emitted: u64,
    pub relations_dropped: u64,
    pub counter_samples_aggregated: u64,
    pub counter_windows_flushed: u64,
    pub metadata_parked: u64,
    /// Allocator counters attributed to open tasks
    pub memory_samples: u64,
}

impl Diagnostics {
    /// Fold the counters of another run into this one
    pub fn merge(&mut self, other: &Diagnostics) {
        self.events += other.events;
        self.malformed += other.malformed;
        self.tasks_completed += other.tasks_completed;
        self.point_events += other.point_events;
        self.unmatched_ends += other.unmatched_ends;
        self.dropped_orphans += other.dropped_orphans;
        self.repaired_begins += other.repaired_begins;
        self.repaired_ends += other.repaired_ends;
        self.dropped_unmatched += other.dropped_unmatched;
        self.unpaired_markers += other.unpaired_markers;
        self.relations_emitted += other.relations_emitted;
        self.relations_dropped += other.relations_dropped;
        self.counter_samples_aggregated += other.counter_samples_aggregated;
        self.counter_windows_flushed += other.counter_windows_flushed;
        self.metadata_parked += other.metadata_parked;
        self.memory_samples += other.memory_samples;
    }

    pub fn repaired(&self) -> u64 {
        self.repaired_begins + self.repaired_ends
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events, {} tasks, {} points, {} relations, {} malformed, {} repaired, {} dropped",
            self.events,
            self.tasks_completed,
            self.point_events,
            self.relations_emitted,
            self.malformed,
            self.repaired(),
            self.dropped_orphans + self.dropped_unmatched + self.relations_dropped
        )
    }
}
