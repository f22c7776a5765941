use tracestitch_types::{CanonicalEvent, EventKind, TaskKind, TimedEvent};
use tracing::{error, info, warn};

use super::Correlator;
use crate::sink::Sink;
use crate::{Error, Result};

impl Correlator {
    /// Deal with everything still unmatched at the end of the stream.
    ///
    /// Ring-buffer, cut and windowed captures get their edges repaired: an
    /// orphan end gets a begin at the left bound, an open begin gets an end
    /// at the right bound. Complete captures must not have leftovers; they
    /// are an error in strict mode and dropped otherwise.
    pub(super) fn handle_leftovers(&mut self, sink: &mut dyn Sink) -> Result<()> {
        let (markers, open): (Vec<_>, Vec<_>) = self
            .state
            .drain()
            .into_iter()
            .partition(|t| t.begin.is_task_marker());

        // a lone task marker is still a valid instant
        for marker in markers {
            self.diagnostics.unpaired_markers += 1;
            self.emit_point(TaskKind::Marker, marker.into_begin(), sink)?;
        }

        let orphans = std::mem::take(&mut self.orphans);
        let unmatched_ends = orphans.len() as u64 + self.diagnostics.dropped_orphans;
        if orphans.is_empty() && open.is_empty() && self.diagnostics.dropped_orphans == 0 {
            return Ok(());
        }

        if !self.capture.allows_leftover_repair() {
            let first = orphans
                .first()
                .map(|e| describe("end without begin", e))
                .or_else(|| open.first().map(|t| describe("begin without end", &t.begin)))
                .unwrap_or_else(|| "nameless end without begin".to_string());

            if self.config.strict {
                return Err(Error::Unmatched {
                    orphan_ends: unmatched_ends as usize,
                    open_begins: open.len(),
                    first,
                });
            }
            error!(
                orphan_ends = unmatched_ends,
                open_begins = open.len(),
                first = %first,
                "complete capture has unmatched records, dropping them"
            );
            // nameless ends are counted once, as unmatched leftovers
            self.diagnostics.dropped_orphans = 0;
            self.diagnostics.dropped_unmatched += unmatched_ends + open.len() as u64;
            return Ok(());
        }

        let (Some(left), Some(right)) = (self.bounds.min, self.bounds.max) else {
            return Ok(());
        };

        for end in orphans {
            let Some(begin_kind) = begin_kind_for(end.kind) else {
                continue;
            };
            let kind = end.kind.task_kind().unwrap_or(TaskKind::Task);
            let mut begin = end.clone();
            begin.kind = begin_kind;
            begin.timestamp = left;
            let begin = TimedEvent::synthetic(begin, self.mapping.convert(left));
            let end = self.timed(end);
            self.diagnostics.repaired_begins += 1;
            sink.complete_task(kind, &begin, &end)?;
        }

        for task in open {
            let Some(end_kind) = task.begin.kind.end_kind() else {
                warn!(kind = %task.begin.kind, "open entry of a kind that has no end");
                continue;
            };
            let kind = task.begin.kind.task_kind().unwrap_or(TaskKind::Task);
            let mut end = task.begin.clone();
            end.kind = end_kind;
            end.timestamp = right.max(task.begin.timestamp);
            let end_time = self.mapping.convert(end.timestamp);
            let end = TimedEvent::synthetic(end, end_time);
            let begin = self.timed(task.into_begin());
            self.diagnostics.repaired_ends += 1;
            sink.complete_task(kind, &begin, &end)?;
        }

        info!(
            repaired_begins = self.diagnostics.repaired_begins,
            repaired_ends = self.diagnostics.repaired_ends,
            left,
            right,
            "leftovers closed at the capture bounds"
        );
        Ok(())
    }
}

fn begin_kind_for(end: EventKind) -> Option<EventKind> {
    match end {
        EventKind::TaskEnd => Some(EventKind::TaskBegin),
        EventKind::TaskEndOverlapped => Some(EventKind::TaskBeginOverlapped),
        EventKind::FrameEnd => Some(EventKind::FrameBegin),
        _ => None,
    }
}

fn describe(what: &str, event: &CanonicalEvent) -> String {
    format!(
        "{} {} on {}/{} at {}",
        what,
        event.display_name(),
        event.domain,
        event.thread_id,
        event.timestamp
    )
}
