use serde::Serialize;
use std::cmp::Ordering;
use tracestitch_types::SyncAnchor;
use tracing::{info, warn};

/// Affine mapping from a capture's clock to output time.
///
/// `output = (source - source_start) * ratio + target_start`. Computed once per
/// capture and not changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeMapping {
    pub source_start: f64,
    pub target_start: f64,
    pub ratio: f64,

    /// Half-width of the simultaneity window, in output units.
    /// None when the mapping was not derived from anchors.
    pub precision: Option<f64>,
}

impl Default for TimeMapping {
    fn default() -> Self {
        Self::identity()
    }
}

impl TimeMapping {
    pub fn identity() -> Self {
        Self {
            source_start: 0.0,
            target_start: 0.0,
            ratio: 1.0,
            precision: None,
        }
    }

    pub fn explicit(source_start: f64, target_start: f64, ratio: f64) -> Self {
        Self {
            source_start,
            target_start,
            ratio,
            precision: None,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.source_start == 0.0 && self.target_start == 0.0 && self.ratio == 1.0
    }

    pub fn convert(&self, source: u64) -> f64 {
        self.convert_raw(source as f64)
    }

    /// Convert a fractional source time (window midpoints, turbo-task ends)
    pub fn convert_raw(&self, source: f64) -> f64 {
        (source - self.source_start) * self.ratio + self.target_start
    }
}

/// Derive a mapping from anchors given in arrival order.
///
/// The closest adjacent pair (smallest target delta, then source delta, then
/// earliest) fixes the common instant: three quarters into the source interval,
/// one quarter into the target interval. The rate comes from the first and last
/// anchors. `target_scale` converts target units to output units.
pub fn compute_time_sync(anchors: &[SyncAnchor], target_scale: f64) -> TimeMapping {
    if anchors.len() < 2 {
        if !anchors.is_empty() {
            warn!(
                anchors = anchors.len(),
                "too few sync anchors, timestamps are left in the capture clock"
            );
        }
        return TimeMapping::identity();
    }

    let closest = anchors
        .windows(2)
        .enumerate()
        .map(|(idx, pair)| {
            let d_target = pair[1].target - pair[0].target;
            let d_source = pair[1].source as i128 - pair[0].source as i128;
            (d_target, d_source, idx)
        })
        .min_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });
    let Some((d_target, d_source, idx)) = closest else {
        return TimeMapping::identity();
    };

    let earlier = anchors[idx];
    let source_start = earlier.source as f64 + (d_source as f64 * 0.75).trunc();
    let target_start = (earlier.target + d_target * 0.25) * target_scale;
    let precision = d_target / 2.0 * target_scale;

    let first = anchors[0];
    let last = anchors[anchors.len() - 1];
    let span_source = last.source as f64 - first.source as f64;
    let span_target = last.target - first.target;
    let ratio = match span_source.partial_cmp(&0.0) {
        Some(Ordering::Equal) | None => {
            warn!("sync anchors span no source time, assuming equal rates");
            target_scale
        }
        _ => target_scale * span_target / span_source,
    };

    info!(
        precision,
        ratio, source_start, target_start, "timelines correlated"
    );

    TimeMapping {
        source_start,
        target_start,
        ratio,
        precision: Some(precision),
    }
}
