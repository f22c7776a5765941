use std::collections::BTreeMap;

use tracestitch_types::CanonicalEvent;

/// One averaged counter value for a finished window
#[derive(Debug, Clone)]
pub struct WindowSample {
    /// Last raw sample of the series, carrying domain, thread and name
    pub template: CanonicalEvent,
    /// Window midpoint in raw capture units
    pub midpoint: f64,
    pub mean: f64,
    pub samples: u64,
}

#[derive(Debug)]
struct Series {
    sum: f64,
    count: u64,
    last: CanonicalEvent,
}

/// Averages counter samples per (domain, name) over fixed windows.
///
/// Windows are anchored at the first sample's timestamp, so window `k` covers
/// `[anchor + k*w, anchor + (k+1)*w)`.
#[derive(Debug)]
pub struct CounterSampler {
    window: u64,
    anchor: Option<u64>,
    current: u64,
    series: BTreeMap<(String, String), Series>,
}

impl CounterSampler {
    pub fn new(window: u64) -> Self {
        Self {
            window: window.max(1),
            anchor: None,
            current: 0,
            series: BTreeMap::new(),
        }
    }

    /// Add a sample; returns the averages of the window it closed, if any
    pub fn add(&mut self, sample: CanonicalEvent, value: f64) -> Vec<WindowSample> {
        let anchor = *self.anchor.get_or_insert(sample.timestamp);
        let index = sample.timestamp.saturating_sub(anchor) / self.window;

        let flushed = if index > self.current && !self.series.is_empty() {
            self.flush()
        } else {
            Vec::new()
        };
        self.current = self.current.max(index);

        let key = (
            sample.domain.clone(),
            sample.name.clone().unwrap_or_default(),
        );
        match self.series.get_mut(&key) {
            Some(series) => {
                series.sum += value;
                series.count += 1;
                series.last = sample;
            }
            None => {
                self.series.insert(
                    key,
                    Series {
                        sum: value,
                        count: 1,
                        last: sample,
                    },
                );
            }
        }
        flushed
    }

    /// Emit the averages of the current window and start an empty one
    pub fn flush(&mut self) -> Vec<WindowSample> {
        let Some(anchor) = self.anchor else {
            return Vec::new();
        };
        let midpoint =
            anchor as f64 + (self.current * self.window) as f64 + self.window as f64 / 2.0;

        std::mem::take(&mut self.series)
            .into_values()
            .map(|series| WindowSample {
                template: series.last,
                midpoint,
                mean: series.sum / series.count as f64,
                samples: series.count,
            })
            .collect()
    }
}
