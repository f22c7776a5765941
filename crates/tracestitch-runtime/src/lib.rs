pub mod config;
pub mod error;
pub mod fanout;
pub mod merge;
pub mod parallel;
pub mod pipeline;
pub mod plan;
pub mod prefetch;

pub use config::{Config, Limits, SyncOverride};
pub use error::{Error, Result};
pub use fanout::{FanOut, FilterOptions};
pub use merge::MergeScheduler;
pub use parallel::{process_captures, run_captures};
pub use pipeline::{CaptureReport, METADATA_DOMAIN, Pipeline, ReplaySource};
pub use plan::{CutSelection, PlannedRun, plan_runs, select_partitions};
pub use prefetch::PrefetchReader;
