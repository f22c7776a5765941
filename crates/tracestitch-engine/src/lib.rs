//! Correlation engine for tracestitch.
//!
//! Consumes canonical records in global time order and produces completed
//! tasks, relations and metadata on a [`Sink`], with all times converted by a
//! [`TimeMapping`].

pub mod correlator;
pub mod diagnostics;
pub mod error;
pub mod sink;
pub mod timesync;

pub use correlator::{
    ContextKey, CorrelationKey, Correlator, CorrelatorConfig, CounterSampler, MemoryMode,
    OpenTaskState, TimeBounds, UNKNOWN_TASK_NAME,
};
pub use diagnostics::Diagnostics;
pub use error::{Error, Result};
pub use sink::{CollectingSink, Emitted, Sink};
pub use timesync::{TimeMapping, compute_time_sync};
