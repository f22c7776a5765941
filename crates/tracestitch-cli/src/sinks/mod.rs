//! Output sinks behind `convert -f`.
//!
//! Every sink writes one artifact file. They hold no correlation logic:
//! records arrive complete and already in output time.

mod table;
mod jsonl;
mod summary;

pub use table::CsvSink;
pub use jsonl::{JsonlSink, OutputRecord};
pub use summary::{Summary, SummarySink};

use std::fs;
use std::io;
use std::path::Path;

use tracestitch_engine::Sink;

use crate::args::OutputKind;

/// Create the sink for `kind` writing to `path`.
///
/// `echo` additionally prints the summary, coloured, to stdout.
pub fn open_sink(kind: OutputKind, path: &Path, echo: bool) -> io::Result<Box<dyn Sink>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(match kind {
        OutputKind::Jsonl => Box::new(JsonlSink::create(path)?),
        OutputKind::Csv => Box::new(CsvSink::create(path)?),
        OutputKind::Summary => Box::new(SummarySink::create(path, echo)?),
    })
}
