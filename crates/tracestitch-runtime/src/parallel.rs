use std::sync::Arc;

use futures::future::join_all;
use tracestitch_engine::Sink;
use tracestitch_providers::Capture;
use tracing::debug;

use crate::pipeline::{CaptureReport, Pipeline};
use crate::plan::PlannedRun;
use crate::{Error, Result};

/// Run every capture on its own blocking worker and wait for all of them.
///
/// Captures share nothing; one failing capture does not stop the others, so
/// results come back per capture, in input order.
pub async fn run_captures<F>(
    pipeline: Arc<Pipeline>,
    captures: Vec<Capture>,
    make_sinks: Arc<F>,
) -> Vec<Result<Vec<CaptureReport>>>
where
    F: Fn(&Capture, &PlannedRun) -> Result<Vec<Box<dyn Sink>>> + Send + Sync + 'static,
{
    let workers = captures.into_iter().map(|capture| {
        let pipeline = Arc::clone(&pipeline);
        let make_sinks = Arc::clone(&make_sinks);
        tokio::task::spawn_blocking(move || {
            debug!(capture = %capture.name(), "capture worker started");
            pipeline.run_capture(&capture, &*make_sinks)
        })
    });

    join_all(workers)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(result) => result,
            Err(err) => Err(Error::InvalidOperation(format!(
                "capture worker failed: {}",
                err
            ))),
        })
        .collect()
}

/// Blocking entry point: a single capture runs inline, several run on a
/// multi-threaded tokio runtime.
pub fn process_captures<F>(
    pipeline: Pipeline,
    captures: Vec<Capture>,
    make_sinks: F,
) -> Result<Vec<Result<Vec<CaptureReport>>>>
where
    F: Fn(&Capture, &PlannedRun) -> Result<Vec<Box<dyn Sink>>> + Send + Sync + 'static,
{
    if captures.len() <= 1 {
        return Ok(captures
            .iter()
            .map(|capture| pipeline.run_capture(capture, &make_sinks))
            .collect());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(run_captures(
        Arc::new(pipeline),
        captures,
        Arc::new(make_sinks),
    )))
}
