use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use tracestitch_engine::Sink;
use tracestitch_providers::{Capture, discover_captures};
use tracestitch_runtime::{Config, Error as RuntimeError, Pipeline, PlannedRun, process_captures};

use crate::args::{ConvertArgs, OutputKind};
use crate::sinks::open_sink;

/// `<input>.stitched`, with a file input's extension dropped first
fn default_prefix(input: &Path) -> PathBuf {
    // components() drops a trailing separator
    let base: PathBuf = if input.is_dir() {
        input.components().collect()
    } else {
        input.with_extension("")
    };
    let mut prefix = base.into_os_string();
    prefix.push(".stitched");
    PathBuf::from(prefix)
}

/// Artifact prefix of one capture: shared when there is only one capture
fn capture_prefix(prefix: &Path, capture: &Capture, multi: bool) -> String {
    let prefix = prefix.to_string_lossy();
    if multi {
        format!("{}-{}", prefix, capture.name())
    } else {
        prefix.into_owned()
    }
}

fn unique_formats(formats: &[OutputKind]) -> Vec<OutputKind> {
    let mut formats = formats.to_vec();
    formats.sort();
    formats.dedup();
    formats
}

/// Delete what a failed capture had already written
fn remove_partial(paths: &[PathBuf]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "partial artifact removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), "cannot remove partial artifact: {}", err),
        }
    }
}

fn install_stop_handler() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    if let Err(err) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Ctrl-C will not stop the replay early: {}", err);
    }
    stop
}

pub fn handle(config: Config, args: &ConvertArgs) -> Result<()> {
    let captures = discover_captures(&args.input)
        .with_context(|| format!("No capture found at {}", args.input.display()))?;
    let names: Vec<String> = captures.iter().map(|c| c.name()).collect();

    let prefix = args.output.clone().unwrap_or_else(|| default_prefix(&args.input));
    let multi = captures.len() > 1;
    let formats = unique_formats(&args.formats);
    let echo = formats.contains(&OutputKind::Summary) && std::io::stdout().is_terminal();

    info!(captures = captures.len(), formats = ?formats, "converting");

    let artifacts: Arc<Mutex<BTreeMap<String, Vec<PathBuf>>>> = Arc::default();
    let make_sinks = {
        let artifacts = Arc::clone(&artifacts);
        move |capture: &Capture, run: &PlannedRun| -> tracestitch_runtime::Result<Vec<Box<dyn Sink>>> {
            let stem = run.artifact_name(&capture_prefix(&prefix, capture, multi));
            let paths: Vec<PathBuf> = formats
                .iter()
                .map(|kind| PathBuf::from(format!("{}.{}", stem, kind.extension())))
                .collect();

            // registered before opening so a failed capture can take them back
            artifacts
                .lock()
                .map_err(|_| RuntimeError::InvalidOperation("artifact list poisoned".to_string()))?
                .entry(capture.name())
                .or_default()
                .extend(paths.iter().cloned());

            formats
                .iter()
                .zip(&paths)
                .map(|(kind, path)| open_sink(*kind, path, echo).map_err(RuntimeError::from))
                .collect()
        }
    };

    let pipeline = Pipeline::new(config).with_stop_flag(install_stop_handler());
    let results = process_captures(pipeline, captures, make_sinks)?;

    let mut produced = Vec::new();
    let mut failures = Vec::new();
    let artifacts = artifacts
        .lock()
        .map_err(|_| anyhow::anyhow!("artifact list poisoned"))?;

    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(reports) => {
                for report in &reports {
                    info!(
                        capture = %report.capture,
                        cut = ?report.cut,
                        records = report.records,
                        failed_partitions = report.failed_partitions,
                        "capture converted"
                    );
                    if report.stopped {
                        warn!(capture = %report.capture, "stopped early, output is partial");
                    }
                }
                if let Some(paths) = artifacts.get(name) {
                    produced.extend(paths.iter().map(|p| p.display().to_string()));
                }
            }
            Err(err) => {
                error!(capture = %name, "conversion failed: {}", err);
                if let Some(paths) = artifacts.get(name) {
                    remove_partial(paths);
                }
                failures.push(format!("{}: {}", name, err));
            }
        }
    }

    println!("result: {}", serde_json::to_string(&produced)?);

    if !failures.is_empty() {
        anyhow::bail!(
            "{} of {} capture(s) failed: {}",
            failures.len(),
            names.len(),
            failures.join("; ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prefix_never_overwrites_the_input() {
        assert_eq!(
            default_prefix(Path::new("/tmp/missing/trace.jsonl")),
            PathBuf::from("/tmp/missing/trace.stitched")
        );
    }

    #[test]
    fn test_remove_partial_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let written = dir.path().join("out.jsonl");
        fs::write(&written, "{}\n").unwrap();
        let never = dir.path().join("out.csv");

        remove_partial(&[written.clone(), never.clone()]);
        assert!(!written.exists());
        assert!(!never.exists());
    }

    #[test]
    fn test_unique_formats() {
        let formats = unique_formats(&[OutputKind::Summary, OutputKind::Jsonl, OutputKind::Summary]);
        assert_eq!(formats, vec![OutputKind::Jsonl, OutputKind::Summary]);
    }
}
