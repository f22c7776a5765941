use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use tracestitch_engine::TimeMapping;
use tracestitch_providers::{Capture, CaptureLayout, discover_captures};
use tracestitch_runtime::{Config, Pipeline};

use crate::args::InspectFormat;

#[derive(Debug, Serialize)]
struct PartitionView {
    domain: String,
    thread: i64,
    cut: Option<String>,
    ring: Option<String>,
    format: String,
    size: u64,
    first_timestamp: Option<u64>,
}

#[derive(Debug, Serialize)]
struct CaptureView {
    name: String,
    root: String,
    layout: &'static str,
    pid: i64,
    ring_buffer: bool,
    cuts: Vec<String>,
    /// Last modification of the capture on disk, local time
    recorded: Option<String>,
    total_size: u64,
    partitions: Vec<PartitionView>,
    threads: BTreeMap<i64, String>,
    processes: BTreeMap<i64, String>,
    anchors: usize,
    mapping: TimeMapping,
}

fn layout_name(layout: CaptureLayout) -> &'static str {
    match layout {
        CaptureLayout::Sea => "native",
        CaptureLayout::JsonlDir => "jsonl-dir",
        CaptureLayout::JsonlFile => "jsonl-file",
    }
}

fn recorded(root: &Path) -> Option<String> {
    let modified = std::fs::metadata(root).ok()?.modified().ok()?;
    let local: DateTime<Local> = modified.into();
    Some(local.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn view(capture: &Capture, pipeline: &Pipeline) -> CaptureView {
    CaptureView {
        name: capture.name(),
        root: capture.root.display().to_string(),
        layout: layout_name(capture.layout),
        pid: capture.info.pid,
        ring_buffer: capture.info.ring_buffer,
        cuts: capture.info.cuts.iter().cloned().collect(),
        recorded: recorded(&capture.root),
        total_size: capture.total_size(),
        partitions: capture
            .partitions
            .iter()
            .map(|p| PartitionView {
                domain: p.domain.clone(),
                thread: p.thread_id,
                cut: p.cut.clone(),
                ring: p.ring.clone(),
                format: p.format.to_string(),
                size: p.size,
                first_timestamp: p.first_timestamp,
            })
            .collect(),
        threads: capture.threads.clone(),
        processes: capture.processes.clone(),
        anchors: capture.anchors.len(),
        mapping: pipeline.mapping_for(capture),
    }
}

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

fn print_plain(capture: &CaptureView) {
    println!("capture {} ({})", capture.name, capture.layout);
    println!("  root: {}", capture.root);
    println!("  pid: {}", capture.pid);
    println!(
        "  ring buffer: {}",
        if capture.ring_buffer { "yes" } else { "no" }
    );
    let cuts = (!capture.cuts.is_empty()).then(|| capture.cuts.join(", "));
    println!("  cuts: {}", or_dash(cuts));
    println!("  recorded: {}", or_dash(capture.recorded.clone()));
    println!(
        "  partitions: {} ({} bytes)",
        capture.partitions.len(),
        capture.total_size
    );
    for p in &capture.partitions {
        let mut label = format!("{}/{}", p.domain, p.thread);
        if let Some(cut) = &p.cut {
            label.push_str(&format!("!{}", cut));
        }
        if let Some(ring) = &p.ring {
            label.push_str(&format!("-{}", ring));
        }
        println!(
            "    {} {} size={} first={}",
            label,
            p.format,
            p.size,
            or_dash(p.first_timestamp.map(|t| t.to_string()))
        );
    }
    for (tid, name) in &capture.threads {
        println!("  thread {}: {}", tid, name);
    }
    for (pid, name) in &capture.processes {
        println!("  process {}: {}", pid, name);
    }
    println!("  anchors: {}", capture.anchors);

    let m = &capture.mapping;
    if m.is_identity() {
        println!("  mapping: identity");
    } else {
        println!(
            "  mapping: source_start={} target_start={} ratio={} precision={}",
            m.source_start,
            m.target_start,
            m.ratio,
            or_dash(m.precision.map(|p| p.to_string()))
        );
    }
}

pub fn handle(input: &Path, config: Config, format: InspectFormat) -> Result<()> {
    let captures = discover_captures(input)
        .with_context(|| format!("No capture found at {}", input.display()))?;
    let pipeline = Pipeline::new(config);
    let views: Vec<CaptureView> = captures.iter().map(|c| view(c, &pipeline)).collect();

    match format {
        InspectFormat::Json => println!("{}", serde_json::to_string_pretty(&views)?),
        InspectFormat::Plain => {
            for capture in &views {
                print_plain(capture);
            }
        }
    }
    Ok(())
}
