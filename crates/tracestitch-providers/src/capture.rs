use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracestitch_types::{CaptureInfo, ContextSwitch, SyncAnchor};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::jsonl::{JsonlReader, peek_first_event, read_jsonl};
use crate::layout::{parse_capture_pid, parse_partition_name};
use crate::sea::{SeaReader, StringTable, peek_first_timestamp, read_sea_metadata};
use crate::traits::{PartitionDescriptor, PartitionFormat, SourceReader};
use crate::{Error, Result};

pub const TIME_SYNC_FILE: &str = "time_sync.jsonl";
pub const CONTEXT_SWITCHES_FILE: &str = "context_switches.jsonl";
pub const MANIFEST_FILE: &str = "capture.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureLayout {
    /// Native recorder directory of `.sea` partitions
    Sea,
    /// Directory of canonical `.jsonl` partitions
    JsonlDir,
    /// A single canonical `.jsonl` file
    JsonlFile,
}

/// A discovered capture: its partitions and side metadata, nothing read yet
#[derive(Debug, Clone)]
pub struct Capture {
    pub root: PathBuf,
    pub layout: CaptureLayout,
    pub info: CaptureInfo,
    pub partitions: Vec<PartitionDescriptor>,
    pub threads: BTreeMap<i64, String>,
    pub processes: BTreeMap<i64, String>,
    pub anchors: Vec<SyncAnchor>,
    strings: StringTable,
}

impl Capture {
    pub fn name(&self) -> String {
        self.root
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture".to_string())
    }

    pub fn total_size(&self) -> u64 {
        self.partitions.iter().map(|p| p.size).sum()
    }

    pub fn open_partition(&self, partition: &PartitionDescriptor) -> Result<Box<dyn SourceReader>> {
        match partition.format {
            PartitionFormat::Sea => Ok(Box::new(SeaReader::open(
                partition.clone(),
                self.info.pid,
                Arc::clone(&self.strings),
            )?)),
            PartitionFormat::Jsonl => Ok(Box::new(JsonlReader::open(partition.clone())?)),
            PartitionFormat::Memory => Err(Error::Format(format!(
                "{} is an in-memory partition and has no file to open",
                partition.label()
            ))),
        }
    }

    pub fn load_context_switches(&self) -> Result<Vec<ContextSwitch>> {
        match self.layout {
            CaptureLayout::JsonlFile => Ok(Vec::new()),
            CaptureLayout::Sea | CaptureLayout::JsonlDir => {
                read_jsonl(&self.root.join(CONTEXT_SWITCHES_FILE))
            }
        }
    }
}

/// capture.toml of a JSONL capture directory
#[derive(Debug, Default, Deserialize)]
struct CaptureManifest {
    pid: Option<i64>,
    #[serde(default)]
    ring_buffer: bool,
    #[serde(default)]
    cuts: Vec<String>,
    #[serde(default)]
    threads: BTreeMap<String, String>,
    #[serde(default)]
    processes: BTreeMap<String, String>,
}

/// Discover the single capture at `path` (a capture directory or a `.jsonl` file).
pub fn discover_capture(path: &Path) -> Result<Capture> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }

    if path.is_file() {
        if path.extension().is_some_and(|e| e == "jsonl") {
            return discover_jsonl_file(path);
        }
        return Err(Error::Format(format!(
            "{} is neither a capture directory nor a .jsonl file",
            path.display()
        )));
    }

    match detect_partition_format(path)? {
        Some(PartitionFormat::Sea) => discover_sea_dir(path),
        Some(PartitionFormat::Jsonl) => discover_jsonl_dir(path),
        _ => Err(Error::NotFound(path.to_path_buf())),
    }
}

/// Discover every capture under `path`.
///
/// `path` may be one capture, or a directory holding several `*-<pid>`
/// capture directories (one per process).
pub fn discover_captures(path: &Path) -> Result<Vec<Capture>> {
    if path.is_file() || (path.is_dir() && detect_partition_format(path)?.is_some()) {
        return Ok(vec![discover_capture(path)?]);
    }
    if !path.is_dir() {
        return Err(Error::NotFound(path.to_path_buf()));
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_capture_pid)
                .is_some()
        })
        .collect();
    dirs.sort();

    let mut captures = Vec::new();
    for dir in dirs {
        match discover_capture(&dir) {
            Ok(capture) => captures.push(capture),
            Err(Error::NotFound(_)) => debug!(dir = %dir.display(), "no partitions, skipping"),
            Err(e) => return Err(e),
        }
    }

    if captures.is_empty() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    Ok(captures)
}

/// Format of the partition files in the domain sub-directories, if any
fn detect_partition_format(root: &Path) -> Result<Option<PartitionFormat>> {
    let mut found = None;
    for entry in WalkDir::new(root).min_depth(2).max_depth(2) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.path().extension().and_then(|e| e.to_str()) {
            Some("sea") => return Ok(Some(PartitionFormat::Sea)),
            Some("jsonl") => found = Some(PartitionFormat::Jsonl),
            _ => {}
        }
    }
    Ok(found)
}

/// Collect `<domain>/<tid>[!cut][-ring].<ext>` partitions, sorted by first timestamp
fn scan_partitions(root: &Path, format: PartitionFormat) -> Result<Vec<PartitionDescriptor>> {
    let ext = format.to_string();
    let mut partitions = Vec::new();

    for entry in WalkDir::new(root).min_depth(2).max_depth(2) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext.as_str()) {
            warn!(file = %path.display(), "unexpected file in domain directory");
            continue;
        }

        let Some(domain) = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
        else {
            continue;
        };
        let Some(name) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(parse_partition_name)
        else {
            warn!(file = %path.display(), "partition file name is not <tid>[!cut][-ring]");
            continue;
        };

        let first_timestamp = match format {
            PartitionFormat::Sea => peek_first_timestamp(path)?,
            _ => match peek_first_event(path) {
                Ok(first) => first.map(|e| e.timestamp),
                Err(Error::Format(reason)) => {
                    warn!(file = %path.display(), "first record unreadable, partition skipped: {}", reason);
                    None
                }
                Err(err) => return Err(err),
            },
        };

        partitions.push(PartitionDescriptor {
            domain: domain.to_string(),
            thread_id: name.thread_id,
            path: Some(path.to_path_buf()),
            cut: name.cut,
            ring: name.ring,
            format,
            size: entry.metadata()?.len(),
            first_timestamp,
        });
    }

    sort_partitions(&mut partitions);
    Ok(partitions)
}

/// Earliest first record first; empty partitions last
fn sort_partitions(partitions: &mut [PartitionDescriptor]) {
    partitions.sort_by(|a, b| {
        let key = |p: &PartitionDescriptor| (p.first_timestamp.is_none(), p.first_timestamp);
        key(a).cmp(&key(b)).then_with(|| a.label().cmp(&b.label()))
    });
}

fn capture_info_from(pid: i64, partitions: &[PartitionDescriptor]) -> CaptureInfo {
    CaptureInfo {
        pid,
        ring_buffer: partitions.iter().any(|p| p.ring.is_some()),
        cuts: partitions.iter().filter_map(|p| p.cut.clone()).collect(),
        windowed: false,
    }
}

fn dir_pid(root: &Path) -> Option<i64> {
    root.file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_capture_pid)
}

fn discover_sea_dir(root: &Path) -> Result<Capture> {
    let pid = dir_pid(root).ok_or_else(|| {
        Error::Format(format!(
            "{}: native capture directory must be named <name>-<pid>",
            root.display()
        ))
    })?;
    let meta = read_sea_metadata(root)?;
    let partitions = scan_partitions(root, PartitionFormat::Sea)?;
    let anchors = read_jsonl(&root.join(TIME_SYNC_FILE))?;

    debug!(
        root = %root.display(),
        pid,
        partitions = partitions.len(),
        strings = meta.strings.len(),
        "discovered native capture"
    );

    Ok(Capture {
        root: root.to_path_buf(),
        layout: CaptureLayout::Sea,
        info: capture_info_from(pid, &partitions),
        partitions,
        threads: meta.threads,
        processes: meta.processes,
        anchors,
        strings: Arc::new(meta.strings),
    })
}

fn discover_jsonl_dir(root: &Path) -> Result<Capture> {
    let manifest_path = root.join(MANIFEST_FILE);
    let manifest: CaptureManifest = if manifest_path.exists() {
        toml::from_str(&fs::read_to_string(&manifest_path)?)?
    } else {
        CaptureManifest::default()
    };

    let partitions = scan_partitions(root, PartitionFormat::Jsonl)?;
    let pid = match manifest.pid.or_else(|| dir_pid(root)) {
        Some(pid) => pid,
        None => first_record_pid(&partitions)?,
    };

    let mut info = capture_info_from(pid, &partitions);
    info.ring_buffer |= manifest.ring_buffer;
    info.cuts.extend(manifest.cuts.iter().cloned());

    Ok(Capture {
        root: root.to_path_buf(),
        layout: CaptureLayout::JsonlDir,
        info,
        partitions,
        threads: parse_named_ids(&manifest.threads, "thread"),
        processes: parse_named_ids(&manifest.processes, "process"),
        anchors: read_jsonl(&root.join(TIME_SYNC_FILE))?,
        strings: Arc::new(HashMap::new()),
    })
}

fn discover_jsonl_file(path: &Path) -> Result<Capture> {
    let first = peek_first_event(path)?;
    let domain = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let partition = PartitionDescriptor {
        domain,
        thread_id: first.as_ref().map(|e| e.thread_id).unwrap_or_default(),
        path: Some(path.to_path_buf()),
        cut: None,
        ring: None,
        format: PartitionFormat::Jsonl,
        size: fs::metadata(path)?.len(),
        first_timestamp: first.as_ref().map(|e| e.timestamp),
    };

    Ok(Capture {
        root: path.to_path_buf(),
        layout: CaptureLayout::JsonlFile,
        info: CaptureInfo {
            pid: first.map(|e| e.process_id).unwrap_or_default(),
            ring_buffer: false,
            cuts: BTreeSet::new(),
            windowed: false,
        },
        partitions: vec![partition],
        threads: BTreeMap::new(),
        processes: BTreeMap::new(),
        anchors: Vec::new(),
        strings: Arc::new(HashMap::new()),
    })
}

fn first_record_pid(partitions: &[PartitionDescriptor]) -> Result<i64> {
    for partition in partitions.iter().filter(|p| p.first_timestamp.is_some()) {
        if let Some(path) = &partition.path
            && let Some(event) = peek_first_event(path)?
        {
            return Ok(event.process_id);
        }
    }
    Ok(0)
}

fn parse_named_ids(names: &BTreeMap<String, String>, what: &str) -> BTreeMap<i64, String> {
    names
        .iter()
        .filter_map(|(key, name)| match key.parse::<i64>() {
            Ok(id) => Some((id, name.clone())),
            Err(_) => {
                warn!(key = %key, "{} name keyed by a non-numeric id", what);
                None
            }
        })
        .collect()
}
