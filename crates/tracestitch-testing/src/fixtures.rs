//! On-disk capture writers.
//!
//! Both writers produce exactly the layouts `discover_capture` reads:
//! - [`SeaCaptureWriter`]: native `<name>-<pid>/` directories of `.sea` partitions
//! - [`JsonlCaptureWriter`]: directories of canonical `.jsonl` partitions

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracestitch_providers::layout::parse_partition_name;
use tracestitch_providers::{CONTEXT_SWITCHES_FILE, MANIFEST_FILE, TIME_SYNC_FILE, encode_record};
use tracestitch_types::{CanonicalEvent, ContextSwitch, SyncAnchor};

/// Thread id encoded in a partition file stem (`<tid>[!cut][-ring]`)
fn stem_thread(stem: &str) -> Result<i64> {
    match parse_partition_name(stem) {
        Some(name) => Ok(name.thread_id),
        None => bail!("{} is not a <tid>[!cut][-ring] partition name", stem),
    }
}

/// Move a record built with process/thread 0 onto its partition
fn homed(event: &CanonicalEvent, domain: &str, pid: i64, tid: i64) -> CanonicalEvent {
    let mut event = event.clone();
    event.domain = domain.to_string();
    if event.process_id == 0 {
        event.process_id = pid;
    }
    if event.thread_id == 0 {
        event.thread_id = tid;
    }
    event
}

/// Write `items` as one JSON object per line.
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let mut out = BufWriter::new(
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
    );
    for item in items {
        serde_json::to_writer(&mut out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Writer for a native capture directory `<name>-<pid>/`.
///
/// Record names are interned into `<handle>.str` files as partitions are
/// written.
pub struct SeaCaptureWriter {
    root: PathBuf,
    pid: i64,
    handles: HashMap<String, u64>,
}

impl SeaCaptureWriter {
    pub fn create(parent: &Path, name: &str, pid: i64) -> Result<Self> {
        let root = parent.join(format!("{}-{}", name, pid));
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            pid,
            handles: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pid(&self) -> i64 {
        self.pid
    }

    fn intern(&mut self, name: &str) -> Result<u64> {
        if let Some(handle) = self.handles.get(name) {
            return Ok(*handle);
        }
        let handle = self.handles.len() as u64 + 1;
        fs::write(self.root.join(format!("{}.str", handle)), format!("{}\n", name))?;
        self.handles.insert(name.to_string(), handle);
        Ok(handle)
    }

    /// Encode `events` into `<domain>/<stem>.sea`.
    pub fn partition(&mut self, domain: &str, stem: &str, events: &[CanonicalEvent]) -> Result<PathBuf> {
        let tid = stem_thread(stem)?;
        let mut bytes = Vec::new();
        for event in events {
            let event = homed(event, domain, self.pid, tid);
            let handle = match &event.name {
                Some(name) => Some(self.intern(name)?),
                None => None,
            };
            bytes.extend(encode_record(&event, handle, self.pid, tid));
        }
        self.raw_partition(domain, stem, &bytes)
    }

    /// Write `<domain>/<stem>.sea` as given, for truncated or corrupt files.
    pub fn raw_partition(&self, domain: &str, stem: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.root.join(domain);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.sea", stem));
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn thread_name(&self, tid: i64, name: &str) -> Result<()> {
        fs::write(self.root.join(format!("{},{}.tid", self.pid, tid)), name)?;
        Ok(())
    }

    pub fn process_name(&self, pid: i64, name: &str) -> Result<()> {
        fs::write(self.root.join(format!("{}.pid", pid)), name)?;
        Ok(())
    }

    pub fn time_sync(&self, anchors: &[SyncAnchor]) -> Result<()> {
        write_jsonl(&self.root.join(TIME_SYNC_FILE), anchors)
    }

    pub fn context_switches(&self, switches: &[ContextSwitch]) -> Result<()> {
        write_jsonl(&self.root.join(CONTEXT_SWITCHES_FILE), switches)
    }
}

/// Contents of `capture.toml`
#[derive(Debug, Default, Serialize)]
struct Manifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<i64>,
    ring_buffer: bool,
    cuts: Vec<String>,
    threads: BTreeMap<String, String>,
    processes: BTreeMap<String, String>,
}

/// Writer for a directory of canonical `.jsonl` partitions.
///
/// `capture.toml` is rewritten after every manifest change.
pub struct JsonlCaptureWriter {
    root: PathBuf,
    manifest: Manifest,
}

impl JsonlCaptureWriter {
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            manifest: Manifest::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_manifest(&self) -> Result<()> {
        let text = toml::to_string(&self.manifest)?;
        fs::write(self.root.join(MANIFEST_FILE), text)?;
        Ok(())
    }

    pub fn pid(mut self, pid: i64) -> Result<Self> {
        self.manifest.pid = Some(pid);
        self.write_manifest()?;
        Ok(self)
    }

    pub fn ring_buffer(mut self) -> Result<Self> {
        self.manifest.ring_buffer = true;
        self.write_manifest()?;
        Ok(self)
    }

    pub fn thread_name(&mut self, tid: i64, name: &str) -> Result<()> {
        self.manifest.threads.insert(tid.to_string(), name.to_string());
        self.write_manifest()
    }

    pub fn process_name(&mut self, pid: i64, name: &str) -> Result<()> {
        self.manifest.processes.insert(pid.to_string(), name.to_string());
        self.write_manifest()
    }

    /// Write `events` to `<domain>/<stem>.jsonl`.
    pub fn partition(&self, domain: &str, stem: &str, events: &[CanonicalEvent]) -> Result<PathBuf> {
        let tid = stem_thread(stem)?;
        let pid = self.manifest.pid.unwrap_or_default();
        let events: Vec<CanonicalEvent> = events.iter().map(|e| homed(e, domain, pid, tid)).collect();

        let dir = self.root.join(domain);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.jsonl", stem));
        write_jsonl(&path, &events)?;
        Ok(path)
    }

    pub fn time_sync(&self, anchors: &[SyncAnchor]) -> Result<()> {
        write_jsonl(&self.root.join(TIME_SYNC_FILE), anchors)
    }

    pub fn context_switches(&self, switches: &[ContextSwitch]) -> Result<()> {
        write_jsonl(&self.root.join(CONTEXT_SWITCHES_FILE), switches)
    }
}

/// Write a single-file capture: `events` as given, one per line.
pub fn write_jsonl_capture(path: &Path, events: &[CanonicalEvent]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_jsonl(path, events)
}
