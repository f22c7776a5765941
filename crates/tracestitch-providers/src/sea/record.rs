use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::sync::Arc;

use tracestitch_types::{CanonicalEvent, EventKind, MarkerScope};
use tracing::{debug, warn};

use crate::traits::{OrderGuard, PartitionDescriptor, SourceReader};
use crate::{Error, Result};

/// Header: u64 time, u8 kind, u8 flags
pub const HEADER_LEN: usize = 10;

/// Optional fields follow the header in this order
pub mod flags {
    pub const ID: u8 = 0x01;
    pub const PARENT: u8 = 0x02;
    pub const STRING: u8 = 0x04;
    pub const THREAD: u8 = 0x08;
    pub const DATA: u8 = 0x10;
    pub const DELTA: u8 = 0x20;
    pub const POINTER: u8 = 0x40;
    pub const PROCESS: u8 = 0x80;
}

pub type StringTable = Arc<HashMap<u64, String>>;

/// Reader for one native `.sea` partition file
pub struct SeaReader {
    descriptor: PartitionDescriptor,
    file: BufReader<File>,
    strings: StringTable,
    process_id: i64,
    position: u64,
    guard: OrderGuard,
    finished: bool,
}

impl SeaReader {
    pub fn open(
        descriptor: PartitionDescriptor,
        process_id: i64,
        strings: StringTable,
    ) -> Result<Self> {
        let path = descriptor
            .path
            .clone()
            .ok_or_else(|| Error::Format("sea partition without a file".to_string()))?;
        let file = File::open(&path)?;
        Ok(Self {
            descriptor,
            file: BufReader::new(file),
            strings,
            process_id,
            position: 0,
            guard: OrderGuard::default(),
            finished: false,
        })
    }

    /// Fill `buf` as far as the file allows, returning the byte count
    fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.position += filled as u64;
        Ok(filled)
    }

    /// Take exactly `len` bytes, or None when the record is cut short
    fn take(&mut self, len: usize) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; len];
        let got = self.read_up_to(&mut buf)?;
        if got < len {
            warn!(
                partition = %self.descriptor.label(),
                offset = self.position,
                "truncated record at end of partition"
            );
            return Ok(None);
        }
        Ok(Some(buf))
    }

    fn take_u64(&mut self) -> Result<Option<u64>> {
        Ok(self.take(8)?.map(|bytes| le_u64(&bytes)))
    }

    fn decode(&mut self) -> Result<Option<CanonicalEvent>> {
        let mut header = [0u8; HEADER_LEN];
        let got = self.read_up_to(&mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_LEN {
            warn!(partition = %self.descriptor.label(), "truncated record header");
            return Ok(None);
        }
        if header.iter().all(|b| *b == 0) {
            debug!(partition = %self.descriptor.label(), "zero padding reached");
            return Ok(None);
        }

        let timestamp = le_u64(&header[..8]);
        let kind = EventKind::from_code(header[8]).ok_or_else(|| {
            Error::Format(format!(
                "unknown record kind {} in {} at offset {}",
                header[8],
                self.descriptor.label(),
                self.position - HEADER_LEN as u64
            ))
        })?;
        let record_flags = header[9];

        let mut event = CanonicalEvent::new(self.descriptor.domain.clone(), kind, timestamp)
            .with_thread(self.process_id, self.descriptor.thread_id);

        if record_flags & flags::ID != 0 {
            let Some(bytes) = self.take(16)? else {
                return Ok(None);
            };
            event.id = Some(le_u64(&bytes));
        }
        if record_flags & flags::PARENT != 0 {
            let Some(bytes) = self.take(16)? else {
                return Ok(None);
            };
            event.parent_id = Some(le_u64(&bytes));
        }
        if record_flags & flags::STRING != 0 {
            let Some(handle) = self.take_u64()? else {
                return Ok(None);
            };
            match self.strings.get(&handle) {
                Some(name) => event.name = Some(name.clone()),
                None => warn!(
                    partition = %self.descriptor.label(),
                    handle,
                    "string handle missing from the string table"
                ),
            }
        }
        if record_flags & flags::THREAD != 0 {
            let Some(tid) = self.take_u64()? else {
                return Ok(None);
            };
            event.thread_id = tid as i64;
        }
        if record_flags & flags::DATA != 0 {
            let Some(len) = self.take_u64()? else {
                return Ok(None);
            };
            let remaining = self.size().saturating_sub(self.position);
            if len > remaining {
                warn!(
                    partition = %self.descriptor.label(),
                    len,
                    remaining,
                    "data field runs past the end of the partition"
                );
                return Ok(None);
            }
            let Some(bytes) = self.take(len as usize)? else {
                return Ok(None);
            };
            event.data = Some(String::from_utf8_lossy(&bytes).into_owned());
        }
        if record_flags & flags::DELTA != 0 {
            let Some(bits) = self.take_u64()? else {
                return Ok(None);
            };
            event.delta = Some(f64::from_bits(bits));
        }
        if record_flags & flags::POINTER != 0 {
            let Some(ptr) = self.take_u64()? else {
                return Ok(None);
            };
            event.pointer = Some(ptr);
        }
        if record_flags & flags::PROCESS != 0 {
            let Some(pid) = self.take_u64()? else {
                return Ok(None);
            };
            event.process_id = pid as i64;
        }

        // markers carry their scope in the data field
        if kind == EventKind::Marker
            && let Some(scope) = event.data.take()
        {
            event.scope = Some(MarkerScope::parse(&scope));
        }

        Ok(Some(event))
    }
}

impl SourceReader for SeaReader {
    fn partition(&self) -> &PartitionDescriptor {
        &self.descriptor
    }

    fn next_event(&mut self) -> Result<Option<CanonicalEvent>> {
        if self.finished {
            return Ok(None);
        }
        match self.decode() {
            Ok(Some(mut event)) => {
                self.guard.admit(&self.descriptor, &mut event);
                Ok(Some(event))
            }
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn size(&self) -> u64 {
        self.descriptor.size
    }
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

/// Encode one record the way the native recorder lays it out.
///
/// `name_handle` is the string-table handle for `event.name`. The thread and
/// process fields are written only when they differ from the partition's own.
pub fn encode_record(
    event: &CanonicalEvent,
    name_handle: Option<u64>,
    home_process: i64,
    home_thread: i64,
) -> Vec<u8> {
    let data = match (event.kind, event.scope) {
        (EventKind::Marker, Some(scope)) => Some(scope_str(scope).to_string()),
        _ => event.data.clone(),
    };

    let mut record_flags = 0u8;
    if event.id.is_some() {
        record_flags |= flags::ID;
    }
    if event.parent_id.is_some() {
        record_flags |= flags::PARENT;
    }
    if name_handle.is_some() {
        record_flags |= flags::STRING;
    }
    if event.thread_id != home_thread {
        record_flags |= flags::THREAD;
    }
    if data.is_some() {
        record_flags |= flags::DATA;
    }
    if event.delta.is_some() {
        record_flags |= flags::DELTA;
    }
    if event.pointer.is_some() {
        record_flags |= flags::POINTER;
    }
    if event.process_id != home_process {
        record_flags |= flags::PROCESS;
    }

    let mut out = Vec::with_capacity(HEADER_LEN + 64);
    out.extend_from_slice(&event.timestamp.to_le_bytes());
    out.push(event.kind.code());
    out.push(record_flags);

    if let Some(id) = event.id {
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
    }
    if let Some(parent) = event.parent_id {
        out.extend_from_slice(&parent.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
    }
    if let Some(handle) = name_handle {
        out.extend_from_slice(&handle.to_le_bytes());
    }
    if event.thread_id != home_thread {
        out.extend_from_slice(&event.thread_id.to_le_bytes());
    }
    if let Some(data) = &data {
        out.extend_from_slice(&(data.len() as u64).to_le_bytes());
        out.extend_from_slice(data.as_bytes());
    }
    if let Some(delta) = event.delta {
        out.extend_from_slice(&delta.to_bits().to_le_bytes());
    }
    if let Some(ptr) = event.pointer {
        out.extend_from_slice(&ptr.to_le_bytes());
    }
    if event.process_id != home_process {
        out.extend_from_slice(&event.process_id.to_le_bytes());
    }
    out
}

fn scope_str(scope: MarkerScope) -> &'static str {
    match scope {
        MarkerScope::Global => "global",
        MarkerScope::TrackGroup => "track_group",
        MarkerScope::Track => "track",
        MarkerScope::Task => "task",
        MarkerScope::Marker => "marker",
        MarkerScope::Unknown => "unknown",
    }
}
