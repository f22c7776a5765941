use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::de::DeserializeOwned;
use tracestitch_types::CanonicalEvent;
use tracing::warn;

use crate::traits::{OrderGuard, PartitionDescriptor, SourceReader};
use crate::{Error, Result};

/// Reader for a partition written as one canonical event per line
pub struct JsonlReader {
    descriptor: PartitionDescriptor,
    lines: BufReader<File>,
    position: u64,
    line_no: usize,
    guard: OrderGuard,
    finished: bool,
}

impl JsonlReader {
    pub fn open(descriptor: PartitionDescriptor) -> Result<Self> {
        let path = descriptor
            .path
            .clone()
            .ok_or_else(|| Error::Format("jsonl partition without a file".to_string()))?;
        let file = File::open(&path)?;
        Ok(Self {
            descriptor,
            lines: BufReader::new(file),
            position: 0,
            line_no: 0,
            guard: OrderGuard::default(),
            finished: false,
        })
    }

    fn decode(&mut self) -> Result<Option<CanonicalEvent>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.lines.read_line(&mut line)?;
            if n == 0 {
                return Ok(None);
            }
            self.position += n as u64;
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<CanonicalEvent>(trimmed) {
                Ok(event) => return Ok(Some(event)),
                // a last line without its newline is a tail cut short by the writer
                Err(_) if !line.ends_with('\n') => {
                    warn!(
                        partition = %self.descriptor.label(),
                        line = self.line_no,
                        "truncated trailing record"
                    );
                    return Ok(None);
                }
                Err(e) => {
                    return Err(Error::Format(format!(
                        "{}:{}: {}",
                        self.descriptor.label(),
                        self.line_no,
                        e
                    )));
                }
            }
        }
    }
}

impl SourceReader for JsonlReader {
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

/// First record of a partition file; None when it holds only blank lines.
///
/// A first line that does not decode is a format error.
pub fn peek_first_event(path: &Path) -> Result<Option<CanonicalEvent>> {
    let reader = BufReader::new(File::open(path)?);
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return serde_json::from_str(trimmed).map(Some).map_err(|e| {
            Error::Format(format!("{}:{}: {}", path.display(), index + 1, e))
        });
    }
    Ok(None)
}

/// Read a sidecar file of one JSON value per line; a missing file is empty
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut items = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(item) => items.push(item),
            Err(e) => warn!(
                file = %path.display(),
                line = idx + 1,
                error = %e,
                "skipping unreadable line"
            ),
        }
    }
    Ok(items)
}
