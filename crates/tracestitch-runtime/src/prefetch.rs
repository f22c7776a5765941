use std::sync::mpsc::{Receiver, sync_channel};
use std::thread::JoinHandle;

use tracestitch_providers::{PartitionDescriptor, Result, SourceReader};
use tracestitch_types::CanonicalEvent;
use tracing::trace;

type Item = (Result<Option<CanonicalEvent>>, u64);

/// Decodes a partition ahead of the merge on its own thread.
///
/// Only I/O and decoding overlap; records still reach the correlator one at
/// a time through the merge. Dropping the reader stops the worker at its next
/// send.
pub struct PrefetchReader {
    descriptor: PartitionDescriptor,
    size: u64,
    position: u64,
    done: bool,
    rx: Receiver<Item>,
    _handle: JoinHandle<()>,
}

impl PrefetchReader {
    pub fn spawn(mut reader: Box<dyn SourceReader>, depth: usize) -> std::io::Result<Self> {
        let descriptor = reader.partition().clone();
        let size = reader.size();
        let (tx, rx) = sync_channel::<Item>(depth.max(1));

        let name = format!("prefetch-{}-{}", descriptor.domain, descriptor.thread_id);
        let handle = std::thread::Builder::new().name(name).spawn(move || {
            loop {
                let item = reader.next_event();
                let last = !matches!(item, Ok(Some(_)));
                if tx.send((item, reader.position())).is_err() {
                    trace!(partition = %reader.partition().label(), "prefetch consumer gone");
                    break;
                }
                if last {
                    break;
                }
            }
        })?;

        Ok(Self {
            descriptor,
            size,
            position: 0,
            done: false,
            rx,
            _handle: handle,
        })
    }
}

impl SourceReader for PrefetchReader {
    fn partition(&self) -> &PartitionDescriptor {
        &self.descriptor
    }

    fn next_event(&mut self) -> Result<Option<CanonicalEvent>> {
        if self.done {
            return Ok(None);
        }
        match self.rx.recv() {
            Ok((item, position)) => {
                self.position = position;
                if !matches!(item, Ok(Some(_))) {
                    self.done = true;
                }
                item
            }
            Err(_) => {
                self.done = true;
                Ok(None)
            }
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracestitch_providers::MemoryReader;
    use tracestitch_types::EventKind;

    #[test]
    fn test_prefetch_yields_same_records() {
        let events: Vec<CanonicalEvent> = (0..100)
            .map(|ts| CanonicalEvent::new("d", EventKind::Marker, ts).with_name("m"))
            .collect();
        let inner = Box::new(MemoryReader::new("d", 1, events));
        let mut reader = PrefetchReader::spawn(inner, 4).unwrap();

        let mut stamps = Vec::new();
        while let Some(event) = reader.next_event().unwrap() {
            stamps.push(event.timestamp);
        }
        assert_eq!(stamps, (0..100).collect::<Vec<u64>>());
        assert_eq!(reader.position(), 100);
        assert_eq!(reader.size(), 100);
        assert!(reader.next_event().unwrap().is_none());
    }

    #[test]
    fn test_dropping_reader_early_is_fine() {
        let events: Vec<CanonicalEvent> = (0..1000)
            .map(|ts| CanonicalEvent::new("d", EventKind::Marker, ts))
            .collect();
        let inner = Box::new(MemoryReader::new("d", 1, events));
        let mut reader = PrefetchReader::spawn(inner, 1).unwrap();
        assert!(reader.next_event().unwrap().is_some());
        drop(reader);
    }
}
