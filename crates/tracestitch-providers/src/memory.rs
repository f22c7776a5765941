use std::collections::VecDeque;

use tracestitch_types::CanonicalEvent;

use crate::Result;
use crate::traits::{OrderGuard, PartitionDescriptor, PartitionFormat, SourceReader};

/// A partition held in memory; position and size count records.
pub struct MemoryReader {
    descriptor: PartitionDescriptor,
    events: VecDeque<CanonicalEvent>,
    consumed: u64,
    guard: OrderGuard,
}

impl MemoryReader {
    pub fn new(domain: impl Into<String>, thread_id: i64, events: Vec<CanonicalEvent>) -> Self {
        let descriptor = PartitionDescriptor {
            domain: domain.into(),
            thread_id,
            path: None,
            cut: None,
            ring: None,
            format: PartitionFormat::Memory,
            size: events.len() as u64,
            first_timestamp: events.first().map(|e| e.timestamp),
        };
        Self {
            descriptor,
            events: events.into(),
            consumed: 0,
            guard: OrderGuard::default(),
        }
    }
}

impl SourceReader for MemoryReader {
    fn partition(&self) -> &PartitionDescriptor {
        &self.descriptor
    }

    fn next_event(&mut self) -> Result<Option<CanonicalEvent>> {
        let Some(mut event) = self.events.pop_front() else {
            return Ok(None);
        };
        self.consumed += 1;
        self.guard.admit(&self.descriptor, &mut event);
        Ok(Some(event))
    }

    fn position(&self) -> u64 {
        self.consumed
    }

    fn size(&self) -> u64 {
        self.descriptor.size
    }
}
