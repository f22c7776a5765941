use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracestitch_providers::SourceReader;
use tracestitch_types::CanonicalEvent;
use tracing::{debug, warn};

/// Current head record of one registered reader
struct Head {
    event: CanonicalEvent,
    source: usize,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.event.timestamp == other.event.timestamp && self.source == other.source
    }
}

impl Eq for Head {}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior; registration order breaks ties
        (other.event.timestamp, other.source).cmp(&(self.event.timestamp, self.source))
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Global k-way merge over per-partition readers.
///
/// Each call to `next` yields the record with the smallest timestamp among
/// all reader heads and advances only that reader. Equal timestamps come out
/// in reader registration order.
#[derive(Default)]
pub struct MergeScheduler {
    readers: Vec<Box<dyn SourceReader>>,
    heap: BinaryHeap<Head>,
    failed: usize,
}

impl MergeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reader and pull its first record; returns its index
    pub fn register(&mut self, reader: Box<dyn SourceReader>) -> usize {
        let source = self.readers.len();
        self.readers.push(reader);
        self.advance(source);
        source
    }

    fn advance(&mut self, source: usize) {
        let reader = &mut self.readers[source];
        match reader.next_event() {
            Ok(Some(event)) => self.heap.push(Head { event, source }),
            Ok(None) => {
                debug!(partition = %reader.partition().label(), "partition exhausted");
            }
            Err(err) => {
                warn!(
                    partition = %reader.partition().label(),
                    position = reader.position(),
                    "partition ended early: {}",
                    err
                );
                self.failed += 1;
            }
        }
    }

    /// Readers that still have records
    pub fn active(&self) -> usize {
        self.heap.len()
    }

    pub fn registered(&self) -> usize {
        self.readers.len()
    }

    /// Readers that stopped on an error
    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn position(&self) -> u64 {
        self.readers.iter().map(|r| r.position()).sum()
    }

    pub fn total_size(&self) -> u64 {
        self.readers.iter().map(|r| r.size()).sum()
    }
}

impl Iterator for MergeScheduler {
    type Item = CanonicalEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let Head { event, source } = self.heap.pop()?;
        self.advance(source);
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tracestitch_providers::{MemoryReader, PartitionDescriptor, Result};
    use tracestitch_types::EventKind;

    fn marker(tid: i64, ts: u64) -> CanonicalEvent {
        CanonicalEvent::new("d", EventKind::Marker, ts)
            .with_thread(1, tid)
            .with_name(format!("m{}", tid))
    }

    fn partition(tid: i64, stamps: &[u64]) -> Box<dyn SourceReader> {
        let events = stamps.iter().map(|ts| marker(tid, *ts)).collect();
        Box::new(MemoryReader::new("d", tid, events))
    }

    /// Yields a few records, then a decoding error
    struct Failing {
        inner: MemoryReader,
        left: usize,
    }

    impl SourceReader for Failing {
        fn partition(&self) -> &PartitionDescriptor {
            self.inner.partition()
        }

        fn next_event(&mut self) -> Result<Option<CanonicalEvent>> {
            if self.left == 0 {
                return Err(tracestitch_providers::Error::Format("bad record".to_string()));
            }
            self.left -= 1;
            self.inner.next_event()
        }

        fn position(&self) -> u64 {
            self.inner.position()
        }

        fn size(&self) -> u64 {
            self.inner.size()
        }
    }

    #[test]
    fn test_merges_by_timestamp() {
        let mut merge = MergeScheduler::new();
        merge.register(partition(1, &[1, 5]));
        merge.register(partition(2, &[2, 3]));
        merge.register(partition(3, &[]));

        let order: Vec<(u64, i64)> = merge.by_ref().map(|e| (e.timestamp, e.thread_id)).collect();
        assert_eq!(order, vec![(1, 1), (2, 2), (3, 2), (5, 1)]);
        assert_eq!(merge.active(), 0);
        assert_eq!(merge.position(), 4);
        assert_eq!(merge.total_size(), 4);
    }

    #[test]
    fn test_ties_follow_registration_order() {
        let mut merge = MergeScheduler::new();
        merge.register(partition(9, &[4, 4]));
        merge.register(partition(2, &[4]));
        merge.register(partition(5, &[3, 4]));

        let order: Vec<(u64, i64)> = merge.map(|e| (e.timestamp, e.thread_id)).collect();
        assert_eq!(order, vec![(3, 5), (4, 9), (4, 9), (4, 2), (4, 5)]);
    }

    #[test]
    fn test_failing_reader_ends_only_its_partition() {
        let mut merge = MergeScheduler::new();
        merge.register(Box::new(Failing {
            inner: MemoryReader::new("d", 1, vec![marker(1, 1), marker(1, 3), marker(1, 4)]),
            left: 2,
        }));
        merge.register(partition(2, &[2, 6]));

        let order: Vec<u64> = merge.by_ref().map(|e| e.timestamp).collect();
        assert_eq!(order, vec![1, 2, 3, 6]);
        assert_eq!(merge.failed(), 1);
        assert_eq!(merge.registered(), 2);
    }

    #[test]
    fn test_random_partitions_merge_in_order() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let count = rng.gen_range(1..12);
            let mut merge = MergeScheduler::new();
            let mut expected = 0;
            for tid in 0..count {
                let len = rng.gen_range(0..40);
                let mut clock = rng.gen_range(0..20u64);
                let stamps: Vec<u64> = (0..len)
                    .map(|_| {
                        clock += rng.gen_range(0..4);
                        clock
                    })
                    .collect();
                expected += stamps.len();
                merge.register(partition(tid, &stamps));
            }

            let merged: Vec<(u64, i64)> = merge.map(|e| (e.timestamp, e.thread_id)).collect();
            assert_eq!(merged.len(), expected);
            for pair in merged.windows(2) {
                assert!(pair[0].0 <= pair[1].0, "out of order: {:?}", pair);
                if pair[0].0 == pair[1].0 {
                    // registration index equals thread id here
                    assert!(pair[0].1 <= pair[1].1, "unstable tie: {:?}", pair);
                }
            }
        }
    }
}
