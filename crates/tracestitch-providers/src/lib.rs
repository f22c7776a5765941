// Error types
pub mod error;

// Source reader contract
pub mod traits;

// Partition and capture naming
pub mod layout;

// Readers
pub mod jsonl;
pub mod memory;
pub mod sea;

// Capture discovery
pub mod capture;

pub use capture::{
    CONTEXT_SWITCHES_FILE, Capture, CaptureLayout, MANIFEST_FILE, TIME_SYNC_FILE,
    discover_capture, discover_captures,
};
pub use error::{Error, Result};
pub use jsonl::{JsonlReader, read_jsonl};
pub use memory::MemoryReader;
pub use sea::{SeaReader, encode_record};
pub use traits::{OrderGuard, PartitionDescriptor, PartitionFormat, SourceReader};
