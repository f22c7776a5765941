mod record;
mod scan;

pub use record::{HEADER_LEN, SeaReader, StringTable, encode_record, flags};
pub use scan::{SeaMetadata, peek_first_timestamp, read_sea_metadata};
