pub mod capture;
pub mod error;
pub mod event;
pub mod record;
pub mod sync;

pub use capture::*;
pub use error::{MalformedRecord, RequiredField};
pub use event::*;
pub use record::*;
pub use sync::*;
