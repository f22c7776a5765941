pub mod canonical;
pub mod kind;

pub use canonical::*;
pub use kind::*;
