use std::fmt;

use crate::event::EventKind;

/// Field a record kind cannot do without
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredField {
    Name,
    Id,
    ParentId,
    Delta,
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequiredField::Name => write!(f, "name"),
            RequiredField::Id => write!(f, "id"),
            RequiredField::ParentId => write!(f, "parent_id"),
            RequiredField::Delta => write!(f, "delta"),
        }
    }
}

/// A record that is missing a mandatory field for its kind.
///
/// Produced once at ingestion; the record is dropped and the run continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub kind: EventKind,
    pub missing: RequiredField,
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} record is missing `{}`", self.kind, self.missing)
    }
}

impl std::error::Error for MalformedRecord {}
