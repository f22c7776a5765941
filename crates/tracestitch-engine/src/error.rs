use std::fmt;

/// Result type for tracestitch-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while correlating a capture
#[derive(Debug)]
pub enum Error {
    /// Begins or ends left unmatched in a capture that is known to be complete
    Unmatched {
        orphan_ends: usize,
        open_begins: usize,
        first: String,
    },

    /// The sink rejected a record
    Sink(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn sink<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Sink(err.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unmatched {
                orphan_ends,
                open_begins,
                first,
            } => write!(
                f,
                "Unmatched correlation in a complete capture: {} end(s) without begin, {} begin(s) without end (first: {})",
                orphan_ends, open_begins, first
            ),
            Error::Sink(err) => write!(f, "Sink error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Sink(err) => Some(err.as_ref()),
            Error::Unmatched { .. } => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Sink(Box::new(err))
    }
}
