use std::fmt;
use std::path::PathBuf;

/// Result type for tracestitch-providers operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while discovering or reading captures
#[derive(Debug)]
pub enum Error {
    /// IO operation failed
    Io(std::io::Error),

    /// JSON parsing failed
    Json(serde_json::Error),

    /// capture.toml could not be parsed
    Toml(toml::de::Error),

    /// Record or layout does not follow the capture format
    Format(String),

    /// Input path does not hold a capture
    NotFound(PathBuf),

    /// Walkdir error
    WalkDir(walkdir::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::Toml(err) => write!(f, "Capture manifest error: {}", err),
            Error::Format(msg) => write!(f, "Format error: {}", msg),
            Error::NotFound(path) => write!(f, "No capture found at {}", path.display()),
            Error::WalkDir(err) => write!(f, "Directory traversal error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Toml(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::Format(_) | Error::NotFound(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Toml(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::WalkDir(err)
    }
}
