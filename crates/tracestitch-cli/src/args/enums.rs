use clap::ValueEnum;
use std::fmt;
use tracestitch_engine::MemoryMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum OutputKind {
    Jsonl,
    Csv,
    Summary,
}

impl OutputKind {
    /// Appended to the artifact name
    pub fn extension(self) -> &'static str {
        match self {
            OutputKind::Jsonl => "jsonl",
            OutputKind::Csv => "csv",
            OutputKind::Summary => "summary.txt",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Jsonl => write!(f, "jsonl"),
            OutputKind::Csv => write!(f, "csv"),
            OutputKind::Summary => write!(f, "summary"),
        }
    }
}

/// How allocator counters appear in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum MemoryOutput {
    Total,
    Detailed,
}

impl From<MemoryOutput> for MemoryMode {
    fn from(output: MemoryOutput) -> Self {
        match output {
            MemoryOutput::Total => MemoryMode::Total,
            MemoryOutput::Detailed => MemoryMode::Detailed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum InspectFormat {
    Plain,
    Json,
}

impl fmt::Display for InspectFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectFormat::Plain => write!(f, "plain"),
            InspectFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}
