use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracestitch_engine::{CorrelatorConfig, MemoryMode, TimeMapping};

/// Time window in raw capture units; either side may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<u64>,
}

impl Limits {
    pub fn new(left: Option<u64>, right: Option<u64>) -> Self {
        Self { left, right }
    }

    pub fn is_set(&self) -> bool {
        self.left.is_some() || self.right.is_some()
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        self.left.is_none_or(|left| timestamp >= left)
            && self.right.is_none_or(|right| timestamp <= right)
    }
}

/// Parses `left:right`; either side may be empty (`:500`, `100:`)
impl FromStr for Limits {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (left, right) = s
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("limit `{}` is not `left:right`", s)))?;
        let bound = |part: &str| -> Result<Option<u64>> {
            let part = part.trim();
            if part.is_empty() {
                return Ok(None);
            }
            part.parse::<u64>()
                .map(Some)
                .map_err(|e| Error::Config(format!("limit bound `{}`: {}", part, e)))
        };
        let limits = Limits::new(bound(left)?, bound(right)?);
        if let (Some(l), Some(r)) = (limits.left, limits.right)
            && l > r
        {
            return Err(Error::Config(format!("limit `{}` has left > right", s)));
        }
        Ok(limits)
    }
}

/// Explicit time mapping that replaces the one derived from anchors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncOverride {
    pub source_start: f64,
    pub target_start: f64,
    pub ratio: f64,
}

impl SyncOverride {
    pub fn mapping(&self) -> TimeMapping {
        TimeMapping::explicit(self.source_start, self.target_start, self.ratio)
    }
}

/// Parses `source_start:target_start:ratio`
impl FromStr for SyncOverride {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let [source_start, target_start, ratio] = parts.as_slice() else {
            return Err(Error::Config(format!(
                "sync `{}` is not `source_start:target_start:ratio`",
                s
            )));
        };
        let number = |part: &str| -> Result<f64> {
            part.trim()
                .parse::<f64>()
                .map_err(|e| Error::Config(format!("sync value `{}`: {}", part, e)))
        };
        Ok(Self {
            source_start: number(source_start)?,
            target_start: number(target_start)?,
            ratio: number(ratio)?,
        })
    }
}

fn default_strict() -> bool {
    true
}

fn default_target_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Average counters over windows of this many raw units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_window: Option<u64>,

    #[serde(default)]
    pub limits: Limits,

    /// Fail on unmatched records in complete captures
    #[serde(default = "default_strict")]
    pub strict: bool,

    #[serde(default)]
    pub remove_args: bool,

    #[serde(default)]
    pub distinct: bool,

    #[serde(default)]
    pub strip_aliens: bool,

    /// Output units per target-clock unit
    #[serde(default = "default_target_scale")]
    pub target_scale: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncOverride>,

    /// Cuts to process separately; absent or `["all"]` merges everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuts: Option<Vec<String>>,

    /// Records read ahead per partition on a worker thread; 0 reads inline
    #[serde(default)]
    pub prefetch: usize,

    /// Allocator counters as a running total or per block size
    #[serde(default)]
    pub memory: MemoryMode,

    /// Least output time between two memory total samples
    #[serde(default)]
    pub memory_interval: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sampling_window: None,
            limits: Limits::default(),
            strict: default_strict(),
            remove_args: false,
            distinct: false,
            strip_aliens: false,
            target_scale: default_target_scale(),
            sync: None,
            cuts: None,
            prefetch: 0,
            memory: MemoryMode::default(),
            memory_interval: 0.0,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::default_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// `<config_dir>/tracestitch/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("tracestitch").join("config.toml"))
            .ok_or_else(|| {
                Error::Config("Could not determine the user configuration directory".to_string())
            })
    }

    pub fn correlator_config(&self) -> CorrelatorConfig {
        CorrelatorConfig {
            sampling_window: self.sampling_window.filter(|w| *w > 0),
            strict: self.strict,
            memory: self.memory,
            memory_interval: self.memory_interval.max(0.0),
        }
    }
}
