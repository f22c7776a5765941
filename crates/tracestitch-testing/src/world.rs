//! TestWorld pattern for CLI integration tests.
//!
//! Provides:
//! - An isolated temp directory used as the working directory
//! - A private config file location, so the user's config never leaks in
//! - Capture writers rooted in that directory
//! - CLI execution with captured output

use anyhow::Result;
use assert_cmd::Command;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::fixtures::{JsonlCaptureWriter, SeaCaptureWriter};

/// Isolated environment for running the `tracestitch` binary.
///
/// # Example
/// ```no_run
/// use tracestitch_testing::TestWorld;
/// use tracestitch_testing::events::{begin, end};
///
/// let world = TestWorld::new();
/// let mut capture = world.sea_capture("app", 4242).unwrap();
/// capture.partition("cpu", "7", &[begin(10, "load"), end(20)]).unwrap();
///
/// let result = world.run(&["convert", "app-4242", "-f", "jsonl"]).unwrap();
/// assert!(result.success());
/// ```
pub struct TestWorld {
    temp_dir: TempDir,
    cwd: PathBuf,
    config_path: PathBuf,
    env_vars: HashMap<String, String>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    /// Create a new isolated test environment.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_path = temp_dir.path().to_path_buf();
        let config_path = base_path.join(".tracestitch").join("config.toml");

        Self {
            cwd: base_path,
            temp_dir,
            config_path,
            env_vars: HashMap::new(),
        }
    }

    /// Get the temp directory root.
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Path passed to `--config`; the file need not exist.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Resolve `path` against the temp root.
    pub fn path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.temp_dir.path().join(path)
    }

    /// Set an environment variable for CLI execution.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Write the config file used by every run.
    pub fn with_config(self, toml: &str) -> Self {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create config dir");
        }
        std::fs::write(&self.config_path, toml).expect("Failed to write config");
        self
    }

    /// Start a native capture directory `<name>-<pid>` in the temp root.
    pub fn sea_capture(&self, name: &str, pid: i64) -> Result<SeaCaptureWriter> {
        SeaCaptureWriter::create(self.temp_dir.path(), name, pid)
    }

    /// Start a JSONL capture directory in the temp root.
    pub fn jsonl_capture(&self, dir: &str) -> Result<JsonlCaptureWriter> {
        JsonlCaptureWriter::create(&self.temp_dir.path().join(dir))
    }

    /// Configure a CLI command with this test environment's settings.
    pub fn configure_command<'a>(&self, cmd: &'a mut Command) -> &'a mut Command {
        cmd.arg("--config").arg(&self.config_path);
        cmd.current_dir(&self.cwd);

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        cmd
    }

    /// Execute the `tracestitch` binary with `args` and capture its output.
    ///
    /// # Note
    /// This method uses `Command::cargo_bin()`, which relies on cargo test
    /// setting the `CARGO_BIN_EXE_` variables.
    #[allow(deprecated)]
    pub fn run(&self, args: &[&str]) -> Result<CliResult> {
        let mut cmd = Command::cargo_bin("tracestitch")
            .map_err(|e| anyhow::anyhow!("Failed to find tracestitch binary: {}", e))?;

        self.configure_command(&mut cmd);
        cmd.args(args);

        let output = cmd.output()?;

        Ok(CliResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Result of a CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    pub status: std::process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CliResult {
    /// Check if the command succeeded.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Parse stdout as JSON.
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.stdout)?)
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}
