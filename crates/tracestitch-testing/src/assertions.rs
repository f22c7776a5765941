//! Checks over `convert` output.
//!
//! The `jsonl` output holds one tagged object per record:
//! `{"type":"task","kind":"task","begin":{"event":{..},"time":..},"end":{..}}`.

use anyhow::{Context, Result};
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Read a `jsonl` output file.
pub fn read_records(path: &Path) -> Result<Vec<Value>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).with_context(|| format!("bad output line: {}", l)))
        .collect()
}

/// Records of one `type` (`task`, `relation`, `metadata`, `context_switch`)
pub fn of_type<'a>(records: &'a [Value], kind: &str) -> Vec<&'a Value> {
    records.iter().filter(|r| r["type"] == kind).collect()
}

/// (name, begin time, end time) of every completed task, in output order
pub fn task_spans(records: &[Value]) -> Result<Vec<(String, f64, f64)>> {
    of_type(records, "task")
        .into_iter()
        .filter(|r| r["kind"] == "task")
        .map(|r| {
            let name = r["begin"]["event"]["name"]
                .as_str()
                .context("task without a name")?
                .to_string();
            let begin = r["begin"]["time"].as_f64().context("task without begin time")?;
            let end = r["end"]["time"].as_f64().context("task without end time")?;
            Ok((name, begin, end))
        })
        .collect()
}

/// Assert that the output holds `expected` completed records of `kind`.
pub fn assert_kind_count(records: &[Value], kind: &str, expected: usize) -> Result<()> {
    let count = of_type(records, "task")
        .into_iter()
        .filter(|r| r["kind"] == kind)
        .count();
    if count != expected {
        anyhow::bail!("Expected {} {} records, got {}", expected, kind, count);
    }
    Ok(())
}

/// Artifacts listed on the `result: [...]` line printed by `convert`.
pub fn listed_artifacts(stdout: &str) -> Result<Vec<PathBuf>> {
    let line = stdout
        .lines()
        .find(|l| l.starts_with("result: "))
        .context("no result line in output")?;
    let list: Vec<String> = serde_json::from_str(line.trim_start_matches("result: "))
        .context("result line is not a JSON list")?;
    Ok(list.into_iter().map(PathBuf::from).collect())
}

/// Predicate matching the stdout of a successful `convert`.
pub fn converted() -> impl Predicate<str> {
    predicate::str::contains("result: [")
}
