//! Convert command tests
//!
//! Captures are written to disk with the testing crate's writers and
//! converted by the real binary.

use anyhow::Result;
use std::path::PathBuf;
use tracestitch_testing::assertions::{assert_kind_count, listed_artifacts, read_records, task_spans};
use tracestitch_testing::events::{begin, counter, end, named_end};
use tracestitch_testing::fixtures::write_jsonl_capture;
use tracestitch_testing::{SeaCaptureWriter, TestWorld};

fn span(name: &str, begin: f64, end: f64) -> (String, f64, f64) {
    (name.to_string(), begin, end)
}

#[test]
fn test_convert_native_capture_to_every_format() -> Result<()> {
    let world = TestWorld::new();
    let mut capture = world.sea_capture("app", 4242)?;
    capture.partition(
        "cpu",
        "7",
        &[begin(10, "frame"), begin(12, "draw"), end(14), end(20)],
    )?;
    capture.partition("cpu", "8", &[begin(11, "io"), counter(15, "queue", 3.0), end(30)])?;
    capture.thread_name(7, "main")?;

    let result = world.run(&["convert", "app-4242", "-f", "jsonl,csv,summary", "-o", "out/trace"])?;
    assert!(result.success(), "stderr: {}", result.stderr());

    let artifacts = listed_artifacts(result.stdout())?;
    assert_eq!(
        artifacts,
        vec![
            PathBuf::from("out/trace.jsonl"),
            PathBuf::from("out/trace.csv"),
            PathBuf::from("out/trace.summary.txt"),
        ]
    );

    let records = read_records(&world.path("out/trace.jsonl"))?;
    assert_eq!(
        task_spans(&records)?,
        vec![span("draw", 12.0, 14.0), span("frame", 10.0, 20.0), span("io", 11.0, 30.0)]
    );
    assert_kind_count(&records, "counter", 1)?;
    assert!(
        records
            .iter()
            .any(|r| r["type"] == "metadata" && r["record"]["event"]["data"] == "main")
    );

    let csv = std::fs::read_to_string(world.path("out/trace.csv"))?;
    assert_eq!(csv.lines().count(), 5);
    assert!(csv.lines().any(|l| l.starts_with("task,cpu,4242,7,draw,12,14,2,")));

    let summary = std::fs::read_to_string(world.path("out/trace.summary.txt"))?;
    assert!(summary.starts_with("summary: trace"));
    assert!(summary.contains("cpu/frame count=1 total=10 min=10 max=10 mean=10"));
    assert!(summary.contains("cpu/queue samples=1 min=3 max=3 mean=3"));
    Ok(())
}

#[test]
fn test_default_prefix_sits_next_to_the_input() -> Result<()> {
    let world = TestWorld::new();
    write_jsonl_capture(&world.path("single.jsonl"), &[begin(1, "a"), end(2)])?;

    let result = world.run(&["convert", "single.jsonl", "-f", "jsonl"])?;
    assert!(result.success(), "stderr: {}", result.stderr());
    assert_eq!(listed_artifacts(result.stdout())?, vec![PathBuf::from("single.stitched.jsonl")]);
    Ok(())
}

#[test]
fn test_unmatched_complete_capture_fails_in_strict_mode() -> Result<()> {
    let world = TestWorld::new();
    write_jsonl_capture(
        &world.path("broken.jsonl"),
        &[begin(1, "a"), end(2), named_end(3, "orphan")],
    )?;

    let result = world.run(&["convert", "broken.jsonl", "-f", "jsonl", "-o", "strict"])?;
    assert!(!result.success());
    assert!(result.stderr().contains("Unmatched correlation"), "stderr: {}", result.stderr());
    assert!(result.stdout().contains("result: []"));
    assert!(!world.path("strict.jsonl").exists(), "partial output left behind");

    let result = world.run(&["convert", "broken.jsonl", "-f", "jsonl", "-o", "lenient", "--lenient"])?;
    assert!(result.success(), "stderr: {}", result.stderr());
    let records = read_records(&world.path("lenient.jsonl"))?;
    assert_eq!(task_spans(&records)?, vec![span("a", 1.0, 2.0)]);
    Ok(())
}

#[test]
fn test_config_file_sets_defaults() -> Result<()> {
    let world = TestWorld::new().with_config("strict = false\n");
    write_jsonl_capture(
        &world.path("broken.jsonl"),
        &[begin(1, "a"), end(2), named_end(3, "orphan")],
    )?;

    let result = world.run(&["convert", "broken.jsonl", "-f", "jsonl", "-o", "out"])?;
    assert!(result.success(), "stderr: {}", result.stderr());
    Ok(())
}

#[test]
fn test_cuts_produce_separate_artifacts() -> Result<()> {
    let world = TestWorld::new();
    let capture = world.jsonl_capture("session")?.pid(99)?;
    capture.partition("app", "1!warm", &[begin(1, "w"), end(2)])?;
    capture.partition("app", "1!hot", &[begin(10, "h"), end(11)])?;

    let result = world.run(&["convert", "session", "-f", "jsonl", "-o", "cut", "--cuts", "warm,hot"])?;
    assert!(result.success(), "stderr: {}", result.stderr());
    assert_eq!(
        listed_artifacts(result.stdout())?,
        vec![PathBuf::from("cut!hot.jsonl"), PathBuf::from("cut!warm.jsonl")]
    );

    let hot = read_records(&world.path("cut!hot.jsonl"))?;
    assert_eq!(task_spans(&hot)?, vec![span("h", 10.0, 11.0)]);
    let warm = read_records(&world.path("cut!warm.jsonl"))?;
    assert_eq!(task_spans(&warm)?, vec![span("w", 1.0, 2.0)]);
    Ok(())
}

#[test]
fn test_limit_window_repairs_cut_tasks() -> Result<()> {
    let world = TestWorld::new();
    let mut capture = world.sea_capture("app", 7)?;
    capture.partition(
        "cpu",
        "1",
        &[
            begin(1, "early"),
            end(5),
            begin(10, "mid"),
            end(15),
            begin(18, "late"),
            end(40),
        ],
    )?;

    let result = world.run(&["convert", "app-7", "-f", "jsonl", "-o", "window", "--limit", "8:20"])?;
    assert!(result.success(), "stderr: {}", result.stderr());

    let records = read_records(&world.path("window.jsonl"))?;
    assert_eq!(
        task_spans(&records)?,
        vec![span("mid", 10.0, 15.0), span("late", 18.0, 18.0)]
    );
    Ok(())
}

#[test]
fn test_every_process_capture_gets_its_own_artifacts() -> Result<()> {
    let world = TestWorld::new();
    for (pid, name) in [(1, "one"), (2, "two")] {
        let mut capture = SeaCaptureWriter::create(&world.path("multi"), "svc", pid)?;
        capture.partition("cpu", "10", &[begin(1, name), end(2)])?;
    }

    let result = world.run(&["convert", "multi", "-f", "jsonl", "-o", "m"])?;
    assert!(result.success(), "stderr: {}", result.stderr());
    assert_eq!(
        listed_artifacts(result.stdout())?,
        vec![PathBuf::from("m-svc-1.jsonl"), PathBuf::from("m-svc-2.jsonl")]
    );

    let second = read_records(&world.path("m-svc-2.jsonl"))?;
    assert_eq!(task_spans(&second)?, vec![span("two", 1.0, 2.0)]);
    Ok(())
}

#[test]
fn test_missing_input_fails() -> Result<()> {
    let world = TestWorld::new();
    let result = world.run(&["convert", "nowhere", "-f", "jsonl"])?;
    assert!(!result.success());
    assert!(result.stderr().contains("No capture found"), "stderr: {}", result.stderr());
    Ok(())
}
