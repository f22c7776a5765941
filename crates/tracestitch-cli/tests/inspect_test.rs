//! Inspect command tests

use anyhow::Result;
use tracestitch_testing::TestWorld;
use tracestitch_testing::events::{begin, end};
use tracestitch_types::SyncAnchor;

fn ring_capture(world: &TestWorld) -> Result<()> {
    let mut capture = world.sea_capture("game", 17)?;
    capture.partition("gpu", "3-0", &[begin(5, "a"), end(9)])?;
    capture.partition("gpu", "3-1", &[begin(20, "b")])?;
    capture.partition("cpu", "4", &[begin(2, "x"), end(30)])?;
    capture.thread_name(3, "render")?;
    capture.time_sync(&[SyncAnchor::new(0, 1000.0), SyncAnchor::new(100, 1100.0)])?;
    Ok(())
}

#[test]
fn test_inspect_json() -> Result<()> {
    let world = TestWorld::new();
    ring_capture(&world)?;

    let result = world.run(&["inspect", "game-17", "--format", "json"])?;
    assert!(result.success(), "stderr: {}", result.stderr());

    let json = result.json()?;
    let capture = &json[0];
    assert_eq!(capture["name"], "game-17");
    assert_eq!(capture["layout"], "native");
    assert_eq!(capture["pid"], 17);
    assert_eq!(capture["ring_buffer"], true);
    assert_eq!(capture["anchors"], 2);
    assert_eq!(capture["mapping"]["precision"], 50.0);
    assert_eq!(capture["threads"]["3"], "render");

    let firsts: Vec<u64> = capture["partitions"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["first_timestamp"].as_u64()).collect())
        .unwrap_or_default();
    assert_eq!(firsts, vec![2, 5, 20]);
    Ok(())
}

#[test]
fn test_inspect_plain() -> Result<()> {
    let world = TestWorld::new();
    ring_capture(&world)?;

    let result = world.run(&["inspect", "game-17"])?;
    assert!(result.success(), "stderr: {}", result.stderr());

    let out = result.stdout();
    assert!(out.starts_with("capture game-17 (native)"));
    assert!(out.contains("  ring buffer: yes"));
    assert!(out.contains("    gpu/3-1 sea size="));
    assert!(out.contains("  thread 3: render"));
    assert!(out.contains("  mapping: source_start=75 target_start=1025 ratio=1 precision=50"));
    Ok(())
}

#[test]
fn test_inspect_does_not_replay() -> Result<()> {
    // a capture that would fail conversion is still inspectable
    let world = TestWorld::new();
    let mut capture = world.sea_capture("app", 3)?;
    capture.partition("cpu", "1", &[begin(1, "never-ends")])?;

    let result = world.run(&["inspect", "app-3"])?;
    assert!(result.success(), "stderr: {}", result.stderr());
    assert!(result.stdout().contains("  mapping: identity"));
    Ok(())
}
