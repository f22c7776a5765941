//! Config command tests

use anyhow::Result;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tracestitch_testing::TestWorld;

#[test]
fn test_show_defaults_without_a_file() -> Result<()> {
    let world = TestWorld::new();
    let result = world.run(&["config", "show"])?;
    assert!(result.success(), "stderr: {}", result.stderr());

    let table: toml::Table = toml::from_str(result.stdout())?;
    assert_eq!(table["strict"].as_bool(), Some(true));
    assert_eq!(table["target_scale"].as_float(), Some(1.0));
    assert_eq!(table["prefetch"].as_integer(), Some(0));
    Ok(())
}

#[test]
fn test_show_reads_the_file() -> Result<()> {
    let world = TestWorld::new().with_config("sampling_window = 250\ndistinct = true\n");
    let result = world.run(&["config", "show"])?;
    assert!(result.success(), "stderr: {}", result.stderr());
    assert!(result.stdout().contains("sampling_window = 250"));
    assert!(result.stdout().contains("distinct = true"));
    Ok(())
}

#[test]
fn test_init_refuses_to_overwrite() -> Result<()> {
    let world = TestWorld::new();

    let result = world.run(&["config", "init"])?;
    assert!(result.success(), "stderr: {}", result.stderr());
    assert!(world.config_path().exists());

    let result = world.run(&["config", "init"])?;
    assert!(!result.success());
    assert!(result.stderr().contains("already exists"));

    let result = world.run(&["config", "init", "--force"])?;
    assert!(result.success(), "stderr: {}", result.stderr());
    Ok(())
}

#[test]
fn test_broken_config_is_reported() {
    let world = TestWorld::new().with_config("strict = \"maybe\"\n");

    let mut cmd = cargo_bin_cmd!("tracestitch");
    world.configure_command(&mut cmd).arg("config").arg("show");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load"));
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = cargo_bin_cmd!("tracestitch");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("convert"))
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("config"));
}
