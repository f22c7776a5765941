//! Testing infrastructure for tracestitch integration tests.
//!
//! This crate provides utilities for writing integration tests:
//! - `TestWorld`: isolated environment for running the CLI
//! - `events`: terse builders for canonical records
//! - `fixtures`: on-disk capture writers for the native and JSONL layouts
//! - `assertions`: checks over `convert` output

pub mod assertions;
pub mod events;
pub mod fixtures;
pub mod world;

pub use fixtures::{JsonlCaptureWriter, SeaCaptureWriter};
pub use world::{CliResult, TestWorld};
