//! Integration test suite for quiver.
//!
//! These tests exercise the full pipeline from declared input to
//! completed run: resolution, sequence building and concurrent
//! execution working together through the public API.
//!
//! # Test Categories
//!
//! - `resolution`: name parsing, task trees, diagnostics, listing
//! - `sequencing`: flatten shapes, sub-task expansion, option merging
//! - `execution`: series/parallel runs, failure policy, reports
//! - `shell_tasks`: adaptor subprocesses and the TOML input file
//!
//! # CI Compatibility
//!
//! Module tasks use in-process recording callables; shell tests only
//! invoke `sh` with trivial commands, making them safe to run in CI
//! environments.

mod fixtures;

mod sequencing;
mod shell_tasks;
