// Stepwise - Java Execution Visualizer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use assert_cmd::Command;
use predicates::prelude::*;
use stepwise_common::logging;
use tracing::info;

#[test]
fn test_help_command() {
    logging::ensure_test_logging(None);
    info!("Testing CLI help command");

    let mut cmd = Command::cargo_bin("stepwise").unwrap();
    cmd.arg("--help").assert().success().stdout(predicate::str::contains("step-by-step execution traces"));
}

#[test]
fn test_version_command() {
    logging::ensure_test_logging(None);
    info!("Running test");
    let mut cmd = Command::cargo_bin("stepwise").unwrap();
    cmd.arg("--version").assert().success().stdout(predicate::str::contains("stepwise"));
}

#[test]
fn test_serve_subcommand_help() {
    logging::ensure_test_logging(None);
    info!("Running test");
    let mut cmd = Command::cargo_bin("stepwise").unwrap();
    cmd.arg("serve")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Serve traces over HTTP").and(predicate::str::contains("--workers")));
}

#[test]
fn test_trace_subcommand_help() {
    logging::ensure_test_logging(None);
    info!("Running test");
    let mut cmd = Command::cargo_bin("stepwise").unwrap();
    cmd.arg("trace")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Trace one source file"));
}

#[test]
fn test_missing_subcommand() {
    logging::ensure_test_logging(None);
    info!("Running test");
    let mut cmd = Command::cargo_bin("stepwise").unwrap();
    cmd.assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_trace_missing_file() {
    logging::ensure_test_logging(None);
    info!("Running test");
    let mut cmd = Command::cargo_bin("stepwise").unwrap();
    cmd.arg("trace")
        .arg("/nonexistent/stepwise/Snippet.java")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_trace_blank_file() {
    logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("Blank.java");
    std::fs::write(&file, "  \n").unwrap();

    let mut cmd = Command::cargo_bin("stepwise").unwrap();
    cmd.arg("trace").arg(&file).assert().failure().stderr(predicate::str::contains("Code is required"));
}

#[test]
fn test_trace_snippet_without_method() {
    logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("Snippet.java");
    std::fs::write(&file, "int x = 1;\n").unwrap();

    let mut cmd = Command::cargo_bin("stepwise").unwrap();
    cmd.arg("trace")
        .arg(&file)
        .env("JAVA_HOME", "/nonexistent/jdk")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Could not find an entry method to run."));
}
