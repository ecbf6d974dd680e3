//! Integration tests for the CLI interface
//!
//! Only commands that stop before any provider call are exercised here.

mod common;

use assert_cmd::Command;
use common::{config_yaml, TestContext};
use predicates::prelude::*;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("lambda-deployer").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help_lists_commands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("schedule"));
}

#[test]
fn test_missing_subcommand_is_rejected() {
    cli()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_validate_accepts_good_config() {
    let ctx = TestContext::new().unwrap();
    let path = ctx.create_file("deploy.yaml", &config_yaml("orders")).unwrap();

    cli()
        .args(["validate", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration for orders is valid"));
}

#[test]
fn test_validate_reports_problems_with_exit_code_two() {
    let ctx = TestContext::new().unwrap();
    let path = ctx
        .create_file(
            "deploy.yaml",
            &format!("{}timeout: 0\nmemorySize: 64\n", config_yaml("orders")),
        )
        .unwrap();

    cli()
        .args(["validate", "--config"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Validation error"))
        .stderr(predicate::str::contains("timeout"))
        .stderr(predicate::str::contains("memorySize"));
}

#[test]
fn test_unsupported_config_extension() {
    let ctx = TestContext::new().unwrap();
    let path = ctx.create_file("deploy.ini", "functionName=orders").unwrap();

    cli()
        .args(["validate", "-c"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unsupported config file extension"));
}

#[test]
fn test_deploy_with_missing_config_fails_before_provider_calls() {
    let ctx = TestContext::new().unwrap();
    let package = ctx.package().unwrap();

    cli()
        .arg("deploy")
        .arg("--config")
        .arg(ctx.path().join("absent.yaml"))
        .arg("--package")
        .arg(&package)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_validate_reads_toml() {
    let ctx = TestContext::new().unwrap();
    let path = ctx
        .create_file(
            "deploy.toml",
            "functionName = \"reporter\"\nhandler = \"bootstrap\"\nrole = \"arn:aws:iam::123456789012:role/r\"\n\n[schedule]\nname = \"hourly\"\nscheduleExpression = \"rate(1 hour)\"\n",
        )
        .unwrap();

    cli()
        .args(["validate", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("reporter"));
}
