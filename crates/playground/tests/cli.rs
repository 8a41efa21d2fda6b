use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const PROGRAM: &str = "#version 450\nlayout(local_size_x = 1) in;\nvoid main() {}\n";

fn create_tutorials(root: &Path) {
    let first = root.join("tutorials/tutorial-0");
    let second = root.join("tutorials/tutorial-1");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(&second).unwrap();
    fs::write(first.join("HelloCompute.comp"), PROGRAM).unwrap();
    fs::write(first.join("HelloComputeSolution.comp"), PROGRAM).unwrap();
    fs::write(second.join("Bar.comp"), PROGRAM).unwrap();
    fs::write(
        root.join("playground.toml"),
        "version = 1\n[programs]\nroot = \"tutorials\"\n",
    )
    .unwrap();
}

fn playground(root: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_playground"))
        .current_dir(root.path())
        .env_remove("PLAYGROUND_CONFIG")
        .env("RUST_LOG", "warn")
        .arg("--config")
        .arg(root.path().join("playground.toml"))
        .args(args)
        .output()
        .expect("failed to run playground")
}

#[test]
fn list_prints_catalog_with_solutions_paired() {
    let root = TempDir::new().unwrap();
    create_tutorials(root.path());

    let output = playground(&root, &["--list"]);
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Tutorial 0: Hello Compute"), "{stdout}");
    assert!(stdout.contains("solution: tutorial-0/HelloComputeSolution.comp"));
    assert!(stdout.contains("Tutorial 1: Bar"));
    assert!(!stdout.contains("Tutorial 2"));
}

#[test]
fn unknown_arguments_do_not_abort() {
    let root = TempDir::new().unwrap();
    create_tutorials(root.path());

    let output = playground(&root, &["--list", "--someHostFlag", "-XYZ"]);
    assert!(output.status.success(), "{output:?}");
}

#[test]
fn invalid_configuration_exits_with_failure() {
    let root = TempDir::new().unwrap();
    create_tutorials(root.path());
    fs::write(root.path().join("playground.toml"), "version = 7\n").unwrap();

    let output = playground(&root, &["--list"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("configuration"), "{stderr}");
}
