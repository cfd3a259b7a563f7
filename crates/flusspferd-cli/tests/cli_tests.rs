//! Integration tests for the `flusspferd` shell
//!
//! Every command runs in a fresh temporary directory that also serves as
//! `$HOME`, so no user configuration or history leaks into the tests.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn shell(dir: &TempDir) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("flusspferd");
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("FLUSSPFERD_HISTORY_FILE")
        .env_remove("FLUSSPFERD_GC_THRESHOLD")
        .env_remove("FLUSSPFERD_MAX_CALL_DEPTH")
        .env_remove("FLUSSPFERD_PRELUDE")
        .env_remove("FLUSSPFERD_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

// ============================================================================
// Command line
// ============================================================================

#[test]
fn test_help_lists_options() {
    let dir = TempDir::new().unwrap();
    shell(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--file"))
        .stdout(predicate::str::contains("--expression"))
        .stdout(predicate::str::contains("--interactive"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_version_flag() {
    let dir = TempDir::new().unwrap();
    shell(&dir)
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_expression() {
    let dir = TempDir::new().unwrap();
    shell(&dir)
        .args(["-e", "print(1 + 2)"])
        .assert()
        .success()
        .stdout("3\n");
}

#[test]
fn test_files_and_expressions_run_in_order() {
    let dir = TempDir::new().unwrap();
    let first = write(&dir, "first.js", "print('file'); var fromFile = 1\n");
    shell(&dir)
        .args(["-e", "print('expr')", "-f", &first, "-e", "print(fromFile + 1)"])
        .assert()
        .success()
        .stdout("expr\nfile\n2\n");
}

#[test]
fn test_script_arguments() {
    let dir = TempDir::new().unwrap();
    let script = write(
        &dir,
        "args.js",
        "#!/usr/bin/env flusspferd\nprint(arguments.length, arguments[0], arguments[1])\n",
    );
    shell(&dir)
        .args([script.as_str(), "alpha", "beta"])
        .assert()
        .success()
        .stdout("2 alpha beta\n");
}

// ============================================================================
// Exit codes
// ============================================================================

#[test]
fn test_uncaught_error_exits_with_one() {
    let dir = TempDir::new().unwrap();
    shell(&dir)
        .args(["-e", "missing + 1"])
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("ERROR: "))
        .stderr(predicate::str::contains("missing is not defined"));
}

#[test]
fn test_missing_file_exits_with_one() {
    let dir = TempDir::new().unwrap();
    shell(&dir)
        .arg("nope.js")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ERROR: "))
        .stderr(predicate::str::contains("nope.js"));
}

#[test]
fn test_quit_sets_exit_code() {
    let dir = TempDir::new().unwrap();
    shell(&dir)
        .args(["-e", "print('before'); quit(7); print('after')"])
        .assert()
        .code(7)
        .stdout("before\n");
}

#[test]
fn test_syntax_error_names_location() {
    let dir = TempDir::new().unwrap();
    let script = write(&dir, "bad.js", "var ok = 1\nvar = 2\n");
    shell(&dir)
        .arg(&script)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SyntaxError"))
        .stderr(predicate::str::contains("bad.js:2:"));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_missing_config_file_fails_startup() {
    let dir = TempDir::new().unwrap();
    shell(&dir)
        .args(["-c", "absent.toml", "-e", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ERROR: loading configuration"));
}

#[test]
fn test_invalid_config_fails_startup() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "bad.toml", "[runtime]\nunknown_key = 1\n");
    shell(&dir)
        .args(["-c", &config, "-e", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ERROR: "));
}

#[test]
fn test_prelude_runs_before_expressions() {
    let dir = TempDir::new().unwrap();
    write(&dir, "prelude.js", "var greeting = 'hello from prelude'\n");
    let config = write(&dir, "shell.toml", "[shell]\nprelude = \"prelude.js\"\n");
    shell(&dir)
        .args(["-c", &config, "-e", "print(greeting)"])
        .assert()
        .success()
        .stdout("hello from prelude\n");
}

#[test]
fn test_local_config_is_picked_up() {
    let dir = TempDir::new().unwrap();
    write(&dir, "prelude.js", "var local = 42\n");
    write(&dir, "flusspferd.toml", "[shell]\nprelude = \"prelude.js\"\n");
    shell(&dir)
        .args(["-e", "print(local)"])
        .assert()
        .success()
        .stdout("42\n");
}

#[test]
fn test_environment_needs_permission() {
    let dir = TempDir::new().unwrap();
    shell(&dir)
        .env("FLUSSPFERD_TEST_VALUE", "secret")
        .args(["-e", "print(environment.FLUSSPFERD_TEST_VALUE)"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SecurityError"));

    let config = write(
        &dir,
        "env.toml",
        "[permissions]\nenv = [\"FLUSSPFERD_TEST_VALUE\"]\n",
    );
    shell(&dir)
        .env("FLUSSPFERD_TEST_VALUE", "secret")
        .args(["-c", &config, "-e", "print(environment.FLUSSPFERD_TEST_VALUE)"])
        .assert()
        .success()
        .stdout("secret\n");
}

// ============================================================================
// Interactive mode
// ============================================================================

#[test]
fn test_interactive_prints_source_of_results() {
    let dir = TempDir::new().unwrap();
    shell(&dir)
        .arg("--no-global-history")
        .write_stdin("1 + 2\nvar o = {a: 1,\nb: 'x'}\no\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("3"))
        .stdout(predicate::str::contains("({a:1, b:\"x\"})"));
}

#[test]
fn test_interactive_errors_do_not_end_session() {
    let dir = TempDir::new().unwrap();
    shell(&dir)
        .arg("--no-global-history")
        .write_stdin("throw new RangeError('boom')\nprint('still here')\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("ERROR: RangeError: boom"))
        .stdout(predicate::str::contains("still here"));
}

#[test]
fn test_interactive_quit() {
    let dir = TempDir::new().unwrap();
    shell(&dir)
        .arg("--no-global-history")
        .write_stdin("quit(3)\nprint('unreachable')\n")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("unreachable").not());
}

#[test]
fn test_interactive_after_failing_file() {
    let dir = TempDir::new().unwrap();
    let script = write(&dir, "fails.js", "var before = 5\nthrow new TypeError('bad')\n");
    shell(&dir)
        .args(["--no-global-history", "-i", "-f", &script])
        .write_stdin("before * 2\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("ERROR: TypeError: bad"))
        .stdout(predicate::str::contains("10"));
}

#[test]
fn test_startup_quit_stays_interactive_with_flag() {
    let dir = TempDir::new().unwrap();
    shell(&dir)
        .args(["--no-global-history", "-i", "-e", "quit(5)"])
        .write_stdin("print('after quit')\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("after quit"));
}

#[test]
fn test_history_file_is_written() {
    let dir = TempDir::new().unwrap();
    let history = dir.path().join("history");
    shell(&dir)
        .arg("--history-file")
        .arg(&history)
        .write_stdin("var remembered = 1\n")
        .assert()
        .success();
    let saved = fs::read_to_string(&history).unwrap();
    assert!(saved.contains("var remembered = 1"), "{}", saved);
}
