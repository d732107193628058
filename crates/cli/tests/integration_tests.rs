//! End-to-end tests driving the built `kfs` binary: write/read round-trips,
//! unlink idempotence, stat/list output, compact, and error reporting.
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::tempdir;

const KEY: &str = "adc83b19e793491b1c6ea0fd8b46cd9f32e592fc";
const OTHER_KEY: &str = "0000000000000000000000000000000000000001";

/// Runs `kfs -d <table> <args...>`, feeding `stdin` when given.
fn run_kfs(table: &Path, args: &[&str], stdin: Option<&[u8]>) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kfs"));
    cmd.arg("-d")
        .arg(table)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().expect("failed to spawn kfs");
    if let Some(bytes) = stdin {
        child
            .stdin
            .as_mut()
            .expect("stdin not piped")
            .write_all(bytes)
            .expect("failed to write stdin");
    }
    drop(child.stdin.take());
    child.wait_with_output().expect("failed to wait for kfs")
}

fn assert_success(out: &Output) {
    assert!(
        out.status.success(),
        "kfs failed: stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
}

fn assert_failure(out: &Output) {
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.lines().any(|l| l.starts_with("[error] ")),
        "missing [error] line: {stderr}"
    );
}

#[test]
fn write_and_read_via_stdio() {
    let dir = tempdir().unwrap();
    let table = dir.path().join("t");

    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    assert_success(&run_kfs(&table, &["write", KEY], Some(&payload)));

    let out = run_kfs(&table, &["read", KEY], None);
    assert_success(&out);
    assert_eq!(out.stdout, payload);

    // the table directory got its canonical suffix
    assert!(dir.path().join("t.kfs").join("r").is_file());
}

#[test]
fn write_and_read_via_files() {
    let dir = tempdir().unwrap();
    let table = dir.path().join("t");

    let src = dir.path().join("input.bin");
    let dst = dir.path().join("output.bin");
    let payload: Vec<u8> = (0..300 * 1024u32).map(|i| (i * 7 % 256) as u8).collect();
    std::fs::write(&src, &payload).unwrap();

    assert_success(&run_kfs(
        &table,
        &["write", KEY, src.to_str().unwrap()],
        None,
    ));
    assert_success(&run_kfs(
        &table,
        &["read", KEY, dst.to_str().unwrap()],
        None,
    ));
    assert_eq!(std::fs::read(&dst).unwrap(), payload);
}

#[test]
fn rewrite_replaces_contents() {
    let dir = tempdir().unwrap();
    let table = dir.path().join("t");

    assert_success(&run_kfs(&table, &["write", KEY], Some(b"first")));
    assert_success(&run_kfs(&table, &["write", KEY], Some(b"second")));

    let out = run_kfs(&table, &["read", KEY], None);
    assert_success(&out);
    assert_eq!(out.stdout, b"second");
}

#[test]
fn unlink_is_idempotent_and_read_after_fails() {
    let dir = tempdir().unwrap();
    let table = dir.path().join("t");

    assert_success(&run_kfs(&table, &["write", KEY], Some(b"data")));
    assert_success(&run_kfs(&table, &["unlink", KEY], None));
    assert_success(&run_kfs(&table, &["unlink", KEY], None));

    assert_failure(&run_kfs(&table, &["read", KEY], None));
}

#[test]
fn read_missing_key_reports_error() {
    let dir = tempdir().unwrap();
    let table = dir.path().join("t");
    assert_failure(&run_kfs(&table, &["read", OTHER_KEY], None));
}

#[test]
fn bad_keys_are_rejected() {
    let dir = tempdir().unwrap();
    let table = dir.path().join("t");

    assert_failure(&run_kfs(&table, &["write", "nothex"], Some(b"x")));
    assert_failure(&run_kfs(&table, &["read", &KEY.to_uppercase()], None));
    assert_failure(&run_kfs(&table, &["unlink", "1234"], None));
}

#[test]
fn list_shows_blob_and_size() {
    let dir = tempdir().unwrap();
    let table = dir.path().join("t");

    let payload = vec![0xabu8; 5000];
    assert_success(&run_kfs(&table, &["write", KEY], Some(&payload)));

    // the key itself selects its own shard
    let out = run_kfs(&table, &["list", KEY], None);
    assert_success(&out);
    let stdout = String::from_utf8(out.stdout).unwrap();
    let line = stdout.lines().next().expect("no list output");
    let (base, size) = line.split_once(' ').expect("malformed list line");
    assert_eq!(base.len(), 40);
    assert_eq!(size, "5000");
}

#[test]
fn stat_covers_all_shards_or_one() {
    let dir = tempdir().unwrap();
    let table = dir.path().join("t");
    assert_success(&run_kfs(&table, &["write", KEY], Some(b"x")));

    let out = run_kfs(&table, &["stat"], None);
    assert_success(&out);
    assert_eq!(String::from_utf8_lossy(&out.stdout).lines().count(), 256);

    let out = run_kfs(&table, &["stat", KEY], None);
    assert_success(&out);
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("size: "), "{stdout}");

    let out = run_kfs(&table, &["stat", "0", "-h"], None);
    assert_success(&out);
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("[000]"), "{stdout}");
    assert!(stdout.contains("GiB"), "{stdout}");
}

#[test]
fn compact_repairs_existing_buckets() {
    let dir = tempdir().unwrap();
    let table = dir.path().join("t");
    assert_success(&run_kfs(&table, &["write", KEY], Some(b"payload")));

    let out = run_kfs(&table, &["compact"], None);
    assert_success(&out);
    assert!(String::from_utf8_lossy(&out.stdout).contains("repaired 1 bucket(s)"));

    // data survives the repair
    let out = run_kfs(&table, &["read", KEY], None);
    assert_success(&out);
    assert_eq!(out.stdout, b"payload");
}

#[test]
fn empty_write_from_stdin_round_trips() {
    let dir = tempdir().unwrap();
    let table = dir.path().join("t");

    assert_success(&run_kfs(&table, &["write", KEY], Some(b"")));
    let out = run_kfs(&table, &["read", KEY], None);
    assert_success(&out);
    assert!(out.stdout.is_empty());
}
