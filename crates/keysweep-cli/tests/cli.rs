//! Runs the `keysweep` binary end to end

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use keysweep_keys::{Bitcoin, CandidateSource};

fn keysweep(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_keysweep"))
        .args(args)
        .current_dir(dir)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run keysweep")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn address_for(position: u128) -> String {
    Bitcoin::default().from_position(position).unwrap().identifier
}

fn import(dir: &Path, lines: &[&str]) -> Output {
    fs::write(dir.join("targets.txt"), lines.join("\n")).unwrap();
    keysweep(dir, &["import", "targets.txt", "--bloom-capacity", "1000"])
}

#[test]
fn test_generate_prints_address() {
    let dir = tempfile::tempdir().unwrap();
    let output = keysweep(dir.path(), &["generate"]);

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Address:     1"), "{text}");
    assert!(text.contains("Private Key: "), "{text}");
}

#[test]
fn test_derive_known_key() {
    let dir = tempfile::tempdir().unwrap();
    let output = keysweep(
        dir.path(),
        &["derive", "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn"],
    );

    assert!(output.status.success());
    assert!(stdout(&output).contains("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"));
}

#[test]
fn test_import_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let lines = ["addr-a", "addr-b", "addr-a", "", "my wallet export", "addr-c"];

    let first = import(dir.path(), &lines);
    assert!(first.status.success());
    assert!(stdout(&first).contains("Imported 3 new addresses (1 duplicates, 2 skipped, 0 failed)"));

    let second = import(dir.path(), &lines);
    assert!(second.status.success());
    let text = stdout(&second);
    assert!(text.contains("Imported 0 new addresses (4 duplicates"), "{text}");
    assert!(text.contains("Filter loaded with 3 addresses"), "{text}");
}

#[test]
fn test_process_pool_finds_key() {
    let dir = tempfile::tempdir().unwrap();
    let target = address_for(7);
    assert!(import(dir.path(), &["unrelated", &target]).status.success());

    let output = keysweep(
        dir.path(),
        &[
            "scan", "sequential", "--range", "1-100", "--workers", "2", "--force",
            "--chunk-size", "4", "--bloom-capacity", "1000",
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let text = stdout(&output);
    assert!(text.contains("MATCH FOUND"), "{text}");
    assert!(text.contains(&target), "{text}");
    assert!(text.contains("Position:    7"), "{text}");

    let found = fs::read_to_string(dir.path().join("foundkey.txt")).unwrap();
    assert_eq!(found.lines().next(), Some(target.as_str()));
    assert_eq!(found.lines().count(), 2);

    // Stopped on a match, so the checkpoint survives at or below the match
    let saved = fs::read_to_string(dir.path().join("cache.txt")).unwrap();
    let cursor: u128 = saved.trim().split('-').next().unwrap().parse().unwrap();
    assert!((1..=8).contains(&cursor), "{saved}");
    assert!(saved.trim().ends_with("-1-100"), "{saved}");
}

#[test]
fn test_exhausted_range_clears_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    assert!(import(dir.path(), &["unrelated"]).status.success());
    fs::write(dir.path().join("cache.txt"), "not a checkpoint").unwrap();

    let output = keysweep(
        dir.path(),
        &[
            "scan", "sequential", "--range", "1-40", "--pool", "threads", "--workers", "1",
            "--bloom-capacity", "1000",
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("Range exhausted"));
    assert!(!dir.path().join("cache.txt").exists());
    assert!(!dir.path().join("foundkey.txt").exists());
}

#[test]
fn test_resume_uses_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    // Key 5 sits below the saved cursor and must not be found again
    let skipped = address_for(5);
    let target = address_for(30);
    assert!(import(dir.path(), &[&skipped, &target]).status.success());
    fs::write(dir.path().join("cache.txt"), "20-1-50").unwrap();

    let output = keysweep(
        dir.path(),
        &["scan", "sequential", "--pool", "threads", "--workers", "1", "--bloom-capacity", "1000"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let text = stdout(&output);
    assert!(text.contains(&target), "{text}");
    assert!(!text.contains(&skipped), "{text}");
}

#[test]
fn test_rejects_bad_worker_count() {
    let dir = tempfile::tempdir().unwrap();
    assert!(import(dir.path(), &["unrelated"]).status.success());

    let output = keysweep(
        dir.path(),
        &["scan", "sequential", "--range", "1-10", "--workers", "0"],
    );
    assert!(!output.status.success());
    assert!(!dir.path().join("foundkey.txt").exists());
}

#[test]
fn test_missing_range_without_terminal_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = keysweep(dir.path(), &["scan", "sequential", "--workers", "1"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--range"));
}

#[test]
fn test_import_skips_undecodable_line() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("targets.txt"), b"addr-a\n\xff\xfe\naddr-b\n").unwrap();

    let output = keysweep(dir.path(), &["import", "targets.txt", "--bloom-capacity", "1000"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let text = stdout(&output);
    assert!(text.contains("Imported 2 new addresses (0 duplicates, 0 skipped, 1 failed)"), "{text}");
    assert!(text.contains("Filter loaded with 2 addresses"), "{text}");
}

#[test]
fn test_undecodable_checkpoint_needs_fresh_range() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("cache.txt"), [0x31, 0x35, 0xff, 0xfe, 0x2d]).unwrap();

    let output = keysweep(dir.path(), &["scan", "sequential", "--pool", "threads", "--workers", "1"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No checkpoint found"), "{stderr}");
}

#[test]
fn test_finished_checkpoint_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("cache.txt"), "50-1-50").unwrap();

    let output = keysweep(dir.path(), &["scan", "sequential", "--pool", "threads", "--workers", "1"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--range"));
    assert!(!dir.path().join("cache.txt").exists());
}

#[test]
fn test_oversubscription_falls_back_to_available_cores() {
    let dir = tempfile::tempdir().unwrap();
    assert!(import(dir.path(), &["unrelated"]).status.success());

    let output = keysweep(
        dir.path(),
        &[
            "scan", "sequential", "--range", "1-20", "--pool", "threads", "--workers", "100000",
            "--bloom-capacity", "1000",
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("using available cores"), "{stderr}");
    assert!(!stderr.contains("Workers: 100000"), "{stderr}");
    assert!(stdout(&output).contains("Range exhausted"));
}
