// tests/common/mod.rs

//! Shared fixtures for the bag integration tests.

#![allow(dead_code)]

use filetime::FileTime;
use satchel::{Bag, BagBuilder, BuilderConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Modification time stamped on fixture payload files
pub const FIXTURE_MTIME: i64 = 1_600_000_000;

/// Repetitive payload text, large enough to exercise buffered copies
pub fn fixture_text() -> String {
    "lskdflsfevmep".repeat(1000)
}

/// Write the fixture payload to `dir/name` with a fixed modification time.
pub fn write_fixture(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, fixture_text()).unwrap();
    filetime::set_file_mtime(&path, FileTime::from_unix_time(FIXTURE_MTIME, 0)).unwrap();
    path
}

/// Modification time of `path` in unix seconds
pub fn mtime(path: &Path) -> i64 {
    let meta = fs::metadata(path).unwrap();
    FileTime::from_last_modification_time(&meta).unix_seconds()
}

/// Build a bag named `name` under `dir` holding one fixture payload and a contact.
///
/// Returns the built bag; the payload lives at `data/payload.txt`.
pub fn simple_bag(dir: &TempDir, name: &str, config: BuilderConfig) -> Bag {
    let source = write_fixture(dir.path(), &format!("{}-source.txt", name));
    let mut builder = BagBuilder::with_config(Some(&dir.path().join(name)), config).unwrap();
    builder
        .payload("payload.txt", &source)
        .unwrap()
        .metadata_str("Contact-Name", "Ann Example")
        .unwrap();
    builder.build().unwrap()
}

/// Read every line of a tag file, split on any terminator
pub fn lines(path: &Path) -> Vec<String> {
    let text = fs::read_to_string(path).unwrap();
    text.split(['\n', '\r'])
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
