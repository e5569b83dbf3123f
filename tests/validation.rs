// tests/validation.rs

//! Completeness and validity checks against damaged and reused bags.

mod common;

use common::{simple_bag, write_fixture};
use satchel::{archive, BagBuilder, BagStatus, BuilderConfig, ChecksumAlgorithm, Error};
use std::collections::BTreeSet;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_fresh_bag_is_complete_and_valid() {
    let dir = TempDir::new().unwrap();
    let bag = simple_bag(&dir, "fresh", BuilderConfig::default());
    assert_eq!(bag.complete_status().unwrap(), BagStatus::Ok);
    assert_eq!(bag.validation_status().unwrap(), BagStatus::Ok);
    assert_eq!(BagStatus::Ok.code(), 0);
}

#[test]
fn test_deleted_payload_breaks_completeness() {
    let dir = TempDir::new().unwrap();
    let source = write_fixture(dir.path(), "src.txt");
    let mut builder = BagBuilder::new(dir.path().join("deleted")).unwrap();
    builder
        .payload("first.txt", &source)
        .unwrap()
        .payload("second.txt", &source)
        .unwrap();
    let bag = builder.build().unwrap();
    assert!(bag.is_valid().unwrap());

    fs::remove_file(bag.payload_file("second.txt").unwrap()).unwrap();
    let report = bag.check_complete().unwrap();
    assert_eq!(report.missing, vec!["data/second.txt"]);
    assert_eq!(bag.complete_status().unwrap(), BagStatus::Incomplete);
    assert_eq!(bag.validation_status().unwrap().code(), 1);
    assert!(!bag.is_complete().unwrap());
    assert!(!bag.is_valid().unwrap());
}

#[test]
fn test_overwritten_payload_breaks_validity_only() {
    let dir = TempDir::new().unwrap();
    let config = BuilderConfig::default()
        .with_algorithms([ChecksumAlgorithm::Md5, ChecksumAlgorithm::Sha256]);
    let bag = simple_bag(&dir, "overwritten", config);
    fs::write(bag.payload_file("payload.txt").unwrap(), "something else").unwrap();

    assert!(bag.is_complete().unwrap());
    let report = bag.verify().unwrap();
    assert_eq!(report.mismatched.len(), 2);
    assert!(report.mismatched.iter().all(|m| m.path == "data/payload.txt"));
    assert_eq!(report.status(), BagStatus::Invalid);
    assert_eq!(report.status().code(), 2);
}

#[test]
fn test_edited_tag_file_breaks_validity() {
    let dir = TempDir::new().unwrap();
    let bag = simple_bag(&dir, "edited", BuilderConfig::default());
    let info = bag.tag_file("bag-info.txt").unwrap();
    let mut text = fs::read_to_string(&info).unwrap();
    text.push_str("Contact-Phone: 555-0100\n");
    fs::write(&info, text).unwrap();

    assert!(bag.is_complete().unwrap());
    let report = bag.verify().unwrap();
    assert_eq!(report.mismatched.len(), 1);
    assert_eq!(report.mismatched[0].path, "bag-info.txt");
    assert!(!bag.is_valid().unwrap());
}

#[test]
fn test_missing_manifest_is_incomplete() {
    let dir = TempDir::new().unwrap();
    let bag = simple_bag(&dir, "unlisted", BuilderConfig::default());
    fs::remove_file(bag.tag_file("manifest-sha512.txt").unwrap()).unwrap();

    let report = bag.check_complete().unwrap();
    assert!(report.no_manifest);
    assert_eq!(bag.complete_status().unwrap(), BagStatus::Incomplete);
    assert!(bag.cs_algorithms().unwrap().is_empty());
}

#[test]
fn test_undeclared_files_are_ignored() {
    let dir = TempDir::new().unwrap();
    let bag = simple_bag(&dir, "extras", BuilderConfig::default());
    fs::write(bag.payload_file("stray.txt").unwrap(), "not listed").unwrap();
    fs::write(bag.tag_file("stray-tag.txt").unwrap(), "not listed").unwrap();
    assert!(bag.is_valid().unwrap());
}

#[test]
fn test_opaque_bag_hides_paths() {
    let dir = TempDir::new().unwrap();
    simple_bag(&dir, "hidden", BuilderConfig::default());
    let bag = archive::from_directory(dir.path().join("hidden"), true).unwrap();

    assert!(bag.is_opaque());
    assert!(matches!(bag.base_dir(), Err(Error::AccessDenied(_))));
    assert!(matches!(bag.payload_file("payload.txt"), Err(Error::AccessDenied(_))));
    assert!(matches!(bag.tag_file("bagit.txt"), Err(Error::AccessDenied(_))));

    let mut content = String::new();
    std::io::Read::read_to_string(&mut bag.payload_stream("payload.txt").unwrap(), &mut content)
        .unwrap();
    assert_eq!(content, common::fixture_text());
    assert!(bag.tag_stream("bagit.txt").is_ok());
    assert!(matches!(bag.tag_stream("nothing.txt"), Err(Error::NotFound(_))));
    assert!(bag.is_valid().unwrap());
}

#[test]
fn test_basis_bag_seeds_new_bag() {
    let dir = TempDir::new().unwrap();
    let source = write_fixture(dir.path(), "src.txt");
    let mut builder = BagBuilder::new(dir.path().join("basis")).unwrap();
    builder
        .payload("kept.txt", &source)
        .unwrap()
        .payload_ref("remote.txt", &b"remote bytes"[..], "https://example.org/remote.txt")
        .unwrap()
        .tag_reader("custom/notes.txt", &b"carried over"[..])
        .unwrap()
        .metadata_str("Source-Organization", "Example Archive")
        .unwrap();
    let basis = builder.build().unwrap();

    let mut derived = BagBuilder::from_basis(dir.path().join("derived"), &basis, None).unwrap();
    derived
        .payload_reader("added.txt", &b"new content"[..])
        .unwrap();
    let bag = derived.build().unwrap();

    let manifest = bag.payload_manifest(ChecksumAlgorithm::Sha512).unwrap();
    let paths: BTreeSet<&str> = manifest.keys().map(String::as_str).collect();
    assert_eq!(
        paths,
        BTreeSet::from(["data/added.txt", "data/kept.txt", "data/remote.txt"])
    );
    assert_eq!(bag.fetch_refs().unwrap().len(), 1);
    assert!(bag.tag_file("custom/notes.txt").unwrap().is_file());
    assert_eq!(
        bag.metadata_str("Source-Organization").unwrap(),
        vec!["Example Archive"]
    );
    assert_eq!(bag.metadata_str("Bag-Software-Agent").unwrap().len(), 1);
    assert!(!bag.is_complete().unwrap());
}
