// src/bag/mod.rs

//! Read-only access to a finished bag
//!
//! A [`Bag`] wraps a directory laid out as:
//!
//! ```text
//! <bag>/
//!   bagit.txt                 declaration (version, tag encoding)
//!   bag-info.txt              metadata properties
//!   manifest-<alg>.txt        payload digests, one file per algorithm
//!   tagmanifest-<alg>.txt     digests of every other tag file
//!   fetch.txt                 payload held outside the bag (optional)
//!   data/                     payload
//! ```
//!
//! Opaque bags hide their filesystem location: path accessors fail with
//! [`Error::AccessDenied`] while the stream accessors keep working.

pub mod manifest;
pub mod metadata;

pub use manifest::{FetchRef, ManifestKind};
pub use metadata::MetadataName;

use crate::encoding::TagEncoding;
use crate::hash::{hash_file, ChecksumAlgorithm, ChecksumMismatch};
use crate::{Error, Result};
use manifest::{manifest_file_name, parse_fetch, parse_manifest, parse_manifest_file_name};
use metadata::parse_properties;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

pub const DECLARATION_FILE: &str = "bagit.txt";
pub const METADATA_FILE: &str = "bag-info.txt";
pub const FETCH_FILE: &str = "fetch.txt";
pub const DATA_DIR: &str = "data";
pub const BAGIT_VERSION: &str = "1.0";

const VERSION_KEY: &str = "BagIt-Version";
const ENCODING_KEY: &str = "Tag-File-Character-Encoding";

/// Check that `rel` is a plain relative path that stays inside its root
pub(crate) fn check_relative(rel: &str) -> Result<()> {
    let path = Path::new(rel);
    if rel.is_empty() || path.components().next().is_none() {
        return Err(Error::invalid_path(rel, "empty path"));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::invalid_path(rel, "parent directory references are not allowed"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::invalid_path(rel, "absolute paths are not allowed"));
            }
        }
    }
    Ok(())
}

/// Validate `rel` and render it with `/` separators and no `.` components
pub(crate) fn normalize_relative(rel: &str) -> Result<String> {
    check_relative(rel)?;
    let parts: Vec<String> = Path::new(rel)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return Err(Error::invalid_path(rel, "empty path"));
    }
    Ok(parts.join("/"))
}

/// Bag-relative path of a payload file, e.g. `data/a/b.txt`
pub(crate) fn payload_path(rel: &str) -> Result<String> {
    Ok(format!("{}/{}", DATA_DIR, normalize_relative(rel)?))
}

/// Whether `rel` (normalized) names a file the builder writes itself
pub(crate) fn is_reserved_tag(rel: &str) -> bool {
    rel == DECLARATION_FILE || manifest::parse_manifest_file_name(rel).is_some()
}

/// Outcome of a completeness or validity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BagStatus {
    Ok,
    /// Missing manifests or payload content
    Incomplete,
    /// Content present but checksums disagree
    Invalid,
}

impl BagStatus {
    /// Process exit code: 0 ok, 1 incomplete, 2 checksum mismatch
    pub fn code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Incomplete => 1,
            Self::Invalid => 2,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == Self::Ok
    }
}

/// Problems found while checking a bag
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// No payload manifest was found
    pub no_manifest: bool,
    /// Manifest entries whose file does not exist
    pub missing: Vec<String>,
    /// Manifest entries that could not be read or have an unusable path
    pub unreadable: Vec<String>,
    pub mismatched: Vec<ChecksumMismatch>,
}

impl ValidationReport {
    pub fn status(&self) -> BagStatus {
        if self.no_manifest || !self.missing.is_empty() {
            BagStatus::Incomplete
        } else if !self.unreadable.is_empty() || !self.mismatched.is_empty() {
            BagStatus::Invalid
        } else {
            BagStatus::Ok
        }
    }
}

enum Presence {
    Present,
    Missing,
    /// Path escapes the bag or is malformed
    Unusable,
}

/// Handle to a bag directory
#[derive(Debug, Clone)]
pub struct Bag {
    base: PathBuf,
    opaque: bool,
    ephemeral: bool,
}

impl Bag {
    pub(crate) fn new(base: impl Into<PathBuf>, opaque: bool, ephemeral: bool) -> Self {
        Self {
            base: base.into(),
            opaque,
            ephemeral,
        }
    }

    /// Bag directory, regardless of opacity
    pub(crate) fn root(&self) -> &Path {
        &self.base
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Directory name of the bag
    pub fn name(&self) -> String {
        self.base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn deny_if_opaque(&self, what: &str) -> Result<()> {
        if self.opaque {
            return Err(Error::AccessDenied(format!("{} of opaque bag '{}'", what, self.name())));
        }
        Ok(())
    }

    /// Filesystem location of the bag
    pub fn base_dir(&self) -> Result<&Path> {
        self.deny_if_opaque("base directory")?;
        Ok(&self.base)
    }

    /// Path of a payload file, relative to `data/`
    pub fn payload_file(&self, rel_path: &str) -> Result<PathBuf> {
        self.deny_if_opaque("payload file path")?;
        check_relative(rel_path)?;
        Ok(self.base.join(DATA_DIR).join(rel_path))
    }

    /// Path of a tag file, relative to the bag root
    pub fn tag_file(&self, rel_path: &str) -> Result<PathBuf> {
        self.deny_if_opaque("tag file path")?;
        check_relative(rel_path)?;
        Ok(self.base.join(rel_path))
    }

    /// Open a payload file for reading; permitted on opaque bags
    pub fn payload_stream(&self, rel_path: &str) -> Result<File> {
        check_relative(rel_path)?;
        open_existing(&self.base.join(DATA_DIR).join(rel_path))
    }

    /// Open a tag file for reading; permitted on opaque bags
    pub fn tag_stream(&self, rel_path: &str) -> Result<File> {
        check_relative(rel_path)?;
        open_existing(&self.base.join(rel_path))
    }

    /// Decoded text of a tag file, `None` if it does not exist
    fn read_tag_text(&self, rel_path: &str) -> Result<Option<String>> {
        match fs::read(self.base.join(rel_path)) {
            Ok(bytes) => Ok(Some(TagEncoding::decode(&bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// `(BagIt-Version, Tag-File-Character-Encoding)` from `bagit.txt`
    pub fn declaration(&self) -> Result<Option<(String, String)>> {
        let props = self.properties(DECLARATION_FILE)?;
        let find = |key: &str| {
            props
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
        };
        Ok(find(VERSION_KEY).zip(find(ENCODING_KEY)))
    }

    /// All properties of a property tag file, in file order
    pub fn properties(&self, rel_path: &str) -> Result<Vec<(String, String)>> {
        check_relative(rel_path)?;
        Ok(self
            .read_tag_text(rel_path)?
            .map(|text| parse_properties(&text))
            .unwrap_or_default())
    }

    /// Values of property `name` in tag file `rel_path`
    pub fn property(&self, rel_path: &str, name: &str) -> Result<Vec<String>> {
        Ok(self
            .properties(rel_path)?
            .into_iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
            .collect())
    }

    /// Values of a reserved `bag-info.txt` property
    pub fn metadata(&self, name: MetadataName) -> Result<Vec<String>> {
        self.property(METADATA_FILE, name.name())
    }

    /// Values of any `bag-info.txt` property
    pub fn metadata_str(&self, name: &str) -> Result<Vec<String>> {
        self.property(METADATA_FILE, name)
    }

    /// Payload manifest for `algorithm`, keyed by bag-relative path
    pub fn payload_manifest(&self, algorithm: ChecksumAlgorithm) -> Result<BTreeMap<String, String>> {
        self.manifest(ManifestKind::Payload, algorithm)
    }

    /// Tag manifest for `algorithm`, keyed by bag-relative path
    pub fn tag_manifest(&self, algorithm: ChecksumAlgorithm) -> Result<BTreeMap<String, String>> {
        self.manifest(ManifestKind::Tag, algorithm)
    }

    fn manifest(
        &self,
        kind: ManifestKind,
        algorithm: ChecksumAlgorithm,
    ) -> Result<BTreeMap<String, String>> {
        Ok(self
            .read_tag_text(&manifest_file_name(kind, algorithm))?
            .map(|text| parse_manifest(&text))
            .unwrap_or_default())
    }

    fn manifest_algorithms(&self, kind: ManifestKind) -> Result<BTreeSet<ChecksumAlgorithm>> {
        let mut found = BTreeSet::new();
        let entries = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some((k, alg)) = parse_manifest_file_name(&name.to_string_lossy()) {
                if k == kind {
                    found.insert(alg);
                }
            }
        }
        Ok(found)
    }

    /// Algorithms with a payload manifest present in the bag
    pub fn cs_algorithms(&self) -> Result<BTreeSet<ChecksumAlgorithm>> {
        self.manifest_algorithms(ManifestKind::Payload)
    }

    /// Entries of `fetch.txt`; empty when the bag has none
    pub fn fetch_refs(&self) -> Result<Vec<FetchRef>> {
        Ok(self
            .read_tag_text(FETCH_FILE)?
            .map(|text| parse_fetch(&text))
            .unwrap_or_default())
    }

    /// Check that every payload listed by the strongest manifest is present
    pub fn check_complete(&self) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();
        let Some(primary) = self.cs_algorithms()?.last().copied() else {
            warn!("Bag '{}' has no payload manifest", self.name());
            report.no_manifest = true;
            return Ok(report);
        };
        for path in self.payload_manifest(primary)?.into_keys() {
            match self.presence(&path) {
                Presence::Present => {}
                Presence::Missing => {
                    warn!("Missing payload file: {}", path);
                    report.missing.push(path);
                }
                Presence::Unusable => report.unreadable.push(path),
            }
        }
        Ok(report)
    }

    /// Check completeness, then recompute every payload and tag manifest digest
    ///
    /// Each listed file is read once, feeding every algorithm that lists it.
    pub fn verify(&self) -> Result<ValidationReport> {
        let mut report = self.check_complete()?;
        if report.no_manifest {
            return Ok(report);
        }

        let mut expected: BTreeMap<String, BTreeMap<ChecksumAlgorithm, String>> = BTreeMap::new();
        for alg in self.cs_algorithms()? {
            for (path, hex) in self.payload_manifest(alg)? {
                expected.entry(path).or_default().insert(alg, hex);
            }
        }
        for alg in self.manifest_algorithms(ManifestKind::Tag)? {
            for (path, hex) in self.tag_manifest(alg)? {
                expected.entry(path).or_default().insert(alg, hex);
            }
        }

        let reported: BTreeSet<String> = report
            .missing
            .iter()
            .chain(report.unreadable.iter())
            .cloned()
            .collect();
        for (path, digests) in expected {
            if reported.contains(&path) {
                continue;
            }
            match self.presence(&path) {
                Presence::Present => {}
                Presence::Missing => {
                    warn!("Missing file listed in manifest: {}", path);
                    report.missing.push(path);
                    continue;
                }
                Presence::Unusable => {
                    report.unreadable.push(path);
                    continue;
                }
            }
            let algorithms: BTreeSet<ChecksumAlgorithm> = digests.keys().copied().collect();
            let actual = match hash_file(&algorithms, &self.base.join(&path)) {
                Ok(actual) => actual,
                Err(e) => {
                    warn!("Cannot read {}: {}", path, e);
                    report.unreadable.push(path);
                    continue;
                }
            };
            for (alg, expected_hex) in digests {
                let actual_hex = actual.get(&alg).cloned().unwrap_or_default();
                if actual_hex != expected_hex {
                    warn!("Checksum mismatch for {} ({})", path, alg);
                    report.mismatched.push(ChecksumMismatch {
                        path: path.clone(),
                        algorithm: alg,
                        expected: expected_hex,
                        actual: actual_hex,
                    });
                }
            }
        }
        debug!(
            "Verified bag '{}': {} missing, {} mismatched",
            self.name(),
            report.missing.len(),
            report.mismatched.len()
        );
        Ok(report)
    }

    fn presence(&self, path: &str) -> Presence {
        if let Err(e) = check_relative(path) {
            warn!("Rejecting manifest entry: {}", e);
            return Presence::Unusable;
        }
        if self.base.join(path).is_file() {
            Presence::Present
        } else {
            Presence::Missing
        }
    }

    pub fn complete_status(&self) -> Result<BagStatus> {
        Ok(self.check_complete()?.status())
    }

    pub fn validation_status(&self) -> Result<BagStatus> {
        Ok(self.verify()?.status())
    }

    /// True iff a payload manifest exists and all its files are present
    pub fn is_complete(&self) -> Result<bool> {
        Ok(self.complete_status()?.is_ok())
    }

    /// True iff the bag is complete and every recorded digest matches
    pub fn is_valid(&self) -> Result<bool> {
        Ok(self.validation_status()?.is_ok())
    }
}

fn open_existing(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_check_relative() {
        assert!(check_relative("a/b.txt").is_ok());
        assert!(check_relative("./a").is_ok());
        assert!(matches!(check_relative("../a"), Err(Error::InvalidPath { .. })));
        assert!(matches!(check_relative("a/../../b"), Err(Error::InvalidPath { .. })));
        assert!(matches!(check_relative("/etc/passwd"), Err(Error::InvalidPath { .. })));
        assert!(matches!(check_relative(""), Err(Error::InvalidPath { .. })));
    }

    #[test]
    fn test_normalize_relative() {
        assert_eq!(normalize_relative("./a//b.txt").unwrap(), "a/b.txt");
        assert_eq!(payload_path("x/y").unwrap(), "data/x/y");
        assert!(normalize_relative(".").is_err());
        assert!(is_reserved_tag("bagit.txt"));
        assert!(is_reserved_tag("tagmanifest-md5.txt"));
        assert!(!is_reserved_tag("bag-info.txt"));
        assert!(!is_reserved_tag("meta/manifest-md5.txt"));
    }

    #[test]
    fn test_missing_tag_files_read_empty() {
        let dir = TempDir::new().unwrap();
        let bag = Bag::new(dir.path(), false, false);
        assert!(bag.metadata(MetadataName::ContactName).unwrap().is_empty());
        assert!(bag.payload_manifest(ChecksumAlgorithm::Sha512).unwrap().is_empty());
        assert!(bag.cs_algorithms().unwrap().is_empty());
        assert!(bag.fetch_refs().unwrap().is_empty());
        assert_eq!(bag.declaration().unwrap(), None);
    }

    #[test]
    fn test_no_manifest_is_incomplete() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "data/a.txt", "a");
        let bag = Bag::new(dir.path(), false, false);
        assert_eq!(bag.complete_status().unwrap(), BagStatus::Incomplete);
        assert_eq!(bag.complete_status().unwrap().code(), 1);
    }

    #[test]
    fn test_primary_algorithm_decides_completeness() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "data/a.txt", "a");
        // The weaker manifest lists a missing file, the strongest does not
        write(dir.path(), "manifest-md5.txt", "0cc175b9c0f1b6a831c399e269772661 data/a.txt\nffff data/gone.txt\n");
        write(
            dir.path(),
            "manifest-sha256.txt",
            "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb data/a.txt\n",
        );
        let bag = Bag::new(dir.path(), false, false);
        assert!(bag.is_complete().unwrap());
        assert_eq!(bag.validation_status().unwrap(), BagStatus::Incomplete);
    }

    #[test]
    fn test_verify_detects_mismatch() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "data/a.txt", "b");
        write(
            dir.path(),
            "manifest-sha256.txt",
            "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb data/a.txt\n",
        );
        let bag = Bag::new(dir.path(), false, false);
        let report = bag.verify().unwrap();
        assert_eq!(report.mismatched.len(), 1);
        assert_eq!(report.mismatched[0].path, "data/a.txt");
        assert_eq!(report.status(), BagStatus::Invalid);
        assert_eq!(report.status().code(), 2);
    }

    #[test]
    fn test_escaping_manifest_entry_is_unreadable() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "manifest-md5.txt", "0cc175b9c0f1b6a831c399e269772661 ../outside.txt\n");
        let bag = Bag::new(dir.path(), false, false);
        let report = bag.verify().unwrap();
        assert_eq!(report.unreadable, vec!["../outside.txt".to_string()]);
        assert_eq!(report.status(), BagStatus::Invalid);
    }

    #[test]
    fn test_opaque_denies_paths_but_streams() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "data/a.txt", "a");
        let bag = Bag::new(dir.path(), true, false);
        assert!(matches!(bag.payload_file("a.txt"), Err(Error::AccessDenied(_))));
        assert!(matches!(bag.tag_file("bagit.txt"), Err(Error::AccessDenied(_))));
        assert!(matches!(bag.base_dir(), Err(Error::AccessDenied(_))));
        assert!(bag.payload_stream("a.txt").is_ok());
        assert!(matches!(bag.payload_stream("nope.txt"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_bag_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<Bag>();
    }
}
