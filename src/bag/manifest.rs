// src/bag/manifest.rs

//! Manifest and fetch file names and line formats
//!
//! ```text
//! manifest-sha512.txt:  <hex digest> data/<path>
//! fetch.txt:            <uri> <size or -> data/<path>
//! ```

use crate::encoding::split_lines;
use crate::hash::ChecksumAlgorithm;
use std::collections::BTreeMap;
use std::fmt;

pub const MANIFEST_PREFIX: &str = "manifest-";
pub const TAG_MANIFEST_PREFIX: &str = "tagmanifest-";
const MANIFEST_SUFFIX: &str = ".txt";

/// Which kind of manifest a file name denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Payload,
    Tag,
}

impl ManifestKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Payload => MANIFEST_PREFIX,
            Self::Tag => TAG_MANIFEST_PREFIX,
        }
    }
}

/// File name of the manifest for `algorithm`, e.g. `manifest-sha512.txt`
pub fn manifest_file_name(kind: ManifestKind, algorithm: ChecksumAlgorithm) -> String {
    format!("{}{}{}", kind.prefix(), algorithm.code(), MANIFEST_SUFFIX)
}

/// Recognize a manifest file name, returning its kind and algorithm
///
/// Unknown algorithm codes are not recognized.
pub fn parse_manifest_file_name(name: &str) -> Option<(ManifestKind, ChecksumAlgorithm)> {
    let stem = name.strip_suffix(MANIFEST_SUFFIX)?;
    // "tagmanifest-" ends with "manifest-", so test the longer prefix first
    let (kind, code) = if let Some(code) = stem.strip_prefix(TAG_MANIFEST_PREFIX) {
        (ManifestKind::Tag, code)
    } else {
        (ManifestKind::Payload, stem.strip_prefix(MANIFEST_PREFIX)?)
    };
    ChecksumAlgorithm::from_code(code).map(|alg| (kind, alg))
}

/// Parse manifest text into a path → hex digest map
///
/// Paths may contain spaces; only the first run of whitespace separates the
/// digest. Digests are lowercased.
pub(crate) fn parse_manifest(text: &str) -> BTreeMap<String, String> {
    split_lines(text)
        .into_iter()
        .filter_map(|line| {
            let line = line.trim_start();
            let (digest, path) = line.split_once([' ', '\t'])?;
            let path = path.trim_start_matches([' ', '\t']);
            if digest.is_empty() || path.is_empty() {
                return None;
            }
            Some((path.to_string(), digest.to_ascii_lowercase()))
        })
        .collect()
}

/// One `fetch.txt` entry: payload content held outside the bag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRef {
    pub uri: String,
    /// Declared size; `None` when recorded as `-`
    pub size: Option<u64>,
    /// Bag-relative path, including the `data/` prefix
    pub path: String,
}

impl FetchRef {
    /// Render as a `fetch.txt` line (without terminator)
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FetchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size {
            Some(size) if size > 0 => write!(f, "{} {} {}", self.uri, size, self.path),
            _ => write!(f, "{} - {}", self.uri, self.path),
        }
    }
}

/// Parse `fetch.txt` text, skipping malformed lines
pub(crate) fn parse_fetch(text: &str) -> Vec<FetchRef> {
    split_lines(text)
        .into_iter()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(3, [' ', '\t']);
            let uri = parts.next()?.to_string();
            let size = parts.next()?;
            let path = parts.next()?.trim_start().to_string();
            if uri.is_empty() || path.is_empty() {
                return None;
            }
            let size = if size == "-" { None } else { size.parse().ok() };
            Some(FetchRef { uri, size, path })
        })
        .collect()
}
