// src/archive/format.rs

//! Package format detection
//!
//! Formats are recognized by file suffix first and confirmed by signature:
//!
//! | Format | Suffixes          | Signature                  |
//! |--------|-------------------|----------------------------|
//! | zip    | `.zip`            | `50 4b` ("PK") at offset 0 |
//! | tgz    | `.tgz`, `.tar.gz` | `1f 8b` at offset 0        |
//! | tar    | `.tar`            | `ustar` at offset 257      |

use crate::{Error, Result};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Archive formats a bag can be serialized to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageFormat {
    Zip,
    Tar,
    /// Gzip-compressed tar
    Tgz,
}

struct Signature {
    format: PackageFormat,
    suffixes: &'static [&'static str],
    offset: usize,
    magic: &'static [u8],
}

static SIGNATURES: [Signature; 3] = [
    Signature {
        format: PackageFormat::Zip,
        suffixes: &["zip"],
        offset: 0,
        magic: b"PK",
    },
    Signature {
        format: PackageFormat::Tgz,
        suffixes: &["tgz", "gz"],
        offset: 0,
        magic: &[0x1f, 0x8b],
    },
    Signature {
        format: PackageFormat::Tar,
        suffixes: &["tar"],
        offset: 257,
        magic: b"ustar",
    },
];

/// Bytes needed to check every signature
const HEADER_LEN: usize = 262;

impl PackageFormat {
    fn signature(&self) -> &'static Signature {
        match self {
            Self::Zip => &SIGNATURES[0],
            Self::Tgz => &SIGNATURES[1],
            Self::Tar => &SIGNATURES[2],
        }
    }

    /// Format implied by the outer suffix of `path`
    pub fn from_extension(path: &str) -> Option<Self> {
        let (_, suffix) = path.rsplit_once('.')?;
        let suffix = suffix.to_ascii_lowercase();
        SIGNATURES
            .iter()
            .find(|sig| sig.suffixes.contains(&suffix.as_str()))
            .map(|sig| sig.format)
    }

    /// Format identified by the leading bytes of a package
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        SIGNATURES
            .iter()
            .find(|sig| {
                data.get(sig.offset..sig.offset + sig.magic.len()) == Some(sig.magic)
            })
            .map(|sig| sig.format)
    }

    /// Sniff the format of a package file from its suffix and signature
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let format = Self::from_extension(&name).ok_or_else(|| {
            Error::UnsupportedFormat(format!("unknown suffix: {}", path.display()))
        })?;

        let mut head = Vec::with_capacity(HEADER_LEN);
        File::open(path)?
            .take(HEADER_LEN as u64)
            .read_to_end(&mut head)?;
        if Self::from_magic_bytes(&head) != Some(format) {
            return Err(Error::UnsupportedFormat(format!(
                "{} does not carry a {} signature",
                name, format
            )));
        }
        Ok(format)
    }

    /// Suffix written on new packages
    pub fn extension(&self) -> &'static str {
        self.signature().suffixes[0]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::Tgz => "tgz",
        }
    }

    /// Bag directory name for a package file name
    ///
    /// Strips the outer suffix, then a trailing `.tar` left by `.tar.gz`.
    pub fn bag_root_name(file_name: &str) -> &str {
        let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);
        stem.strip_suffix(".tar").unwrap_or(stem)
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PackageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "tar" => Ok(Self::Tar),
            "tgz" | "gz" | "tar.gz" => Ok(Self::Tgz),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}
