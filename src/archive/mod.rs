// src/archive/mod.rs

//! Converting bags to and from packages
//!
//! A bag travels as a directory, a package file (zip, tar, gzip-tar) or a
//! byte stream over a package. Packages hold one top-level directory named
//! after the bag; packaging replaces the bag directory with the package file.

mod format;
mod stream;
mod tar;
mod zip;

pub use format::PackageFormat;
pub use stream::PackageStream;

use crate::bag::{check_relative, Bag, DATA_DIR};
use crate::{Error, Result};
use filetime::FileTime;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// One file or directory destined for a package
pub(crate) struct PackEntry {
    source: PathBuf,
    /// Archive path, rooted at the bag directory name
    name: String,
    is_dir: bool,
    /// Modification time in unix seconds
    mtime: i64,
}

fn collect_entries(bag_dir: &Path, root_name: &str) -> Result<Vec<PackEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(bag_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let rel = entry.path().strip_prefix(bag_dir).unwrap_or(entry.path());
        let mut name = String::from(root_name);
        for component in rel.components() {
            name.push('/');
            name.push_str(&component.as_os_str().to_string_lossy());
        }
        let is_dir = entry.file_type().is_dir();
        if is_dir {
            name.push('/');
        } else if !entry.file_type().is_file() {
            debug!("Skipping non-regular file {}", entry.path().display());
            continue;
        }
        let meta = entry.metadata().map_err(|e| Error::Io(e.into()))?;
        entries.push(PackEntry {
            source: entry.path().to_path_buf(),
            name,
            is_dir,
            mtime: FileTime::from_last_modification_time(&meta).unix_seconds(),
        });
    }
    Ok(entries)
}

/// Writes archive entries below a destination directory
///
/// The first path component of every entry is replaced by the bag root name,
/// either fixed up front or taken from the first entry.
pub(crate) struct Unpacker {
    parent: PathBuf,
    root: Option<String>,
    files: usize,
}

impl Unpacker {
    fn new(parent: PathBuf, root: Option<String>) -> Self {
        Self {
            parent,
            root,
            files: 0,
        }
    }

    pub(crate) fn entry(
        &mut self,
        name: &str,
        is_dir: bool,
        content: &mut dyn Read,
        mtime: Option<i64>,
    ) -> Result<()> {
        let trimmed = name.trim_end_matches('/');
        check_relative(trimmed)?;
        let mut components = Path::new(trimmed).components().filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        });
        let Some(top) = components.next() else {
            return Ok(());
        };
        let root = self
            .root
            .get_or_insert_with(|| top.to_string_lossy().into_owned())
            .clone();
        let rest: PathBuf = components.collect();

        let target = self.parent.join(&root).join(&rest);
        if is_dir {
            fs::create_dir_all(&target)?;
            return Ok(());
        }
        if rest.as_os_str().is_empty() {
            return Err(Error::invalid_path(name, "file entry outside the bag directory"));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&target)?);
        io::copy(content, &mut out)?;
        out.flush()?;
        drop(out);
        if let Some(secs) = mtime {
            filetime::set_file_mtime(&target, FileTime::from_unix_time(secs, 0))?;
        }
        self.files += 1;
        Ok(())
    }

    /// Bag directory produced by the extraction
    fn finish(self) -> Result<PathBuf> {
        let root = self
            .root
            .ok_or_else(|| Error::UnsupportedFormat("package holds no entries".to_string()))?;
        let bag_dir = self.parent.join(root);
        fs::create_dir_all(bag_dir.join(DATA_DIR))?;
        debug!("Extracted {} file(s) into {}", self.files, bag_dir.display());
        Ok(bag_dir)
    }
}

/// Wrap an existing bag directory without copying it
pub fn from_directory(path: impl AsRef<Path>, opaque: bool) -> Result<Bag> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    Ok(Bag::new(path, opaque, false))
}

/// Extract a package file into `dest_parent` (default: next to the package)
///
/// The bag directory is named after the package with its suffix removed.
/// The package itself is left in place.
pub fn from_package(path: impl AsRef<Path>, opaque: bool, dest_parent: Option<&Path>) -> Result<Bag> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let format = PackageFormat::detect(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let root_name = PackageFormat::bag_root_name(&file_name).to_string();
    let parent = match dest_parent {
        Some(parent) => parent.to_path_buf(),
        None => path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    info!("Unpacking {} package {}", format, path.display());

    let mut unpacker = Unpacker::new(parent, Some(root_name));
    let file = File::open(path)?;
    match format {
        PackageFormat::Zip => zip::read_package(BufReader::new(file), &mut unpacker)?,
        PackageFormat::Tar => tar::read_package(BufReader::new(file), false, &mut unpacker)?,
        PackageFormat::Tgz => tar::read_package(BufReader::new(file), true, &mut unpacker)?,
    }
    Ok(Bag::new(unpacker.finish()?, opaque, false))
}

/// Extract a package read from `reader` into `dest_parent`
///
/// Without a destination the bag lands in a fresh temporary directory. The
/// bag directory keeps the package's top-level directory name.
pub fn from_stream(
    reader: impl Read,
    format: PackageFormat,
    opaque: bool,
    dest_parent: Option<&Path>,
) -> Result<Bag> {
    let parent = match dest_parent {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            parent.to_path_buf()
        }
        None => tempfile::Builder::new().prefix("bagparent").tempdir()?.keep(),
    };
    debug!("Unpacking {} stream into {}", format, parent.display());

    let mut unpacker = Unpacker::new(parent, None);
    match format {
        PackageFormat::Zip => zip::read_stream(reader, &mut unpacker)?,
        PackageFormat::Tar => tar::read_package(reader, false, &mut unpacker)?,
        PackageFormat::Tgz => tar::read_package(reader, true, &mut unpacker)?,
    }
    Ok(Bag::new(unpacker.finish()?, opaque, false))
}

/// Package a bag into `dest_parent` (default: next to the bag directory)
///
/// With `no_time` every entry carries a fixed timestamp, so the package bytes
/// do not depend on when files were written. The bag directory is deleted
/// once the package is complete.
pub fn to_package(
    bag: &Bag,
    format: PackageFormat,
    no_time: bool,
    dest_parent: Option<&Path>,
) -> Result<PathBuf> {
    let bag_dir = bag.root();
    if !bag_dir.is_dir() {
        return Err(Error::NotFound(bag_dir.to_path_buf()));
    }
    let name = bag.name();
    let parent = match dest_parent {
        Some(parent) => parent.to_path_buf(),
        None => bag_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let package = parent.join(format!("{}.{}", name, format.extension()));
    let entries = collect_entries(bag_dir, &name)?;

    let out = BufWriter::new(File::create(&package)?);
    let out = match format {
        PackageFormat::Zip => zip::write_package(out, &entries, no_time)?,
        PackageFormat::Tar => tar::write_package(out, &entries, false, no_time)?,
        PackageFormat::Tgz => tar::write_package(out, &entries, true, no_time)?,
    };
    out.into_inner()
        .map_err(|e| Error::Io(e.into_error()))?
        .sync_all()?;

    fs::remove_dir_all(bag_dir)?;
    info!(
        "Packaged bag '{}' as {} ({} entries)",
        name,
        package.display(),
        entries.len()
    );
    Ok(package)
}

/// Package a bag and open a read stream over the result
///
/// Ephemeral bags can be streamed once: their package file is removed when
/// the stream is closed, and the bag directory is already gone.
pub fn to_stream(bag: &Bag, format: PackageFormat, no_time: bool) -> Result<PackageStream> {
    let package = to_package(bag, format, no_time, None)?;
    PackageStream::open(package, bag.is_ephemeral())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unpacker_rejects_escaping_entries() {
        let dir = TempDir::new().unwrap();
        let mut unpacker = Unpacker::new(dir.path().to_path_buf(), None);
        let err = unpacker
            .entry("bag/../../evil.txt", false, &mut &b"x"[..], None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
        let err = unpacker
            .entry("/etc/evil.txt", false, &mut &b"x"[..], None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[test]
    fn test_unpacker_reroots_entries() {
        let dir = TempDir::new().unwrap();
        let mut unpacker = Unpacker::new(dir.path().to_path_buf(), Some("renamed".to_string()));
        unpacker.entry("packed/", true, &mut io::empty(), None).unwrap();
        unpacker
            .entry("packed/data/a.txt", false, &mut &b"abc"[..], Some(1_600_000_000))
            .unwrap();
        let bag_dir = unpacker.finish().unwrap();

        assert_eq!(bag_dir, dir.path().join("renamed"));
        let target = bag_dir.join("data/a.txt");
        assert_eq!(fs::read(&target).unwrap(), b"abc");
        let meta = fs::metadata(&target).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_600_000_000);
    }

    #[test]
    fn test_empty_package_rejected() {
        let dir = TempDir::new().unwrap();
        let unpacker = Unpacker::new(dir.path().to_path_buf(), None);
        assert!(matches!(unpacker.finish(), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_from_directory_missing() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            from_directory(dir.path().join("nope"), false),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_collect_entries_sorted_and_rooted() {
        let dir = TempDir::new().unwrap();
        let bag = dir.path().join("mybag");
        fs::create_dir_all(bag.join("data/sub")).unwrap();
        fs::write(bag.join("bagit.txt"), "x").unwrap();
        fs::write(bag.join("data/sub/b.txt"), "b").unwrap();
        fs::write(bag.join("data/a.txt"), "a").unwrap();

        let names: Vec<String> = collect_entries(&bag, "mybag")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "mybag/",
                "mybag/bagit.txt",
                "mybag/data/",
                "mybag/data/a.txt",
                "mybag/data/sub/",
                "mybag/data/sub/b.txt",
            ]
        );
    }
}
