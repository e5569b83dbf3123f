// src/builder/mod.rs

//! Bag construction
//!
//! A [`BagBuilder`] owns a bag directory while it is being filled. Every byte
//! that enters the bag passes through the digest pipeline once, and the
//! resulting manifest lines are written as files arrive. Finalization happens
//! in [`BagBuilder::build`], which closes writers in dependency order so the
//! tag-manifests list every other tag file and never themselves:
//!
//! 1. still-open payload/tag stream handles
//! 2. automatic metadata (`Bagging-Date`, `Bag-Size`, `Payload-Oxum`, `Bag-Software-Agent`)
//! 3. property and fetch writers
//! 4. payload manifests
//! 5. `bagit.txt`
//! 6. tag-manifests

mod basis;
pub(crate) mod writer;

pub use writer::BagWriter;

use crate::bag::manifest::{manifest_file_name, FetchRef, ManifestKind};
use crate::bag::metadata::{human_bytes, parse_properties};
use crate::bag::{
    is_reserved_tag, normalize_relative, payload_path, Bag, MetadataName, BAGIT_VERSION,
    DATA_DIR, DECLARATION_FILE, FETCH_FILE, METADATA_FILE,
};
use crate::encoding::{EolRule, TagEncoding};
use crate::hash::{normalize_digest, ChecksumAlgorithm, DigestReader, Digests};
use crate::{Error, Result};
use filetime::FileTime;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;
use writer::{create_exclusive, lock, BagStream, FlatWriter, SharedWriter, Successors, Tally};

/// Agent string written to `Bag-Software-Agent`
pub const SOFTWARE_AGENT: &str = concat!("satchel v", env!("CARGO_PKG_VERSION"));

/// Tag encoding, line terminator and checksum algorithms for a new bag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    pub encoding: TagEncoding,
    pub eol: EolRule,
    pub algorithms: BTreeSet<ChecksumAlgorithm>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            encoding: TagEncoding::default(),
            eol: EolRule::default(),
            algorithms: [ChecksumAlgorithm::default()].into_iter().collect(),
        }
    }
}

impl BuilderConfig {
    pub fn with_encoding(mut self, encoding: TagEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_eol(mut self, eol: EolRule) -> Self {
        self.eol = eol;
        self
    }

    pub fn with_algorithms(mut self, algorithms: impl IntoIterator<Item = ChecksumAlgorithm>) -> Self {
        self.algorithms = algorithms.into_iter().collect();
        self
    }

    /// Replace the algorithm set from names such as `SHA-512` or `md5`
    pub fn with_algorithm_names<S: AsRef<str>>(
        self,
        names: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let algorithms = names
            .into_iter()
            .map(|name| name.as_ref().parse::<ChecksumAlgorithm>())
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(self.with_algorithms(algorithms))
    }
}

/// Writers and handles that exist only until the bag is built
#[derive(Debug)]
struct OpenBag {
    tag_manifests: BTreeMap<ChecksumAlgorithm, SharedWriter>,
    manifests: BTreeMap<ChecksumAlgorithm, SharedWriter>,
    writers: BTreeMap<String, FlatWriter>,
    streams: Vec<Arc<Mutex<BagStream>>>,
    /// Bag-relative payload paths claimed so far, including fetch references
    payload_entries: BTreeSet<String>,
}

#[derive(Debug)]
enum BuilderState {
    Open(OpenBag),
    /// Payload manifest lines captured at build time
    Built(BTreeMap<ChecksumAlgorithm, Vec<String>>),
    /// Finalization stopped part way; the directory is not a usable bag
    Failed(String),
}

fn open_state(state: &mut BuilderState) -> Result<&mut OpenBag> {
    match state {
        BuilderState::Open(open) => Ok(open),
        BuilderState::Built(_) => Err(Error::AlreadyBuilt),
        BuilderState::Failed(reason) => Err(Error::BuildFailed(reason.clone())),
    }
}

/// Builder for a single bag
#[derive(Debug)]
pub struct BagBuilder {
    base: PathBuf,
    config: BuilderConfig,
    ephemeral: bool,
    autogen: BTreeSet<MetadataName>,
    tally: Arc<Tally>,
    state: BuilderState,
}

impl BagBuilder {
    /// Builder for a bag at `base` with default settings
    pub fn new(base: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(Some(base.as_ref()), BuilderConfig::default())
    }

    /// Builder for an ephemeral bag in a private temporary directory
    pub fn ephemeral() -> Result<Self> {
        Self::with_config(None, BuilderConfig::default())
    }

    /// Builder with explicit configuration; a `None` base creates an ephemeral bag
    pub fn with_config(base: Option<&Path>, config: BuilderConfig) -> Result<Self> {
        if config.algorithms.is_empty() {
            return Err(Error::Configuration("no checksum algorithm specified".to_string()));
        }
        let (base, ephemeral) = match base {
            Some(base) => (base.to_path_buf(), false),
            None => (tempfile::Builder::new().prefix("bag").tempdir()?.keep(), true),
        };
        fs::create_dir_all(base.join(DATA_DIR))?;

        let mut tag_manifests = BTreeMap::new();
        for alg in &config.algorithms {
            let writer = FlatWriter::create(
                &base,
                &manifest_file_name(ManifestKind::Tag, *alg),
                config.encoding,
                config.eol,
                &config.algorithms,
                Successors::default(),
            )?;
            tag_manifests.insert(*alg, writer.into_shared());
        }
        let mut manifests = BTreeMap::new();
        for alg in &config.algorithms {
            let writer = FlatWriter::create(
                &base,
                &manifest_file_name(ManifestKind::Payload, *alg),
                config.encoding,
                config.eol,
                &config.algorithms,
                Successors::of(&tag_manifests),
            )?;
            manifests.insert(*alg, writer.recording().into_shared());
        }

        debug!(
            "New bag at {} ({} algorithm(s), {})",
            base.display(),
            config.algorithms.len(),
            config.encoding
        );
        Ok(Self {
            base,
            config,
            ephemeral,
            autogen: MetadataName::AUTO_GENERATED.into_iter().collect(),
            tally: Arc::new(Tally::default()),
            state: BuilderState::Open(OpenBag {
                tag_manifests,
                manifests,
                writers: BTreeMap::new(),
                streams: Vec::new(),
                payload_entries: BTreeSet::new(),
            }),
        })
    }

    /// Directory the bag is being assembled in
    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn is_built(&self) -> bool {
        matches!(self.state, BuilderState::Built(_))
    }

    /// Select the metadata written automatically at build time
    ///
    /// Names that cannot be generated are ignored; an empty set disables
    /// automatic metadata.
    pub fn auto_generate(&mut self, names: impl IntoIterator<Item = MetadataName>) -> &mut Self {
        self.autogen = names
            .into_iter()
            .filter(MetadataName::is_auto_generatable)
            .collect();
        self
    }

    pub fn auto_generated(&self) -> &BTreeSet<MetadataName> {
        &self.autogen
    }

    /// Copy `source` into the payload at `data/<rel_path>`
    ///
    /// The copy keeps the source's access and modification times.
    pub fn payload(&mut self, rel_path: &str, source: impl AsRef<Path>) -> Result<&mut Self> {
        let source = source.as_ref();
        let meta = fs::metadata(source)?;
        let reader = BufReader::new(File::open(source)?);
        let dest = self.add_payload(rel_path, reader)?;
        filetime::set_file_times(
            &dest,
            FileTime::from_last_access_time(&meta),
            FileTime::from_last_modification_time(&meta),
        )?;
        Ok(self)
    }

    /// Copy `source` into the payload under its own file name
    pub fn payload_file(&mut self, source: impl AsRef<Path>) -> Result<&mut Self> {
        let source = source.as_ref();
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::invalid_path(source.display().to_string(), "no file name"))?;
        self.payload(&name, source)
    }

    /// Stream `reader` into the payload at `data/<rel_path>`
    pub fn payload_reader(&mut self, rel_path: &str, reader: impl Read) -> Result<&mut Self> {
        self.add_payload(rel_path, reader)?;
        Ok(self)
    }

    fn add_payload(&mut self, rel_path: &str, reader: impl Read) -> Result<PathBuf> {
        let open = open_state(&mut self.state)?;
        let bag_path = payload_path(rel_path)?;
        claim_payload(open, &self.base, &bag_path)?;
        let dest = self.base.join(&bag_path);
        let (digests, size) = digest_copy(reader, &dest, "payload", &bag_path, &self.config.algorithms)?;
        Successors::of(&open.manifests).notify(&digests, &bag_path)?;
        open.payload_entries.insert(bag_path);
        self.tally.record(size);
        Ok(dest)
    }

    /// Open a write handle for a payload file at `data/<rel_path>`
    ///
    /// Manifest lines are recorded when the handle is closed, or at build time.
    pub fn payload_stream(&mut self, rel_path: &str) -> Result<BagWriter> {
        let open = open_state(&mut self.state)?;
        let bag_path = payload_path(rel_path)?;
        claim_payload(open, &self.base, &bag_path)?;
        let stream = BagStream::create(
            &self.base,
            &bag_path,
            "payload",
            &self.config.algorithms,
            Successors::of(&open.manifests),
            Some(self.tally.clone()),
        )?;
        let shared = Arc::new(Mutex::new(stream));
        open.streams.push(shared.clone());
        open.payload_entries.insert(bag_path);
        Ok(BagWriter::new(shared))
    }

    /// Record payload held at `uri`, digesting `reader` without storing it
    pub fn payload_ref(&mut self, rel_path: &str, reader: impl Read, uri: &str) -> Result<&mut Self> {
        let open = open_state(&mut self.state)?;
        let bag_path = payload_path(rel_path)?;
        claim_payload(open, &self.base, &bag_path)?;
        let uri = parse_uri(uri)?;

        let mut digester = DigestReader::new(reader, &self.config.algorithms);
        io::copy(&mut digester, &mut io::sink())?;
        let (digests, size) = digester.finalize();

        record_fetch(open, &self.base, &self.config, &digests, uri, Some(size), bag_path)?;
        Ok(self)
    }

    /// Record payload held at `uri`, digesting the local copy at `source`
    pub fn payload_ref_file(
        &mut self,
        rel_path: &str,
        source: impl AsRef<Path>,
        uri: &str,
    ) -> Result<&mut Self> {
        let reader = BufReader::new(File::open(source.as_ref())?);
        self.payload_ref(rel_path, reader, uri)
    }

    /// Record payload held at `uri` with caller-supplied size and checksums
    ///
    /// The checksums are trusted; they must cover exactly the configured
    /// algorithms.
    pub fn payload_ref_unsafe(
        &mut self,
        rel_path: &str,
        size: Option<u64>,
        uri: &str,
        checksums: &BTreeMap<ChecksumAlgorithm, String>,
    ) -> Result<&mut Self> {
        let open = open_state(&mut self.state)?;
        let bag_path = payload_path(rel_path)?;
        claim_payload(open, &self.base, &bag_path)?;
        let uri = parse_uri(uri)?;

        if !checksums.keys().eq(self.config.algorithms.iter()) {
            return Err(Error::InvalidReference(format!(
                "checksums for {} do not match the bag's algorithms",
                bag_path
            )));
        }
        let mut digests = Digests::new();
        for (alg, hex) in checksums {
            let hex = normalize_digest(*alg, hex)
                .map_err(|e| Error::InvalidReference(format!("{}: {}", bag_path, e)))?;
            digests.insert(*alg, hex);
        }

        record_fetch(open, &self.base, &self.config, &digests, uri, size, bag_path)?;
        Ok(self)
    }

    /// Copy `source` into the bag as a tag file at `rel_path`
    pub fn tag(&mut self, rel_path: &str, source: impl AsRef<Path>) -> Result<&mut Self> {
        let reader = BufReader::new(File::open(source.as_ref())?);
        self.tag_reader(rel_path, reader)
    }

    /// Stream `reader` into a tag file at `rel_path`
    ///
    /// A supplied `bag-info.txt` is merged into the bag's metadata property by
    /// property; names selected for automatic generation are skipped.
    pub fn tag_reader(&mut self, rel_path: &str, reader: impl Read) -> Result<&mut Self> {
        open_state(&mut self.state)?;
        let tag_path = raw_tag_path(rel_path)?;
        if tag_path == METADATA_FILE {
            return self.merge_metadata(reader);
        }
        let open = open_state(&mut self.state)?;
        let dest = self.base.join(&tag_path);
        let (digests, _) = digest_copy(reader, &dest, "tag", &tag_path, &self.config.algorithms)?;
        Successors::of(&open.tag_manifests).notify(&digests, &tag_path)?;
        Ok(self)
    }

    fn merge_metadata(&mut self, mut reader: impl Read) -> Result<&mut Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        for (name, value) in parse_properties(&TagEncoding::decode(&bytes)) {
            let generated = name
                .parse::<MetadataName>()
                .is_ok_and(|n| self.autogen.contains(&n));
            if generated {
                debug!("Skipping supplied {}; it is generated at build time", name);
                continue;
            }
            self.metadata_str(&name, &value)?;
        }
        Ok(self)
    }

    /// Open a write handle for a tag file at `rel_path`
    ///
    /// `bag-info.txt` cannot be streamed; use the metadata methods instead.
    pub fn tag_stream(&mut self, rel_path: &str) -> Result<BagWriter> {
        let open = open_state(&mut self.state)?;
        let tag_path = raw_tag_path(rel_path)?;
        if tag_path == METADATA_FILE {
            return Err(Error::invalid_path(rel_path, "written through the metadata methods"));
        }
        let stream = BagStream::create(
            &self.base,
            &tag_path,
            "tag",
            &self.config.algorithms,
            Successors::of(&open.tag_manifests),
            None,
        )?;
        let shared = Arc::new(Mutex::new(stream));
        open.streams.push(shared.clone());
        Ok(BagWriter::new(shared))
    }

    /// Append a reserved property to `bag-info.txt`
    pub fn metadata(&mut self, name: MetadataName, value: &str) -> Result<&mut Self> {
        self.property(METADATA_FILE, name.name(), value)
    }

    /// Append a free-form property to `bag-info.txt`
    pub fn metadata_str(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        self.property(METADATA_FILE, name, value)
    }

    /// Append `name: value` to the property tag file at `rel_path`
    pub fn property(&mut self, rel_path: &str, name: &str, value: &str) -> Result<&mut Self> {
        let open = open_state(&mut self.state)?;
        let tag_path = tag_path(rel_path)?;
        tag_writer(open, &self.base, &self.config, &tag_path)?.write_property(name, value)?;
        Ok(self)
    }

    /// Payload manifest lines recorded so far for `algorithm`
    ///
    /// Files written through a still-open stream handle are not listed yet.
    pub fn manifest(&self, algorithm: ChecksumAlgorithm) -> Vec<String> {
        match &self.state {
            BuilderState::Open(open) => open
                .manifests
                .get(&algorithm)
                .map(|writer| lock(writer).lines())
                .unwrap_or_default(),
            BuilderState::Built(snapshot) => snapshot.get(&algorithm).cloned().unwrap_or_default(),
            BuilderState::Failed(_) => Vec::new(),
        }
    }

    /// Finalize the bag
    ///
    /// Only the first call writes anything; later calls return a fresh handle
    /// to the same directory. If finalization fails the builder stays failed
    /// and every later call reports [`Error::BuildFailed`].
    pub fn build(&mut self) -> Result<Bag> {
        let placeholder = BuilderState::Failed("build did not complete".to_string());
        let open = match mem::replace(&mut self.state, placeholder) {
            BuilderState::Open(open) => open,
            BuilderState::Failed(reason) => {
                self.state = BuilderState::Failed(reason.clone());
                return Err(Error::BuildFailed(reason));
            }
            built => {
                self.state = built;
                return Ok(self.bag());
            }
        };
        let snapshot = match self.finalize(open) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to build bag {}: {}", self.base.display(), e);
                self.state = BuilderState::Failed(e.to_string());
                return Err(e);
            }
        };
        self.state = BuilderState::Built(snapshot);
        info!(
            "Built bag {} ({} payload file(s), {} bytes)",
            self.base.display(),
            self.tally.files(),
            self.tally.bytes()
        );
        Ok(self.bag())
    }

    fn finalize(&self, mut open: OpenBag) -> Result<BTreeMap<ChecksumAlgorithm, Vec<String>>> {
        for stream in &open.streams {
            lock(stream).close()?;
        }

        for name in &self.autogen {
            let value = match name {
                MetadataName::BaggingDate => chrono::Local::now().format("%Y-%m-%d").to_string(),
                MetadataName::BagSize => human_bytes(self.tally.bytes()),
                MetadataName::PayloadOxum => {
                    format!("{}.{}", self.tally.bytes(), self.tally.files())
                }
                MetadataName::BagSoftwareAgent => SOFTWARE_AGENT.to_string(),
                _ => continue,
            };
            tag_writer(&mut open, &self.base, &self.config, METADATA_FILE)?
                .write_property(name.name(), &value)?;
        }

        for writer in open.writers.values_mut() {
            writer.close()?;
        }

        let mut snapshot = BTreeMap::new();
        for (alg, manifest) in &open.manifests {
            let mut manifest = lock(manifest);
            manifest.close()?;
            snapshot.insert(*alg, manifest.lines());
        }

        let mut declaration = FlatWriter::create(
            &self.base,
            DECLARATION_FILE,
            TagEncoding::Utf8,
            self.config.eol,
            &self.config.algorithms,
            Successors::of(&open.tag_manifests),
        )?;
        declaration.write_line(&format!("BagIt-Version: {}", BAGIT_VERSION))?;
        declaration.write_line(&format!(
            "Tag-File-Character-Encoding: {}",
            self.config.encoding
        ))?;
        declaration.close()?;

        for manifest in open.tag_manifests.values() {
            lock(manifest).close()?;
        }
        Ok(snapshot)
    }

    fn bag(&self) -> Bag {
        Bag::new(self.base.clone(), false, self.ephemeral)
    }
}

/// Fail if `bag_path` is already listed or present on disk
fn claim_payload(open: &OpenBag, base: &Path, bag_path: &str) -> Result<()> {
    if open.payload_entries.contains(bag_path) || base.join(bag_path).exists() {
        return Err(Error::DuplicateEntry {
            kind: "payload",
            path: bag_path.to_string(),
        });
    }
    Ok(())
}

/// Normalize a tag path, rejecting the payload directory and builder-owned files
fn tag_path(rel_path: &str) -> Result<String> {
    let normalized = normalize_relative(rel_path)?;
    if normalized == DATA_DIR || normalized.starts_with(&format!("{}/", DATA_DIR)) {
        return Err(Error::invalid_path(rel_path, "tag files are not allowed in the payload directory"));
    }
    if is_reserved_tag(&normalized) {
        return Err(Error::invalid_path(rel_path, "reserved for the bag's own tag files"));
    }
    Ok(normalized)
}

/// Tag path for caller-supplied content; `fetch.txt` only comes from payload references
fn raw_tag_path(rel_path: &str) -> Result<String> {
    let normalized = tag_path(rel_path)?;
    if normalized == FETCH_FILE {
        return Err(Error::invalid_path(rel_path, "written from payload references"));
    }
    Ok(normalized)
}

fn parse_uri(uri: &str) -> Result<Url> {
    Url::parse(uri).map_err(|e| Error::InvalidReference(format!("URI must be absolute: '{}' ({})", uri, e)))
}

/// The property writer for `rel_path`, created on first use
fn tag_writer<'a>(
    open: &'a mut OpenBag,
    base: &Path,
    config: &BuilderConfig,
    rel_path: &str,
) -> Result<&'a mut FlatWriter> {
    match open.writers.entry(rel_path.to_string()) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => {
            let writer = FlatWriter::create(
                base,
                rel_path,
                config.encoding,
                config.eol,
                &config.algorithms,
                Successors::of(&open.tag_manifests),
            )?;
            Ok(entry.insert(writer))
        }
    }
}

/// Append manifest lines and a `fetch.txt` entry for external payload
fn record_fetch(
    open: &mut OpenBag,
    base: &Path,
    config: &BuilderConfig,
    digests: &Digests,
    uri: Url,
    size: Option<u64>,
    bag_path: String,
) -> Result<()> {
    Successors::of(&open.manifests).notify(digests, &bag_path)?;
    let fetch = FetchRef {
        uri: uri.to_string(),
        size,
        path: bag_path.clone(),
    };
    tag_writer(open, base, config, FETCH_FILE)?.write_line(&fetch.to_line())?;
    debug!("Recorded fetch reference {}", fetch);
    open.payload_entries.insert(bag_path);
    Ok(())
}

/// Copy `reader` to a new file at `dest`, digesting in the same pass
fn digest_copy(
    reader: impl Read,
    dest: &Path,
    kind: &'static str,
    bag_path: &str,
    algorithms: &BTreeSet<ChecksumAlgorithm>,
) -> Result<(Digests, u64)> {
    let file = create_exclusive(dest, kind, bag_path)?;
    let mut out = BufWriter::new(file);
    let mut digester = DigestReader::new(reader, algorithms);
    io::copy(&mut digester, &mut out)?;
    out.flush()?;
    Ok(digester.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn builder(dir: &TempDir) -> BagBuilder {
        BagBuilder::new(dir.path().join("bag")).unwrap()
    }

    #[test]
    fn test_empty_algorithm_set_rejected() {
        let dir = TempDir::new().unwrap();
        let config = BuilderConfig::default().with_algorithms([]);
        let result = BagBuilder::with_config(Some(dir.path()), config);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_unknown_algorithm_name_rejected() {
        let result = BuilderConfig::default().with_algorithm_names(["SHA-6666"]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_duplicate_payload_rejected() {
        let dir = TempDir::new().unwrap();
        let mut builder = builder(&dir);
        builder.payload_reader("a.txt", &b"one"[..]).unwrap();
        let err = builder.payload_reader("a.txt", &b"two"[..]).unwrap_err();
        assert!(matches!(err, Error::DuplicateEntry { kind: "payload", .. }));
        let err = builder
            .payload_ref("./a.txt", &b"two"[..], "http://example.org/a")
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEntry { .. }));
    }

    #[test]
    fn test_tag_in_payload_dir_rejected() {
        let dir = TempDir::new().unwrap();
        let mut builder = builder(&dir);
        let err = builder.tag_reader("data/x.txt", &b"x"[..]).unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
        let err = builder.tag_reader("bagit.txt", &b"x"[..]).unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
        let err = builder.property("data/info.txt", "a", "b").unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }

    #[test]
    fn test_relative_uri_rejected() {
        let dir = TempDir::new().unwrap();
        let mut builder = builder(&dir);
        let err = builder.payload_ref("r.txt", &b"x"[..], "not/absolute").unwrap_err();
        assert!(matches!(err, Error::InvalidReference(_)));
    }

    #[test]
    fn test_unsafe_ref_requires_matching_algorithms() {
        let dir = TempDir::new().unwrap();
        let mut builder = builder(&dir);
        let mut sums = BTreeMap::new();
        sums.insert(ChecksumAlgorithm::Md5, "0cc175b9c0f1b6a831c399e269772661".to_string());
        let err = builder
            .payload_ref_unsafe("r.txt", Some(1), "http://example.org/r", &sums)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidReference(_)));

        let mut sums = BTreeMap::new();
        sums.insert(ChecksumAlgorithm::Sha512, "abc".to_string());
        let err = builder
            .payload_ref_unsafe("r.txt", Some(1), "http://example.org/r", &sums)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidReference(_)));
    }

    #[test]
    fn test_stream_lines_appear_after_close() {
        let dir = TempDir::new().unwrap();
        let mut builder = builder(&dir);
        let mut stream = builder.payload_stream("s.bin").unwrap();
        stream.write_all(b"streamed").unwrap();
        assert!(builder.manifest(ChecksumAlgorithm::Sha512).is_empty());
        stream.close().unwrap();
        let lines = builder.manifest(ChecksumAlgorithm::Sha512);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(" data/s.bin"));
    }

    #[test]
    fn test_build_closes_open_streams() {
        let dir = TempDir::new().unwrap();
        let mut builder = builder(&dir);
        let mut stream = builder.payload_stream("left-open.bin").unwrap();
        stream.write_all(b"0123").unwrap();
        let bag = builder.build().unwrap();

        assert_eq!(builder.manifest(ChecksumAlgorithm::Sha512).len(), 1);
        assert_eq!(bag.metadata(MetadataName::PayloadOxum).unwrap(), vec!["4.1"]);
        assert!(stream.write_all(b"late").is_err());
    }

    #[test]
    fn test_content_after_build_fails() {
        let dir = TempDir::new().unwrap();
        let mut builder = builder(&dir);
        builder.build().unwrap();
        assert!(builder.is_built());
        assert!(matches!(
            builder.payload_reader("a", &b"a"[..]),
            Err(Error::AlreadyBuilt)
        ));
        assert!(matches!(builder.metadata_str("a", "b"), Err(Error::AlreadyBuilt)));
        assert!(matches!(builder.tag_stream("t.txt"), Err(Error::AlreadyBuilt)));
    }

    #[test]
    fn test_supplied_bag_info_merges_into_metadata() {
        let dir = TempDir::new().unwrap();
        let mut builder = builder(&dir);
        builder
            .tag_reader("bag-info.txt", &b"Contact-Name: Ann\nPayload-Oxum: 9.9\n"[..])
            .unwrap()
            .metadata_str("Contact-Email", "ann@example.org")
            .unwrap();
        let bag = builder.build().unwrap();

        assert!(dir.path().join("bag/bagit.txt").is_file());
        assert_eq!(bag.metadata_str("Contact-Name").unwrap(), vec!["Ann"]);
        assert_eq!(bag.metadata_str("Contact-Email").unwrap(), vec!["ann@example.org"]);
        assert_eq!(bag.metadata(MetadataName::PayloadOxum).unwrap(), vec!["0.0"]);
        assert!(bag.is_valid().unwrap());
    }

    #[test]
    fn test_builder_owned_tag_names_rejected() {
        let dir = TempDir::new().unwrap();
        let mut builder = builder(&dir);
        let err = builder.tag_reader("fetch.txt", &b"x"[..]).unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
        assert!(matches!(
            builder.tag_stream("bag-info.txt"),
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(
            builder.tag_stream("./fetch.txt"),
            Err(Error::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_failed_build_stays_failed() {
        let dir = TempDir::new().unwrap();
        let mut builder = builder(&dir);
        builder.payload_reader("a.txt", &b"a"[..]).unwrap();
        fs::write(dir.path().join("bag/bagit.txt"), "placed by someone else").unwrap();

        let err = builder.build().unwrap_err();
        assert!(matches!(err, Error::DuplicateEntry { .. }));
        assert!(!builder.is_built());
        assert!(matches!(builder.build(), Err(Error::BuildFailed(_))));
        assert!(matches!(
            builder.payload_reader("b.txt", &b"b"[..]),
            Err(Error::BuildFailed(_))
        ));
        assert!(builder.manifest(ChecksumAlgorithm::Sha512).is_empty());
    }

    #[test]
    fn test_auto_generate_filters_names() {
        let dir = TempDir::new().unwrap();
        let mut builder = builder(&dir);
        builder.auto_generate([MetadataName::ContactName, MetadataName::PayloadOxum]);
        assert_eq!(
            builder.auto_generated().iter().copied().collect::<Vec<_>>(),
            vec![MetadataName::PayloadOxum]
        );
    }

    #[test]
    fn test_no_autogen_leaves_no_bag_info() {
        let dir = TempDir::new().unwrap();
        let mut builder = builder(&dir);
        builder.auto_generate([]);
        builder.payload_reader("a.txt", &b"a"[..]).unwrap();
        let bag = builder.build().unwrap();
        assert!(!dir.path().join("bag/bag-info.txt").exists());
        assert_eq!(bag.tag_manifest(ChecksumAlgorithm::Sha512).unwrap().len(), 2);
    }

    #[test]
    fn test_software_agent() {
        assert!(SOFTWARE_AGENT.starts_with("satchel v"));
    }
}
