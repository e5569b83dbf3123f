// src/builder/writer.rs

//! Tag file writers and payload/tag stream handles
//!
//! Every file a builder produces is written through one of two sinks:
//!
//! - [`FlatWriter`]: a line-oriented tag file (manifests, `bag-info.txt`,
//!   `fetch.txt`, user property files)
//! - [`BagWriter`]: a caller-driven byte stream into a payload or tag file
//!
//! Both digest everything they write. When closed, they report
//! `<hex> <bag-relative path>` to their successors: the manifest writers of
//! the same algorithm. Successors are held weakly, so closing order is decided
//! by the builder and never by reference cycles.

use crate::encoding::{EolRule, TagEncoding};
use crate::hash::{ChecksumAlgorithm, DigestWriter, Digests};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

/// Maximum characters per physical property line before folding
pub const FOLD_WIDTH: usize = 80;

pub(crate) type SharedWriter = Arc<Mutex<FlatWriter>>;

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create `path` (and its parents), failing if something is already there
pub(crate) fn create_exclusive(path: &Path, kind: &'static str, rel_path: &str) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => Error::DuplicateEntry {
                kind,
                path: rel_path.to_string(),
            },
            _ => Error::Io(e),
        })
}

/// Manifest writers notified when a file is closed, one per algorithm
#[derive(Debug, Default, Clone)]
pub(crate) struct Successors(BTreeMap<ChecksumAlgorithm, Weak<Mutex<FlatWriter>>>);

impl Successors {
    pub(crate) fn of(writers: &BTreeMap<ChecksumAlgorithm, SharedWriter>) -> Self {
        Self(
            writers
                .iter()
                .map(|(alg, writer)| (*alg, Arc::downgrade(writer)))
                .collect(),
        )
    }

    /// Append one manifest line per algorithm for `rel_path`
    pub(crate) fn notify(&self, digests: &Digests, rel_path: &str) -> Result<()> {
        for (alg, successor) in &self.0 {
            let (Some(hex), Some(writer)) = (digests.get(alg), successor.upgrade()) else {
                continue;
            };
            lock(&writer).write_line(&format!("{} {}", hex, rel_path))?;
        }
        Ok(())
    }
}

/// Running payload totals for `Payload-Oxum` and `Bag-Size`
#[derive(Debug, Default)]
pub(crate) struct Tally {
    bytes: AtomicU64,
    files: AtomicU64,
}

impl Tally {
    pub(crate) fn record(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.files.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }
}

/// Sequential line writer over one tag file
#[derive(Debug)]
pub(crate) struct FlatWriter {
    rel_path: String,
    out: Option<DigestWriter<BufWriter<File>>>,
    encoding: TagEncoding,
    eol: EolRule,
    successors: Successors,
    recorded: Option<Vec<String>>,
    started: bool,
}

impl FlatWriter {
    /// Create the tag file at `base/rel_path`
    pub(crate) fn create(
        base: &Path,
        rel_path: &str,
        encoding: TagEncoding,
        eol: EolRule,
        algorithms: &BTreeSet<ChecksumAlgorithm>,
        successors: Successors,
    ) -> Result<Self> {
        let file = create_exclusive(&base.join(rel_path), "tag", rel_path)?;
        debug!("Opened tag file {}", rel_path);
        Ok(Self {
            rel_path: rel_path.to_string(),
            out: Some(DigestWriter::new(BufWriter::new(file), algorithms)),
            encoding,
            eol,
            successors,
            recorded: None,
            started: false,
        })
    }

    /// Keep written lines in memory so they can be queried before build
    pub(crate) fn recording(mut self) -> Self {
        self.recorded = Some(Vec::new());
        self
    }

    pub(crate) fn into_shared(self) -> SharedWriter {
        Arc::new(Mutex::new(self))
    }

    pub(crate) fn rel_path(&self) -> &str {
        &self.rel_path
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.out.is_none()
    }

    /// Lines written so far (empty unless recording)
    pub(crate) fn lines(&self) -> Vec<String> {
        self.recorded.clone().unwrap_or_default()
    }

    /// Append `line` followed by the configured terminator
    pub(crate) fn write_line(&mut self, line: &str) -> Result<()> {
        let Some(out) = self.out.as_mut() else {
            return Err(Error::Io(io::Error::other(format!(
                "tag file {} is already closed",
                self.rel_path
            ))));
        };
        let mut text = String::with_capacity(line.len() + 2);
        text.push_str(line);
        text.push_str(self.eol.terminator());
        out.write_all(&self.encoding.encode(&text, !self.started))?;
        self.started = true;
        if let Some(recorded) = self.recorded.as_mut() {
            recorded.push(line.to_string());
        }
        Ok(())
    }

    /// Append `name: value`, folded into continuation lines past [`FOLD_WIDTH`]
    pub(crate) fn write_property(&mut self, name: &str, value: &str) -> Result<()> {
        for line in fold_property(name, value) {
            self.write_line(&line)?;
        }
        Ok(())
    }

    /// Flush, digest the written bytes and report them to the successors
    ///
    /// Closing an already closed writer does nothing.
    pub(crate) fn close(&mut self) -> Result<()> {
        let Some(out) = self.out.take() else {
            return Ok(());
        };
        let (buffered, digests, size) = out.finalize()?;
        let file = buffered.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
        debug!("Closed tag file {} ({} bytes)", self.rel_path, size);
        self.successors.notify(&digests, &self.rel_path)
    }
}

/// Split a property into physical lines of at most [`FOLD_WIDTH`] characters
///
/// Continuation lines carry one leading space followed by the next chunk.
pub(crate) fn fold_property(name: &str, value: &str) -> Vec<String> {
    let full: Vec<char> = format!("{}: {}", name, value).chars().collect();
    let mut chunks = full.chunks(FOLD_WIDTH);
    let mut lines: Vec<String> = chunks.next().map(|c| c.iter().collect()).into_iter().collect();
    for chunk in chunks {
        let mut line = String::with_capacity(chunk.len() + 1);
        line.push(' ');
        line.extend(chunk);
        lines.push(line);
    }
    lines
}

/// Shared state behind a [`BagWriter`]
#[derive(Debug)]
pub(crate) struct BagStream {
    rel_path: String,
    out: Option<DigestWriter<BufWriter<File>>>,
    successors: Successors,
    tally: Option<Arc<Tally>>,
}

impl BagStream {
    pub(crate) fn create(
        base: &Path,
        rel_path: &str,
        kind: &'static str,
        algorithms: &BTreeSet<ChecksumAlgorithm>,
        successors: Successors,
        tally: Option<Arc<Tally>>,
    ) -> Result<Self> {
        let file = create_exclusive(&base.join(rel_path), kind, rel_path)?;
        Ok(Self {
            rel_path: rel_path.to_string(),
            out: Some(DigestWriter::new(BufWriter::new(file), algorithms)),
            successors,
            tally,
        })
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        let Some(out) = self.out.take() else {
            return Ok(());
        };
        let (buffered, digests, size) = out.finalize()?;
        buffered.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        if let Some(tally) = &self.tally {
            tally.record(size);
        }
        debug!("Closed stream {} ({} bytes)", self.rel_path, size);
        self.successors.notify(&digests, &self.rel_path)
    }
}

/// Write-only handle to a payload or tag file under construction
///
/// Manifest lines for the file are emitted when the handle is closed, either
/// explicitly through [`BagWriter::close`] or by the builder's `build()`.
/// Dropping the handle without closing leaves the file open until then.
pub struct BagWriter {
    inner: Arc<Mutex<BagStream>>,
}

impl BagWriter {
    pub(crate) fn new(inner: Arc<Mutex<BagStream>>) -> Self {
        Self { inner }
    }

    /// Bag-relative path this handle writes to
    pub fn path(&self) -> String {
        lock(&self.inner).rel_path.clone()
    }

    /// Finish the file and record its checksums
    pub fn close(self) -> Result<()> {
        lock(&self.inner).close()
    }
}

impl Write for BagWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut stream = lock(&self.inner);
        match stream.out.as_mut() {
            Some(out) => out.write(buf),
            None => Err(io::Error::other(format!("{} is already closed", stream.rel_path))),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match lock(&self.inner).out.as_mut() {
            Some(out) => out.flush(),
            None => Ok(()),
        }
    }
}
