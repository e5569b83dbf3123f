// src/hash.rs

//! Checksum algorithms and the single-pass digest pipeline
//!
//! Every bag is configured with a set of checksum algorithms. Each file that
//! enters the bag is read exactly once; the bytes are fed to one hasher per
//! algorithm as they stream past, producing one hex digest per algorithm.
//!
//! | Algorithm | Manifest code | Hex length |
//! |-----------|---------------|-----------|
//! | MD5       | `md5`         | 32        |
//! | SHA-1     | `sha1`        | 40        |
//! | SHA-256   | `sha256`      | 64        |
//! | SHA-512   | `sha512`      | 128       |

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::str::FromStr;

/// Checksum algorithm selection
///
/// Ordering follows digest strength, so the last algorithm of a sorted set is
/// the strongest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha256,
    /// Default algorithm for new bags
    #[default]
    Sha512,
}

/// Static registry: algorithm, canonical name, manifest code, digest length in bytes
const REGISTRY: [(ChecksumAlgorithm, &str, &str, usize); 4] = [
    (ChecksumAlgorithm::Md5, "MD5", "md5", 16),
    (ChecksumAlgorithm::Sha1, "SHA-1", "sha1", 20),
    (ChecksumAlgorithm::Sha256, "SHA-256", "sha256", 32),
    (ChecksumAlgorithm::Sha512, "SHA-512", "sha512", 64),
];

impl ChecksumAlgorithm {
    /// All known algorithms, weakest first
    pub const ALL: [ChecksumAlgorithm; 4] = [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512];

    fn entry(&self) -> &'static (ChecksumAlgorithm, &'static str, &'static str, usize) {
        // Registry rows are in declaration order
        &REGISTRY[*self as usize]
    }

    /// Canonical name, e.g. `SHA-512`
    #[inline]
    pub fn name(&self) -> &'static str {
        self.entry().1
    }

    /// Code used in manifest file names, e.g. `sha512` in `manifest-sha512.txt`
    #[inline]
    pub fn code(&self) -> &'static str {
        self.entry().2
    }

    /// Digest output length in bytes
    #[inline]
    pub fn output_len(&self) -> usize {
        self.entry().3
    }

    /// Digest length as a hex string
    #[inline]
    pub fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    /// Look up an algorithm by its manifest code
    pub fn from_code(code: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|(_, _, c, _)| *c == code)
            .map(|(alg, _, _, _)| *alg)
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        REGISTRY
            .iter()
            .find(|(_, name, code, _)| name.eq_ignore_ascii_case(s) || code.eq_ignore_ascii_case(s))
            .map(|(alg, _, _, _)| *alg)
            .ok_or_else(|| HashError::UnknownAlgorithm(s.to_string()))
    }
}

/// Hash computation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Unknown checksum algorithm name
    UnknownAlgorithm(String),
    /// Digest string has wrong length for algorithm
    InvalidLength { expected: usize, got: usize },
    /// Digest string contains invalid hex characters
    InvalidHex(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "no such checksum algorithm: {}", name),
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid digest length: expected {}, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in digest: {}", s),
        }
    }
}

impl std::error::Error for HashError {}

impl From<HashError> for crate::Error {
    fn from(err: HashError) -> Self {
        crate::Error::Configuration(err.to_string())
    }
}

/// Check that `value` is a well-formed hex digest for `algorithm`, returning it lowercased
pub fn normalize_digest(algorithm: ChecksumAlgorithm, value: &str) -> Result<String, HashError> {
    let expected = algorithm.hex_len();
    if value.len() != expected {
        return Err(HashError::InvalidLength {
            expected,
            got: value.len(),
        });
    }
    if !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(HashError::InvalidHex(value.to_string()));
    }
    Ok(value.to_ascii_lowercase())
}

/// Hex digests keyed by algorithm
pub type Digests = BTreeMap<ChecksumAlgorithm, String>;

/// Incremental state for a single algorithm
#[derive(Debug)]
pub struct Hasher {
    algorithm: ChecksumAlgorithm,
    state: HasherState,
}

#[derive(Debug)]
enum HasherState {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    /// Create a new hasher with the specified algorithm
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        let state = match algorithm {
            ChecksumAlgorithm::Md5 => HasherState::Md5(Md5::new()),
            ChecksumAlgorithm::Sha1 => HasherState::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            ChecksumAlgorithm::Sha512 => HasherState::Sha512(Sha512::new()),
        };
        Self { algorithm, state }
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Md5(h) => h.update(data),
            HasherState::Sha1(h) => h.update(data),
            HasherState::Sha256(h) => h.update(data),
            HasherState::Sha512(h) => h.update(data),
        }
    }

    /// Finalize into a lowercase hex digest
    pub fn finalize(self) -> String {
        match self.state {
            HasherState::Md5(h) => hex::encode(h.finalize()),
            HasherState::Sha1(h) => hex::encode(h.finalize()),
            HasherState::Sha256(h) => hex::encode(h.finalize()),
            HasherState::Sha512(h) => hex::encode(h.finalize()),
        }
    }

    #[inline]
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }
}

/// One hasher per configured algorithm, all fed from the same chunks
#[derive(Debug)]
pub struct MultiHasher {
    hashers: Vec<Hasher>,
}

impl MultiHasher {
    pub fn new<'a>(algorithms: impl IntoIterator<Item = &'a ChecksumAlgorithm>) -> Self {
        Self {
            hashers: algorithms.into_iter().map(|alg| Hasher::new(*alg)).collect(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        for hasher in &mut self.hashers {
            hasher.update(data);
        }
    }

    pub fn finalize(self) -> Digests {
        self.hashers
            .into_iter()
            .map(|h| (h.algorithm(), h.finalize()))
            .collect()
    }
}

/// Pass-through reader that digests everything read through it
pub struct DigestReader<R> {
    inner: R,
    hasher: MultiHasher,
    count: u64,
}

impl<R: Read> DigestReader<R> {
    pub fn new(inner: R, algorithms: &BTreeSet<ChecksumAlgorithm>) -> Self {
        Self {
            inner,
            hasher: MultiHasher::new(algorithms),
            count: 0,
        }
    }

    /// Bytes read so far
    pub fn bytes_read(&self) -> u64 {
        self.count
    }

    /// Finish hashing, returning the digests and the number of bytes seen
    pub fn finalize(self) -> (Digests, u64) {
        (self.hasher.finalize(), self.count)
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}

/// Pass-through writer that digests everything written through it
#[derive(Debug)]
pub struct DigestWriter<W> {
    inner: W,
    hasher: MultiHasher,
    count: u64,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W, algorithms: &BTreeSet<ChecksumAlgorithm>) -> Self {
        Self {
            inner,
            hasher: MultiHasher::new(algorithms),
            count: 0,
        }
    }

    /// Bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.count
    }

    /// Flush the inner writer and finish hashing
    pub fn finalize(mut self) -> io::Result<(W, Digests, u64)> {
        self.inner.flush()?;
        Ok((self.inner, self.hasher.finalize(), self.count))
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        // Only digest what the inner writer accepted
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Digest a reader with every algorithm in one pass
pub fn hash_reader<R: Read>(
    algorithms: &BTreeSet<ChecksumAlgorithm>,
    reader: R,
) -> io::Result<Digests> {
    let mut reader = DigestReader::new(reader, algorithms);
    io::copy(&mut reader, &mut io::sink())?;
    Ok(reader.finalize().0)
}

/// Digest a file with every algorithm in one pass
///
/// Streams the file content to avoid loading it entirely into memory.
pub fn hash_file(algorithms: &BTreeSet<ChecksumAlgorithm>, path: &Path) -> io::Result<Digests> {
    let file = File::open(path)?;
    hash_reader(algorithms, io::BufReader::new(file))
}

/// Recorded digest that does not match the file's current content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub path: String,
    pub algorithm: ChecksumAlgorithm,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for ChecksumMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} mismatch: expected {}, got {}",
            self.path, self.algorithm, self.expected, self.actual
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> BTreeSet<ChecksumAlgorithm> {
        ChecksumAlgorithm::ALL.into_iter().collect()
    }

    #[test]
    fn test_known_digests() {
        let digests = hash_reader(&all(), &b"hello world"[..]).unwrap();

        assert_eq!(digests[&ChecksumAlgorithm::Md5], "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(
            digests[&ChecksumAlgorithm::Sha1],
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
        assert_eq!(
            digests[&ChecksumAlgorithm::Sha256],
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_hex_lengths() {
        let digests = hash_reader(&all(), &b"lskdflsfevmep"[..]).unwrap();
        for (alg, hex) in &digests {
            assert_eq!(hex.len(), alg.hex_len(), "{}", alg);
        }
        assert_eq!(ChecksumAlgorithm::Md5.hex_len(), 32);
        assert_eq!(ChecksumAlgorithm::Sha1.hex_len(), 40);
        assert_eq!(ChecksumAlgorithm::Sha256.hex_len(), 64);
        assert_eq!(ChecksumAlgorithm::Sha512.hex_len(), 128);
    }

    #[test]
    fn test_hasher_incremental() {
        let mut full = Hasher::new(ChecksumAlgorithm::Sha512);
        full.update(b"Hello, World!");

        let mut incremental = Hasher::new(ChecksumAlgorithm::Sha512);
        incremental.update(b"Hello, ");
        incremental.update(b"World!");

        assert_eq!(full.finalize(), incremental.finalize());
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("SHA-512".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha512);
        assert_eq!("sha512".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha512);
        assert_eq!("md5".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Md5);
        assert_eq!("Sha-1".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha1);
        assert!(matches!(
            "SHA-6666".parse::<ChecksumAlgorithm>(),
            Err(HashError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_from_code() {
        assert_eq!(ChecksumAlgorithm::from_code("sha256"), Some(ChecksumAlgorithm::Sha256));
        assert_eq!(ChecksumAlgorithm::from_code("SHA-256"), None);
        for alg in ChecksumAlgorithm::ALL {
            assert_eq!(ChecksumAlgorithm::from_code(alg.code()), Some(alg));
        }
    }

    #[test]
    fn test_default_algorithm() {
        assert_eq!(ChecksumAlgorithm::default(), ChecksumAlgorithm::Sha512);
    }

    #[test]
    fn test_digest_writer_passes_bytes_through() {
        let algs: BTreeSet<_> = [ChecksumAlgorithm::Sha256].into_iter().collect();
        let mut writer = DigestWriter::new(Vec::new(), &algs);
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        assert_eq!(writer.bytes_written(), 11);

        let (out, digests, count) = writer.finalize().unwrap();
        assert_eq!(out, b"hello world");
        assert_eq!(count, 11);
        assert_eq!(
            digests[&ChecksumAlgorithm::Sha256],
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_digest_reader_matches_writer() {
        let data = vec![7u8; 64 * 1024 + 3];
        let mut reader = DigestReader::new(&data[..], &all());
        let mut copy = Vec::new();
        io::copy(&mut reader, &mut copy).unwrap();
        let (read_digests, count) = reader.finalize();

        let mut writer = DigestWriter::new(io::sink(), &all());
        writer.write_all(&data).unwrap();
        let (_, write_digests, _) = writer.finalize().unwrap();

        assert_eq!(copy, data);
        assert_eq!(count, data.len() as u64);
        assert_eq!(read_digests, write_digests);
    }

    #[test]
    fn test_normalize_digest() {
        let upper = "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9";
        assert_eq!(
            normalize_digest(ChecksumAlgorithm::Sha256, upper).unwrap(),
            upper.to_ascii_lowercase()
        );
        assert!(matches!(
            normalize_digest(ChecksumAlgorithm::Sha256, "abc123"),
            Err(HashError::InvalidLength { .. })
        ));
        assert!(matches!(
            normalize_digest(ChecksumAlgorithm::Md5, "gggg6021bb2bd5b0af676290809ec3a5"),
            Err(HashError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_empty_algorithm_set_yields_no_digests() {
        let digests = hash_reader(&BTreeSet::new(), &b"data"[..]).unwrap();
        assert!(digests.is_empty());
    }
}
