// src/builder/basis.rs

//! Seeding a new bag from an existing one

use super::{BagBuilder, BuilderConfig};
use crate::bag::manifest::parse_manifest_file_name;
use crate::bag::{Bag, MetadataName, DATA_DIR, DECLARATION_FILE, FETCH_FILE, METADATA_FILE};
use crate::encoding::TagEncoding;
use crate::hash::ChecksumAlgorithm;
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

impl BagBuilder {
    /// Builder at `base` holding the content of `basis`
    ///
    /// Payload files, user tag files and non-automatic `bag-info.txt`
    /// properties are copied and re-digested. Fetch references are carried
    /// over without verification when the basis records a checksum for every
    /// requested algorithm. `None` keeps the basis bag's algorithms.
    pub fn from_basis(
        base: impl AsRef<Path>,
        basis: &Bag,
        algorithms: Option<BTreeSet<ChecksumAlgorithm>>,
    ) -> Result<Self> {
        let algorithms = match algorithms {
            Some(algorithms) => algorithms,
            None => basis.cs_algorithms()?,
        };
        let encoding = match basis.declaration()? {
            Some((_, encoding)) => encoding.parse().unwrap_or(TagEncoding::Utf8),
            None => TagEncoding::Utf8,
        };
        let config = BuilderConfig::default()
            .with_encoding(encoding)
            .with_algorithms(algorithms);
        let mut builder = Self::with_config(Some(base.as_ref()), config)?;
        let root = basis.root();

        let data_dir = root.join(DATA_DIR);
        let payload_entries: Vec<_> = if data_dir.is_dir() {
            WalkDir::new(&data_dir).sort_by_file_name().into_iter().collect()
        } else {
            Vec::new()
        };
        for entry in payload_entries {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = slash_path(entry.path().strip_prefix(&data_dir).unwrap_or(entry.path()));
            builder.payload(&rel, entry.path())?;
        }

        let fetch_refs = basis.fetch_refs()?;
        if !fetch_refs.is_empty() {
            let mut recorded: BTreeMap<ChecksumAlgorithm, BTreeMap<String, String>> = BTreeMap::new();
            for alg in &builder.config.algorithms {
                recorded.insert(*alg, basis.payload_manifest(*alg)?);
            }
            for fetch in fetch_refs {
                let checksums: Option<BTreeMap<ChecksumAlgorithm, String>> = recorded
                    .iter()
                    .map(|(alg, manifest)| manifest.get(&fetch.path).map(|hex| (*alg, hex.clone())))
                    .collect();
                let rel = fetch
                    .path
                    .strip_prefix(&format!("{}/", DATA_DIR))
                    .unwrap_or(&fetch.path);
                match checksums {
                    Some(checksums) => {
                        builder.payload_ref_unsafe(rel, fetch.size, &fetch.uri, &checksums)?;
                    }
                    None => warn!(
                        "Dropping fetch reference {}: basis has no checksum for every algorithm",
                        fetch.path
                    ),
                }
            }
        }

        for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|e| {
            e.depth() != 1 || e.file_name() != DATA_DIR
        }) {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = slash_path(entry.path().strip_prefix(root).unwrap_or(entry.path()));
            if is_builder_owned(&rel) {
                continue;
            }
            builder.tag(&rel, entry.path())?;
        }

        for (name, value) in basis.properties(METADATA_FILE)? {
            let automatic = name
                .parse::<MetadataName>()
                .is_ok_and(|n| n.is_auto_generatable());
            if !automatic {
                builder.metadata_str(&name, &value)?;
            }
        }

        debug!("Seeded {} from basis bag '{}'", builder.base.display(), basis.name());
        Ok(builder)
    }
}

/// Tag files the builder regenerates rather than copies
fn is_builder_owned(rel: &str) -> bool {
    rel == DECLARATION_FILE
        || rel == METADATA_FILE
        || rel == FETCH_FILE
        || parse_manifest_file_name(rel).is_some()
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
