// src/lib.rs

//! Satchel: BagIt bag builder, validator and packager
//!
//! Builds BagIt 1.0 bags: self-describing directories that carry payload
//! files together with checksum manifests, metadata and references to
//! external content.
//!
//! # Architecture
//!
//! - Single-pass digests: every file is read once for all checksum algorithms
//! - Ordered finalization: tag-manifests cover every other tag file
//! - Opaque and ephemeral bags: path-hiding and self-cleaning lifecycles
//! - Packages: zip, tar and gzip-tar, with optional timestamp normalization
//!
//! ```no_run
//! use satchel::{archive, BagBuilder, MetadataName, PackageFormat};
//!
//! let mut builder = BagBuilder::new("/tmp/mybag")?;
//! builder
//!     .payload("report.pdf", "/home/me/report.pdf")?
//!     .metadata(MetadataName::ContactName, "Ann Example")?;
//! let bag = builder.build()?;
//! assert!(bag.is_valid()?);
//! let package = archive::to_package(&bag, PackageFormat::Zip, true, None)?;
//! println!("{}", package.display());
//! # Ok::<(), satchel::Error>(())
//! ```

pub mod archive;
pub mod bag;
pub mod builder;
pub mod encoding;
mod error;
pub mod hash;

pub use archive::{PackageFormat, PackageStream};
pub use bag::{Bag, BagStatus, FetchRef, MetadataName, ValidationReport};
pub use builder::{BagBuilder, BagWriter, BuilderConfig};
pub use encoding::{EolRule, TagEncoding};
pub use error::{Error, Result};
pub use hash::{ChecksumAlgorithm, Digests};
