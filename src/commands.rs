// src/commands.rs

//! Command handlers for the satchel CLI

use crate::cli::FillArgs;
use anyhow::{Context, Result, bail};
use satchel::{
    archive, BagBuilder, BagStatus, BuilderConfig, ChecksumAlgorithm, PackageFormat, TagEncoding,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Optimization flag that turns off automatic metadata
const NO_AUTOGEN_FLAG: &str = "nag";

/// Split `[BAGPATH=]FILE`; without a bag path the file argument is used for both
fn split_placement(arg: &str) -> (&str, &str) {
    match arg.split_once('=') {
        Some((bag_path, file)) if !bag_path.is_empty() => (bag_path, file),
        _ => (arg, arg),
    }
}

/// Split `BAGPATH=FILE=URI`; the URI keeps any further `=` characters
fn split_reference(arg: &str) -> Result<(&str, &str, &str)> {
    let mut parts = arg.splitn(3, '=');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(bag_path), Some(file), Some(uri)) if !bag_path.is_empty() && !uri.is_empty() => {
            Ok((bag_path, file, uri))
        }
        _ => bail!("Reference must have the form BAGPATH=FILE=URI: '{}'", arg),
    }
}

/// Split `NAME=VALUE`; the value keeps any further `=` characters
fn split_statement(arg: &str) -> Result<(&str, &str)> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => bail!("Metadata statement must have the form NAME=VALUE: '{}'", arg),
    }
}

fn report(bag: &Path, ok: bool, quality: &str) {
    let name = bag
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| bag.display().to_string());
    println!("Bag '{}' is {}{}", name, if ok { "" } else { "in" }, quality);
}

/// Create a bag from command-line content, optionally packaging it
pub fn cmd_fill(bag_dir: &Path, args: &FillArgs, verbose: u8) -> Result<()> {
    let algorithms = args
        .checksums
        .iter()
        .map(|name| name.parse::<ChecksumAlgorithm>())
        .collect::<std::result::Result<BTreeSet<_>, _>>()
        .context("Invalid checksum algorithm")?;

    let mut builder = match &args.basis {
        Some(basis_dir) => {
            let basis = archive::from_directory(basis_dir, false)
                .with_context(|| format!("Failed to open basis bag {}", basis_dir.display()))?;
            let algorithms = if args.checksums.is_empty() {
                None
            } else {
                Some(algorithms)
            };
            info!("Seeding {} from basis {}", bag_dir.display(), basis_dir.display());
            BagBuilder::from_basis(bag_dir, &basis, algorithms)?
        }
        None => {
            let encoding: TagEncoding = args.encoding.parse()?;
            let mut config = BuilderConfig::default().with_encoding(encoding);
            if !args.checksums.is_empty() {
                config = config.with_algorithms(algorithms);
            }
            BagBuilder::with_config(Some(bag_dir), config)
                .with_context(|| format!("Failed to create bag at {}", bag_dir.display()))?
        }
    };

    if args.optimize.iter().any(|flag| flag == NO_AUTOGEN_FLAG) {
        builder.auto_generate(std::iter::empty());
    }

    for payload in &args.payloads {
        let (bag_path, file) = split_placement(payload);
        builder
            .payload(bag_path, file)
            .with_context(|| format!("Failed to add payload {}", file))?;
    }
    for reference in &args.references {
        let (bag_path, file, uri) = split_reference(reference)?;
        builder
            .payload_ref_file(bag_path, file, uri)
            .with_context(|| format!("Failed to add reference {}", uri))?;
    }
    for tag in &args.tags {
        let (bag_path, file) = split_placement(tag);
        builder
            .tag(bag_path, file)
            .with_context(|| format!("Failed to add tag file {}", file))?;
    }
    for statement in &args.metadata {
        let (name, value) = split_statement(statement)?;
        builder.metadata_str(name, value)?;
    }

    let bag = builder.build().context("Failed to build bag")?;
    let created: PathBuf = if args.archive == "directory" {
        bag_dir.to_path_buf()
    } else {
        let format: PackageFormat = args.archive.parse()?;
        archive::to_package(&bag, format, args.no_time, None)
            .with_context(|| format!("Failed to package bag as {}", format))?
    };

    if verbose > 0 {
        report(&created, true, "created");
    }
    Ok(())
}

/// Completeness status code of the bag at `bag_dir`
pub fn cmd_complete(bag_dir: &Path, verbose: u8) -> Result<i32> {
    let bag = archive::from_directory(bag_dir, false)
        .with_context(|| format!("Failed to open bag {}", bag_dir.display()))?;
    let status = bag.complete_status()?;
    if verbose > 0 {
        report(bag_dir, status == BagStatus::Ok, "complete");
    }
    Ok(status.code())
}

/// Validation status code of the bag at `bag_dir`
pub fn cmd_validate(bag_dir: &Path, verbose: u8) -> Result<i32> {
    let bag = archive::from_directory(bag_dir, false)
        .with_context(|| format!("Failed to open bag {}", bag_dir.display()))?;
    let report_data = bag.verify()?;
    for mismatch in &report_data.mismatched {
        info!("{}", mismatch);
    }
    let status = report_data.status();
    if verbose > 0 {
        report(bag_dir, status == BagStatus::Ok, "valid");
    }
    Ok(status.code())
}
