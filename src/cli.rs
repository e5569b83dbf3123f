// src/cli.rs
//! CLI definitions for satchel
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "satchel")]
#[command(author = "Satchel Contributors")]
#[command(version)]
#[command(about = "Build, complete-check and validate BagIt bags", long_about = None)]
pub struct Cli {
    /// Report results on stdout; repeat for more log detail (-vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fill a new bag with payload, tag files and metadata
    Fill {
        /// Bag directory to create
        bag: PathBuf,

        #[command(flatten)]
        args: FillArgs,
    },

    /// Exit 0 if the bag is complete, non-zero otherwise
    Complete {
        /// Bag directory
        bag: PathBuf,
    },

    /// Exit 0 if the bag is valid, 1 if incomplete, 2 on checksum mismatch
    Validate {
        /// Bag directory
        bag: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub struct FillArgs {
    /// Payload file, optionally placed at a bag path: [BAGPATH=]FILE
    #[arg(short, long = "payload", value_name = "[BAGPATH=]FILE")]
    pub payloads: Vec<String>,

    /// Payload held at a URI, digested from a local copy: BAGPATH=FILE=URI
    #[arg(short, long = "reference", value_name = "BAGPATH=FILE=URI")]
    pub references: Vec<String>,

    /// Tag file, optionally placed at a bag path: [BAGPATH=]FILE
    #[arg(short, long = "tag", value_name = "[BAGPATH=]FILE")]
    pub tags: Vec<String>,

    /// Metadata statement for bag-info.txt: NAME=VALUE
    #[arg(short, long = "metadata", value_name = "NAME=VALUE")]
    pub metadata: Vec<String>,

    /// Existing bag whose content seeds the new one
    #[arg(short, long)]
    pub basis: Option<PathBuf>,

    /// Output form of the bag
    #[arg(
        short,
        long,
        default_value = "directory",
        value_parser = ["directory", "zip", "tar", "tgz"]
    )]
    pub archive: String,

    /// Fix archive entry timestamps so package bytes are reproducible
    #[arg(short, long)]
    pub no_time: bool,

    /// Checksum algorithm (repeatable; default SHA-512, or the basis bag's)
    #[arg(short, long = "checksum", value_name = "ALG")]
    pub checksums: Vec<String>,

    /// Tag file character encoding
    #[arg(short, long, default_value = "UTF-8", value_parser = ["UTF-8", "UTF-16"])]
    pub encoding: String,

    /// Optimization flag; `nag` suppresses automatic metadata
    #[arg(short, long = "optimize", value_name = "FLAG")]
    pub optimize: Vec<String>,
}
