// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: bag directory
fn bag_arg(help: &'static str) -> Arg {
    Arg::new("bag").required(true).value_name("BAG").help(help)
}

/// Repeatable option taking a value
fn list_arg(id: &'static str, short: char, value_name: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .short(short)
        .long(id)
        .value_name(value_name)
        .action(ArgAction::Append)
        .help(help)
}

fn build_cli() -> Command {
    Command::new("satchel")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Satchel Contributors")
        .about("Build, complete-check and validate BagIt bags")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Report results on stdout; repeat for more log detail (-vv)"),
        )
        .subcommand(
            Command::new("fill")
                .about("Fill a new bag with payload, tag files and metadata")
                .arg(bag_arg("Bag directory to create"))
                .arg(list_arg(
                    "payload",
                    'p',
                    "[BAGPATH=]FILE",
                    "Payload file, optionally placed at a bag path",
                ))
                .arg(list_arg(
                    "reference",
                    'r',
                    "BAGPATH=FILE=URI",
                    "Payload held at a URI, digested from a local copy",
                ))
                .arg(list_arg(
                    "tag",
                    't',
                    "[BAGPATH=]FILE",
                    "Tag file, optionally placed at a bag path",
                ))
                .arg(list_arg(
                    "metadata",
                    'm',
                    "NAME=VALUE",
                    "Metadata statement for bag-info.txt",
                ))
                .arg(
                    Arg::new("basis")
                        .short('b')
                        .long("basis")
                        .value_name("BASIS")
                        .help("Existing bag whose content seeds the new one"),
                )
                .arg(
                    Arg::new("archive")
                        .short('a')
                        .long("archive")
                        .default_value("directory")
                        .value_parser(["directory", "zip", "tar", "tgz"])
                        .help("Output form of the bag"),
                )
                .arg(
                    Arg::new("no_time")
                        .short('n')
                        .long("no-time")
                        .action(ArgAction::SetTrue)
                        .help("Fix archive entry timestamps so package bytes are reproducible"),
                )
                .arg(list_arg(
                    "checksum",
                    'c',
                    "ALG",
                    "Checksum algorithm (default SHA-512, or the basis bag's)",
                ))
                .arg(
                    Arg::new("encoding")
                        .short('e')
                        .long("encoding")
                        .default_value("UTF-8")
                        .value_parser(["UTF-8", "UTF-16"])
                        .help("Tag file character encoding"),
                )
                .arg(list_arg(
                    "optimize",
                    'o',
                    "FLAG",
                    "Optimization flag; nag suppresses automatic metadata",
                )),
        )
        .subcommand(
            Command::new("complete")
                .about("Exit 0 if the bag is complete, non-zero otherwise")
                .arg(bag_arg("Bag directory")),
        )
        .subcommand(
            Command::new("validate")
                .about("Exit 0 if the bag is valid, 1 if incomplete, 2 on checksum mismatch")
                .arg(bag_arg("Bag directory")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("satchel.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
