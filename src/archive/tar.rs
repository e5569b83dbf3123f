// src/archive/tar.rs

//! Tar and gzip-compressed tar packages

use super::{PackEntry, Unpacker};
use crate::Result;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use std::fs::File;
use std::io::{self, Read, Write};
use tar::{Archive, Builder, EntryType, Header};

fn entry_header(entry_type: EntryType, mode: u32, size: u64, mtime: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(mtime);
    header.set_cksum();
    header
}

fn append_entries<W: Write>(builder: &mut Builder<W>, entries: &[PackEntry], no_time: bool) -> Result<()> {
    for entry in entries {
        let mtime = if no_time {
            0
        } else {
            u64::try_from(entry.mtime).unwrap_or(0)
        };
        if entry.is_dir {
            let mut header = entry_header(EntryType::Directory, 0o755, 0, mtime);
            builder.append_data(&mut header, &entry.name, io::empty())?;
        } else {
            let file = File::open(&entry.source)?;
            let size = file.metadata()?.len();
            let mut header = entry_header(EntryType::Regular, 0o644, size, mtime);
            builder.append_data(&mut header, &entry.name, file)?;
        }
    }
    Ok(())
}

/// Write a tar stream, gzip-compressed when `compress` is set
///
/// The gzip header carries no timestamp.
pub(super) fn write_package<W: Write>(
    out: W,
    entries: &[PackEntry],
    compress: bool,
    no_time: bool,
) -> Result<W> {
    if compress {
        let encoder: GzEncoder<W> = GzBuilder::new().mtime(0).write(out, Compression::default());
        let mut builder = Builder::new(encoder);
        append_entries(&mut builder, entries, no_time)?;
        Ok(builder.into_inner()?.finish()?)
    } else {
        let mut builder = Builder::new(out);
        append_entries(&mut builder, entries, no_time)?;
        Ok(builder.into_inner()?)
    }
}

pub(super) fn read_package<R: Read>(reader: R, compressed: bool, unpacker: &mut Unpacker) -> Result<()> {
    if compressed {
        read_entries(Archive::new(GzDecoder::new(reader)), unpacker)
    } else {
        read_entries(Archive::new(reader), unpacker)
    }
}

fn read_entries<R: Read>(mut archive: Archive<R>, unpacker: &mut Unpacker) -> Result<()> {
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let entry_type = entry.header().entry_type();
        if !entry_type.is_file() && !entry_type.is_dir() {
            // Links and GNU/PAX metadata records carry no bag content
            continue;
        }
        let mtime = entry.header().mtime().ok().and_then(|t| i64::try_from(t).ok());
        unpacker.entry(&name, entry_type.is_dir(), &mut entry, mtime)?;
    }
    Ok(())
}
