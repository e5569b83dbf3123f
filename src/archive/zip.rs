// src/archive/zip.rs

//! Zip packages
//!
//! Entry timestamps are DOS date/times interpreted as UTC; they carry two
//! second resolution and cannot express dates before 1980. Each entry also
//! carries an extended timestamp field (0x5455) with the exact unix mtime,
//! which readers prefer when present.

use super::{PackEntry, Unpacker};
use crate::Result;
use chrono::{Datelike, NaiveDate, Timelike};
use std::fs::File;
use std::io::{Read, Seek, Write};
use zip::write::FullFileOptions;
use zip::{CompressionMethod, DateTime, ExtraField, ZipArchive, ZipWriter};

/// Info-ZIP extended timestamp extra field
const EXTENDED_TIMESTAMP_ID: u16 = 0x5455;

/// Flags byte: modification time present
const MOD_TIME_FLAG: u8 = 0x01;

/// DOS timestamp for unix seconds, clamped to the DOS epoch when out of range
fn dos_time(unix_secs: i64) -> DateTime {
    chrono::DateTime::from_timestamp(unix_secs, 0)
        .and_then(|t| {
            DateTime::from_date_and_time(
                u16::try_from(t.year()).ok()?,
                t.month() as u8,
                t.day() as u8,
                t.hour() as u8,
                t.minute() as u8,
                t.second() as u8,
            )
            .ok()
        })
        .unwrap_or_default()
}

fn unix_time(dos: DateTime) -> Option<i64> {
    NaiveDate::from_ymd_opt(dos.year().into(), dos.month().into(), dos.day().into())?
        .and_hms_opt(dos.hour().into(), dos.minute().into(), dos.second().into())
        .map(|t| t.and_utc().timestamp())
}

/// Extended timestamp payload for `unix_secs`, if it fits the field's u32
fn extended_timestamp(unix_secs: i64) -> Option<Box<[u8]>> {
    let secs = u32::try_from(unix_secs).ok()?;
    let mut data = Vec::with_capacity(5);
    data.push(MOD_TIME_FLAG);
    data.extend_from_slice(&secs.to_le_bytes());
    Some(data.into_boxed_slice())
}

/// Entry mtime from the extended timestamp, falling back to the DOS time
fn entry_mtime<'a>(
    mut fields: impl Iterator<Item = &'a ExtraField>,
    dos: Option<DateTime>,
) -> Option<i64> {
    fields
        .find_map(|field| match field {
            ExtraField::ExtendedTimestamp(ts) => ts.mod_time(),
            _ => None,
        })
        .map(i64::from)
        .or_else(|| dos.and_then(unix_time))
}

pub(super) fn write_package<W: Write + Seek>(out: W, entries: &[PackEntry], no_time: bool) -> Result<W> {
    let mut zip = ZipWriter::new(out);
    for entry in entries {
        let modified = if no_time {
            DateTime::default()
        } else {
            dos_time(entry.mtime)
        };
        let mut options = FullFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(modified);
        if !no_time {
            if let Some(data) = extended_timestamp(entry.mtime) {
                options.add_extra_data(EXTENDED_TIMESTAMP_ID, data, false)?;
            }
        }
        if entry.is_dir {
            zip.add_directory(entry.name.as_str(), options)?;
        } else {
            zip.start_file(entry.name.as_str(), options)?;
            let mut source = File::open(&entry.source)?;
            std::io::copy(&mut source, &mut zip)?;
        }
    }
    Ok(zip.finish()?)
}

/// Extract a seekable zip file
pub(super) fn read_package<R: Read + Seek>(reader: R, unpacker: &mut Unpacker) -> Result<()> {
    let mut archive = ZipArchive::new(reader)?;
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let name = file.name().to_string();
        let is_dir = file.is_dir();
        let mtime = entry_mtime(file.extra_data_fields(), file.last_modified());
        unpacker.entry(&name, is_dir, &mut file, mtime)?;
    }
    Ok(())
}

/// Extract a zip read front to back, without seeking
pub(super) fn read_stream<R: Read>(mut reader: R, unpacker: &mut Unpacker) -> Result<()> {
    while let Some(mut file) = zip::read::read_zipfile_from_stream(&mut reader)? {
        let name = file.name().to_string();
        let is_dir = file.is_dir();
        let mtime = entry_mtime(file.extra_data_fields(), file.last_modified());
        unpacker.entry(&name, is_dir, &mut file, mtime)?;
    }
    Ok(())
}
