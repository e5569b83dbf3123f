// src/archive/stream.rs

//! Read stream over a package file

use crate::Result;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reader over a packaged bag
///
/// When created for an ephemeral bag the package file is removed once, when
/// the stream is closed or dropped.
#[derive(Debug)]
pub struct PackageStream {
    reader: Option<File>,
    path: PathBuf,
    cleanup: bool,
}

impl PackageStream {
    pub(crate) fn open(path: PathBuf, cleanup: bool) -> Result<Self> {
        let reader = File::open(&path)?;
        Ok(Self {
            reader: Some(reader),
            path,
            cleanup,
        })
    }

    /// Package file backing this stream
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether closing the stream deletes the package file
    pub fn is_ephemeral(&self) -> bool {
        self.cleanup
    }

    /// Close the stream, deleting the package file if ephemeral
    pub fn close(mut self) -> Result<()> {
        self.release()?;
        Ok(())
    }

    fn release(&mut self) -> io::Result<()> {
        if self.reader.take().is_none() {
            return Ok(());
        }
        if self.cleanup {
            self.cleanup = false;
            fs::remove_file(&self.path)?;
            debug!("Removed ephemeral package {}", self.path.display());
        }
        Ok(())
    }
}

impl Read for PackageStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.as_mut() {
            Some(reader) => reader.read(buf),
            None => Err(io::Error::other("package stream is closed")),
        }
    }
}

impl Drop for PackageStream {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to remove package {}: {}", self.path.display(), e);
        }
    }
}
