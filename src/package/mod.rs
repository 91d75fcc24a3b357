//! Zip package access and scratch storage for the XML decoders
//!
//! XLSX and ODS parts are copied out of the archive into a private temporary
//! directory so the pull parsers can reopen them cheaply on every rewind. The
//! directory lives as long as the reader and is removed when it is dropped.

pub mod xml;
pub mod zip_reader;

pub use zip_reader::{PackageArchive, ZipEntry};

use crate::config::ReaderConfig;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary directory holding extracted package parts
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh directory under `config.temp_dir` or the system default
    pub fn create(config: &ReaderConfig) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sheetstream-");

        let dir = match &config.temp_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };

        log::debug!("Created scratch directory {}", dir.path().display());
        Ok(ScratchDir { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the scratch directory
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
