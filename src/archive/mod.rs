//! In-memory archive of fetched tracks and its zip serialization

use std::{
    collections::HashSet,
    io::{Cursor, Write},
};

use thiserror::Error;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::fetch::AudioPayload;

pub mod batch;

pub const ZIP_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub filename: String,
    pub payload: AudioPayload,
}

/// Entries in insertion order, with unique filenames.
#[derive(Debug, Default)]
pub struct Archive {
    entries: Vec<ArchiveEntry>,
    taken: HashSet<String>,
}

impl Archive {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            taken: HashSet::with_capacity(capacity),
        }
    }

    /// Appends an entry. A name already in the archive gets a ` (n)` suffix
    /// before its extension; returns the name actually used.
    pub fn push(&mut self, filename: String, payload: AudioPayload) -> &str {
        let filename = self.unique_name(filename);
        self.taken.insert(filename.clone());
        self.entries.push(ArchiveEntry { filename, payload });
        &self.entries[self.entries.len() - 1].filename
    }

    fn unique_name(&self, filename: String) -> String {
        if !self.taken.contains(&filename) {
            return filename;
        }

        let (stem, ext) = match filename.rfind('.') {
            Some(dot) if dot > 0 => filename.split_at(dot),
            _ => (filename.as_str(), ""),
        };

        let mut n = 2;
        loop {
            let candidate = format!("{stem} ({n}){ext}");
            if !self.taken.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

}

/// Serializes archive entries into a single container
pub trait ArchiveWriter: Send + Sync {
    fn write(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>, ArchiveError>;
}

/// Zip container. Audio is already compressed, so entries are stored as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipArchiveWriter;

impl ArchiveWriter for ZipArchiveWriter {
    fn write(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>, ArchiveError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for entry in entries {
            zip.start_file(entry.filename.as_str(), options)?;
            zip.write_all(entry.payload.as_bytes())?;
        }

        Ok(zip.finish()?.into_inner())
    }
}
