//! Fetches a whole playlist, one track at a time, into a single archive.

use std::{sync::Arc, time::Duration};

use log::info;
use thiserror::Error;

use crate::{
    archive::{Archive, ArchiveError, ArchiveWriter, ZIP_CONTENT_TYPE},
    blob::{BlobError, BlobStore, PublishNaming},
    domain::track::TrackDescriptor,
    fetch::{FetchError, Fetcher},
    pacing::Sleeper,
};

pub const DEFAULT_ARCHIVE_PATH: &str = "playlists/playlist.zip";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no tracks to download")]
    NoTracks,

    #[error("track {} failed: {source}", .index + 1)]
    Fetch {
        index: usize,
        #[source]
        source: FetchError,
    },

    #[error("failed to build archive: {0}")]
    Archive(#[from] ArchiveError),

    #[error("failed to publish archive: {0}")]
    Blob(#[from] BlobError),
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// pause between two consecutive tracks
    pub inter_request_delay: Duration,
    pub archive_path: String,
    pub naming: PublishNaming,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            inter_request_delay: Duration::from_millis(1000),
            archive_path: DEFAULT_ARCHIVE_PATH.to_string(),
            naming: PublishNaming {
                content_addressed: false,
            },
        }
    }
}

/// Archive bytes, serialized once
#[derive(Debug)]
pub struct SerializedArchive {
    pub bytes: Vec<u8>,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArchive {
    pub url: String,
    pub path: String,
    pub entries: usize,
}

pub struct BatchArchiver {
    fetcher: Arc<Fetcher>,
    writer: Arc<dyn ArchiveWriter>,
    sleeper: Arc<dyn Sleeper>,
    settings: BatchSettings,
}

impl BatchArchiver {
    pub fn new(
        fetcher: Arc<Fetcher>,
        writer: Arc<dyn ArchiveWriter>,
        sleeper: Arc<dyn Sleeper>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            fetcher,
            writer,
            sleeper,
            settings,
        }
    }

    /// Fetches every track in order and serializes the result.
    ///
    /// Tracks are fetched strictly one after another with a fixed pause in
    /// between. The first track that can't be fetched aborts the batch and
    /// everything fetched so far is dropped.
    pub fn assemble(&self, descriptors: &[TrackDescriptor]) -> Result<SerializedArchive, BatchError> {
        if descriptors.is_empty() {
            return Err(BatchError::NoTracks);
        }

        let total = descriptors.len();
        let mut archive = Archive::with_capacity(total);

        for (index, track) in descriptors.iter().enumerate() {
            let query = track.build_query();
            info!("Downloading track {}/{}: {}", index + 1, total, query);

            let payload = self
                .fetcher
                .fetch_track(&query)
                .map_err(|source| BatchError::Fetch { index, source })?;
            archive.push(track.build_filename(), payload);

            if index + 1 < total {
                self.sleeper.sleep(self.settings.inter_request_delay);
            }
        }

        let bytes = self.writer.write(archive.entries())?;
        Ok(SerializedArchive {
            bytes,
            entries: archive.entries().len(),
        })
    }

    /// [`BatchArchiver::assemble`], then publishes the archive with public read access.
    pub fn build_archive(
        &self,
        descriptors: &[TrackDescriptor],
        store: &dyn BlobStore,
    ) -> Result<PublishedArchive, BatchError> {
        let SerializedArchive { bytes, entries } = self.assemble(descriptors)?;

        let path = self
            .settings
            .naming
            .path_for(&self.settings.archive_path, &bytes);
        let url = store.put(&path, bytes, ZIP_CONTENT_TYPE)?;

        Ok(PublishedArchive { url, path, entries })
    }
}
