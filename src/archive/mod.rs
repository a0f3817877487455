// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Persistent backing of bundles across revisions and process restarts (§4.1).
//!
//! [`Cache`] owns the cache root and hands out [`Archive`]s; each `Archive` owns
//! an ordered, oldest-to-newest list of [`Revision`]s. All filesystem operations
//! go through `fs_err` so I/O errors carry the offending path.

pub mod layout;
pub mod revision;

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bundle::{BundleId, PersistentState};
use crate::resolver::ManifestParser;

pub use revision::{Revision, RevisionKind};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to (de)serialize archive record: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("input stream install requires content bytes")]
    MissingContent,
    #[error("missing native library entry: {0}")]
    MissingNativeLibrary(String),
    #[error("no archive for bundle {0}")]
    NotFound(BundleId),
    #[error("cannot roll back: archive has only one revision")]
    OnlyOneRevision,
    #[error("location {0:?} is not a reference:/inputstream: form and does not parse as a URL: {1}")]
    InvalidLocation(String, url::ParseError),
    #[error("legacy archive record at {0:?} is incomplete")]
    IncompleteLegacyRecord(PathBuf),
}

/// The consolidated `bundle.info` record (§4.1 "Layout"). Serialized as YAML;
/// falls back to the legacy one-field-per-file layout when absent (§4.1
/// "Failure semantics").
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchiveRecord {
    id: u64,
    location: String,
    persistent_state: PersistentState,
    start_level: i32,
    last_modified: DateTime<Utc>,
    refresh_count: u64,
}

/// Persistent backing of one bundle (§3 "BundleArchive").
#[derive(Debug)]
pub struct Archive {
    pub id: BundleId,
    pub original_location: String,
    pub persistent_state: PersistentState,
    pub start_level: i32,
    pub last_modified: DateTime<Utc>,
    pub refresh_count: u64,
    root: PathBuf,
    revisions: Vec<Revision>,
}

impl Archive {
    pub fn revision_count(&self) -> usize {
        self.revisions.len()
    }

    pub fn revision(&self, index: usize) -> Option<&Revision> {
        self.revisions.get(index)
    }

    pub fn current_revision(&self) -> Option<&Revision> {
        self.revisions.last()
    }

    pub fn data_file(&self, relative: impl AsRef<Path>) -> PathBuf {
        layout::data_dir(&self.root).join(relative)
    }

    /// Appends a new revision, persisting the updated record (§4.4 "Update").
    pub fn revise(&mut self, location: &str, content: Option<&[u8]>, manifest_parser: &dyn ManifestParser) -> Result<(), Error> {
        let index = self.revisions.len();
        let dir = layout::revision_dir(&self.root, self.refresh_count, index);
        let revision = Revision::create(&dir, location, content, manifest_parser)?;
        self.revisions.push(revision);
        self.last_modified = Utc::now();
        self.persist()
    }

    /// Reverses a failed [`Archive::revise`]: closes and removes the newest
    /// revision's directory and drops it from the list. Fails if only one
    /// revision remains (§4.1 "Rationale").
    pub fn rollback_revise(&mut self) -> Result<bool, Error> {
        if self.revisions.len() <= 1 {
            return Err(Error::OnlyOneRevision);
        }
        let index = self.revisions.len() - 1;
        self.revisions.pop();
        let dir = layout::revision_dir(&self.root, self.refresh_count, index);
        if dir.exists() {
            fs_err::remove_dir_all(&dir)?;
        }
        self.persist()?;
        Ok(true)
    }

    /// Drops every revision except the newest, bumps `refresh_count` so the
    /// surviving revision gets a fresh directory (§4.5 step 6).
    pub fn purge(&mut self, manifest_parser: &dyn ManifestParser) -> Result<(), Error> {
        let newest_index = self.revisions.len();
        let Some(newest) = self.revisions.pop() else {
            return Ok(());
        };

        let new_dir = layout::revision_dir(&self.root, self.refresh_count + 1, 0);
        let rebuilt = newest.relocate(&new_dir, manifest_parser)?;

        for index in 0..=newest_index {
            let dir = layout::revision_dir(&self.root, self.refresh_count, index);
            if dir.exists() {
                fs_err::remove_dir_all(&dir)?;
            }
        }

        self.refresh_count += 1;
        self.revisions.clear();
        self.revisions.push(rebuilt);
        self.persist()
    }

    /// Marks this archive closed. No file handles are held open between calls in
    /// this implementation, so this only exists as a lifecycle seam for callers
    /// mirroring the OSGi close/close_and_delete pair.
    pub fn close(&self) {}

    pub fn close_and_delete(self) -> Result<(), Error> {
        fs_err::remove_dir_all(&self.root)?;
        Ok(())
    }

    /// Non-consuming form of [`Archive::close_and_delete`], for callers that only
    /// hold the archive behind a lock and cannot move it out (§4.5 garbage
    /// collection of uninstalled bundles).
    pub fn delete(&self) -> Result<(), Error> {
        fs_err::remove_dir_all(&self.root)?;
        Ok(())
    }

    fn persist(&self) -> Result<(), Error> {
        let record = ArchiveRecord {
            id: self.id.0,
            location: self.original_location.clone(),
            persistent_state: self.persistent_state,
            start_level: self.start_level,
            last_modified: self.last_modified,
            refresh_count: self.refresh_count,
        };
        fs_err::create_dir_all(&self.root)?;
        let serialized = serde_yaml::to_string(&record)?;
        fs_err::write(self.root.join(layout::ARCHIVE_INFO_FILE), serialized)?;
        Ok(())
    }
}

/// Owns the cache root; hands out and reloads [`Archive`]s (§4.1 "Contract").
#[derive(Debug)]
pub struct Cache {
    root: PathBuf,
}

impl Cache {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        fs_err::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Persists and returns the next bundle id. The counter file is written
    /// before the id is handed out, per invariant 3.
    pub fn next_id(&self) -> Result<BundleId, Error> {
        let counter_file = self.root.join(layout::BUNDLE_ID_FILE);

        let current = fs_err::read_to_string(&counter_file)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(1);

        fs_err::create_dir_all(&self.root)?;
        fs_err::write(&counter_file, (current + 1).to_string())?;

        Ok(BundleId(current))
    }

    /// Creates a new archive for `id` at `location`, materializing `content` if
    /// the location requires a copy.
    pub fn create(
        &self,
        id: BundleId,
        location: &str,
        content: Option<&[u8]>,
        manifest_parser: &dyn ManifestParser,
    ) -> Result<Archive, Error> {
        let root = layout::archive_dir(&self.root, id);
        fs_err::create_dir_all(layout::data_dir(&root))?;

        let mut archive = Archive {
            id,
            original_location: location.to_string(),
            persistent_state: PersistentState::Installed,
            start_level: 1,
            last_modified: Utc::now(),
            refresh_count: 0,
            root,
            revisions: Vec::new(),
        };
        archive.revise(location, content, manifest_parser)?;
        Ok(archive)
    }

    /// Reloads every archive present under the cache root, tolerating
    /// orphan/stale revision directories by keeping placeholder slots so
    /// `purge` drops them on the next refresh (§4.1 "Failure semantics").
    pub fn get_archives(&self, manifest_parser: &dyn ManifestParser) -> Result<Vec<Archive>, Error> {
        let mut archives = Vec::new();
        let Ok(entries) = fs_err::read_dir(&self.root) else {
            return Ok(archives);
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(id) = path.file_name().and_then(|n| n.to_str()).and_then(|n| n.parse::<u64>().ok()) else {
                continue;
            };
            if let Some(archive) = self.reload_one(BundleId(id), manifest_parser)? {
                archives.push(archive);
            }
        }

        Ok(archives)
    }

    pub fn get(&self, id: BundleId, manifest_parser: &dyn ManifestParser) -> Result<Archive, Error> {
        self.reload_one(id, manifest_parser)?.ok_or(Error::NotFound(id))
    }

    pub fn remove(&self, archive: Archive) -> Result<(), Error> {
        archive.close_and_delete()
    }

    /// No buffered writers are retained between calls in this implementation;
    /// provided as the documented seam for an embedder that adds write buffering.
    pub fn flush(&self) -> Result<(), Error> {
        Ok(())
    }

    fn reload_one(&self, id: BundleId, manifest_parser: &dyn ManifestParser) -> Result<Option<Archive>, Error> {
        let root = layout::archive_dir(&self.root, id);
        if !root.exists() {
            return Ok(None);
        }

        let record = self.read_record(&root, id)?;

        let mut revisions = Vec::new();
        let mut index = 0;
        loop {
            let dir = layout::revision_dir(&root, record.refresh_count, index);
            if !dir.exists() {
                break;
            }
            revisions.push(Revision::reload(&dir, manifest_parser)?);
            index += 1;
        }

        Ok(Some(Archive {
            id,
            original_location: record.location,
            persistent_state: record.persistent_state,
            start_level: record.start_level,
            last_modified: record.last_modified,
            refresh_count: record.refresh_count,
            root,
            revisions,
        }))
    }

    fn read_record(&self, root: &Path, id: BundleId) -> Result<ArchiveRecord, Error> {
        let consolidated = root.join(layout::ARCHIVE_INFO_FILE);
        if let Ok(text) = fs_err::read_to_string(&consolidated) {
            return Ok(serde_yaml::from_str(&text)?);
        }

        self.read_legacy_record(root, id)
    }

    /// Falls back to the legacy one-value-per-file layout (§4.1 "Failure
    /// semantics"): `bundle.id`, `bundle.location`, `bundle.state`,
    /// `bundle.startlevel`, `bundle.lastmodified`, `refresh.counter`.
    fn read_legacy_record(&self, root: &Path, id: BundleId) -> Result<ArchiveRecord, Error> {
        let read_field = |name: &str| fs_err::read_to_string(root.join(name)).ok().map(|s| s.trim().to_string());

        let location = read_field("bundle.location").ok_or_else(|| Error::IncompleteLegacyRecord(root.to_path_buf()))?;
        let persistent_state = match read_field("bundle.state").as_deref() {
            Some("active") => PersistentState::Active,
            Some("uninstalled") => PersistentState::Uninstalled,
            _ => PersistentState::Installed,
        };
        let start_level = read_field("bundle.startlevel").and_then(|s| s.parse().ok()).unwrap_or(1);
        let last_modified = read_field("bundle.lastmodified")
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|ms| DateTime::from_timestamp_millis(ms))
            .unwrap_or_else(Utc::now);
        let refresh_count = read_field("refresh.counter").and_then(|s| s.parse().ok()).unwrap_or(0);

        Ok(ArchiveRecord {
            id: id.0,
            location,
            persistent_state,
            start_level,
            last_modified,
            refresh_count,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolver::LineManifestParser;

    fn parser() -> LineManifestParser {
        LineManifestParser
    }

    #[test]
    fn create_then_reload_roundtrips_record() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        let id = cache.next_id().unwrap();

        let archive = cache.create(id, "inputstream:", Some(b"jar bytes"), &parser()).unwrap();
        assert_eq!(archive.revision_count(), 1);

        let reloaded = cache.get(id, &parser()).unwrap();
        assert_eq!(reloaded.id, id);
        assert_eq!(reloaded.revision_count(), 1);
        assert_eq!(reloaded.original_location, "inputstream:");
    }

    #[test]
    fn install_then_uninstall_then_remove_drops_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        let id = cache.next_id().unwrap();
        let archive = cache.create(id, "inputstream:", Some(b"x"), &parser()).unwrap();
        let root = layout::archive_dir(tmp.path(), id);
        assert!(root.exists());

        cache.remove(archive).unwrap();
        assert!(!root.exists());
        assert!(cache.get(id, &parser()).is_err());
    }

    #[test]
    fn rollback_revise_fails_with_single_revision() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        let id = cache.next_id().unwrap();
        let mut archive = cache.create(id, "inputstream:", Some(b"x"), &parser()).unwrap();

        assert!(matches!(archive.rollback_revise(), Err(Error::OnlyOneRevision)));
    }

    #[test]
    fn rollback_revise_restores_previous_revision_count() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        let id = cache.next_id().unwrap();
        let mut archive = cache.create(id, "inputstream:", Some(b"v1"), &parser()).unwrap();
        archive.revise("inputstream:", Some(b"v2"), &parser()).unwrap();
        assert_eq!(archive.revision_count(), 2);

        let rolled_back = archive.rollback_revise().unwrap();
        assert!(rolled_back);
        assert_eq!(archive.revision_count(), 1);
    }

    #[test]
    fn next_id_is_monotonic_and_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        let first = cache.next_id().unwrap();
        let second = cache.next_id().unwrap();
        assert!(second.0 > first.0);

        let reopened = Cache::open(tmp.path()).unwrap();
        let third = reopened.next_id().unwrap();
        assert!(third.0 > second.0);
    }
}
