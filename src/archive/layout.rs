// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Path-joining helpers for the cache directory layout (§4.1 "Layout"), so every
//! consumer of the on-disk archive structure goes through one seam instead of ad
//! hoc `PathBuf` concatenation at each call site.

use std::path::PathBuf;

use percent_encoding::percent_decode_str;

use crate::bundle::BundleId;

/// Reserved filename at cache root holding the next-id counter.
pub const BUNDLE_ID_FILE: &str = "bundle.id";

/// Consolidated per-archive state file, with a one-value-per-file legacy fallback.
pub const ARCHIVE_INFO_FILE: &str = "bundle.info";

/// One archive's root directory: `<cache root>/<bundle id>/`.
pub fn archive_dir(cache_root: &std::path::Path, id: BundleId) -> PathBuf {
    cache_root.join(id.0.to_string())
}

pub fn data_dir(archive_dir: &std::path::Path) -> PathBuf {
    archive_dir.join("data")
}

/// Directory for one revision: `version<refresh_count>.<revision_index>/`. A fresh
/// `refresh_count` per refresh gives every revision directory a unique absolute
/// path, required because host loaders tie loaded native libraries to their
/// absolute path (§4.1 "Rationale").
pub fn revision_dir(archive_dir: &std::path::Path, refresh_count: u64, revision_index: usize) -> PathBuf {
    archive_dir.join(format!("version{refresh_count}.{revision_index}"))
}

pub fn revision_location_file(revision_dir: &std::path::Path) -> PathBuf {
    revision_dir.join("revision.location")
}

pub fn revision_content_dir(revision_dir: &std::path::Path) -> PathBuf {
    revision_dir.join("content")
}

/// Percent-decodes a `reference:file:<path>` or similar location per §4.1 "URL
/// decoding": `%HH` to byte, multi-byte sequences decoded as UTF-8. Falls back to
/// the original string on invalid UTF-8 rather than failing the caller.
pub fn percent_decode(raw: &str) -> String {
    match percent_decode_str(raw).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// Classifies a location string per §4.1 "Revision selection by location prefix".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationKind {
    ReferencedDirectory(String),
    ReferencedFile(String),
    InputStream,
    Remote(String),
}

pub fn classify_location(location: &str) -> LocationKind {
    if let Some(rest) = location.strip_prefix("reference:file:") {
        let path = percent_decode(rest);
        if std::path::Path::new(&path).is_dir() {
            LocationKind::ReferencedDirectory(path)
        } else {
            LocationKind::ReferencedFile(path)
        }
    } else if location.starts_with("inputstream:") {
        LocationKind::InputStream
    } else {
        LocationKind::Remote(location.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn percent_decode_handles_spaces_and_utf8() {
        assert_eq!(percent_decode("/tmp/my%20bundle"), "/tmp/my bundle");
        assert_eq!(percent_decode("caf%C3%A9"), "café");
    }

    #[test]
    fn classify_location_recognizes_inputstream() {
        assert_eq!(classify_location("inputstream:"), LocationKind::InputStream);
    }

    #[test]
    fn classify_location_recognizes_referenced_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let loc = format!("reference:file:{}", tmp.path().display());
        assert_eq!(classify_location(&loc), LocationKind::ReferencedFile(tmp.path().display().to_string()));
    }

    #[test]
    fn revision_dir_is_unique_per_refresh_count() {
        let root = PathBuf::from("/cache/1");
        assert_ne!(revision_dir(&root, 0, 0), revision_dir(&root, 1, 0));
    }
}
