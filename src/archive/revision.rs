// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! One version of a bundle's content (§3 "Revision"): `Jar`, `ReferencedJar`,
//! `Directory`, `InputStream`. Each exposes manifest headers, a resource lookup
//! over its content, and any declared native libraries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::module::ModuleDefinition;
use crate::resolver::ManifestParser;

use super::layout;
use super::Error;

/// How a revision's content reached the cache. `ReferencedJar`/`Directory` point
/// at content outside the cache root (no copy); `Jar`/`InputStream` own a copy
/// under the revision directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionKind {
    Jar,
    ReferencedJar,
    Directory,
    InputStream,
}

/// One entry of a bundle's content history. `content_root` is the directory
/// resource/entry lookups and native library resolution are relative to: for
/// `Directory`/`ReferencedJar` this is the referenced external path; for
/// `Jar`/`InputStream` this is the revision directory's own `content/`.
#[derive(Debug, Clone)]
pub struct Revision {
    pub kind: RevisionKind,
    pub location: String,
    pub content_root: PathBuf,
    pub headers: HashMap<String, String>,
    pub definition: ModuleDefinition,
}

impl Revision {
    /// Builds a revision by classifying `location` (§4.1 "Revision selection by
    /// location prefix"), materializing content under `revision_dir` when the
    /// location requires a copy, and parsing the manifest found there.
    pub fn create(
        revision_dir: &Path,
        location: &str,
        content: Option<&[u8]>,
        manifest_parser: &dyn ManifestParser,
    ) -> Result<Self, Error> {
        let decoded_location = layout::percent_decode(location);

        let (kind, content_root) = match layout::classify_location(location) {
            layout::LocationKind::ReferencedDirectory(path) => (RevisionKind::Directory, PathBuf::from(path)),
            layout::LocationKind::ReferencedFile(path) => (RevisionKind::ReferencedJar, PathBuf::from(path)),
            layout::LocationKind::InputStream => {
                let content_root = layout::revision_content_dir(revision_dir);
                fs_err::create_dir_all(&content_root)?;
                let bytes = content.ok_or(Error::MissingContent)?;
                fs_err::write(content_root.join("bundle.jar"), bytes)?;
                // This crate has no jar/zip reader, so the manifest is the content
                // itself rather than an entry extracted from it (§4.1 "Revision
                // selection by location prefix").
                fs_err::write(content_root.join("MANIFEST"), bytes)?;
                (RevisionKind::InputStream, content_root)
            }
            layout::LocationKind::Remote(raw) => {
                // §4.1 "Revision selection by location prefix": anything that isn't a
                // `reference:`/`inputstream:` form is opened as a URL before being
                // copied in. This crate has no network stack, so "open" means
                // "accept the caller-supplied bytes for a location that at least
                // parses" rather than actually fetching it.
                let url = url::Url::parse(&raw).map_err(|err| Error::InvalidLocation(raw.clone(), err))?;
                log::debug!("treating location {url} as a remote jar, scheme {:?}", url.scheme());

                let content_root = layout::revision_content_dir(revision_dir);
                fs_err::create_dir_all(&content_root)?;
                let bytes = content.ok_or(Error::MissingContent)?;
                fs_err::write(content_root.join("bundle.jar"), bytes)?;
                fs_err::write(content_root.join("MANIFEST"), bytes)?;
                (RevisionKind::Jar, content_root)
            }
        };

        fs_err::create_dir_all(revision_dir)?;
        fs_err::write(layout::revision_location_file(revision_dir), &decoded_location)?;

        let manifest_path = content_root.join("MANIFEST");
        let manifest_text = fs_err::read_to_string(&manifest_path).unwrap_or_default();
        let parsed = manifest_parser.parse(&manifest_text);

        Ok(Self {
            kind,
            location: decoded_location,
            content_root,
            headers: parsed.headers,
            definition: parsed.definition,
        })
    }

    /// Reloads a previously-persisted revision from its directory without
    /// re-materializing content (used by [`super::Cache::get_archives`]).
    pub fn reload(revision_dir: &Path, manifest_parser: &dyn ManifestParser) -> Result<Self, Error> {
        let location = fs_err::read_to_string(layout::revision_location_file(revision_dir))?;
        let (kind, content_root) = match layout::classify_location(&location) {
            layout::LocationKind::ReferencedDirectory(path) => (RevisionKind::Directory, PathBuf::from(path)),
            layout::LocationKind::ReferencedFile(path) => (RevisionKind::ReferencedJar, PathBuf::from(path)),
            _ => (RevisionKind::Jar, layout::revision_content_dir(revision_dir)),
        };

        let manifest_path = content_root.join("MANIFEST");
        let manifest_text = fs_err::read_to_string(&manifest_path).unwrap_or_default();
        let parsed = manifest_parser.parse(&manifest_text);

        Ok(Self {
            kind,
            location,
            content_root,
            headers: parsed.headers,
            definition: parsed.definition,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Resolves a resource path within this revision's content, `None` if absent.
    pub fn resource(&self, relative: impl AsRef<Path>) -> Option<PathBuf> {
        let path = self.content_root.join(relative);
        path.exists().then_some(path)
    }

    /// Resolves one of the revision's declared native library entries (§4.4 step 6
    /// requires every declared entry to exist in the content).
    pub fn native_library(&self, name: &str) -> Option<PathBuf> {
        if !self.definition.native_libraries.iter().any(|lib| lib == name) {
            return None;
        }
        self.resource(name)
    }

    /// Verifies every declared native library entry exists in the content,
    /// per the install-time check in §4.4 step 6.
    pub fn verify_native_libraries(&self) -> Result<(), Error> {
        for lib in &self.definition.native_libraries {
            if self.resource(lib).is_none() {
                return Err(Error::MissingNativeLibrary(lib.clone()));
            }
        }
        Ok(())
    }

    /// Rebuilds this revision under a fresh `new_revision_dir`, giving it a unique
    /// absolute path (§4.1 "Rationale"). Referenced kinds (`Directory`,
    /// `ReferencedJar`) keep pointing at their external location unchanged; owned
    /// kinds (`Jar`, `InputStream`) have their content copied across, since the
    /// directory holding the original bytes is about to be removed by purge.
    pub fn relocate(&self, new_revision_dir: &Path, manifest_parser: &dyn ManifestParser) -> Result<Self, Error> {
        fs_err::create_dir_all(new_revision_dir)?;
        fs_err::write(layout::revision_location_file(new_revision_dir), &self.location)?;

        let content_root = match self.kind {
            RevisionKind::Directory | RevisionKind::ReferencedJar => self.content_root.clone(),
            RevisionKind::Jar | RevisionKind::InputStream => {
                let new_content_root = layout::revision_content_dir(new_revision_dir);
                copy_dir_all(&self.content_root, &new_content_root)?;
                new_content_root
            }
        };

        let manifest_text = fs_err::read_to_string(content_root.join("MANIFEST")).unwrap_or_default();
        let parsed = manifest_parser.parse(&manifest_text);

        Ok(Self {
            kind: self.kind,
            location: self.location.clone(),
            content_root,
            headers: parsed.headers,
            definition: parsed.definition,
        })
    }
}

fn copy_dir_all(from: &Path, to: &Path) -> Result<(), Error> {
    fs_err::create_dir_all(to)?;
    for entry in fs_err::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs_err::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolver::LineManifestParser;

    #[test]
    fn create_remote_revision_requires_a_parseable_url() {
        let tmp = tempfile::tempdir().unwrap();
        let revision_dir = tmp.path().join("version0.0");
        let parser = LineManifestParser;

        let revision = Revision::create(&revision_dir, "https://example.invalid/b1.jar", Some(b"jar bytes"), &parser).unwrap();
        assert_eq!(revision.kind, RevisionKind::Jar);

        let rejected = Revision::create(&tmp.path().join("version0.1"), "not a url at all", Some(b"jar bytes"), &parser);
        assert!(matches!(rejected, Err(Error::InvalidLocation(_, _))));
    }

    #[test]
    fn create_inputstream_revision_materializes_content() {
        let tmp = tempfile::tempdir().unwrap();
        let revision_dir = tmp.path().join("version0.0");
        let parser = LineManifestParser;

        let revision = Revision::create(&revision_dir, "inputstream:", Some(b"fake jar bytes"), &parser).unwrap();

        assert_eq!(revision.kind, RevisionKind::InputStream);
        assert!(revision.resource("bundle.jar").is_some());
    }

    #[test]
    fn create_referenced_directory_revision_does_not_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let content_dir = tmp.path().join("content");
        fs_err::create_dir_all(&content_dir).unwrap();
        fs_err::write(content_dir.join("MANIFEST"), "Bundle-SymbolicName: demo\n").unwrap();

        let revision_dir = tmp.path().join("version0.0");
        let parser = LineManifestParser;
        let location = format!("reference:file:{}", content_dir.display());

        let revision = Revision::create(&revision_dir, &location, None, &parser).unwrap();
        assert_eq!(revision.kind, RevisionKind::Directory);
        assert_eq!(revision.header("Bundle-SymbolicName"), Some("demo"));
    }

    #[test]
    fn verify_native_libraries_detects_missing_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let revision_dir = tmp.path().join("version0.0");
        let parser = LineManifestParser;
        let mut revision = Revision::create(&revision_dir, "inputstream:", Some(b"x"), &parser).unwrap();
        revision.definition.native_libraries.push("libfoo.so".into());

        assert!(matches!(revision.verify_native_libraries(), Err(Error::MissingNativeLibrary(_))));
    }

    #[test]
    fn relocate_copies_owned_content_to_new_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let revision_dir = tmp.path().join("version0.0");
        let parser = LineManifestParser;
        let revision = Revision::create(&revision_dir, "inputstream:", Some(b"jar bytes"), &parser).unwrap();

        let new_dir = tmp.path().join("version1.0");
        let relocated = revision.relocate(&new_dir, &parser).unwrap();

        assert_eq!(relocated.kind, RevisionKind::InputStream);
        assert!(relocated.resource("bundle.jar").is_some());
        assert_ne!(relocated.content_root, revision.content_root);
    }

    #[test]
    fn relocate_keeps_referenced_directory_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let content_dir = tmp.path().join("content");
        fs_err::create_dir_all(&content_dir).unwrap();
        fs_err::write(content_dir.join("MANIFEST"), "Bundle-SymbolicName: demo\n").unwrap();

        let revision_dir = tmp.path().join("version0.0");
        let parser = LineManifestParser;
        let location = format!("reference:file:{}", content_dir.display());
        let revision = Revision::create(&revision_dir, &location, None, &parser).unwrap();

        let new_dir = tmp.path().join("version1.0");
        let relocated = revision.relocate(&new_dir, &parser).unwrap();
        assert_eq!(relocated.content_root, content_dir);
    }
}
