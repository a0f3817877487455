// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Resolves the on-disk cache root for [`crate::archive`] from the `cache.dir` /
//! `cache.profile` / `cache.profiledir` configuration keys (§6 "Files"), and
//! determines whether it is writable.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::trace;

use crate::config::FrameworkConfig;

/// Whether the resolved cache root can be written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    ReadOnly,
    ReadWrite,
}

impl fmt::Display for Mutability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutability::ReadOnly => "read-only".fmt(f),
            Mutability::ReadWrite => "read-write".fmt(f),
        }
    }
}

/// The resolved filesystem layout a [`crate::archive::Cache`] is opened against.
#[derive(Debug, Clone)]
pub struct Installation {
    pub root: PathBuf,
    pub mutability: Mutability,
}

impl Installation {
    /// Resolves `config`'s `cache.dir`/`cache.profile`/`cache.profiledir` keys
    /// against `default_root` and probes writability.
    pub fn open(default_root: impl Into<PathBuf>, config: &FrameworkConfig) -> Self {
        let base = config.cache_dir.clone().unwrap_or_else(|| default_root.into());

        let root = if let Some(profiledir) = &config.cache_profiledir {
            profiledir.clone()
        } else if let Some(profile) = &config.cache_profile {
            base.join(profile)
        } else {
            base
        };

        let mutability = probe_writable(&root);
        trace!("cache root: {root:?} ({mutability})");

        if matches!(mutability, Mutability::ReadWrite) {
            ensure_dirs_exist(&root);
        }

        Self { root, mutability }
    }

    pub fn read_only(&self) -> bool {
        matches!(self.mutability, Mutability::ReadOnly)
    }
}

fn probe_writable(root: &Path) -> Mutability {
    if fs::create_dir_all(root).is_err() {
        return Mutability::ReadOnly;
    }

    let probe = root.join(".writable-probe");
    match fs::write(&probe, []) {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            Mutability::ReadWrite
        }
        Err(_) => Mutability::ReadOnly,
    }
}

fn ensure_dirs_exist(root: &Path) {
    let _ = fs::create_dir_all(root.join("data"));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn open_resolves_profiledir_over_profile_over_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = FrameworkConfig::default();
        config.cache_dir = Some(tmp.path().join("cache"));
        config.cache_profile = Some("p1".into());

        let installation = Installation::open(tmp.path().join("default"), &config);
        assert_eq!(installation.root, tmp.path().join("cache").join("p1"));
        assert_eq!(installation.mutability, Mutability::ReadWrite);
    }

    #[test]
    fn open_creates_data_dir_when_writable() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = FrameworkConfig::default();
        config.cache_dir = Some(tmp.path().to_path_buf());

        let installation = Installation::open(tmp.path(), &config);
        assert!(installation.root.join("data").exists());
    }
}
