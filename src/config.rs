// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Layered YAML configuration (§6 "Config file surface"): a `Base::Vendor` search
//! path (read-only defaults) and a `Base::Admin` search path (operator overrides),
//! each checked for both a single `<domain>.conf` file and a `<domain>.conf.d/`
//! directory of fragments, merged through [`Config::merge`].

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const EXTENSION: &str = "conf";

pub trait Config: DeserializeOwned {
    fn domain() -> String;

    fn merge(self, other: Self) -> Self;
}

pub fn load<T: Config>(root: impl AsRef<Path>) -> Option<T> {
    let domain = T::domain();

    [
        (Base::Vendor, Search::File),
        (Base::Vendor, Search::Directory),
        (Base::Admin, Search::File),
        (Base::Admin, Search::Directory),
    ]
    .into_iter()
    .flat_map(|(base, search)| enumerate_paths(search, &root, base, &domain))
    .filter_map(read_config)
    .reduce(T::merge)
}

pub fn save<T: Config + Serialize>(root: impl AsRef<Path>, name: impl fmt::Display, config: &T) -> Result<(), SaveError> {
    let domain = T::domain();
    let dir = domain_dir(root, Base::Admin, &domain);

    fs::create_dir_all(&dir).map_err(|io| SaveError::CreateDir(dir.clone(), io))?;

    let path = dir.join(format!("{name}.{EXTENSION}"));
    let serialized = serde_yaml::to_string(config)?;
    fs::write(&path, serialized).map_err(|io| SaveError::Write(path, io))?;

    Ok(())
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("could not create config dir {0:?}: {1}")]
    CreateDir(PathBuf, io::Error),
    #[error("failed to serialize config as yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to write config file at {0:?}: {1}")]
    Write(PathBuf, io::Error),
}

fn enumerate_paths(search: Search, root: &impl AsRef<Path>, base: Base, domain: &str) -> Vec<PathBuf> {
    match search {
        Search::File => {
            let file = domain_file(root, base, domain);
            if file.exists() {
                vec![file]
            } else {
                vec![]
            }
        }
        Search::Directory => fs::read_dir(domain_dir(root, base, domain))
            .map(|read_dir| {
                read_dir
                    .flatten()
                    .filter_map(|entry| {
                        let path = entry.path();
                        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
                        (path.exists() && extension == EXTENSION).then_some(path)
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn domain_file(root: impl AsRef<Path>, base: Base, domain: &str) -> PathBuf {
    root.as_ref().join(base.path()).join("moduleframework").join(format!("{domain}.{EXTENSION}"))
}

fn domain_dir(root: impl AsRef<Path>, base: Base, domain: &str) -> PathBuf {
    root.as_ref()
        .join(base.path())
        .join("moduleframework")
        .join(format!("{domain}.{EXTENSION}.d"))
}

fn read_config<T: Config>(path: PathBuf) -> Option<T> {
    let file = File::open(path).ok()?;
    serde_yaml::from_reader(file).ok()
}

#[derive(Clone, Copy)]
enum Base {
    Admin,
    Vendor,
}

impl Base {
    fn path(&self) -> &'static str {
        match self {
            Base::Admin => "etc",
            Base::Vendor => "usr/share",
        }
    }
}

enum Search {
    File,
    Directory,
}

/// The §6 configuration-key table. Programmatic builder setters on
/// [`Framework`](crate::framework::Framework) always take precedence over
/// file-loaded values for the keys they touch; see [`FrameworkConfig::merge`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    pub system_bundle_activators: Vec<String>,
    pub log_logger: Option<String>,
    pub log_level: u8,
    pub startlevel_framework: i32,
    pub startlevel_bundle: i32,
    pub framework_service_urlhandlers: bool,
    pub cache_bufsize: usize,
    pub cache_dir: Option<PathBuf>,
    pub cache_profile: Option<String>,
    pub cache_profiledir: Option<PathBuf>,
    pub framework_storage_clean: StorageClean,
    pub framework_executionenvironment: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum StorageClean {
    #[default]
    None,
    OnFirstInit,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            system_bundle_activators: Vec::new(),
            log_logger: None,
            log_level: 2,
            startlevel_framework: 1,
            startlevel_bundle: 1,
            framework_service_urlhandlers: false,
            cache_bufsize: 4096,
            cache_dir: None,
            cache_profile: None,
            cache_profiledir: None,
            framework_storage_clean: StorageClean::None,
            framework_executionenvironment: Vec::new(),
        }
    }
}

impl Config for FrameworkConfig {
    fn domain() -> String {
        "framework".to_string()
    }

    /// Later (more specific) config wins per key; `self` is the earlier/less
    /// specific layer per the `Vendor`-then-`Admin` fold order in [`load`].
    fn merge(self, other: Self) -> Self {
        Self {
            system_bundle_activators: if other.system_bundle_activators.is_empty() {
                self.system_bundle_activators
            } else {
                other.system_bundle_activators
            },
            log_logger: other.log_logger.or(self.log_logger),
            log_level: other.log_level,
            startlevel_framework: other.startlevel_framework,
            startlevel_bundle: other.startlevel_bundle,
            framework_service_urlhandlers: other.framework_service_urlhandlers,
            cache_bufsize: other.cache_bufsize,
            cache_dir: other.cache_dir.or(self.cache_dir),
            cache_profile: other.cache_profile.or(self.cache_profile),
            cache_profiledir: other.cache_profiledir.or(self.cache_profiledir),
            framework_storage_clean: other.framework_storage_clean,
            framework_executionenvironment: if other.framework_executionenvironment.is_empty() {
                self.framework_executionenvironment
            } else {
                other.framework_executionenvironment
            },
        }
    }
}

impl FrameworkConfig {
    /// Loads layered config under `root`, falling back to defaults if no file is
    /// present at all.
    pub fn load_or_default(root: impl AsRef<Path>) -> Self {
        load(root).unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn merge_prefers_more_specific_layer() {
        let vendor = FrameworkConfig {
            log_level: 1,
            cache_bufsize: 1024,
            ..Default::default()
        };
        let admin = FrameworkConfig {
            cache_bufsize: 8192,
            ..Default::default()
        };

        let merged = vendor.merge(admin);
        assert_eq!(merged.cache_bufsize, 8192);
    }

    #[test]
    fn default_matches_documented_defaults() {
        let config = FrameworkConfig::default();
        assert_eq!(config.startlevel_framework, 1);
        assert_eq!(config.startlevel_bundle, 1);
        assert_eq!(config.cache_bufsize, 4096);
        assert_eq!(config.framework_storage_clean, StorageClean::None);
    }
}
