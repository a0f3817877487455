// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The `Bundle` identity and its lifecycle/persistent state (§3 of the design).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a [`Bundle`]. Id `0` is reserved for the system bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BundleId(pub u64);

impl BundleId {
    /// The system bundle's id, always present and never uninstallable.
    pub const SYSTEM: BundleId = BundleId(0);

    pub fn is_system(self) -> bool {
        self == Self::SYSTEM
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for BundleId {
    fn from(id: u64) -> Self {
        BundleId(id)
    }
}

/// Lifecycle state machine: `Installed -> Resolved -> Starting -> Active -> Stopping
/// -> Resolved`, plus the terminal `Uninstalled`. Extension bundles skip
/// `Starting`/`Active` (invariant 7, see [`Bundle::is_extension`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
    Uninstalled,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Installed => "INSTALLED",
            LifecycleState::Resolved => "RESOLVED",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Uninstalled => "UNINSTALLED",
        };
        f.write_str(s)
    }
}

/// The remembered running intent, independent of transient [`LifecycleState`]
/// (invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistentState {
    Installed,
    Active,
    Uninstalled,
}

/// The identity a caller manipulates (§3). Mutable fields live behind
/// [`crate::info::BundleInfo`]; this struct is the immutable identity plus a
/// snapshot, returned from lookups.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub bundle_id: BundleId,
    pub location: String,
    pub symbolic_name: Option<String>,
    pub version: Option<String>,
    pub start_level: i32,
    pub is_extension: bool,
    pub state: LifecycleState,
    pub persistent_state: PersistentState,
    pub last_modified: DateTime<Utc>,
    /// Opaque handle consumed by a permission provider; never interpreted here.
    pub protection_domain: Option<String>,
}

impl Bundle {
    pub fn is_system(&self) -> bool {
        self.bundle_id.is_system()
    }

    /// Manifest-version-"2" uniqueness key (invariant 4). `None` when either field
    /// is absent (manifest version other than "2", or not yet parsed).
    pub fn identity_key(&self) -> Option<(&str, &str)> {
        match (&self.symbolic_name, &self.version) {
            (Some(name), Some(version)) => Some((name.as_str(), version.as_str())),
            _ => None,
        }
    }
}
