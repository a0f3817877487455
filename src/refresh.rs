// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Refresh engine (§4.5): drops stale revisions of a bundle and restarts whatever
//! the dependency graph says must come down and back up with it.
//!
//! Lives as `impl Framework` blocks for the same reason [`crate::lifecycle`] does:
//! every step needs the module graph, the lock manager and the bundle registries
//! together, and `Framework` already owns all three.

use std::collections::HashSet;
use std::sync::Arc;

use itertools::Itertools;
use thiserror::Error as ThisError;

use crate::bundle::{BundleId, LifecycleState, PersistentState};
use crate::error::ErrorKind;
use crate::events::{BundleEventKind, FrameworkEvent, FrameworkEventKind};
use crate::framework::{BundleEntry, Framework};
use crate::module::ModuleId;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Refreshing an extension bundle, or the system bundle while an extension is
    /// still installed, cannot be done live — the embedder must restart the
    /// framework instead (§4.5 Open Question: resolved here as an explicit error
    /// rather than performing the restart on the caller's behalf).
    #[error("refresh of bundle {0} requires a framework restart (extension bundles cannot be refreshed live)")]
    RestartRequired(BundleId),

    #[error(transparent)]
    Lifecycle(#[from] crate::lifecycle::Error),

    #[error(transparent)]
    Archive(#[from] crate::archive::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RestartRequired(_) => ErrorKind::StateError,
            Error::Lifecycle(e) => e.kind(),
            Error::Archive(_) => ErrorKind::BundleFailure,
        }
    }
}

impl Framework {
    /// Refreshes packages (§6 "refresh_packages(targets)"): `None` refreshes every
    /// bundle with a pending revision plus every bundle awaiting garbage
    /// collection since its last uninstall. Delegates to [`Framework::refresh`].
    pub fn refresh_packages(self: &Arc<Self>, targets: Option<&[BundleId]>) -> Result<(), Error> {
        self.refresh(targets)
    }

    /// Drives the refresh sequence (§4.5 steps 1-8): compute the dependency
    /// closure, lock it atomically, reject if it requires a restart, forget
    /// closed-out uninstalled bundles, stop/purge-or-collect/rebuild/restart each
    /// remaining target, then release the locks and emit `PACKAGES_REFRESHED`.
    pub fn refresh(self: &Arc<Self>, targets: Option<&[BundleId]>) -> Result<(), Error> {
        let seeds = self.refresh_targets(targets);
        if seeds.is_empty() {
            return Ok(());
        }

        let closure = self.refresh_closure(&seeds);
        let _guard = self.locks.lock_many(&closure);

        self.check_restart_required(&closure)?;

        let (still_uninstalled, to_collect): (Vec<Arc<BundleEntry>>, Vec<Arc<BundleEntry>>) = {
            let mut uninstalled = self.uninstalled.lock().expect("uninstalled list mutex");
            let drained: Vec<Arc<BundleEntry>> = uninstalled.drain(..).collect();
            drained.into_iter().partition(|entry| {
                let id = entry.info.lock().expect("bundle info mutex").bundle_id;
                !closure.contains(&id)
            })
        };
        *self.uninstalled.lock().expect("uninstalled list mutex") = still_uninstalled;

        let collected_ids: HashSet<BundleId> = to_collect
            .iter()
            .map(|entry| entry.info.lock().expect("bundle info mutex").bundle_id)
            .collect();

        for entry in &to_collect {
            let id = entry.info.lock().expect("bundle info mutex").bundle_id;
            if let Err(err) = self.garbage_collect_one(id, entry) {
                self.emit_framework(FrameworkEvent::error(format!("refresh garbage collection of bundle {id} failed: {err}")));
            }
        }

        for id in &closure {
            if collected_ids.contains(id) {
                continue;
            }
            if let Err(err) = self.refresh_one(*id) {
                self.emit_framework(FrameworkEvent::error(format!("refresh of bundle {id} failed: {err}")));
            }
        }

        drop(_guard);
        self.emit_framework(FrameworkEvent::simple(FrameworkEventKind::PackagesRefreshed));
        Ok(())
    }

    /// Default target set when the caller passes `None`: every installed bundle
    /// with more than one revision, plus every bundle already uninstalled and
    /// awaiting collection (§4.5 step 1).
    fn refresh_targets(&self, targets: Option<&[BundleId]>) -> Vec<BundleId> {
        if let Some(explicit) = targets {
            return explicit.iter().copied().sorted_by_key(|id| id.0).dedup().collect();
        }

        let mut ids = Vec::new();
        {
            let installed = self.installed.lock().expect("installed map mutex");
            for (id, entry) in installed.iter() {
                let archive = entry.archive.lock().expect("bundle archive mutex");
                if archive.revision_count() > 1 {
                    ids.push(*id);
                }
            }
        }
        {
            let uninstalled = self.uninstalled.lock().expect("uninstalled list mutex");
            for entry in uninstalled.iter() {
                ids.push(entry.info.lock().expect("bundle info mutex").bundle_id);
            }
        }
        ids.into_iter().sorted_by_key(|id| id.0).dedup().collect()
    }

    /// Transitive dependency closure of `seeds` (§4.5 step 2): the set that must
    /// be stopped, purged and restarted together so no surviving module is left
    /// wired to a revision about to disappear.
    fn refresh_closure(&self, seeds: &[BundleId]) -> Vec<BundleId> {
        let seed_modules: Vec<ModuleId> = seeds
            .iter()
            .filter_map(|id| self.find_entry(*id))
            .flat_map(|entry| entry.info.lock().expect("bundle info mutex").modules().to_vec())
            .collect();

        let closure_modules = {
            let graph = self.modules.lock().expect("module graph mutex");
            graph.transitive_dependents(&seed_modules)
        };

        closure_modules
            .iter()
            .map(|module_id| module_id.bundle_id)
            .chain(seeds.iter().copied())
            .sorted_by_key(|id| id.0)
            .dedup()
            .collect()
    }

    /// Looks a bundle entry up in either registry: refresh closures routinely
    /// include bundles already moved from `installed` into `uninstalled`.
    pub(crate) fn find_entry(&self, id: BundleId) -> Option<Arc<BundleEntry>> {
        if let Some(entry) = self.installed.lock().expect("installed map mutex").get(&id).cloned() {
            return Some(entry);
        }
        self.uninstalled
            .lock()
            .expect("uninstalled list mutex")
            .iter()
            .find(|entry| entry.info.lock().expect("bundle info mutex").bundle_id == id)
            .cloned()
    }

    /// Refreshing an extension bundle, or the system bundle while an extension is
    /// still only `INSTALLED` (not yet woven into the system module), cannot be
    /// completed without a framework restart (§4.5 step 4).
    fn check_restart_required(&self, closure: &[BundleId]) -> Result<(), Error> {
        for id in closure {
            if let Some(entry) = self.find_entry(*id) {
                if entry.info.lock().expect("bundle info mutex").is_extension {
                    return Err(Error::RestartRequired(*id));
                }
            }
        }

        if closure.contains(&BundleId::SYSTEM) {
            let installed = self.installed.lock().expect("installed map mutex");
            let extension_pending = installed.values().any(|entry| {
                let info = entry.info.lock().expect("bundle info mutex");
                info.is_extension && info.state == LifecycleState::Installed
            });
            if extension_pending {
                return Err(Error::RestartRequired(BundleId::SYSTEM));
            }
        }

        Ok(())
    }

    /// Drops every module the bundle ever registered and removes its archive
    /// entirely (§4.5 step 6, uninstalled branch): there is no current revision
    /// left to rebuild.
    fn garbage_collect_one(&self, id: BundleId, entry: &Arc<BundleEntry>) -> Result<(), Error> {
        self.modules.lock().expect("module graph mutex").remove_bundle_modules(id);
        entry.archive.lock().expect("bundle archive mutex").delete()?;
        Ok(())
    }

    /// Stops the bundle if active, purges every revision but the newest, rebuilds
    /// that revision's module, and restarts the bundle if it was active before
    /// (§4.5 step 6, still-installed branch).
    fn refresh_one(self: &Arc<Self>, id: BundleId) -> Result<(), Error> {
        let Some(entry) = self.installed.lock().expect("installed map mutex").get(&id).cloned() else {
            return Ok(());
        };

        let prior_active = entry.info.lock().expect("bundle info mutex").state == LifecycleState::Active;
        if prior_active {
            self.stop(id, false)?;
        }

        self.modules.lock().expect("module graph mutex").remove_bundle_modules(id);
        {
            let mut archive = entry.archive.lock().expect("bundle archive mutex");
            archive.purge(self.collaborators.manifest_parser.as_ref())?;
        }
        entry.info.lock().expect("bundle info mutex").clear_modules();
        self.rebuild_module_for_current_revision(id, &entry)?;

        {
            let mut info = entry.info.lock().expect("bundle info mutex");
            info.state = LifecycleState::Installed;
            info.protection_domain = None;
            info.touch();
        }
        self.emit_bundle(id, BundleEventKind::Unresolved);

        let persistent_active = entry.info.lock().expect("bundle info mutex").persistent_state == PersistentState::Active;
        if prior_active || persistent_active {
            self.start(id, false)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::config::FrameworkConfig;
    use crate::framework::Framework;

    fn new_framework() -> (Arc<Framework>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let framework = Framework::new(tmp.path(), FrameworkConfig::default()).unwrap();
        (framework, tmp)
    }

    #[test]
    fn refresh_with_no_targets_is_a_no_op() {
        let (framework, _tmp) = new_framework();
        framework.refresh(None).unwrap();
    }

    #[test]
    fn refresh_drops_stale_revisions_and_keeps_one_module() {
        let (framework, _tmp) = new_framework();
        let bundle = framework.install("inputstream:", Some(b"Bundle-SymbolicName: b1\nBundle-Version: 1.0.0\n")).unwrap();
        framework.update(bundle.bundle_id, Some(b"Bundle-SymbolicName: b1\nBundle-Version: 1.1.0\n")).unwrap();

        framework.refresh(Some(&[bundle.bundle_id])).unwrap();

        let refreshed = framework.get_bundle(bundle.bundle_id).unwrap();
        assert_eq!(refreshed.version.as_deref(), Some("1.1.0"));
    }

    #[test]
    fn refresh_restarts_bundle_that_was_active() {
        let (framework, _tmp) = new_framework();
        let bundle = framework.install("inputstream:", Some(b"Bundle-SymbolicName: b1\nBundle-Version: 1.0.0\n")).unwrap();
        framework.start(bundle.bundle_id, true).unwrap();

        framework.refresh(Some(&[bundle.bundle_id])).unwrap();

        let refreshed = framework.get_bundle(bundle.bundle_id).unwrap();
        assert_eq!(refreshed.state, crate::bundle::LifecycleState::Active);
    }

    #[test]
    fn refresh_of_extension_bundle_requires_restart() {
        let (framework, _tmp) = new_framework();
        let bundle = framework
            .install("inputstream:", Some(b"Bundle-SymbolicName: ext\nBundle-Version: 1.0.0\nBundle-Extension: framework\n"))
            .unwrap();

        let result = framework.refresh(Some(&[bundle.bundle_id]));
        assert!(matches!(result, Err(Error::RestartRequired(_))));
    }
}
