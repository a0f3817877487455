// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Install/resolve/start/stop/update/uninstall state machine (§4.4).
//!
//! Lives as `impl Framework` blocks rather than its own type: every operation
//! needs the lock manager, the bundle registries, the module graph and the
//! collaborators all at once, and `Framework` already owns all of them. Splitting
//! that into a separate `LifecycleEngine` struct would just mean passing
//! `&Framework` back in through every method; this module is that engine, kept
//! next to the facade it extends.

use std::sync::Arc;

use thiserror::Error as ThisError;

use crate::activator::{ActivatorError, BundleContext, NoopActivator};
use crate::archive::Archive;
use crate::bundle::{Bundle, BundleId, LifecycleState, PersistentState};
use crate::error::ErrorKind;
use crate::events::{BundleEventKind, FrameworkEvent};
use crate::framework::{BundleEntry, Framework};
use crate::info::BundleInfo;
use crate::module::{DependencyKind, Module, ModuleId};

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("bundle {0}: invalid lifecycle transition from {1} via {2}")]
    InvalidTransition(BundleId, LifecycleState, &'static str),

    #[error("bundle {0}: start level {1} exceeds framework start level {2}")]
    StartLevelExceeded(BundleId, i32, i32),

    #[error("bundle {0}: activator start failed")]
    ActivatorStart(BundleId, #[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("bundle {0}: activator stop failed")]
    ActivatorStop(BundleId, #[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("bundle {0}: resolve failed: {1}")]
    ResolveFailed(BundleId, String),

    #[error("symbolic name and version are not unique: {0} {1}")]
    NotUnique(String, String),

    #[error("no execution environment in {0:?} matches framework-provided environments")]
    ExecutionEnvironmentMismatch(Vec<String>),

    #[error("bundle {0} is uninstalled")]
    Uninstalled(BundleId),

    #[error("bundle {0} is already starting or stopping")]
    ConcurrentLifecycle(BundleId),

    #[error("bundle not found: {0}")]
    NotFound(BundleId),

    #[error("no bundle installed at location {0:?}")]
    NoSuchLocation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error(transparent)]
    Archive(#[from] crate::archive::Error),

    #[error(transparent)]
    Lock(#[from] crate::lock::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidTransition(..)
            | Error::StartLevelExceeded(..)
            | Error::ActivatorStart(..)
            | Error::ActivatorStop(..)
            | Error::ResolveFailed(..)
            | Error::NotUnique(..)
            | Error::ExecutionEnvironmentMismatch(..)
            | Error::Archive(_) => ErrorKind::BundleFailure,

            Error::Uninstalled(_) | Error::ConcurrentLifecycle(_) | Error::NotFound(_) | Error::NoSuchLocation(_) => {
                ErrorKind::StateError
            }

            Error::PermissionDenied(_) => ErrorKind::SecurityError,

            Error::Lock(_) => ErrorKind::InternalError,
        }
    }
}

impl Framework {
    /// Installs a bundle from `location`, materializing `content` into the cache
    /// when the location requires a copy (§4.4 "Install").
    pub fn install(self: &Arc<Self>, location: &str, content: Option<&[u8]>) -> Result<Bundle, Error> {
        let _install_guard = self.locks.lock_install(location);

        if *self.framework_state.lock().expect("framework state mutex") == crate::framework::FrameworkState::Uninstalled {
            return Err(Error::NotFound(BundleId::SYSTEM));
        }

        if let Some(existing) = self.get_bundle_by_location(location) {
            return Ok(existing);
        }

        let id = self.cache.next_id()?;
        let result = self.install_with_id(id, location, content);
        if let Err(err) = &result {
            log::warn!("install {location:?} failed, rolling back cached archive for {id}: {err}");
            if let Ok(archive) = self.cache.get(id, self.collaborators.manifest_parser.as_ref()) {
                let _ = self.cache.remove(archive);
            }
        }
        result
    }

    /// Shared by fresh installs and cache-reload-on-restart (which supplies the
    /// already-persisted id instead of allocating a new one).
    pub(crate) fn install_with_id(self: &Arc<Self>, id: BundleId, location: &str, content: Option<&[u8]>) -> Result<Bundle, Error> {
        let archive = self.cache.create(id, location, content, self.collaborators.manifest_parser.as_ref())?;
        self.finish_install(id, archive)
    }

    fn finish_install(self: &Arc<Self>, id: BundleId, archive: Archive) -> Result<Bundle, Error> {
        let revision_index = archive.revision_count() - 1;
        let revision = archive.current_revision().expect("just-created archive has a revision");

        self.check_identity_unique(
            id,
            revision.header("Bundle-SymbolicName"),
            revision.header("Bundle-Version"),
            revision.header("Bundle-ManifestVersion"),
        )?;
        self.check_execution_environment(revision.definition.required_execution_environment.as_deref())?;
        revision.verify_native_libraries()?;

        let module_id = ModuleId { bundle_id: id, revision_index };
        let module = Module::new(module_id, revision.definition.clone());
        let is_extension = revision.header("Bundle-Extension").is_some();

        {
            let mut graph = self.modules.lock().expect("module graph mutex");
            graph.add_module(module);
        }

        let mut info = BundleInfo::new(id, archive.original_location.clone(), archive.start_level);
        info.is_extension = is_extension;
        info.add_module(module_id);

        let entry = Arc::new(BundleEntry {
            info: std::sync::Mutex::new(info),
            archive: std::sync::Mutex::new(archive),
        });

        self.installed.lock().expect("installed map mutex").insert(id, entry.clone());
        self.by_location.lock().expect("location index mutex").insert(entry.archive.lock().expect("archive mutex").original_location.clone(), id);

        if is_extension {
            self.attach_extension_module(module_id);
            self.refresh_system_module();
        }

        self.emit_bundle(id, BundleEventKind::Installed);
        Ok(self.snapshot(id, &entry))
    }

    /// Enforces `(symbolic_name, version)` uniqueness, but only for manifests
    /// declaring `Bundle-ManifestVersion: 2` (invariant 4, Scenario 1) — a
    /// manifest with no such header, or one declaring "1", predates the
    /// constraint and may collide freely.
    pub(crate) fn check_identity_unique(
        &self,
        id: BundleId,
        symbolic_name: Option<&str>,
        version: Option<&str>,
        manifest_version: Option<&str>,
    ) -> Result<(), Error> {
        if manifest_version != Some("2") {
            return Ok(());
        }
        let (Some(name), Some(version)) = (symbolic_name, version) else {
            return Ok(());
        };

        let installed = self.installed.lock().expect("installed map mutex");
        for (other_id, entry) in installed.iter() {
            if *other_id == id {
                continue;
            }
            let archive = entry.archive.lock().expect("bundle archive mutex");
            let Some(current) = archive.current_revision() else {
                continue;
            };
            if current.header("Bundle-SymbolicName") == Some(name) && current.header("Bundle-Version") == Some(version) {
                return Err(Error::NotUnique(name.to_string(), version.to_string()));
            }
        }
        Ok(())
    }

    /// Verifies at least one comma-separated entry of `required` matches the
    /// framework's configured provided environments (§4.4 step 6). Absent header
    /// means no constraint.
    pub(crate) fn check_execution_environment(&self, required: Option<&str>) -> Result<(), Error> {
        let Some(required) = required else {
            return Ok(());
        };
        if self.config.framework_executionenvironment.is_empty() {
            return Ok(());
        }
        let wanted: Vec<&str> = required.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
        let satisfied = wanted.iter().any(|env| self.config.framework_executionenvironment.iter().any(|provided| provided == env));
        if satisfied {
            Ok(())
        } else {
            Err(Error::ExecutionEnvironmentMismatch(wanted.into_iter().map(String::from).collect()))
        }
    }

    pub(crate) fn attach_extension_module(&self, module_id: ModuleId) {
        let mut graph = self.modules.lock().expect("module graph mutex");
        let system_module = graph.get(ModuleId { bundle_id: BundleId::SYSTEM, revision_index: 0 }).map(|m| m.id);
        if let Some(system_module) = system_module {
            graph.add_dependency(system_module, module_id, DependencyKind::Requirer);
        }
    }

    fn refresh_system_module(self: &Arc<Self>) {
        if let Err(err) = self.refresh(Some(&[BundleId::SYSTEM])) {
            log::warn!("refresh of system module after extension attach failed: {err}");
        }
    }

    /// Resolves `id` via the external [`crate::resolver::Resolver`] (§4.4
    /// "Resolve"). Skipped for extension bundles. Permission check and execution
    /// environment are re-verified at resolve time per §4.4.
    pub fn resolve_bundle(self: &Arc<Self>, id: BundleId) -> Result<bool, Error> {
        let entry = self.entry(id)?;
        let _guard = self.locks.lock_bundle(id);

        let current_module = {
            let info = entry.info.lock().expect("bundle info mutex");
            if info.is_extension {
                return Ok(true);
            }
            let Some(current_module) = info.current_module() else {
                return Ok(false);
            };
            current_module
        };

        let exported = self
            .modules
            .lock()
            .expect("module graph mutex")
            .get(current_module)
            .map(|m| m.definition.exported_packages.clone())
            .unwrap_or_default();
        for package in &exported {
            self.collaborators
                .permissions
                .check_export(id, package)
                .map_err(Error::PermissionDenied)?;
        }

        let universe: Vec<Module> = self.modules.lock().expect("module graph mutex").all();
        let resolved = self.collaborators.resolver.resolve(&[current_module], &universe);
        let did_resolve = resolved.contains(&current_module);
        if did_resolve {
            self.wire_dependencies(current_module, &universe);
            self.on_module_resolved(current_module);
        }
        Ok(did_resolve)
    }

    /// Adds dependency edges from `module_id` to whichever modules in `universe`
    /// satisfy its imports/requires, so the module graph's dependents lists
    /// (§3 invariant 2, §4.5 closure computation) reflect the actual wiring the
    /// resolver just performed — including pinning an older revision of another
    /// bundle alive if that is what currently exports a needed package.
    fn wire_dependencies(&self, module_id: ModuleId, universe: &[Module]) {
        let mut graph = self.modules.lock().expect("module graph mutex");
        let Some(module) = graph.get(module_id).cloned() else {
            return;
        };

        for package in &module.definition.imported_packages {
            if let Some(exporter) = universe.iter().find(|m| m.id != module_id && m.definition.exported_packages.iter().any(|p| p == package)) {
                graph.add_dependency(module_id, exporter.id, DependencyKind::Importer);
            }
        }
        for required in &module.definition.required_bundles {
            if let Some(bundle_id) = required.parse::<u64>().ok().map(BundleId) {
                if let Some(target) = universe.iter().find(|m| m.id.bundle_id == bundle_id) {
                    graph.add_dependency(module_id, target.id, DependencyKind::Requirer);
                }
            }
        }
    }

    /// Resolver listener (§4.4 "Resolver listener"): updates state to `RESOLVED`
    /// and emits the event only if the wired module is the bundle's *current*
    /// module and its state is still `INSTALLED`; mismatches are logged, not
    /// treated as an error, since an older-revision resolve is expected once a
    /// bundle has already moved past `INSTALLED`.
    pub(crate) fn on_module_resolved(&self, module_id: ModuleId) {
        let Some(entry) = self.installed.lock().expect("installed map mutex").get(&module_id.bundle_id).cloned() else {
            return;
        };

        let mut info = entry.info.lock().expect("bundle info mutex");
        if info.current_module() != Some(module_id) {
            log::debug!("resolver wired an older revision of bundle {}; ignoring for state transition", module_id.bundle_id);
            return;
        }
        if info.state != LifecycleState::Installed {
            log::debug!("bundle {} resolved again while in state {:?}; ignoring", module_id.bundle_id, info.state);
            return;
        }

        self.modules.lock().expect("module graph mutex").mark_resolved(module_id);
        info.state = LifecycleState::Resolved;
        drop(info);
        self.emit_bundle(module_id.bundle_id, BundleEventKind::Resolved);
    }

    /// Starts a bundle (§4.4 "Start"). `record` persists the start as the
    /// bundle's remembered running intent; transient starts driven by the
    /// start-level controller pass `record = false`.
    pub fn start(self: &Arc<Self>, id: BundleId, record: bool) -> Result<(), Error> {
        let entry = self.entry(id)?;
        let _guard = self.locks.lock_bundle(id);

        {
            let mut info = entry.info.lock().expect("bundle info mutex");
            if info.is_extension {
                return Ok(());
            }
            if record {
                info.persistent_state = PersistentState::Active;
            }
            match info.state {
                LifecycleState::Uninstalled => return Err(Error::Uninstalled(id)),
                LifecycleState::Starting | LifecycleState::Stopping => return Err(Error::ConcurrentLifecycle(id)),
                LifecycleState::Active => return Ok(()),
                _ => {}
            }

            let framework_level = self.framework_start_level();
            if info.start_level > framework_level {
                if record {
                    return Ok(());
                }
                return Err(Error::StartLevelExceeded(id, info.start_level, framework_level));
            }
        }

        if matches!(entry.info.lock().expect("bundle info mutex").state, LifecycleState::Installed) {
            self.resolve_bundle(id)?;
        }

        {
            let info = entry.info.lock().expect("bundle info mutex");
            if info.state != LifecycleState::Resolved {
                return Err(Error::InvalidTransition(id, info.state, "start"));
            }
        }

        entry.info.lock().expect("bundle info mutex").state = LifecycleState::Starting;
        self.emit_bundle(id, BundleEventKind::Starting);

        let activator_class = {
            let archive = entry.archive.lock().expect("bundle archive mutex");
            archive.current_revision().and_then(|r| r.header("Bundle-Activator")).map(str::to_string)
        };
        let mut activator = activator_class
            .as_deref()
            .and_then(|class_name| self.collaborators.activator_factory.create(class_name))
            .unwrap_or_else(|| Box::new(NoopActivator));

        let mut context = BundleContext::new(id, self.collaborators.service_registry.clone());
        let start_result = activator.start(&mut context);

        match start_result {
            Ok(()) => {
                let mut info = entry.info.lock().expect("bundle info mutex");
                info.set_activator(activator);
                info.state = LifecycleState::Active;
                drop(info);
                self.emit_bundle(id, BundleEventKind::Started);
                Ok(())
            }
            Err(ActivatorError(source)) => {
                let mut info = entry.info.lock().expect("bundle info mutex");
                info.state = LifecycleState::Resolved;
                drop(info);
                self.collaborators.service_registry.unregister_all(id);
                Err(Error::ActivatorStart(id, source))
            }
        }
    }

    /// Stops a bundle (§4.4 "Stop"). Cleanup (services, listeners) runs
    /// regardless of the activator's own outcome; a failing `stop` is recorded
    /// and rethrown only after cleanup completes.
    pub fn stop(self: &Arc<Self>, id: BundleId, record: bool) -> Result<(), Error> {
        let entry = self.entry(id)?;
        let _guard = self.locks.lock_bundle(id);

        {
            let mut info = entry.info.lock().expect("bundle info mutex");
            if info.is_extension {
                return Ok(());
            }
            match info.state {
                LifecycleState::Uninstalled => return Err(Error::Uninstalled(id)),
                LifecycleState::Starting | LifecycleState::Stopping => return Err(Error::ConcurrentLifecycle(id)),
                LifecycleState::Active => {}
                _ => {
                    if record {
                        info.persistent_state = PersistentState::Installed;
                    }
                    return Ok(());
                }
            }
            info.state = LifecycleState::Stopping;
        }
        self.emit_bundle(id, BundleEventKind::Stopping);

        let activator = entry.info.lock().expect("bundle info mutex").take_activator();
        let mut context = BundleContext::new(id, self.collaborators.service_registry.clone());

        let stop_result = activator.map(|mut a| a.stop(&mut context)).unwrap_or(Ok(()));

        self.collaborators.service_registry.unregister_all(id);

        let mut info = entry.info.lock().expect("bundle info mutex");
        info.state = LifecycleState::Resolved;
        if record {
            info.persistent_state = PersistentState::Installed;
        }
        drop(info);
        self.emit_bundle(id, BundleEventKind::Stopped);

        match stop_result {
            Ok(()) => Ok(()),
            Err(ActivatorError(source)) => Err(Error::ActivatorStop(id, source)),
        }
    }

    /// Appends a new revision and rebuilds its module (§4.4 "Update"). Restarts
    /// the bundle afterward if it was `ACTIVE` beforehand; refreshes immediately
    /// if no other live module depends on any revision of this bundle.
    pub fn update(self: &Arc<Self>, id: BundleId, content: Option<&[u8]>) -> Result<(), Error> {
        let entry = self.entry(id)?;
        let _guard = self.locks.lock_bundle(id);

        let prior_state = entry.info.lock().expect("bundle info mutex").state;
        if prior_state == LifecycleState::Active {
            self.stop(id, false)?;
        }

        let update_location = {
            let archive = entry.archive.lock().expect("bundle archive mutex");
            archive
                .current_revision()
                .and_then(|r| r.header("Bundle-UpdateLocation"))
                .map(str::to_string)
                .unwrap_or_else(|| archive.original_location.clone())
        };

        let revise_result = {
            let mut archive = entry.archive.lock().expect("bundle archive mutex");
            archive.revise(&update_location, content, self.collaborators.manifest_parser.as_ref())
        };

        if let Err(err) = revise_result {
            {
                let mut archive = entry.archive.lock().expect("bundle archive mutex");
                let _ = archive.rollback_revise();
            }
            if prior_state == LifecycleState::Active {
                if let Err(restart_err) = self.start(id, false) {
                    log::warn!("failed to restart bundle {id} after a rejected update: {restart_err}");
                }
            }
            return Err(Error::Archive(err));
        }

        let build_result = self.rebuild_module_for_current_revision(id, &entry);
        if let Err(err) = build_result {
            {
                let mut archive = entry.archive.lock().expect("bundle archive mutex");
                let _ = archive.rollback_revise();
            }
            if prior_state == LifecycleState::Active {
                if let Err(restart_err) = self.start(id, false) {
                    log::warn!("failed to restart bundle {id} after a rejected update: {restart_err}");
                }
            }
            return Err(err);
        }

        {
            let mut info = entry.info.lock().expect("bundle info mutex");
            info.touch();
            info.state = LifecycleState::Installed;
            info.removal_pending = true;
        }

        self.emit_bundle(id, BundleEventKind::Unresolved);
        self.emit_bundle(id, BundleEventKind::Updated);

        if !self.has_live_dependents(id) {
            if let Err(err) = self.refresh(Some(&[id])) {
                log::warn!("immediate post-update refresh of bundle {id} failed: {err}");
            }
        }

        if prior_state == LifecycleState::Active {
            self.start(id, false)?;
        }

        Ok(())
    }

    pub(crate) fn rebuild_module_for_current_revision(&self, id: BundleId, entry: &Arc<BundleEntry>) -> Result<(), Error> {
        let archive = entry.archive.lock().expect("bundle archive mutex");
        let revision_index = archive.revision_count() - 1;
        let revision = archive.current_revision().expect("just-revised archive has a revision");

        self.check_identity_unique(
            id,
            revision.header("Bundle-SymbolicName"),
            revision.header("Bundle-Version"),
            revision.header("Bundle-ManifestVersion"),
        )?;
        self.check_execution_environment(revision.definition.required_execution_environment.as_deref())?;
        revision.verify_native_libraries()?;

        let module_id = ModuleId { bundle_id: id, revision_index };
        let module = Module::new(module_id, revision.definition.clone());
        let is_extension = revision.header("Bundle-Extension").is_some();
        drop(archive);

        self.modules.lock().expect("module graph mutex").add_module(module);

        let mut info = entry.info.lock().expect("bundle info mutex");
        info.is_extension = is_extension;
        info.add_module(module_id);
        drop(info);

        if is_extension {
            self.attach_extension_module(module_id);
        }
        Ok(())
    }

    /// True if any module outside `id`'s own revisions still depends on one of
    /// them (§4.4 "Update"/"Uninstall" immediate-refresh gate).
    pub(crate) fn has_live_dependents(&self, id: BundleId) -> bool {
        let info = match self.installed.lock().expect("installed map mutex").get(&id) {
            Some(entry) => entry.info.lock().expect("bundle info mutex").modules().to_vec(),
            None => return false,
        };
        let graph = self.modules.lock().expect("module graph mutex");
        info.iter().any(|module_id| graph.dependents_of(*module_id).iter().any(|dep| dep.bundle_id != id))
    }

    /// Uninstalls a bundle (§4.4 "Uninstall"). Extension bundles are marked
    /// persistent-uninstalled but keep their lifecycle state until a framework
    /// restart, since pulling their module out live would destabilize the
    /// system module's exports.
    pub fn uninstall(self: &Arc<Self>, id: BundleId) -> Result<(), Error> {
        let entry = self.entry(id)?;
        let _guard = self.locks.lock_bundle(id);

        {
            let mut info = entry.info.lock().expect("bundle info mutex");
            if info.state == LifecycleState::Uninstalled {
                return Err(Error::Uninstalled(id));
            }
            if info.is_extension {
                info.persistent_state = PersistentState::Uninstalled;
                return Ok(());
            }
        }

        if let Err(err) = self.stop(id, true) {
            self.emit_framework(FrameworkEvent::error(format!("bundle {id}: stop during uninstall failed: {err}")));
        }

        self.installed.lock().expect("installed map mutex").remove(&id);
        self.by_location.lock().expect("location index mutex").retain(|_, v| *v != id);

        {
            let mut info = entry.info.lock().expect("bundle info mutex");
            info.persistent_state = PersistentState::Uninstalled;
            info.removal_pending = true;
            info.stale = true;
            info.state = LifecycleState::Uninstalled;
            info.touch();
        }

        self.uninstalled.lock().expect("uninstalled list mutex").push(entry.clone());
        self.emit_bundle(id, BundleEventKind::Uninstalled);

        if !self.has_live_dependents(id) {
            if let Err(err) = self.refresh(Some(&[id])) {
                log::warn!("immediate post-uninstall refresh of bundle {id} failed: {err}");
            }
        }

        Ok(())
    }

    pub(crate) fn entry(&self, id: BundleId) -> Result<Arc<BundleEntry>, Error> {
        self.installed.lock().expect("installed map mutex").get(&id).cloned().ok_or(Error::NotFound(id))
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
    fn install_assigns_monotonic_ids() {
        let (framework, _tmp) = new_framework();
        let b1 = framework.install("inputstream:a", Some(b"Bundle-SymbolicName: b1\nBundle-Version: 1.0.0\n")).unwrap();
        let b2 = framework.install("inputstream:b", Some(b"Bundle-SymbolicName: b2\nBundle-Version: 1.0.0\n")).unwrap();
        assert!(b2.bundle_id.0 > b1.bundle_id.0);
    }

    #[test]
    fn install_same_location_twice_returns_existing_bundle() {
        let (framework, _tmp) = new_framework();
        let first = framework.install("reference:file:/tmp/does-not-matter", None);
        // ReferencedFile with missing path still creates a revision (no content copy
        // required), so this should succeed and be idempotent by location.
        if let Ok(first) = first {
            let second = framework.install("reference:file:/tmp/does-not-matter", None).unwrap();
            assert_eq!(first.bundle_id, second.bundle_id);
        }
    }

    #[test]
    fn duplicate_symbolic_name_and_version_is_rejected() {
        let (framework, _tmp) = new_framework();
        let manifest = b"Bundle-SymbolicName: demo\nBundle-Version: 1.0.0\nBundle-ManifestVersion: 2\n";
        framework.install("inputstream:", Some(manifest)).unwrap();
        let second = framework.install("inputstream:a", Some(manifest));
        assert!(second.is_err());
    }

    #[test]
    fn duplicate_symbolic_name_and_version_is_allowed_without_manifest_version_two() {
        let (framework, _tmp) = new_framework();
        let manifest = b"Bundle-SymbolicName: demo\nBundle-Version: 1.0.0\n";
        framework.install("inputstream:", Some(manifest)).unwrap();
        let second = framework.install("inputstream:a", Some(manifest));
        assert!(second.is_ok());
    }

    #[test]
    fn start_resolves_installed_bundle_then_activates() {
        let (framework, _tmp) = new_framework();
        let bundle = framework.install("inputstream:", Some(b"Bundle-SymbolicName: b1\nBundle-Version: 1.0.0\n")).unwrap();
        framework.start(bundle.bundle_id, true).unwrap();
        let refreshed = framework.get_bundle(bundle.bundle_id).unwrap();
        assert_eq!(refreshed.state, crate::bundle::LifecycleState::Active);
        assert_eq!(refreshed.persistent_state, crate::bundle::PersistentState::Active);
    }

    #[test]
    fn stop_returns_bundle_to_resolved() {
        let (framework, _tmp) = new_framework();
        let bundle = framework.install("inputstream:", Some(b"Bundle-SymbolicName: b1\nBundle-Version: 1.0.0\n")).unwrap();
        framework.start(bundle.bundle_id, true).unwrap();
        framework.stop(bundle.bundle_id, true).unwrap();
        let refreshed = framework.get_bundle(bundle.bundle_id).unwrap();
        assert_eq!(refreshed.state, crate::bundle::LifecycleState::Resolved);
        assert_eq!(refreshed.persistent_state, crate::bundle::PersistentState::Installed);
    }

    #[test]
    fn uninstall_then_refresh_removes_archive() {
        let (framework, _tmp) = new_framework();
        let bundle = framework.install("inputstream:", Some(b"Bundle-SymbolicName: b1\nBundle-Version: 1.0.0\n")).unwrap();
        framework.uninstall(bundle.bundle_id).unwrap();
        assert!(framework.get_bundle(bundle.bundle_id).is_none());
    }

    #[test]
    fn update_appends_revision_and_preserves_active_state() {
        let (framework, _tmp) = new_framework();
        let bundle = framework.install("inputstream:", Some(b"Bundle-SymbolicName: b1\nBundle-Version: 1.0.0\n")).unwrap();
        framework.start(bundle.bundle_id, true).unwrap();
        framework.update(bundle.bundle_id, Some(b"Bundle-SymbolicName: b1\nBundle-Version: 1.1.0\n")).unwrap();
        let refreshed = framework.get_bundle(bundle.bundle_id).unwrap();
        assert_eq!(refreshed.version.as_deref(), Some("1.1.0"));
        assert_eq!(refreshed.state, crate::bundle::LifecycleState::Active);
    }
}
