// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Top-level façade (§2, §6 "Programmatic surface"): owns configuration, the
//! installed/uninstalled bundle registries, the lock manager, the event bus, the
//! module graph, and the start-level controller, and wires them together behind
//! the public API. Lifecycle operations live in [`crate::lifecycle`], refresh in
//! [`crate::refresh`], start-level bulk ops in [`crate::startlevel`] — all as
//! `impl Framework` blocks in those files, so this module stays the struct
//! definition and constructor.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use thiserror::Error as ThisError;

use crate::archive::{Archive, Cache};
use crate::bundle::{Bundle, BundleId, LifecycleState, PersistentState};
use crate::config::FrameworkConfig;
use crate::error::ErrorKind;
use crate::events::{BundleEventKind, EventBus, EventListener, FrameworkEvent, FrameworkEventKind};
use crate::info::BundleInfo;
use crate::installation::Installation;
use crate::lock::LockManager;
use crate::module::ModuleGraph;
use crate::resolver::Collaborators;
use crate::startlevel::StartLevelController;

/// Errors raised by the top-level façade itself, as opposed to a specific
/// bundle operation (§7).
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("framework is not active")]
    FrameworkNotActive,

    #[error("start level must be positive, got {0}")]
    InvalidStartLevel(i32),

    #[error(transparent)]
    Archive(#[from] crate::archive::Error),

    #[error(transparent)]
    Lifecycle(#[from] crate::lifecycle::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::FrameworkNotActive => ErrorKind::StateError,
            Error::InvalidStartLevel(_) => ErrorKind::ArgumentError,
            Error::Archive(_) => ErrorKind::BundleFailure,
            Error::Lifecycle(e) => e.kind(),
        }
    }
}

/// Backing record for one installed or uninstalled bundle: its mutable state plus
/// its persistent archive, locked independently so archive I/O never blocks a
/// concurrent `get_bundle` elsewhere.
pub(crate) struct BundleEntry {
    pub(crate) info: Mutex<BundleInfo>,
    pub(crate) archive: Mutex<Archive>,
}

/// The framework's own running state, modeled as the system bundle's lifecycle
/// (invariant 7: the system bundle is always present and drives `start`/`stop`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameworkState {
    Installed,
    Starting,
    Active,
    Stopping,
    Uninstalled,
}

pub struct Framework {
    pub(crate) config: FrameworkConfig,
    pub(crate) installation: Installation,
    pub(crate) cache: Cache,
    pub(crate) locks: LockManager,
    pub(crate) events: EventBus,
    pub(crate) collaborators: Collaborators,
    pub(crate) installed: Mutex<HashMap<BundleId, Arc<BundleEntry>>>,
    pub(crate) by_location: Mutex<HashMap<String, BundleId>>,
    pub(crate) uninstalled: Mutex<Vec<Arc<BundleEntry>>>,
    pub(crate) modules: Mutex<ModuleGraph>,
    pub(crate) framework_state: Mutex<FrameworkState>,
    pub(crate) framework_start_level: Mutex<i32>,
    pub(crate) startlevel: StartLevelController,
    pub(crate) stop_gate: Arc<(Mutex<bool>, Condvar)>,
}

impl Framework {
    /// Builds a framework over `cache_root`, with default collaborators
    /// ([`crate::resolver::Collaborators::default`]) unless the caller supplies
    /// its own. Does not start the framework — call [`Framework::init`] then
    /// [`Framework::start`].
    pub fn new(cache_root: impl Into<std::path::PathBuf>, config: FrameworkConfig) -> Result<Arc<Self>, Error> {
        Self::with_collaborators(cache_root, config, Collaborators::default())
    }

    pub fn with_collaborators(
        cache_root: impl Into<std::path::PathBuf>,
        config: FrameworkConfig,
        collaborators: Collaborators,
    ) -> Result<Arc<Self>, Error> {
        let installation = Installation::open(cache_root, &config);
        let cache = Cache::open(&installation.root)?;

        if config.framework_storage_clean == crate::config::StorageClean::OnFirstInit {
            log::info!("framework.storage.clean=onFirstInit: flushing cache at {:?}", installation.root);
            cache.flush()?;
        }

        let framework = Arc::new(Self {
            config: config.clone(),
            installation,
            cache,
            locks: LockManager::new(),
            events: EventBus::new(),
            collaborators,
            installed: Mutex::new(HashMap::new()),
            by_location: Mutex::new(HashMap::new()),
            uninstalled: Mutex::new(Vec::new()),
            modules: Mutex::new(ModuleGraph::new()),
            framework_state: Mutex::new(FrameworkState::Installed),
            framework_start_level: Mutex::new(config.startlevel_framework.max(1)),
            startlevel: StartLevelController::spawn(),
            stop_gate: Arc::new((Mutex::new(false), Condvar::new())),
        });

        framework.install_system_bundle()?;

        Ok(framework)
    }

    fn install_system_bundle(&self) -> Result<(), Error> {
        // "reference:file:" with a path that doesn't exist classifies as
        // `ReferencedFile`, which needs no content and never touches the
        // `Remote` branch's URL parsing (system bundle has no real jar).
        let location = "reference:file:/system-bundle";
        let mut info = BundleInfo::new(BundleId::SYSTEM, location.to_string(), 0);
        info.state = LifecycleState::Installed;
        let archive = self.cache.create(BundleId::SYSTEM, location, None, self.collaborators.manifest_parser.as_ref())?;

        let entry = Arc::new(BundleEntry {
            info: Mutex::new(info),
            archive: Mutex::new(archive),
        });
        self.installed.lock().expect("installed map mutex").insert(BundleId::SYSTEM, entry);
        self.by_location.lock().expect("location index mutex").insert(location.to_string(), BundleId::SYSTEM);
        Ok(())
    }

    pub fn register_listener(&self, listener: Arc<dyn EventListener>) {
        self.events.register(listener);
    }

    pub fn unregister_all_listeners(&self) {
        self.events.unregister_all();
    }

    /// Performs no work beyond validating the framework is in a state where
    /// `start` can proceed; present as its own call per §6's programmatic
    /// surface, separate from bundle installation which can happen before init.
    pub fn init(&self) -> Result<(), Error> {
        let mut state = self.framework_state.lock().expect("framework state mutex");
        if *state == FrameworkState::Uninstalled {
            return Err(Error::FrameworkNotActive);
        }
        *state = FrameworkState::Installed;
        Ok(())
    }

    pub fn get_bundle(&self, id: BundleId) -> Option<Bundle> {
        let installed = self.installed.lock().expect("installed map mutex");
        let entry = installed.get(&id)?;
        Some(self.snapshot(id, entry))
    }

    pub fn get_bundle_by_location(&self, location: &str) -> Option<Bundle> {
        let id = *self.by_location.lock().expect("location index mutex").get(location)?;
        self.get_bundle(id)
    }

    pub fn get_bundles(&self) -> Vec<Bundle> {
        let installed = self.installed.lock().expect("installed map mutex");
        installed.iter().map(|(id, entry)| self.snapshot(*id, entry)).collect()
    }

    pub(crate) fn snapshot(&self, id: BundleId, entry: &Arc<BundleEntry>) -> Bundle {
        let info = entry.info.lock().expect("bundle info mutex");
        let archive = entry.archive.lock().expect("bundle archive mutex");
        let current = archive.current_revision();
        Bundle {
            bundle_id: id,
            location: archive.original_location.clone(),
            symbolic_name: current.and_then(|r| r.header("Bundle-SymbolicName")).map(str::to_string),
            version: current.and_then(|r| r.header("Bundle-Version")).map(str::to_string),
            start_level: info.start_level,
            is_extension: info.is_extension,
            state: info.state,
            persistent_state: info.persistent_state,
            last_modified: info.last_modified,
            protection_domain: info.protection_domain.clone(),
        }
    }

    pub(crate) fn emit_bundle(&self, id: BundleId, kind: BundleEventKind) {
        self.events.emit_bundle(id, kind);
    }

    pub(crate) fn emit_framework(&self, event: FrameworkEvent) {
        self.events.emit_framework(event);
    }

    pub fn framework_start_level(&self) -> i32 {
        *self.framework_start_level.lock().expect("framework start level mutex")
    }

    /// Starts the framework: the system bundle transitions to `ACTIVE` and the
    /// start-level controller raises the framework to its configured level.
    pub fn start_framework(self: &Arc<Self>) -> Result<(), Error> {
        {
            let mut state = self.framework_state.lock().expect("framework state mutex");
            if *state == FrameworkState::Uninstalled {
                return Err(Error::FrameworkNotActive);
            }
            *state = FrameworkState::Active;
        }
        self.events.emit_framework(FrameworkEvent::simple(FrameworkEventKind::Started));
        let target = self.config.startlevel_framework.max(1);
        self.set_framework_start_level(target)
    }

    /// Stops the framework on the dedicated start-level worker so the calling
    /// thread returns immediately (§5 "Model"): lowers to start level 0, then
    /// opens the shutdown gate and emits `STOPPED`.
    pub fn stop_framework(self: &Arc<Self>) -> Result<(), Error> {
        {
            let mut state = self.framework_state.lock().expect("framework state mutex");
            if *state == FrameworkState::Uninstalled {
                return Err(Error::FrameworkNotActive);
            }
            *state = FrameworkState::Stopping;
        }

        let this = Arc::clone(self);
        std::thread::spawn(move || {
            let _ = this.set_start_level_and_wait(0);
            *this.framework_state.lock().expect("framework state mutex") = FrameworkState::Uninstalled;
            this.events.emit_framework(FrameworkEvent::simple(FrameworkEventKind::Stopped));
            let (lock, condvar) = &*this.stop_gate;
            *lock.lock().expect("stop gate mutex") = true;
            condvar.notify_all();
        });

        Ok(())
    }

    /// Blocks until [`Framework::stop`]'s worker opens the shutdown gate, or
    /// `timeout` elapses. Negative timeouts are structurally impossible: the
    /// typed `Duration` API has no negative value (§5 "Cancellation / timeouts").
    pub fn wait_for_stop(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.stop_gate;
        let guard = lock.lock().expect("stop gate mutex");
        if *guard {
            return true;
        }
        let (guard, _) = condvar.wait_timeout_while(guard, timeout, |stopped| !*stopped).expect("stop gate condvar");
        *guard
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn new_framework() -> (Arc<Framework>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let framework = Framework::new(tmp.path(), FrameworkConfig::default()).unwrap();
        (framework, tmp)
    }

    #[test]
    fn system_bundle_is_always_present() {
        let (framework, _tmp) = new_framework();
        let system = framework.get_bundle(BundleId::SYSTEM).unwrap();
        assert_eq!(system.bundle_id, BundleId::SYSTEM);
    }

    #[test]
    fn start_then_stop_reaches_stopped_event() {
        let (framework, _tmp) = new_framework();
        framework.init().unwrap();
        framework.start_framework().unwrap();
        framework.stop_framework().unwrap();
        assert!(framework.wait_for_stop(Duration::from_secs(5)));
    }
}
