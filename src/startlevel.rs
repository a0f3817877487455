// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Start-level controller (§4.6): walks the installed bundles up or down to a
//! target framework start level, starting/stopping each as its own start level
//! crosses the target.
//!
//! Per §5/§9 this crate is synchronous, not async, so the walk runs on a
//! dedicated worker thread fed through a bounded [`std::sync::mpsc`] queue
//! instead of a task spawned onto a runtime: [`Framework::set_framework_start_level`]
//! and [`Framework::set_start_level_and_wait`] submit a job and block on a
//! completion channel, which serializes concurrent start-level changes for free.
//! The bulk operations themselves are `impl Framework` methods, same as
//! [`crate::lifecycle`] and [`crate::refresh`]; `StartLevelController` is only the
//! worker plumbing.

use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::bundle::PersistentState;
use crate::events::{FrameworkEvent, FrameworkEventKind};
use crate::framework::{Error, Framework, FrameworkState};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Dedicated single thread serializing every framework-wide start-level change.
/// Bounded so a runaway backlog of requested changes cannot grow unbounded.
pub struct StartLevelController {
    sender: SyncSender<Job>,
    _worker: JoinHandle<()>,
}

impl std::fmt::Debug for StartLevelController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartLevelController").finish_non_exhaustive()
    }
}

impl StartLevelController {
    pub fn spawn() -> Self {
        let (sender, receiver) = sync_channel::<Job>(16);
        let worker = thread::Builder::new()
            .name("modfw-startlevel".into())
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })
            .expect("failed to spawn start-level worker thread");
        Self { sender, _worker: worker }
    }

    fn submit(&self, job: Job) {
        // The receiver only stops looping once every sender is dropped, and the
        // only sender lives on this struct, so send failures here would mean the
        // worker panicked; nothing useful to do but drop the job.
        let _ = self.sender.send(job);
    }
}

#[derive(Debug, Clone, Copy)]
struct BundleSnapshot {
    id: crate::bundle::BundleId,
    start_level: i32,
    persistent_state: PersistentState,
}

impl Framework {
    /// Raises or lowers the framework to `level` (§4.6 "set framework start
    /// level"), blocking the caller until the walk completes. `level` must be
    /// positive; use [`Framework::stop_framework`] to reach level 0.
    pub fn set_framework_start_level(self: &Arc<Self>, level: i32) -> Result<(), Error> {
        if level <= 0 {
            return Err(Error::InvalidStartLevel(level));
        }
        self.submit_start_level_walk(level);
        Ok(())
    }

    /// Synchronous form used by [`Framework::stop_framework`]: walks to `level`
    /// (including 0, for shutdown) and blocks until every affected bundle has
    /// been stopped or started.
    pub fn set_start_level_and_wait(self: &Arc<Self>, level: i32) -> Result<(), Error> {
        self.submit_start_level_walk(level.max(0));
        Ok(())
    }

    /// Sets one bundle's start level (§4.6 "set bundle start level"), starting or
    /// stopping it immediately if that crosses the current framework level.
    pub fn set_bundle_start_level(self: &Arc<Self>, id: crate::bundle::BundleId, level: i32) -> Result<(), Error> {
        if level <= 0 {
            return Err(Error::InvalidStartLevel(level));
        }

        let Some(entry) = self.installed.lock().expect("installed map mutex").get(&id).cloned() else {
            return Ok(());
        };

        let _guard = self.locks.lock_bundle(id);
        entry.info.lock().expect("bundle info mutex").start_level = level;

        let framework_level = self.framework_start_level();
        let persistent_active = entry.info.lock().expect("bundle info mutex").persistent_state == PersistentState::Active;

        let result = if persistent_active && level <= framework_level {
            self.start(id, false)
        } else if level > framework_level {
            self.stop(id, false)
        } else {
            Ok(())
        };

        if let Err(err) = result {
            self.emit_framework(FrameworkEvent::error(format!("set_bundle_start_level: bundle {id}: {err}")));
        }
        Ok(())
    }

    fn submit_start_level_walk(self: &Arc<Self>, level: i32) {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let this = Arc::clone(self);
        self.startlevel.submit(Box::new(move || {
            this.run_start_level_walk(level);
            let _ = done_tx.send(());
        }));
        let _ = done_rx.recv();
    }

    /// The walk itself (§4.6): snapshots every non-system bundle's start level
    /// and persistent state, sets the new framework level, then starts bundles
    /// whose level newly falls at or below it (ascending order) or stops bundles
    /// whose level newly falls above it (descending order). Per-bundle failures
    /// become `Error` framework events rather than aborting the walk.
    fn run_start_level_walk(self: &Arc<Self>, new_level: i32) {
        let snapshot: Vec<BundleSnapshot> = {
            let installed = self.installed.lock().expect("installed map mutex");
            installed
                .values()
                .map(|entry| {
                    let info = entry.info.lock().expect("bundle info mutex");
                    BundleSnapshot {
                        id: info.bundle_id,
                        start_level: info.start_level,
                        persistent_state: info.persistent_state,
                    }
                })
                .collect()
        };

        let previous_level = self.framework_start_level();
        *self.framework_start_level.lock().expect("framework start level mutex") = new_level;
        let raising = new_level >= previous_level;

        let mut ordered = snapshot;
        if raising {
            ordered.sort_by_key(|b| (b.start_level, b.id.0));
        } else {
            ordered.sort_by_key(|b| (std::cmp::Reverse(b.start_level), std::cmp::Reverse(b.id.0)));
        }

        for bundle in ordered {
            if bundle.id.is_system() {
                continue;
            }

            let result = if bundle.persistent_state == PersistentState::Active && bundle.start_level <= new_level {
                self.start(bundle.id, false)
            } else if bundle.start_level > new_level {
                self.stop(bundle.id, false)
            } else {
                Ok(())
            };

            if let Err(err) = result {
                self.emit_framework(FrameworkEvent::error(format!("start-level walk to {new_level}: bundle {}: {err}", bundle.id)));
            }
        }

        if *self.framework_state.lock().expect("framework state mutex") == FrameworkState::Active {
            self.emit_framework(FrameworkEvent::simple(FrameworkEventKind::StartLevelChanged));
        }
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
    fn raising_start_level_starts_bundles_at_or_below_target() {
        let (framework, _tmp) = new_framework();
        let bundle = framework.install("inputstream:", Some(b"Bundle-SymbolicName: b1\nBundle-Version: 1.0.0\n")).unwrap();
        framework.start(bundle.bundle_id, true).unwrap();
        assert_eq!(framework.get_bundle(bundle.bundle_id).unwrap().state, crate::bundle::LifecycleState::Active);
    }

    #[test]
    fn lowering_start_level_stops_bundles_above_target() {
        let (framework, _tmp) = new_framework();
        let bundle = framework.install("inputstream:", Some(b"Bundle-SymbolicName: b1\nBundle-Version: 1.0.0\n")).unwrap();
        framework.start(bundle.bundle_id, true).unwrap();
        framework.init().unwrap();
        framework.start_framework().unwrap();

        framework.set_bundle_start_level(bundle.bundle_id, 50).unwrap();
        framework.set_framework_start_level(1).unwrap();

        let snapshot = framework.get_bundle(bundle.bundle_id).unwrap();
        assert_eq!(snapshot.state, crate::bundle::LifecycleState::Resolved);
        assert_eq!(snapshot.persistent_state, crate::bundle::PersistentState::Active);
    }

    #[test]
    fn invalid_start_level_is_rejected() {
        let (framework, _tmp) = new_framework();
        assert!(matches!(framework.set_framework_start_level(0), Err(Error::InvalidStartLevel(0))));
    }
}
