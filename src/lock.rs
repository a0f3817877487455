// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Per-bundle reentrant locks plus coordinated multi-bundle lock acquisition (§4.3).
//!
//! Global lock ordering (enforced structurally by routing every multi-bundle
//! operation through this type rather than letting callers take raw locks):
//! install-lock -> installed-bundles-lock -> uninstalled-bundles-lock -> bundle-lock.
//! The installed/uninstalled-bundles locks are plain mutexes owned by the bundle
//! registry in [`crate::framework`]; this module owns the other two lock kinds.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

use thiserror::Error;

use crate::bundle::BundleId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("install already in progress for location {0:?}")]
    InstallInProgress(String),
}

#[derive(Default)]
struct BundleLockState {
    owner: Option<ThreadId>,
    count: u32,
}

impl BundleLockState {
    fn is_lockable(&self, thread: ThreadId) -> bool {
        self.count == 0 || self.owner == Some(thread)
    }
}

/// Owns the install-location lock and the per-bundle reentrant locks, and provides
/// all-or-none acquisition across a set of bundles.
pub struct LockManager {
    install: Mutex<HashSet<String>>,
    install_cv: Condvar,
    bundles: Mutex<HashMap<BundleId, BundleLockState>>,
    bundles_cv: Condvar,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager").finish_non_exhaustive()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            install: Mutex::new(HashSet::new()),
            install_cv: Condvar::new(),
            bundles: Mutex::new(HashMap::new()),
            bundles_cv: Condvar::new(),
        }
    }

    /// Blocks until no install is in progress for `location`, then marks it
    /// in-progress until the returned guard is dropped.
    pub fn lock_install(&self, location: &str) -> InstallLockGuard<'_> {
        let mut set = self.install.lock().expect("install lock mutex");
        while set.contains(location) {
            set = self.install_cv.wait(set).expect("install lock condvar");
        }
        set.insert(location.to_string());
        InstallLockGuard {
            manager: self,
            location: location.to_string(),
        }
    }

    /// Acquires the reentrant lock for a single bundle.
    pub fn lock_bundle(&self, id: BundleId) -> BundleLockGuard<'_> {
        let thread = thread::current().id();
        let mut map = self.bundles.lock().expect("bundle lock mutex");
        loop {
            let lockable = map.get(&id).map_or(true, |s| s.is_lockable(thread));
            if lockable {
                let state = map.entry(id).or_default();
                state.owner = Some(thread);
                state.count += 1;
                break;
            }
            map = self.bundles_cv.wait(map).expect("bundle lock condvar");
        }
        BundleLockGuard { manager: self, id }
    }

    /// Returns true if `id` is currently lockable by the calling thread (count zero,
    /// or already held reentrantly by this thread). Used by callers building their
    /// own candidate sets before calling [`LockManager::lock_many`].
    pub fn is_lockable(&self, id: BundleId) -> bool {
        let thread = thread::current().id();
        let map = self.bundles.lock().expect("bundle lock mutex");
        map.get(&id).map_or(true, |s| s.is_lockable(thread))
    }

    /// Acquires the reentrant lock for every id in `ids`, atomically: either all are
    /// locked, or none are and the caller blocks until they can all be taken
    /// together. Used for refresh closures and bulk resolves (§4.3, §4.5).
    pub fn lock_many(&self, ids: &[BundleId]) -> MultiLockGuard<'_> {
        let thread = thread::current().id();
        let mut map = self.bundles.lock().expect("bundle lock mutex");
        loop {
            let all_lockable = ids.iter().all(|id| map.get(id).map_or(true, |s| s.is_lockable(thread)));
            if all_lockable {
                for id in ids {
                    let state = map.entry(*id).or_default();
                    state.owner = Some(thread);
                    state.count += 1;
                }
                break;
            }
            map = self.bundles_cv.wait(map).expect("bundle lock condvar");
        }
        MultiLockGuard {
            manager: self,
            ids: ids.to_vec(),
        }
    }

    fn release_bundle(&self, id: BundleId) {
        let mut map = self.bundles.lock().expect("bundle lock mutex");
        if let Some(state) = map.get_mut(&id) {
            debug_assert_eq!(state.owner, Some(thread::current().id()));
            state.count -= 1;
            if state.count == 0 {
                state.owner = None;
                map.remove(&id);
            }
        }
        drop(map);
        self.bundles_cv.notify_all();
    }

    fn release_install(&self, location: &str) {
        let mut set = self.install.lock().expect("install lock mutex");
        set.remove(location);
        drop(set);
        self.install_cv.notify_all();
    }
}

#[must_use = "the install lock is released when this guard is dropped"]
pub struct InstallLockGuard<'a> {
    manager: &'a LockManager,
    location: String,
}

impl Drop for InstallLockGuard<'_> {
    fn drop(&mut self) {
        self.manager.release_install(&self.location);
    }
}

#[must_use = "the bundle lock is released when this guard is dropped"]
pub struct BundleLockGuard<'a> {
    manager: &'a LockManager,
    id: BundleId,
}

impl Drop for BundleLockGuard<'_> {
    fn drop(&mut self) {
        self.manager.release_bundle(self.id);
    }
}

#[must_use = "the bundle locks are released when this guard is dropped"]
pub struct MultiLockGuard<'a> {
    manager: &'a LockManager,
    ids: Vec<BundleId>,
}

impl Drop for MultiLockGuard<'_> {
    fn drop(&mut self) {
        for id in &self.ids {
            self.manager.release_bundle(*id);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn bundle_lock_is_reentrant() {
        let manager = LockManager::new();
        let id = BundleId(1);
        let outer = manager.lock_bundle(id);
        // Same thread can re-acquire without blocking.
        let inner = manager.lock_bundle(id);
        drop(inner);
        drop(outer);
    }

    #[test]
    fn bundle_lock_excludes_other_threads() {
        let manager = Arc::new(LockManager::new());
        let id = BundleId(7);
        let guard = manager.lock_bundle(id);

        let manager2 = manager.clone();
        let handle = thread::spawn(move || {
            let _guard = manager2.lock_bundle(id);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        drop(guard);
        handle.join().unwrap();
    }

    #[test]
    fn install_lock_serializes_identical_locations() {
        let manager = Arc::new(LockManager::new());
        let first = manager.lock_install("file:b1.jar");

        let manager2 = manager.clone();
        let handle = thread::spawn(move || {
            let _guard = manager2.lock_install("file:b1.jar");
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        drop(first);
        handle.join().unwrap();
    }

    #[test]
    fn multi_lock_is_all_or_none() {
        let manager = Arc::new(LockManager::new());
        let a = BundleId(1);
        let b = BundleId(2);

        // Another thread holds `b` alone.
        let manager2 = manager.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            let _guard = manager2.lock_bundle(b);
            tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(100));
        });
        rx.recv().unwrap();

        // Attempting to lock {a, b} together must block until b is released, and
        // must not leave `a` locked in the meantime.
        let start = std::time::Instant::now();
        let guard = manager.lock_many(&[a, b]);
        assert!(start.elapsed() >= Duration::from_millis(40));
        drop(guard);
        handle.join().unwrap();
    }
}
