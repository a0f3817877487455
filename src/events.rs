// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Bundle and framework events (§6), and the listener fan-out that delivers them.
//!
//! Per-bundle ordering is preserved by emitting synchronously from the thread that
//! completed the transition, under that bundle's lock (§5 ordering rule c).

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::bundle::BundleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleEventKind {
    Installed,
    Starting,
    Started,
    Stopping,
    Stopped,
    Updated,
    Unresolved,
    Resolved,
    Uninstalled,
}

impl fmt::Display for BundleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BundleEvent {
    pub bundle_id: BundleId,
    pub kind: BundleEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameworkEventKind {
    Started,
    Error,
    PackagesRefreshed,
    StartLevelChanged,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct FrameworkEvent {
    pub kind: FrameworkEventKind,
    /// Present for `Error` events: a rendered description of the failure. Kept as a
    /// string rather than `Error` so the event can be cloned and fanned out to
    /// multiple listeners without requiring `Error: Clone`.
    pub message: Option<String>,
}

impl FrameworkEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FrameworkEventKind::Error,
            message: Some(message.into()),
        }
    }

    pub fn simple(kind: FrameworkEventKind) -> Self {
        Self { kind, message: None }
    }
}

/// Receives bundle and framework events. Implementations must return promptly —
/// listener invocation happens under the bundle lock for `BundleEvent`s (§5 rule d).
pub trait EventListener: Send + Sync {
    fn bundle_changed(&self, _event: &BundleEvent) {}
    fn framework_event(&self, _event: &FrameworkEvent) {}
}

/// Ordered set of listeners, invoked synchronously in registration order.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Vec<Arc<dyn EventListener>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn EventListener>) {
        self.listeners.lock().expect("event bus mutex").push(listener);
    }

    pub fn unregister_all(&self) {
        self.listeners.lock().expect("event bus mutex").clear();
    }

    pub fn emit_bundle(&self, bundle_id: BundleId, kind: BundleEventKind) {
        let event = BundleEvent { bundle_id, kind };
        log::trace!("bundle {bundle_id}: {kind}");
        for listener in self.listeners.lock().expect("event bus mutex").iter() {
            listener.bundle_changed(&event);
        }
    }

    pub fn emit_framework(&self, event: FrameworkEvent) {
        if event.kind == FrameworkEventKind::Error {
            log::warn!("framework error: {}", event.message.as_deref().unwrap_or_default());
        } else {
            log::trace!("framework event: {:?}", event.kind);
        }
        for listener in self.listeners.lock().expect("event bus mutex").iter() {
            listener.framework_event(&event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listener_count", &self.listeners.lock().map(|l| l.len()).unwrap_or(0))
            .finish()
    }
}
