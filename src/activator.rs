// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The activator seam (§9 "Inheritance / polymorphism"): a trait object invoked on
//! a bundle's `Starting`→`Active` and `Active`→`Stopping` transitions.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::bundle::BundleId;
use crate::resolver::ServiceRegistry;

/// Failure from an activator's `start`/`stop`. Wrapped by
/// [`crate::lifecycle::Error::ActivatorStart`]/[`crate::lifecycle::Error::ActivatorStop`]
/// via `#[source]`.
#[derive(Debug)]
pub struct ActivatorError(pub Box<dyn StdError + Send + Sync>);

impl fmt::Display for ActivatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "activator error: {}", self.0)
    }
}

impl StdError for ActivatorError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.0.as_ref())
    }
}

/// Per-bundle context handed to an activator: its identity plus the service
/// registry handle it needs to register and consume services (§4.4 "Start"/"Stop"
/// cleanup unregisters/ungets everything registered through this handle).
pub struct BundleContext {
    pub bundle_id: BundleId,
    pub services: Arc<dyn ServiceRegistry>,
}

impl BundleContext {
    pub fn new(bundle_id: BundleId, services: Arc<dyn ServiceRegistry>) -> Self {
        Self { bundle_id, services }
    }

    pub fn register_service(&self, interface: &str) -> crate::resolver::ServiceId {
        self.services.register(self.bundle_id, interface)
    }
}

/// A bundle's `Bundle-Activator` entry point (§4.4 "Start"/"Stop"). Instantiated
/// from the header of that name on resolve, invoked on start/stop transitions.
pub trait Activator: Send {
    fn start(&mut self, context: &mut BundleContext) -> Result<(), ActivatorError>;
    fn stop(&mut self, context: &mut BundleContext) -> Result<(), ActivatorError>;
}

/// An activator that never fails; used by tests and by bundles with no
/// `Bundle-Activator` header (no-op activation).
#[derive(Debug, Default)]
pub struct NoopActivator;

impl Activator for NoopActivator {
    fn start(&mut self, _context: &mut BundleContext) -> Result<(), ActivatorError> {
        Ok(())
    }

    fn stop(&mut self, _context: &mut BundleContext) -> Result<(), ActivatorError> {
        Ok(())
    }
}
