// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The crate-wide error kind taxonomy plus the thin top-level [`Error`] umbrella.
//!
//! Each subsystem (`archive`, `lock`, `lifecycle`, `refresh`, `framework`) defines its
//! own `thiserror` enum, the way this codebase gives every subsystem its own small
//! error type rather than a single crate-wide one. [`ErrorKind`] is the classification
//! every concrete error can be asked for via a `kind() -> ErrorKind` method, so callers
//! can dispatch on the §7 taxonomy (`BundleFailure`, `StateError`, `ArgumentError`,
//! `SecurityError`, `InternalError`) without caring which subsystem raised it.

use std::fmt;

use thiserror::Error as ThisError;

/// The taxonomy kinds from §7 of the design. Not a type in its own right — a
/// classification every concrete error can be asked for via `kind()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid lifecycle transition, activator error, resolve failure, cache failure.
    BundleFailure,
    /// Operation on an uninstalled bundle, or starting while starting/stopping.
    StateError,
    /// Negative timeout, non-positive start level.
    ArgumentError,
    /// Permission provider denial.
    SecurityError,
    /// Logger/cache write failure the framework tolerates; never surfaced to a caller
    /// as a failed operation.
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::BundleFailure => "bundle failure",
            ErrorKind::StateError => "state error",
            ErrorKind::ArgumentError => "argument error",
            ErrorKind::SecurityError => "security error",
            ErrorKind::InternalError => "internal error",
        };
        f.write_str(s)
    }
}

/// Top-level error returned by [`crate::Framework`] operations, aggregating the
/// per-subsystem errors (§7 "Rust mapping"). Each variant is `transparent` so
/// `Display`/`source` delegate to the wrapped subsystem error.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Lifecycle(#[from] crate::lifecycle::Error),

    #[error(transparent)]
    Refresh(#[from] crate::refresh::Error),

    #[error(transparent)]
    Framework(#[from] crate::framework::Error),

    #[error(transparent)]
    Archive(#[from] crate::archive::Error),

    #[error(transparent)]
    Lock(#[from] crate::lock::Error),
}

impl Error {
    /// Classify this error per the §7 taxonomy, delegating to whichever
    /// subsystem error is wrapped.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Lifecycle(e) => e.kind(),
            Error::Refresh(e) => e.kind(),
            Error::Framework(e) => e.kind(),
            Error::Archive(_) => ErrorKind::BundleFailure,
            Error::Lock(_) => ErrorKind::InternalError,
        }
    }
}
