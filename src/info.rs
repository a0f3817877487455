// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Mutable per-bundle state store (§4.2 "Bundle state store (BundleInfo)").
//!
//! Holds everything about a bundle that changes over its lifetime: lifecycle and
//! persistent state, start level, the module list, and the activator/context
//! bookkeeping needed to start and stop it. Locking is [`crate::lock::LockManager`]'s
//! job, not this type's; callers are expected to hold the bundle lock while
//! mutating a `BundleInfo`.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::activator::Activator;
use crate::bundle::{BundleId, LifecycleState, PersistentState};
use crate::module::ModuleId;

/// Everything [`crate::lifecycle::LifecycleEngine`] reads and mutates for one
/// bundle across install/resolve/start/stop/update/uninstall/refresh.
pub struct BundleInfo {
    pub bundle_id: BundleId,
    pub location: String,
    pub state: LifecycleState,
    pub persistent_state: PersistentState,
    pub start_level: i32,
    pub last_modified: DateTime<Utc>,
    pub removal_pending: bool,
    pub stale: bool,
    pub is_extension: bool,
    pub protection_domain: Option<String>,
    modules: Vec<ModuleId>,
    activator: Option<Box<dyn Activator>>,
    headers_cache: Mutex<Option<HeadersCache>>,
}

struct HeadersCache {
    locale: String,
    last_modified: DateTime<Utc>,
    resolved: HashMap<String, String>,
}

impl std::fmt::Debug for BundleInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleInfo")
            .field("bundle_id", &self.bundle_id)
            .field("location", &self.location)
            .field("state", &self.state)
            .field("persistent_state", &self.persistent_state)
            .field("start_level", &self.start_level)
            .field("modules", &self.modules)
            .finish_non_exhaustive()
    }
}

impl BundleInfo {
    pub fn new(bundle_id: BundleId, location: String, start_level: i32) -> Self {
        Self {
            bundle_id,
            location,
            state: LifecycleState::Installed,
            persistent_state: PersistentState::Installed,
            start_level,
            last_modified: Utc::now(),
            removal_pending: false,
            stale: false,
            is_extension: false,
            protection_domain: None,
            modules: Vec::new(),
            activator: None,
            headers_cache: Mutex::new(None),
        }
    }

    pub fn modules(&self) -> &[ModuleId] {
        &self.modules
    }

    pub fn current_module(&self) -> Option<ModuleId> {
        self.modules.last().copied()
    }

    /// Appends a module; the module list is append-only between refreshes
    /// (§8 testable property).
    pub fn add_module(&mut self, id: ModuleId) {
        self.modules.push(id);
    }

    pub fn clear_modules(&mut self) {
        self.modules.clear();
    }

    pub fn set_activator(&mut self, activator: Box<dyn Activator>) {
        self.activator = Some(activator);
    }

    pub fn take_activator(&mut self) -> Option<Box<dyn Activator>> {
        self.activator.take()
    }

    pub fn activator(&mut self) -> Option<&mut Box<dyn Activator>> {
        self.activator.as_mut()
    }

    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
        *self.headers_cache.lock().expect("headers cache mutex") = None;
    }

    /// Resolves `%`-prefixed header values against a locale-suffixed properties
    /// set (§4.2 "Localized headers"), falling back to the key itself when
    /// unresolved. `raw_headers` is the current module's manifest header map;
    /// `properties` is the merged `<base>_<loc1>_<loc2>…` resource set the caller
    /// already assembled for `locale`. Cached per-locale, invalidated whenever
    /// `last_modified` advances past the cached timestamp.
    pub fn headers(&self, locale: &str, raw_headers: &HashMap<String, String>, properties: &HashMap<String, String>) -> HashMap<String, String> {
        let mut cache = self.headers_cache.lock().expect("headers cache mutex");
        if let Some(cached) = cache.as_ref() {
            if cached.locale == locale && cached.last_modified >= self.last_modified {
                return cached.resolved.clone();
            }
        }

        let resolved: HashMap<String, String> = raw_headers
            .iter()
            .map(|(key, value)| {
                let resolved_value = if let Some(prop_key) = value.strip_prefix('%') {
                    properties.get(prop_key).cloned().unwrap_or_else(|| prop_key.to_string())
                } else {
                    value.clone()
                };
                (key.clone(), resolved_value)
            })
            .collect();

        *cache = Some(HeadersCache {
            locale: locale.to_string(),
            last_modified: self.last_modified,
            resolved: resolved.clone(),
        });

        resolved
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn headers_resolves_percent_prefixed_values_from_properties() {
        let info = BundleInfo::new(BundleId(1), "file:b1.jar".into(), 1);
        let mut raw = HashMap::new();
        raw.insert("Bundle-Name".to_string(), "%bundle.name".to_string());
        raw.insert("Bundle-Vendor".to_string(), "Acme".to_string());

        let mut properties = HashMap::new();
        properties.insert("bundle.name".to_string(), "Demo Bundle".to_string());

        let resolved = info.headers("en_US", &raw, &properties);
        assert_eq!(resolved.get("Bundle-Name").map(String::as_str), Some("Demo Bundle"));
        assert_eq!(resolved.get("Bundle-Vendor").map(String::as_str), Some("Acme"));
    }

    #[test]
    fn headers_falls_back_to_key_when_unresolved() {
        let info = BundleInfo::new(BundleId(1), "file:b1.jar".into(), 1);
        let mut raw = HashMap::new();
        raw.insert("Bundle-Name".to_string(), "%missing.key".to_string());

        let resolved = info.headers("en_US", &raw, &HashMap::new());
        assert_eq!(resolved.get("Bundle-Name").map(String::as_str), Some("missing.key"));
    }

    #[test]
    fn cache_invalidates_after_touch() {
        let mut info = BundleInfo::new(BundleId(1), "file:b1.jar".into(), 1);
        let mut raw = HashMap::new();
        raw.insert("K".to_string(), "%p".to_string());
        let mut properties = HashMap::new();
        properties.insert("p".to_string(), "v1".to_string());

        let first = info.headers("en", &raw, &properties);
        assert_eq!(first.get("K").map(String::as_str), Some("v1"));

        info.touch();
        properties.insert("p".to_string(), "v2".to_string());
        let second = info.headers("en", &raw, &properties);
        assert_eq!(second.get("K").map(String::as_str), Some("v2"));
    }

    #[test]
    fn modules_are_append_only() {
        let mut info = BundleInfo::new(BundleId(1), "file:b1.jar".into(), 1);
        info.add_module(ModuleId { bundle_id: BundleId(1), revision_index: 0 });
        info.add_module(ModuleId { bundle_id: BundleId(1), revision_index: 1 });
        assert_eq!(info.modules().len(), 2);
        assert_eq!(info.current_module(), Some(ModuleId { bundle_id: BundleId(1), revision_index: 1 }));
    }
}
