// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! External-collaborator contracts (§1, §6): the dependency resolver, manifest
//! parsing, the service registry, and permission checks. Each trait is paired here
//! with a minimal in-process implementation sufficient to drive the lifecycle
//! engine end-to-end in tests, without pulling in a real constraint solver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::module::{Module, ModuleDefinition, ModuleId};

/// Computes wirings between requirements and capabilities across the set of known
/// modules. Consumers call [`Resolver::resolve`] with the modules that must become
/// resolvable; a real implementation runs a constraint solver, this crate ships a
/// deterministic same-process resolver adequate for tests.
pub trait Resolver: Send + Sync {
    /// Attempts to resolve `targets`, given every currently known module. Returns
    /// the subset of `targets` that resolved; the caller is responsible for marking
    /// those modules `Wiring::Resolved` and emitting the corresponding events.
    fn resolve(&self, targets: &[ModuleId], universe: &[Module]) -> Vec<ModuleId>;
}

/// Resolves a module if every `imported_packages` entry is exported by some other
/// known module (or by itself) and every `required_bundles` entry names a bundle
/// present in the universe. This is deliberately permissive — it is a stand-in for
/// a real solver, not a specification of OSGi resolution semantics.
#[derive(Debug, Default)]
pub struct SimpleResolver;

impl Resolver for SimpleResolver {
    fn resolve(&self, targets: &[ModuleId], universe: &[Module]) -> Vec<ModuleId> {
        let exported: std::collections::HashSet<&str> = universe
            .iter()
            .flat_map(|m| m.definition.exported_packages.iter().map(String::as_str))
            .collect();
        let bundle_ids: std::collections::HashSet<u64> =
            universe.iter().map(|m| m.id.bundle_id.0).collect();

        targets
            .iter()
            .copied()
            .filter(|id| {
                let Some(module) = universe.iter().find(|m| m.id == *id) else {
                    return false;
                };
                let imports_satisfied = module
                    .definition
                    .imported_packages
                    .iter()
                    .all(|pkg| exported.contains(pkg.as_str()));
                let requires_satisfied = module
                    .definition
                    .required_bundles
                    .iter()
                    .all(|name| bundle_ids.contains(&name.parse::<u64>().unwrap_or(u64::MAX)));
                imports_satisfied && requires_satisfied
            })
            .collect()
    }
}

/// Parses bundle manifest headers into a [`ModuleDefinition`] plus the raw header
/// map `headers()` exposes. A real implementation would parse a jar manifest or
/// OSGi-style `MANIFEST.MF`; this crate ships a small line-oriented
/// `Header-Name: value` parser, one header per line, comma-separated list values.
pub trait ManifestParser: Send + Sync {
    fn parse(&self, content: &str) -> ParsedManifest;
}

#[derive(Debug, Clone, Default)]
pub struct ParsedManifest {
    pub headers: HashMap<String, String>,
    pub definition: ModuleDefinition,
}

#[derive(Debug, Default)]
pub struct LineManifestParser;

impl ManifestParser for LineManifestParser {
    fn parse(&self, content: &str) -> ParsedManifest {
        let mut headers = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_string(), value.trim().to_string());
            }
        }

        let csv = |key: &str| -> Vec<String> {
            headers
                .get(key)
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default()
        };

        let definition = ModuleDefinition {
            exported_packages: csv("Export-Package"),
            imported_packages: csv("Import-Package"),
            required_bundles: csv("Require-Bundle"),
            dynamic_imports: csv("DynamicImport-Package"),
            native_libraries: csv("Bundle-NativeCode"),
            required_execution_environment: headers.get("Bundle-RequiredExecutionEnvironment").cloned(),
        };

        ParsedManifest { headers, definition }
    }
}

/// Handle returned by [`ServiceRegistry::register`]; dropping it does not
/// automatically unregister — callers call [`ServiceRegistry::unregister`]
/// explicitly, matching the activator lifecycle in §4.4 where unregistration
/// happens as part of an orchestrated stop, not as a destructor side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(pub u64);

/// Bookkeeping for services an activator registers and consumes, sufficient to
/// drive the start/stop cleanup steps in §4.4 without a full service-ranking and
/// dynamic-rebind implementation.
pub trait ServiceRegistry: Send + Sync {
    fn register(&self, bundle_id: crate::bundle::BundleId, interface: &str) -> ServiceId;
    fn unregister(&self, service: ServiceId);
    /// Unregisters every service the given bundle registered, used when a bundle
    /// stops or its activator fails.
    fn unregister_all(&self, bundle_id: crate::bundle::BundleId);
    fn lookup(&self, interface: &str) -> Vec<ServiceId>;
}

#[derive(Debug, Default)]
struct ServiceEntry {
    bundle_id: crate::bundle::BundleId,
    interface: String,
}

#[derive(Debug, Default)]
pub struct InMemoryServiceRegistry {
    next_id: Mutex<u64>,
    services: Mutex<HashMap<ServiceId, ServiceEntry>>,
}

impl ServiceRegistry for InMemoryServiceRegistry {
    fn register(&self, bundle_id: crate::bundle::BundleId, interface: &str) -> ServiceId {
        let mut next_id = self.next_id.lock().expect("service id mutex");
        let id = ServiceId(*next_id);
        *next_id += 1;
        drop(next_id);

        self.services.lock().expect("service map mutex").insert(
            id,
            ServiceEntry {
                bundle_id,
                interface: interface.to_string(),
            },
        );
        id
    }

    fn unregister(&self, service: ServiceId) {
        self.services.lock().expect("service map mutex").remove(&service);
    }

    fn unregister_all(&self, bundle_id: crate::bundle::BundleId) {
        self.services
            .lock()
            .expect("service map mutex")
            .retain(|_, entry| entry.bundle_id != bundle_id);
    }

    fn lookup(&self, interface: &str) -> Vec<ServiceId> {
        self.services
            .lock()
            .expect("service map mutex")
            .iter()
            .filter(|(_, entry)| entry.interface == interface)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Permission check boundary (§4.4 resolve step, §7 SecurityError). Returning
/// `Ok(())` grants the action; any `Err` is surfaced to the caller unchanged.
pub trait PermissionProvider: Send + Sync {
    fn check_export(&self, bundle_id: crate::bundle::BundleId, package: &str) -> Result<(), String>;
}

/// Instantiates the class named by a bundle's `Bundle-Activator` header (§4.4
/// "Start": "instantiate the activator class"). There is no reflection in Rust,
/// so this stands in for it: an embedder registers a constructor under the class
/// name it expects bundles to declare; `create` returns `None` for unknown names,
/// which the lifecycle engine treats the same as a bundle with no activator
/// header at all (falls back to [`crate::activator::NoopActivator`]).
pub trait ActivatorFactory: Send + Sync {
    fn create(&self, class_name: &str) -> Option<Box<dyn crate::activator::Activator>>;
}

type ActivatorCtor = dyn Fn() -> Box<dyn crate::activator::Activator> + Send + Sync;

/// A name -> constructor registry, the common case for an embedder that links a
/// known, fixed set of activator classes into the same binary as the framework.
#[derive(Default)]
pub struct RegistryActivatorFactory {
    ctors: Mutex<HashMap<String, Arc<ActivatorCtor>>>,
}

impl RegistryActivatorFactory {
    pub fn register(&self, class_name: impl Into<String>, ctor: impl Fn() -> Box<dyn crate::activator::Activator> + Send + Sync + 'static) {
        self.ctors.lock().expect("activator registry mutex").insert(class_name.into(), Arc::new(ctor));
    }
}

impl ActivatorFactory for RegistryActivatorFactory {
    fn create(&self, class_name: &str) -> Option<Box<dyn crate::activator::Activator>> {
        let ctor = self.ctors.lock().expect("activator registry mutex").get(class_name).cloned()?;
        Some(ctor())
    }
}

/// Grants every check. Installed by default so the engine is usable without a
/// configured provider; embedders that need enforcement supply their own.
#[derive(Debug, Default)]
pub struct AllowAllPermissions;

impl PermissionProvider for AllowAllPermissions {
    fn check_export(&self, _bundle_id: crate::bundle::BundleId, _package: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Bundles the external collaborators the lifecycle/refresh engines depend on, so
/// `Framework::new` takes one argument instead of five.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn Resolver>,
    pub manifest_parser: Arc<dyn ManifestParser>,
    pub service_registry: Arc<dyn ServiceRegistry>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub activator_factory: Arc<dyn ActivatorFactory>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            resolver: Arc::new(SimpleResolver),
            manifest_parser: Arc::new(LineManifestParser),
            service_registry: Arc::new(InMemoryServiceRegistry::default()),
            permissions: Arc::new(AllowAllPermissions),
            activator_factory: Arc::new(RegistryActivatorFactory::default()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bundle::BundleId;

    #[test]
    fn line_manifest_parser_splits_csv_headers() {
        let parser = LineManifestParser;
        let manifest = parser.parse(
            "Bundle-SymbolicName: demo\nExport-Package: a, b\nImport-Package: c\nBundle-Version: 1.0.0\n",
        );
        assert_eq!(manifest.headers.get("Bundle-SymbolicName").map(String::as_str), Some("demo"));
        assert_eq!(manifest.definition.exported_packages, vec!["a", "b"]);
        assert_eq!(manifest.definition.imported_packages, vec!["c"]);
    }

    #[test]
    fn simple_resolver_requires_matching_export() {
        let resolver = SimpleResolver;
        let exporter = Module::new(
            ModuleId { bundle_id: BundleId(1), revision_index: 0 },
            ModuleDefinition {
                exported_packages: vec!["p".into()],
                ..Default::default()
            },
        );
        let importer = Module::new(
            ModuleId { bundle_id: BundleId(2), revision_index: 0 },
            ModuleDefinition {
                imported_packages: vec!["p".into()],
                ..Default::default()
            },
        );
        let universe = vec![exporter.clone(), importer.clone()];
        let resolved = resolver.resolve(&[importer.id], &universe);
        assert_eq!(resolved, vec![importer.id]);

        let lonely = Module::new(
            ModuleId { bundle_id: BundleId(3), revision_index: 0 },
            ModuleDefinition {
                imported_packages: vec!["missing".into()],
                ..Default::default()
            },
        );
        let universe2 = vec![lonely.clone()];
        assert!(resolver.resolve(&[lonely.id], &universe2).is_empty());
    }

    #[test]
    fn service_registry_unregister_all_scopes_by_bundle() {
        let registry = InMemoryServiceRegistry::default();
        let a = registry.register(BundleId(1), "iface.A");
        let _b = registry.register(BundleId(2), "iface.A");
        registry.unregister_all(BundleId(1));
        assert!(registry.lookup("iface.A").iter().all(|id| *id != a));
        assert_eq!(registry.lookup("iface.A").len(), 1);
    }
}
