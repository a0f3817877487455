// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Per-revision linkage objects ([`Module`]) and the dependents graph that links
//! them (§3, §9 "Cyclic dependency graph").
//!
//! The graph is arena-allocated via `petgraph::stable_graph::StableDiGraph`,
//! addressed by `NodeIndex`, wrapped the way this codebase's own `dag::Dag<N>`
//! wraps petgraph for its transaction graph: construct-or-get-index, cycle-aware
//! edge insertion, and index-based traversal rather than recursion (safe on
//! `require-bundle`-style cycles). The stable variant keeps a surviving node's
//! index valid across another node's removal, which `index` depends on.

use std::collections::HashMap;
use std::fmt;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;

use crate::bundle::BundleId;

/// Identifies a module as `"<bundle_id>.<revision_index>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    pub bundle_id: BundleId,
    pub revision_index: usize,
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.bundle_id, self.revision_index)
    }
}

/// Kind of wiring edge between two modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// Package import wiring.
    Importer,
    /// `Require-Bundle`-style wiring.
    Requirer,
}

/// Declarative view of a revision's manifest, as parsed by an external
/// [`crate::resolver::ManifestParser`]: capabilities offered, requirements needed,
/// dynamic (late-bound) requirements, and native library entries.
#[derive(Debug, Clone, Default)]
pub struct ModuleDefinition {
    pub exported_packages: Vec<String>,
    pub imported_packages: Vec<String>,
    pub required_bundles: Vec<String>,
    pub dynamic_imports: Vec<String>,
    pub native_libraries: Vec<String>,
    pub required_execution_environment: Option<String>,
}

/// Post-resolve linkage state. `Unresolved` until the external
/// [`crate::resolver::Resolver`] successfully wires the module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Wiring {
    #[default]
    Unresolved,
    Resolved,
}

/// The resolver-facing per-revision object (§3 "Module"). Lives in the
/// [`ModuleGraph`] arena; dependents are tracked as graph edges rather than an
/// inline `Vec` so refresh can walk the transitive closure without recursion.
#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    pub definition: ModuleDefinition,
    pub wiring: Wiring,
}

impl Module {
    pub fn new(id: ModuleId, definition: ModuleDefinition) -> Self {
        Self {
            id,
            definition,
            wiring: Wiring::Unresolved,
        }
    }
}

/// Arena of [`Module`]s with dependency/dependent edges, generalized from this
/// codebase's package-transaction `Dag<N>` wrapper to carry [`DependencyKind`]
/// edges instead of transaction ordering edges.
///
/// Backed by `StableDiGraph` rather than `DiGraph`: removal (refresh's
/// garbage-collect step) must not reassign a surviving module's `NodeIndex`,
/// since `index` caches those indices across calls.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    graph: StableDiGraph<Module, DependencyKind>,
    index: HashMap<ModuleId, NodeIndex>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `module` if absent, returning its index either way (modules are
    /// append-only between refreshes, invariant §8).
    pub fn add_module(&mut self, module: Module) -> NodeIndex {
        if let Some(existing) = self.index.get(&module.id) {
            *existing
        } else {
            let id = module.id;
            let idx = self.graph.add_node(module);
            self.index.insert(id, idx);
            idx
        }
    }

    pub fn get(&self, id: ModuleId) -> Option<&Module> {
        self.index.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn get_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        let idx = *self.index.get(&id)?;
        Some(&mut self.graph[idx])
    }

    pub fn contains(&self, id: ModuleId) -> bool {
        self.index.contains_key(&id)
    }

    /// Every module currently known to the graph, the universe a [`crate::resolver::Resolver`]
    /// resolves a target against.
    pub fn all(&self) -> Vec<Module> {
        self.graph.node_weights().cloned().collect()
    }

    /// Wires `dependent` to `dependency` (dependent imports/requires dependency).
    /// A module may depend on an older revision of another bundle, per invariant 2.
    pub fn add_dependency(&mut self, dependent: ModuleId, dependency: ModuleId, kind: DependencyKind) {
        let (Some(&from), Some(&to)) = (self.index.get(&dependent), self.index.get(&dependency)) else {
            return;
        };
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, kind);
        }
    }

    /// Direct dependents of `id`: modules with an edge pointing *at* `id`.
    pub fn dependents_of(&self, id: ModuleId) -> Vec<ModuleId> {
        let Some(&idx) = self.index.get(&id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|edge| self.graph[edge.source()].id)
            .collect()
    }

    /// Transitive closure of dependents of every id in `seeds`, including the seeds
    /// themselves — the set refresh must stop-purge-restart together (§4.5 step 2).
    pub fn transitive_dependents(&self, seeds: &[ModuleId]) -> Vec<ModuleId> {
        let mut result = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for &seed in seeds {
            let Some(&start) = self.index.get(&seed) else {
                continue;
            };
            // Walk the reversed graph from `start` so Dfs naturally visits dependents.
            let reversed = petgraph::visit::Reversed(&self.graph);
            let mut dfs = Dfs::new(&reversed, start);
            while let Some(node) = dfs.next(&reversed) {
                let id = self.graph[node].id;
                if seen.insert(id) {
                    result.push(id);
                }
            }
        }

        result
    }

    /// Removes every module belonging to `bundle_id`. Used by refresh's
    /// purge/garbage-collect step, which must drop all stale modules from the
    /// factory before rebuilding the current revision's module (§4.5 rationale).
    pub fn remove_bundle_modules(&mut self, bundle_id: BundleId) -> Vec<ModuleId> {
        let ids: Vec<ModuleId> = self
            .index
            .keys()
            .copied()
            .filter(|id| id.bundle_id == bundle_id)
            .collect();

        for id in &ids {
            if let Some(idx) = self.index.remove(id) {
                self.graph.remove_node(idx);
            }
        }

        ids
    }

    pub fn mark_resolved(&mut self, id: ModuleId) {
        if let Some(module) = self.get_mut(id) {
            module.wiring = Wiring::Resolved;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mid(bundle: u64, rev: usize) -> ModuleId {
        ModuleId {
            bundle_id: BundleId(bundle),
            revision_index: rev,
        }
    }

    #[test]
    fn transitive_dependents_follows_chain() {
        let mut graph = ModuleGraph::new();
        graph.add_module(Module::new(mid(1, 0), ModuleDefinition::default()));
        graph.add_module(Module::new(mid(2, 0), ModuleDefinition::default()));
        graph.add_module(Module::new(mid(3, 0), ModuleDefinition::default()));

        // 2 imports 1, 3 imports 2.
        graph.add_dependency(mid(2, 0), mid(1, 0), DependencyKind::Importer);
        graph.add_dependency(mid(3, 0), mid(2, 0), DependencyKind::Importer);

        let closure = graph.transitive_dependents(&[mid(1, 0)]);
        assert!(closure.contains(&mid(1, 0)));
        assert!(closure.contains(&mid(2, 0)));
        assert!(closure.contains(&mid(3, 0)));
    }

    #[test]
    fn cycles_do_not_hang_traversal() {
        let mut graph = ModuleGraph::new();
        graph.add_module(Module::new(mid(1, 0), ModuleDefinition::default()));
        graph.add_module(Module::new(mid(2, 0), ModuleDefinition::default()));

        graph.add_dependency(mid(1, 0), mid(2, 0), DependencyKind::Requirer);
        graph.add_dependency(mid(2, 0), mid(1, 0), DependencyKind::Requirer);

        let closure = graph.transitive_dependents(&[mid(1, 0)]);
        assert_eq!(closure.len(), 2);
    }

    #[test]
    fn remove_bundle_modules_drops_only_that_bundle() {
        let mut graph = ModuleGraph::new();
        graph.add_module(Module::new(mid(1, 0), ModuleDefinition::default()));
        graph.add_module(Module::new(mid(1, 1), ModuleDefinition::default()));
        graph.add_module(Module::new(mid(2, 0), ModuleDefinition::default()));

        let removed = graph.remove_bundle_modules(BundleId(1));
        assert_eq!(removed.len(), 2);
        assert!(!graph.contains(mid(1, 0)));
        assert!(!graph.contains(mid(1, 1)));
        assert!(graph.contains(mid(2, 0)));
    }

    #[test]
    fn survivor_stays_addressable_after_an_earlier_node_is_removed() {
        // Regression: a swap-removing arena (petgraph::graph::DiGraph) reassigns
        // the last node's index into the freed slot, leaving `index` pointing at
        // the wrong module for any bundle added after the removed one.
        let mut graph = ModuleGraph::new();
        graph.add_module(Module::new(mid(1, 0), ModuleDefinition::default()));
        graph.add_module(Module::new(mid(2, 0), ModuleDefinition::default()));
        graph.add_dependency(mid(2, 0), mid(1, 0), DependencyKind::Importer);

        graph.remove_bundle_modules(BundleId(1));

        assert_eq!(graph.get(mid(2, 0)).map(|m| m.id), Some(mid(2, 0)));
        assert!(graph.dependents_of(mid(1, 0)).is_empty());

        graph.add_module(Module::new(mid(3, 0), ModuleDefinition::default()));
        graph.add_dependency(mid(3, 0), mid(2, 0), DependencyKind::Importer);
        assert_eq!(graph.dependents_of(mid(2, 0)), vec![mid(3, 0)]);
    }
}
