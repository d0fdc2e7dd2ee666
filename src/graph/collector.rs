//! Transactional edge updates for one owner.
//!
//! ```ignore
//! let mut collection = graph.start_collecting(&owner);
//! collection.add_dependency(&mut graph, reference_id);
//! let report = collection.finish(&mut graph);
//! ```
//!
//! Edges found during collection are inserted immediately in both
//! directions, so the graph stays consistent while a transform runs.
//! Edges that vanished are removed at `finish`, and targets left unused
//! are pruned recursively.

use rustc_hash::FxHashSet;

use super::{ReferenceId, UrlGraph};
use crate::core::ResourceUrl;

/// Nodes affected by a `finish`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Pruned nodes, in pruning order
    pub pruned: Vec<ResourceUrl>,
    /// Pruned inline nodes that were deleted
    pub deleted: Vec<ResourceUrl>,
}

impl PruneReport {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pruned.is_empty()
    }
}

/// Collection token returned by [`UrlGraph::start_collecting`].
#[must_use = "call `finish` to commit the collected references"]
#[derive(Debug)]
pub struct DependencyCollection {
    owner: ResourceUrl,
    previous_dependencies: FxHashSet<ResourceUrl>,
    previous_references: Vec<ReferenceId>,
    references: Vec<ReferenceId>,
}

impl UrlGraph {
    /// Snapshot `owner`'s edges and start collecting its new references.
    pub fn start_collecting(&mut self, owner: &ResourceUrl) -> DependencyCollection {
        let (previous_dependencies, previous_references) = self
            .get(owner)
            .map(|info| (info.dependencies.clone(), info.references.clone()))
            .unwrap_or_default();
        DependencyCollection {
            owner: owner.clone(),
            previous_dependencies,
            previous_references,
            references: Vec::new(),
        }
    }
}

impl DependencyCollection {
    #[inline]
    pub fn owner(&self) -> &ResourceUrl {
        &self.owner
    }

    /// References collected so far.
    #[inline]
    pub fn references(&self) -> &[ReferenceId] {
        &self.references
    }

    /// Record a resolved reference and insert its edge.
    ///
    /// Returns the target URL, or `None` if the reference is unresolved.
    pub fn add_dependency(&mut self, graph: &mut UrlGraph, id: ReferenceId) -> Option<ResourceUrl> {
        let implicit = graph.reference(id)?.is_implicit;
        let url = graph.reuse_or_create_url_info(id)?;
        if !self.references.contains(&id) {
            self.references.push(id);
        }
        graph.add_edge(&self.owner, &url, implicit);
        Some(url)
    }

    /// Swap `old` for its successor `new` (e.g. a reference turned inline).
    pub fn replace_reference(
        &mut self,
        graph: &mut UrlGraph,
        old: ReferenceId,
        new: ReferenceId,
    ) -> Option<ResourceUrl> {
        let implicit = graph.reference(new)?.is_implicit;
        let url = graph.reuse_or_create_url_info(new)?;
        match self.references.iter().position(|&id| id == old) {
            Some(index) => self.references[index] = new,
            None => self.references.push(new),
        }
        graph.add_edge(&self.owner, &url, implicit);
        Some(url)
    }

    /// Commit the collected references: remove vanished edges and prune
    /// targets that are no longer used.
    pub fn finish(self, graph: &mut UrlGraph) -> PruneReport {
        let mut report = PruneReport::default();
        let Some(owner) = graph.get_mut(&self.owner) else {
            return report;
        };
        owner.references = self.references.clone();
        let mut candidates: Vec<ResourceUrl> = owner
            .dependencies
            .iter()
            .chain(self.previous_dependencies.iter())
            .cloned()
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        candidates.sort();

        let live: FxHashSet<ResourceUrl> = self
            .references
            .iter()
            .filter_map(|&id| graph.reference(id))
            .filter(|reference| reference.is_current())
            .filter_map(|reference| reference.url.clone())
            .collect();

        let mut guard = FxHashSet::default();
        guard.insert(self.owner.clone());
        for dependency in candidates {
            if live.contains(&dependency) {
                continue;
            }
            graph.remove_edge(&self.owner, &dependency);
            if !graph.is_used(&dependency) {
                prune(graph, &dependency, &mut report, &mut guard);
            }
        }

        graph
            .references
            .retire(&self.previous_references, &self.references);
        report
    }

    /// Discard the collection: drop edges and references added since
    /// `start_collecting`. Previous references stay current.
    pub fn abort(self, graph: &mut UrlGraph) {
        let added: Vec<ResourceUrl> = graph
            .get(&self.owner)
            .map(|info| {
                info.dependencies
                    .iter()
                    .filter(|url| !self.previous_dependencies.contains(*url))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for dependency in added {
            graph.remove_edge(&self.owner, &dependency);
        }

        let fresh: Vec<ReferenceId> = self
            .references
            .iter()
            .filter(|id| !self.previous_references.contains(id))
            .copied()
            .collect();
        graph.references.retire(&fresh, &self.previous_references);
    }
}

/// Prune `url` and, recursively, the dependencies it leaves unused.
///
/// Pruned nodes lose their outgoing edges and get a fresh generation;
/// inline ones are deleted.
fn prune(
    graph: &mut UrlGraph,
    url: &ResourceUrl,
    report: &mut PruneReport,
    guard: &mut FxHashSet<ResourceUrl>,
) {
    if !guard.insert(url.clone()) {
        return;
    }
    let Some(info) = graph.get_mut(url) else {
        return;
    };
    if info.is_entry_point {
        return;
    }
    let dependencies = info.sorted_dependencies();
    let references = std::mem::take(&mut info.references);
    info.touch();

    for dependency in &dependencies {
        graph.remove_edge(url, dependency);
        if !graph.is_used(dependency) {
            prune(graph, dependency, report, guard);
        }
    }
    graph.references.retire(&references, &[]);

    graph.notify_pruned(url);
    report.pruned.push(url.clone());
    if graph.get(url).is_some_and(|info| info.is_inline) {
        graph.delete_url_info(url);
        report.deleted.push(url.clone());
    }
}
