//! Content versioning, bottom-up over the dependency graph.
//!
//! 1. Post-order DFS from the sorted entry points over sorted dependencies,
//!    so dependencies come first wherever the graph is acyclic.
//! 2. Each eligible resource hashes its line-ending-normalized content.
//! 3. Each non-external dependency folds in its version, or its content
//!    hash when it has none (not eligible, or not computed yet on a cycle).
//!    Inline dependencies are flattened into their own dependencies.
//!
//! The cycle fallback under-invalidates: a dependent of a cycle member
//! does not see a change that only affects the other member's
//! dependencies.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::core::{ResourceUrl, append_search_params};
use crate::graph::{ReferenceType, UrlGraph, UrlInfo, UrlType, subtype};
use crate::utils::hash::{ContentHash, normalize_line_endings};

/// Where the version goes in the output name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersioningMethod {
    /// `style.3f2a9c1e.css`
    #[default]
    Filename,
    /// `style.css?v=3f2a9c1e`
    SearchParam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersioningOptions {
    pub method: VersioningMethod,
    /// Hex chars kept from the hash
    pub length: usize,
}

impl Default for VersioningOptions {
    fn default() -> Self {
        Self {
            method: VersioningMethod::Filename,
            length: 8,
        }
    }
}

impl VersioningOptions {
    /// Versioned form of a build path.
    pub fn versioned_path(&self, path: &str, version: &str) -> String {
        match self.method {
            VersioningMethod::Filename => with_version_suffix(path, version),
            VersioningMethod::SearchParam => {
                append_search_params(path, &[("v".to_string(), version.to_string())])
            }
        }
    }

    /// File written for a versioned build path (the search form keeps its name).
    pub fn versioned_file(&self, path: &str, version: &str) -> String {
        match self.method {
            VersioningMethod::Filename => with_version_suffix(path, version),
            VersioningMethod::SearchParam => path.to_string(),
        }
    }
}

/// `assets/style.css` + `abc` → `assets/style.abc.css`
fn with_version_suffix(path: &str, version: &str) -> String {
    let name_start = path.rfind('/').map_or(0, |pos| pos + 1);
    let (dir, name) = path.split_at(name_start);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{dir}{stem}.{version}.{ext}"),
        _ => format!("{dir}{name}.{version}"),
    }
}

// =============================================================================
// Versions
// =============================================================================

/// Version of every eligible resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Versions {
    versions: FxHashMap<ResourceUrl, String>,
    /// Post-order used to compute them
    order: Vec<ResourceUrl>,
}

impl Versions {
    pub fn get(&self, url: &ResourceUrl) -> Option<&str> {
        self.versions.get(url).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Versioned URLs in computation order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceUrl, &str)> {
        self.order
            .iter()
            .filter_map(|url| self.versions.get_key_value(url))
            .map(|(url, version)| (url, version.as_str()))
    }
}

/// Whether `info` gets a version.
pub fn is_versionable(graph: &UrlGraph, info: &UrlInfo) -> bool {
    if info.is_entry_point
        || info.is_external
        || info.is_inline
        || info.content.is_none()
        || info.sourcemap_owner.is_some()
        || matches!(
            info.kind,
            UrlType::WebManifest | UrlType::Sourcemap | UrlType::Directory
        )
    {
        return false;
    }
    if info.subtype.as_deref() == Some(subtype::SERVICE_WORKER) && is_worker_entry(graph, info) {
        return false;
    }
    graph.is_used(&info.url)
}

/// Registered as a worker: the URL must stay stable across builds.
fn is_worker_entry(graph: &UrlGraph, info: &UrlInfo) -> bool {
    info.dependents().iter().any(|dependent| {
        graph.references_of(dependent.as_str()).any(|reference| {
            reference.kind == ReferenceType::JsWorker && reference.url.as_ref() == Some(&info.url)
        })
    })
}

/// Compute versions for the whole graph.
pub fn compute_versions(graph: &UrlGraph, options: &VersioningOptions) -> Versions {
    let order = post_order(graph);
    let mut versions: FxHashMap<ResourceUrl, String> = FxHashMap::default();

    for url in &order {
        let Some(info) = graph.get(url) else {
            continue;
        };
        if !is_versionable(graph, info) {
            continue;
        }
        let version = hash_resource(graph, info, &versions).short(options.length);
        crate::debug!("version"; "{} -> {}", url, version);
        versions.insert(url.clone(), version);
    }

    Versions { versions, order }
}

fn hash_resource(
    graph: &UrlGraph,
    info: &UrlInfo,
    versions: &FxHashMap<ResourceUrl, String>,
) -> ContentHash {
    let mut hasher = blake3::Hasher::new();
    if let Some(content) = &info.content {
        hasher.update(&normalize_line_endings(content.as_bytes()));
    }

    let mut seen = FxHashSet::default();
    seen.insert(info.url.clone());
    for dependency in flattened_dependencies(graph, info, &mut seen) {
        let Some(dep) = graph.get(&dependency) else {
            continue;
        };
        let folded = match versions.get(&dependency) {
            Some(version) => version.clone(),
            None => dep
                .content
                .as_ref()
                .map(|content| ContentHash::of(&*normalize_line_endings(content.as_bytes())).to_hex())
                .unwrap_or_default(),
        };
        hasher.update(b"\n");
        hasher.update(folded.as_bytes());
    }

    ContentHash::new(*hasher.finalize().as_bytes())
}

/// Sorted non-external dependencies, inline ones replaced by theirs.
fn flattened_dependencies(
    graph: &UrlGraph,
    info: &UrlInfo,
    seen: &mut FxHashSet<ResourceUrl>,
) -> Vec<ResourceUrl> {
    let mut out = Vec::new();
    for dependency in info.sorted_dependencies() {
        if !seen.insert(dependency.clone()) {
            continue;
        }
        let Some(dep) = graph.get(&dependency) else {
            continue;
        };
        if dep.is_external {
            continue;
        }
        if dep.is_inline {
            out.extend(flattened_dependencies(graph, dep, seen));
        } else {
            out.push(dependency);
        }
    }
    out
}

/// Dependencies before dependents, from the sorted entry points.
fn post_order(graph: &UrlGraph) -> Vec<ResourceUrl> {
    let children = |url: &ResourceUrl| -> Vec<ResourceUrl> {
        let mut deps = graph
            .get(url)
            .map(UrlInfo::sorted_dependencies)
            .unwrap_or_default();
        deps.reverse();
        deps
    };

    let mut order = Vec::new();
    let mut visited: FxHashSet<ResourceUrl> = FxHashSet::default();
    for entry in graph.entry_points() {
        if !visited.insert(entry.clone()) {
            continue;
        }
        let mut stack = vec![(entry.clone(), children(&entry))];
        while let Some((_, pending)) = stack.last_mut() {
            match pending.pop() {
                Some(next) => {
                    if visited.insert(next.clone()) {
                        let deps = children(&next);
                        stack.push((next, deps));
                    }
                }
                None => {
                    if let Some((done, _)) = stack.pop() {
                        order.push(done);
                    }
                }
            }
        }
    }
    order
}
