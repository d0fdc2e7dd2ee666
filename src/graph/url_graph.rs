//! The URL graph: one [`UrlInfo`] per canonical URL plus the reference log.
//!
//! # Invariants
//! - `A.dependencies ∋ B` ⇔ `B.dependents ∋ A`
//! - Edges are only added or removed through `DependencyCollection`
//!   (and detached wholesale by `delete_url_info`)
//! - Entry points are never pruned

use std::collections::VecDeque;
use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use rustc_hash::{FxHashMap, FxHashSet};

use super::{
    Content, InlineUrlSite, Reference, ReferenceId, ReferenceLog, ReferenceSpec, ReferenceType,
    UrlInfo, UrlType,
};
use crate::core::ResourceUrl;
use crate::utils::mime;

/// Observer called for every node of a given lifecycle event.
pub type UrlInfoObserver = Box<dyn Fn(&UrlInfo) + Send + Sync>;

/// One-shot callback fired when a specific node is pruned.
pub type PrunedCallback = Box<dyn FnOnce(&UrlInfo) + Send + Sync>;

/// Characters re-encoded when matching a request back to a specifier.
const SPECIFIER_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub struct UrlGraph {
    root_directory_url: ResourceUrl,
    url_infos: FxHashMap<ResourceUrl, UrlInfo>,
    pub(crate) references: ReferenceLog,
    created_observers: Vec<UrlInfoObserver>,
    pruned_observers: Vec<UrlInfoObserver>,
    pruned_callbacks: FxHashMap<ResourceUrl, Vec<PrunedCallback>>,
}

impl fmt::Debug for UrlGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlGraph")
            .field("root_directory_url", &self.root_directory_url)
            .field("url_infos", &self.url_infos.len())
            .field("references", &self.references.len())
            .finish_non_exhaustive()
    }
}

impl UrlGraph {
    pub fn new(root_directory_url: ResourceUrl) -> Self {
        Self {
            root_directory_url,
            url_infos: FxHashMap::default(),
            references: ReferenceLog::new(),
            created_observers: Vec::new(),
            pruned_observers: Vec::new(),
            pruned_callbacks: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn root_directory_url(&self) -> &ResourceUrl {
        &self.root_directory_url
    }

    // =========================================================================
    // Node access
    // =========================================================================

    #[inline]
    pub fn len(&self) -> usize {
        self.url_infos.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.url_infos.is_empty()
    }

    #[inline]
    pub fn contains(&self, url: &(impl AsRef<str> + ?Sized)) -> bool {
        self.url_infos.contains_key(url.as_ref())
    }

    #[inline]
    pub fn get(&self, url: &(impl AsRef<str> + ?Sized)) -> Option<&UrlInfo> {
        self.url_infos.get(url.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, url: &(impl AsRef<str> + ?Sized)) -> Option<&mut UrlInfo> {
        self.url_infos.get_mut(url.as_ref())
    }

    /// All nodes, in arbitrary order.
    pub fn url_infos(&self) -> impl Iterator<Item = &UrlInfo> {
        self.url_infos.values()
    }

    /// All URLs, sorted.
    pub fn sorted_urls(&self) -> Vec<ResourceUrl> {
        let mut urls: Vec<_> = self.url_infos.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Entry points, sorted.
    pub fn entry_points(&self) -> Vec<ResourceUrl> {
        let mut entries: Vec<_> = self
            .url_infos
            .values()
            .filter(|info| info.is_entry_point)
            .map(|info| info.url.clone())
            .collect();
        entries.sort();
        entries
    }

    /// Mark `url` as an entry point, creating its node if needed.
    pub fn add_entry_point(&mut self, url: ResourceUrl) -> &mut UrlInfo {
        self.ensure_url_info(&url);
        let info = self
            .url_infos
            .entry(url.clone())
            .or_insert_with(|| UrlInfo::new(url));
        info.is_entry_point = true;
        info
    }

    // =========================================================================
    // References
    // =========================================================================

    #[inline]
    pub fn reference(&self, id: ReferenceId) -> Option<&Reference> {
        self.references.get(id)
    }

    #[inline]
    pub fn reference_log(&self) -> &ReferenceLog {
        &self.references
    }

    /// Publish a reference found in `owner`.
    pub fn create_reference(&mut self, owner: ResourceUrl, spec: ReferenceSpec) -> ReferenceId {
        self.references.create(owner, spec)
    }

    /// Publish an entry point reference, owned by the root directory.
    ///
    /// Replaces the entry references published earlier for `specifier`.
    pub fn create_entry_reference(&mut self, specifier: &str) -> ReferenceId {
        let owner = self.root_directory_url.clone();
        let previous = self.references.entry_references(specifier);
        let id = self
            .references
            .create(owner, ReferenceSpec::new(ReferenceType::EntryPoint, specifier));
        self.references.retire(&previous, &[id]);
        id
    }

    /// Current outgoing references of `url`.
    pub fn references_of<'a>(&'a self, url: &str) -> impl Iterator<Item = &'a Reference> + use<'a> {
        self.url_infos
            .get(url)
            .into_iter()
            .flat_map(|info| info.references.iter())
            .filter_map(|id| self.references.get(*id))
    }

    /// Match an incoming specifier back to a reference of `parent_url`.
    ///
    /// Known specifiers are compared both raw and re-encoded.
    pub fn infer_reference(
        &self,
        specifier: &str,
        parent_url: &(impl AsRef<str> + ?Sized),
    ) -> Option<ReferenceId> {
        let encoded = encode_specifier(specifier);
        self.references_of(parent_url.as_ref())
            .find(|reference| {
                let candidates = [
                    Some(reference.specifier.as_str()),
                    reference.generated_specifier.as_deref(),
                ];
                candidates.into_iter().flatten().any(|known| {
                    known == specifier || encode_specifier(known) == encoded
                })
            })
            .map(|reference| reference.id)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Return the node for the reference's URL, creating it on first sight.
    ///
    /// The node is (re)initialized from the reference: entry flag, inline
    /// site and snapshot, expected type. Inline snapshots are taken only when
    /// the node has none. Only `file:` and inline resources are fetched;
    /// anything else is external.
    pub fn reuse_or_create_url_info(&mut self, id: ReferenceId) -> Option<ResourceUrl> {
        let reference = self.references.get(id)?.clone();
        let url = reference.url.clone()?;

        if !self.url_infos.contains_key(&url) {
            let mut info = UrlInfo::new(url.clone());
            info.first_trace = Some(reference.trace.clone());
            for observer in &self.created_observers {
                observer(&info);
            }
            self.url_infos.insert(url.clone(), info);
        }

        let info = self.url_infos.get_mut(&url)?;
        if reference.is_entry_point {
            info.is_entry_point = true;
        }
        info.allows_directory |= reference.allows_directory;
        info.is_external = !reference.is_inline && !url.is_file();

        if let Some(expected) = reference.expected_type
            && info.content.is_none()
        {
            info.kind = expected;
        }
        if reference.expected_subtype.is_some() && info.subtype.is_none() {
            info.subtype.clone_from(&reference.expected_subtype);
        }

        if reference.is_inline {
            info.is_inline = true;
            if info.original_content.is_none() {
                let content = reference.content.clone().unwrap_or_else(|| Content::from(""));
                info.content_type.clone_from(&reference.content_type);
                info.inline_url_site = Some(InlineUrlSite {
                    url: reference.owner.clone(),
                    line: reference.trace.line.unwrap_or(0),
                    column: reference.trace.column.unwrap_or(0),
                    content: content.clone(),
                });
                info.original_content = Some(content);
            }
        }

        Some(url)
    }

    /// Attach a sourcemap to `owner` as an owned node `<owner>.map`.
    pub fn set_sourcemap(&mut self, owner: &ResourceUrl, sourcemap: String) -> Option<ResourceUrl> {
        let map_url = ResourceUrl::new(format!("{}.map", owner.without_search_and_hash()));
        {
            let info = self.url_infos.get_mut(owner)?;
            info.sourcemap = Some(sourcemap.clone());
            info.sourcemap_url = Some(map_url.clone());
        }

        self.ensure_url_info(&map_url);
        let map = self.url_infos.get_mut(&map_url)?;
        map.kind = UrlType::Sourcemap;
        map.content_type = Some(mime::types::SOURCEMAP.to_string());
        map.sourcemap_owner = Some(owner.clone());
        map.original_content = Some(Content::Text(sourcemap.clone()));
        map.content = Some(Content::Text(sourcemap));
        map.touch();
        Some(map_url)
    }

    /// Remove a node, detaching every edge. Cascades to its owned sourcemap.
    pub fn delete_url_info(&mut self, url: &(impl AsRef<str> + ?Sized)) -> Option<UrlInfo> {
        let url = url.as_ref();
        let info = self.url_infos.remove(url)?;

        for dependency in &info.dependencies {
            if let Some(target) = self.url_infos.get_mut(dependency) {
                target.dependents.remove(url);
            }
        }
        for dependent in &info.dependents {
            if let Some(source) = self.url_infos.get_mut(dependent) {
                source.dependencies.remove(url);
                source.implicit_urls.remove(url);
            }
        }

        self.references.retire(&info.references, &[]);
        self.pruned_callbacks.remove(url);

        if let Some(map_url) = &info.sourcemap_url
            && map_url.as_str() != url
        {
            self.delete_url_info(map_url.as_str());
        }
        Some(info)
    }

    /// Mark `url` modified: bump its generation and propagate to inline
    /// children, inline owner and implicit dependents.
    ///
    /// Inline snapshots are cleared so the next discovery re-takes them.
    pub fn consider_modified(&mut self, url: &(impl AsRef<str> + ?Sized)) -> Vec<ResourceUrl> {
        let url = url.as_ref();
        let mut visited: FxHashSet<ResourceUrl> = FxHashSet::default();
        let mut stack: Vec<ResourceUrl> = match self.url_infos.get_key_value(url) {
            Some((key, _)) => vec![key.clone()],
            None => return Vec::new(),
        };

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(info) = self.url_infos.get_mut(&current) else {
                continue;
            };
            info.touch();
            if info.is_inline {
                info.original_content = None;
            }
            if let Some(site) = &info.inline_url_site {
                stack.push(site.url.clone());
            }
            let dependencies: Vec<_> = info.dependencies.iter().cloned().collect();
            let dependents: Vec<_> = info.dependents.iter().cloned().collect();

            for dependency in dependencies {
                if self.url_infos.get(&dependency).is_some_and(|d| d.is_inline) {
                    stack.push(dependency);
                }
            }
            for dependent in dependents {
                if self
                    .url_infos
                    .get(&dependent)
                    .is_some_and(|d| d.implicit_urls.contains(&current))
                {
                    stack.push(dependent);
                }
            }
        }

        let mut modified: Vec<_> = visited.into_iter().collect();
        modified.sort();
        modified
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Upward BFS over dependents for the first node matching `predicate`.
    pub fn find_dependent(
        &self,
        url: &(impl AsRef<str> + ?Sized),
        predicate: impl Fn(&UrlInfo) -> bool,
    ) -> Option<ResourceUrl> {
        let start = self.url_infos.get(url.as_ref())?;
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        visited.insert(start.url.as_str());
        let mut queue: VecDeque<&ResourceUrl> = start.dependents.iter().collect();

        while let Some(dependent) = queue.pop_front() {
            if !visited.insert(dependent.as_str()) {
                continue;
            }
            let Some(info) = self.url_infos.get(dependent) else {
                continue;
            };
            if predicate(info) {
                return Some(info.url.clone());
            }
            queue.extend(info.dependents.iter());
        }
        None
    }

    /// Entry point, owned sourcemap of a live owner, or the target of a
    /// current, non-weak reference of some dependent.
    pub fn is_used(&self, url: &(impl AsRef<str> + ?Sized)) -> bool {
        let url = url.as_ref();
        let Some(info) = self.url_infos.get(url) else {
            return false;
        };
        if info.is_entry_point {
            return true;
        }
        if let Some(owner) = &info.sourcemap_owner
            && self.url_infos.contains_key(owner)
        {
            return true;
        }
        info.dependents
            .iter()
            .any(|dependent| self.has_strong_reference(dependent.as_str(), url))
    }

    /// Nodes reachable from entry points through used edges.
    pub fn reachable(&self) -> FxHashSet<ResourceUrl> {
        let mut reached: FxHashSet<ResourceUrl> = FxHashSet::default();
        let mut stack = self.entry_points();

        while let Some(url) = stack.pop() {
            if !reached.insert(url.clone()) {
                continue;
            }
            let Some(info) = self.url_infos.get(&url) else {
                continue;
            };
            if let Some(map_url) = &info.sourcemap_url {
                stack.push(map_url.clone());
            }
            for reference in self.references_of(url.as_str()) {
                if reference.is_current()
                    && !reference.is_weak()
                    && let Some(target) = &reference.url
                    && self.url_infos.contains_key(target)
                {
                    stack.push(target.clone());
                }
            }
        }
        reached
    }

    /// Delete every node not reachable from an entry point.
    pub fn prune_unreachable(&mut self) -> Vec<ResourceUrl> {
        let reached = self.reachable();
        let unreachable: Vec<ResourceUrl> = self
            .sorted_urls()
            .into_iter()
            .filter(|url| !reached.contains(url))
            .collect();

        for url in &unreachable {
            self.notify_pruned(url);
            self.delete_url_info(url);
        }
        unreachable
    }

    // =========================================================================
    // Observers
    // =========================================================================

    pub fn on_url_info_created(&mut self, observer: impl Fn(&UrlInfo) + Send + Sync + 'static) {
        self.created_observers.push(Box::new(observer));
    }

    pub fn on_url_info_pruned(&mut self, observer: impl Fn(&UrlInfo) + Send + Sync + 'static) {
        self.pruned_observers.push(Box::new(observer));
    }

    /// Register a one-shot callback fired the next time `url` is pruned.
    pub fn register_pruned_callback(
        &mut self,
        url: &ResourceUrl,
        callback: impl FnOnce(&UrlInfo) + Send + Sync + 'static,
    ) {
        self.pruned_callbacks
            .entry(url.clone())
            .or_default()
            .push(Box::new(callback));
    }

    pub(crate) fn notify_pruned(&mut self, url: &(impl AsRef<str> + ?Sized)) {
        let url = url.as_ref();
        let callbacks = self.pruned_callbacks.remove(url).unwrap_or_default();
        let Some(info) = self.url_infos.get(url) else {
            return;
        };
        for callback in callbacks {
            callback(info);
        }
        for observer in &self.pruned_observers {
            observer(info);
        }
    }

    // =========================================================================
    // Edges (collector only)
    // =========================================================================

    pub(super) fn add_edge(&mut self, from: &ResourceUrl, to: &ResourceUrl, implicit: bool) {
        if !self.url_infos.contains_key(from) || !self.url_infos.contains_key(to) {
            return;
        }
        if let Some(source) = self.url_infos.get_mut(from) {
            source.dependencies.insert(to.clone());
            if implicit {
                source.implicit_urls.insert(to.clone());
            }
        }
        if let Some(target) = self.url_infos.get_mut(to) {
            target.dependents.insert(from.clone());
        }
    }

    pub(super) fn remove_edge(
        &mut self,
        from: &(impl AsRef<str> + ?Sized),
        to: &(impl AsRef<str> + ?Sized),
    ) {
        let (from, to) = (from.as_ref(), to.as_ref());
        if let Some(source) = self.url_infos.get_mut(from) {
            source.dependencies.remove(to);
            source.implicit_urls.remove(to);
        }
        if let Some(target) = self.url_infos.get_mut(to) {
            target.dependents.remove(from);
        }
    }

    // -------------------------------------------------------------------------
    // Private
    // -------------------------------------------------------------------------

    fn ensure_url_info(&mut self, url: &ResourceUrl) {
        if self.url_infos.contains_key(url) {
            return;
        }
        let info = UrlInfo::new(url.clone());
        for observer in &self.created_observers {
            observer(&info);
        }
        self.url_infos.insert(url.clone(), info);
    }

    fn has_strong_reference(&self, dependent: &str, target: &str) -> bool {
        self.references_of(dependent).any(|reference| {
            reference.is_current()
                && !reference.is_weak()
                && reference.url.as_ref().is_some_and(|url| url.as_str() == target)
        })
    }
}

fn encode_specifier(specifier: &str) -> String {
    let decoded = percent_encoding::percent_decode_str(specifier).decode_utf8_lossy();
    utf8_percent_encode(&decoded, SPECIFIER_ENCODE_SET).to_string()
}
