//! Contexts handed to plugin hooks.

use super::resolve::resolve_reference;
use super::{HookError, HookResult, PluginController, TransformOutput};
use crate::core::{AbortSignal, BuildMode, ResourceUrl, generate_inline_url};
use crate::graph::{
    DependencyCollection, InlineSpec, ReferenceId, ReferenceSpec, UrlGraph, UrlInfo, UrlType,
};
use crate::utils::hash::ContentHash;

// =============================================================================
// KitchenContext
// =============================================================================

/// Settings shared by every hook call.
#[derive(Debug, Clone)]
pub struct KitchenContext {
    pub root_directory_url: ResourceUrl,
    pub mode: BuildMode,
    /// Accept references resolving to directories everywhere
    pub allow_directory_references: bool,
    pub signal: AbortSignal,
}

impl KitchenContext {
    pub fn new(root_directory_url: ResourceUrl, mode: BuildMode) -> Self {
        Self {
            root_directory_url,
            mode,
            allow_directory_references: false,
            signal: AbortSignal::new(),
        }
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = signal;
        self
    }

    pub fn allow_directory_references(mut self, allow: bool) -> Self {
        self.allow_directory_references = allow;
        self
    }

    #[inline]
    pub fn is_build(&self) -> bool {
        !self.mode.is_dev()
    }
}

// =============================================================================
// TransformContext
// =============================================================================

/// A reference reported during a transform, already resolved.
#[derive(Debug, Clone)]
pub struct FoundReference {
    pub id: ReferenceId,
    pub url: ResourceUrl,
    /// Text to write back at the usage site
    pub generated_specifier: String,
}

/// Access to the resource being transformed and its reference collection.
///
/// Holds the graph write lock for the whole transform phase.
pub struct TransformContext<'a> {
    url: ResourceUrl,
    graph: &'a mut UrlGraph,
    collection: &'a mut DependencyCollection,
    plugins: &'a PluginController,
    kitchen: &'a KitchenContext,
}

impl<'a> TransformContext<'a> {
    pub(crate) fn new(
        url: ResourceUrl,
        graph: &'a mut UrlGraph,
        collection: &'a mut DependencyCollection,
        plugins: &'a PluginController,
        kitchen: &'a KitchenContext,
    ) -> Self {
        Self {
            url,
            graph,
            collection,
            plugins,
            kitchen,
        }
    }

    #[inline]
    pub fn url(&self) -> &ResourceUrl {
        &self.url
    }

    pub fn url_info(&self) -> Option<&UrlInfo> {
        self.graph.get(&self.url)
    }

    /// Current content, if textual.
    pub fn text(&self) -> Option<&str> {
        self.url_info().and_then(UrlInfo::text)
    }

    pub fn kind(&self) -> UrlType {
        self.url_info().map_or(UrlType::Other, |info| info.kind)
    }

    pub fn subtype(&self) -> Option<&str> {
        self.url_info().and_then(|info| info.subtype.as_deref())
    }

    #[inline]
    pub fn context(&self) -> &KitchenContext {
        self.kitchen
    }

    #[inline]
    pub fn graph(&self) -> &UrlGraph {
        self.graph
    }

    /// References collected so far in this transform.
    pub fn references(&self) -> &[ReferenceId] {
        self.collection.references()
    }

    /// Report a reference found in the content.
    pub fn found_reference(&mut self, spec: ReferenceSpec) -> HookResult<FoundReference> {
        let id = self.graph.create_reference(self.url.clone(), spec);
        self.add(id)
    }

    /// Report an inline resource (e.g. `<script>` content).
    pub fn found_inline(&mut self, spec: InlineSpec) -> HookResult<FoundReference> {
        let inline_url = self.inline_url(&spec);
        let id = self
            .graph
            .references
            .create_inline(self.url.clone(), inline_url, spec);
        self.add(id)
    }

    /// Turn an existing reference into an inline resource.
    pub fn inline_reference(
        &mut self,
        existing: ReferenceId,
        spec: InlineSpec,
    ) -> HookResult<FoundReference> {
        let inline_url = self.inline_url(&spec);
        let id = self
            .graph
            .references
            .becomes_inline(existing, inline_url, spec)
            .ok_or_else(|| anyhow::anyhow!("reference {existing} is superseded"))?;
        let id = self.resolve(id)?;
        let url = self
            .collection
            .replace_reference(self.graph, existing, id)
            .ok_or_else(|| anyhow::anyhow!("inline reference {id} has no url"))?;
        Ok(self.found(id, url))
    }

    /// Replace the current content.
    pub(crate) fn apply(&mut self, output: TransformOutput) {
        let Some(info) = self.graph.get_mut(&self.url) else {
            return;
        };
        info.content_etag = Some(ContentHash::of(output.content.as_bytes()).to_hex());
        info.content = Some(output.content);
        if let Some(sourcemap) = output.sourcemap {
            let url = self.url.clone();
            self.graph.set_sourcemap(&url, sourcemap);
        }
    }

    // -------------------------------------------------------------------------
    // Private
    // -------------------------------------------------------------------------

    fn inline_url(&self, spec: &InlineSpec) -> ResourceUrl {
        generate_inline_url(
            &self.url,
            spec.line,
            spec.column,
            spec.expected_type.extension(),
        )
    }

    fn resolve(&mut self, id: ReferenceId) -> HookResult<ReferenceId> {
        resolve_reference(self.graph, self.plugins, self.kitchen, id)
            .map_err(|err| HookError::Kitchen(Box::new(err)))
    }

    fn add(&mut self, id: ReferenceId) -> HookResult<FoundReference> {
        let id = self.resolve(id)?;
        let url = self
            .collection
            .add_dependency(self.graph, id)
            .ok_or_else(|| anyhow::anyhow!("reference {id} has no url"))?;
        Ok(self.found(id, url))
    }

    fn found(&self, id: ReferenceId, url: ResourceUrl) -> FoundReference {
        let generated_specifier = self
            .graph
            .reference(id)
            .map(|reference| reference.emitted_specifier().to_string())
            .unwrap_or_else(|| url.to_string());
        FoundReference {
            id,
            url,
            generated_specifier,
        }
    }
}

// =============================================================================
// CookedContext
// =============================================================================

/// Access given to `cooked` hooks.
pub struct CookedContext<'a> {
    url: ResourceUrl,
    graph: &'a mut UrlGraph,
    kitchen: &'a KitchenContext,
}

impl<'a> CookedContext<'a> {
    pub(crate) fn new(url: ResourceUrl, graph: &'a mut UrlGraph, kitchen: &'a KitchenContext) -> Self {
        Self {
            url,
            graph,
            kitchen,
        }
    }

    #[inline]
    pub fn url(&self) -> &ResourceUrl {
        &self.url
    }

    pub fn url_info(&self) -> Option<&UrlInfo> {
        self.graph.get(&self.url)
    }

    #[inline]
    pub fn context(&self) -> &KitchenContext {
        self.kitchen
    }

    /// Run `callback` once, the next time this resource is pruned.
    pub fn on_pruned(&mut self, callback: impl FnOnce(&UrlInfo) + Send + Sync + 'static) {
        self.graph.register_pruned_callback(&self.url, callback);
    }
}
