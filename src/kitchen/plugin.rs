//! Plugin contract and ordered dispatch.
//!
//! A plugin implements the hooks it declares in [`Plugin::hooks`]; every
//! other hook keeps its no-op default. [`PluginController`] calls plugins in
//! registration order, either first-wins (`call_first`) or all (`call_all`).

use std::fmt;
use std::sync::Arc;

use super::{CookedContext, HookError, HookResult, KitchenContext, TransformContext};
use crate::build::{BundleContext, BundleOutput};
use crate::core::ResourceUrl;
use crate::graph::{Content, Reference, UrlInfo, UrlType};
use crate::utils::mime;

// =============================================================================
// Hook names
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    ResolveReference,
    RedirectReference,
    TransformReferenceSearchParams,
    FormatReference,
    FetchUrlContent,
    TransformUrlContent,
    FinalizeUrlContent,
    Cooked,
    Bundle,
}

impl HookName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResolveReference => "resolve_reference",
            Self::RedirectReference => "redirect_reference",
            Self::TransformReferenceSearchParams => "transform_reference_search_params",
            Self::FormatReference => "format_reference",
            Self::FetchUrlContent => "fetch_url_content",
            Self::TransformUrlContent => "transform_url_content",
            Self::FinalizeUrlContent => "finalize_url_content",
            Self::Cooked => "cooked",
            Self::Bundle => "bundle",
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Hook payloads
// =============================================================================

/// Result of `fetch_url_content`.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub content: Content,
    pub content_type: String,
    /// Overrides the kind inferred from the content type
    pub kind: Option<UrlType>,
    pub subtype: Option<String>,
    pub sourcemap: Option<String>,
    /// The URL designates a directory
    pub is_directory: bool,
}

impl FetchedContent {
    pub fn new(content: impl Into<Content>, content_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: content_type.into(),
            kind: None,
            subtype: None,
            sourcemap: None,
            is_directory: false,
        }
    }

    /// Decode `bytes` according to `content_type`.
    pub fn from_bytes(bytes: Vec<u8>, content_type: &str) -> Self {
        Self::new(Content::from_bytes(bytes, content_type), content_type)
    }

    /// Directory listing, one entry per line.
    pub fn directory(entries: &[String]) -> Self {
        let mut fetched = Self::new(entries.join("\n"), mime::types::DIRECTORY);
        fetched.kind = Some(UrlType::Directory);
        fetched.is_directory = true;
        fetched
    }

    pub fn with_kind(mut self, kind: UrlType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_sourcemap(mut self, sourcemap: impl Into<String>) -> Self {
        self.sourcemap = Some(sourcemap.into());
        self
    }
}

/// New content returned by `transform_url_content`.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub content: Content,
    pub sourcemap: Option<String>,
}

impl TransformOutput {
    pub fn new(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            sourcemap: None,
        }
    }
}

// =============================================================================
// Plugin
// =============================================================================

/// A pipeline plugin.
///
/// Hooks are synchronous and run inside a cook phase; they must not block on
/// other cooks.
#[allow(unused_variables)]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Hooks implemented by this plugin.
    fn hooks(&self) -> &'static [HookName];

    /// Produce the URL of an unresolved reference. First plugin wins.
    fn resolve_reference(
        &self,
        reference: &Reference,
        ctx: &KitchenContext,
    ) -> HookResult<Option<ResourceUrl>> {
        Ok(None)
    }

    /// Replace the resolved URL. Every plugin gets a chance.
    fn redirect_reference(
        &self,
        reference: &Reference,
        ctx: &KitchenContext,
    ) -> HookResult<Option<ResourceUrl>> {
        Ok(None)
    }

    /// Extra search params, appended to the generated URL only.
    fn transform_reference_search_params(
        &self,
        reference: &Reference,
        ctx: &KitchenContext,
    ) -> HookResult<Vec<(String, String)>> {
        Ok(Vec::new())
    }

    /// Text to emit at the usage site. First plugin wins.
    fn format_reference(
        &self,
        reference: &Reference,
        ctx: &KitchenContext,
    ) -> HookResult<Option<String>> {
        Ok(None)
    }

    /// Load the content of a resource. First plugin wins.
    fn fetch_url_content(
        &self,
        url_info: &UrlInfo,
        ctx: &KitchenContext,
    ) -> HookResult<Option<FetchedContent>> {
        Ok(None)
    }

    /// Report references and optionally return new content.
    fn transform_url_content(
        &self,
        ctx: &mut TransformContext<'_>,
    ) -> HookResult<Option<TransformOutput>> {
        Ok(None)
    }

    fn finalize_url_content(
        &self,
        url_info: &UrlInfo,
        ctx: &KitchenContext,
    ) -> HookResult<Option<Content>> {
        Ok(None)
    }

    fn cooked(&self, ctx: &mut CookedContext<'_>) -> HookResult<()> {
        Ok(())
    }

    /// Process every resource of one kind at once (build only).
    fn bundle(
        &self,
        url_infos: &[&UrlInfo],
        ctx: &mut BundleContext,
    ) -> HookResult<Vec<BundleOutput>> {
        Ok(Vec::new())
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Hook failure attributed to a plugin.
#[derive(Debug)]
pub struct HookFailure {
    pub plugin: String,
    pub error: HookError,
}

/// Ordered plugin dispatch.
#[derive(Clone, Default)]
pub struct PluginController {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl fmt::Debug for PluginController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|plugin| plugin.name()))
            .finish()
    }
}

impl PluginController {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    #[inline]
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    /// Plugins declaring `hook`, in order.
    pub fn with_hook(&self, hook: HookName) -> impl Iterator<Item = &dyn Plugin> {
        self.plugins
            .iter()
            .filter(move |plugin| plugin.hooks().contains(&hook))
            .map(|plugin| plugin.as_ref())
    }

    /// Call plugins until one returns `Some`. Returns the value and the
    /// name of the plugin that produced it.
    pub fn call_first<T>(
        &self,
        hook: HookName,
        mut call: impl FnMut(&dyn Plugin) -> HookResult<Option<T>>,
    ) -> Result<Option<(T, String)>, HookFailure> {
        for plugin in self.with_hook(hook) {
            match call(plugin) {
                Ok(Some(value)) => return Ok(Some((value, plugin.name().to_string()))),
                Ok(None) => {}
                Err(error) => {
                    return Err(HookFailure {
                        plugin: plugin.name().to_string(),
                        error,
                    });
                }
            }
        }
        Ok(None)
    }

    /// Call every plugin in order, stopping at the first error.
    pub fn call_all(
        &self,
        hook: HookName,
        mut call: impl FnMut(&dyn Plugin) -> HookResult<()>,
    ) -> Result<(), HookFailure> {
        for plugin in self.with_hook(hook) {
            call(plugin).map_err(|error| HookFailure {
                plugin: plugin.name().to_string(),
                error,
            })?;
        }
        Ok(())
    }
}
