//! Graph node: one resource identified by its canonical URL.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use rustc_hash::FxHashSet;
use serde::Serialize;

use super::{ReferenceId, ReferenceTrace};
use crate::core::ResourceUrl;
use crate::kitchen::KitchenError;
use crate::utils::mime;

// =============================================================================
// Content
// =============================================================================

/// Resource content, text or binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Binary(Vec<u8>),
}

impl Content {
    /// Build content from fetched bytes, decoding text content types as UTF-8.
    ///
    /// Bytes that are not valid UTF-8 stay binary whatever the content type says.
    pub fn from_bytes(bytes: Vec<u8>, content_type: &str) -> Self {
        if mime::is_text(content_type) {
            match String::from_utf8(bytes) {
                Ok(text) => Self::Text(text),
                Err(err) => Self::Binary(err.into_bytes()),
            }
        } else {
            Self::Binary(bytes)
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Lossy text view, for diagnostics.
    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

// =============================================================================
// Resource kinds
// =============================================================================

/// Kind of resource a node holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlType {
    Html,
    Css,
    JsModule,
    JsClassic,
    Json,
    WebManifest,
    Sourcemap,
    Directory,
    Other,
}

impl UrlType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::JsModule => "js_module",
            Self::JsClassic => "js_classic",
            Self::Json => "json",
            Self::WebManifest => "webmanifest",
            Self::Sourcemap => "sourcemap",
            Self::Directory => "directory",
            Self::Other => "other",
        }
    }

    /// Infer the kind from a content type. Scripts default to classic.
    pub fn from_content_type(content_type: &str) -> Self {
        match mime::essence(content_type) {
            mime::types::HTML => Self::Html,
            mime::types::CSS => Self::Css,
            mime::types::JAVASCRIPT | "application/javascript" => Self::JsClassic,
            mime::types::WEBMANIFEST => Self::WebManifest,
            mime::types::SOURCEMAP => Self::Sourcemap,
            mime::types::JSON => Self::Json,
            mime::types::DIRECTORY => Self::Directory,
            _ => Self::Other,
        }
    }

    #[inline]
    pub const fn is_js(self) -> bool {
        matches!(self, Self::JsModule | Self::JsClassic)
    }

    /// Extension used for generated (inline) urls of this kind.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::JsModule | Self::JsClassic => "js",
            Self::Json => "json",
            Self::WebManifest => "webmanifest",
            Self::Sourcemap => "map",
            Self::Directory | Self::Other => "txt",
        }
    }
}

impl fmt::Display for UrlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known subtypes.
pub mod subtype {
    pub const WORKER: &str = "worker";
    pub const SHARED_WORKER: &str = "shared_worker";
    pub const SERVICE_WORKER: &str = "service_worker";
}

/// Cooking state of a node.
///
/// `Errored` is absorbing for the current generation: only a fresh cook
/// (after the node is considered modified) leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CookState {
    Unresolved,
    Resolving,
    Fetching,
    Transforming,
    Finalizing,
    Cooked,
    Errored,
}

// =============================================================================
// UrlInfo
// =============================================================================

/// Location of an inline resource inside its owner.
#[derive(Debug, Clone)]
pub struct InlineUrlSite {
    /// Owner resource
    pub url: ResourceUrl,
    pub line: u32,
    pub column: u32,
    /// Content as captured from the owner
    pub content: Content,
}

/// One resource of the graph.
#[derive(Debug, Clone)]
pub struct UrlInfo {
    pub url: ResourceUrl,

    // Content state
    pub original_content: Option<Content>,
    pub content: Option<Content>,
    pub content_type: Option<String>,
    pub kind: UrlType,
    pub subtype: Option<String>,
    pub sourcemap: Option<String>,
    /// Sourcemap node owned by this resource (deleted with it)
    pub sourcemap_url: Option<ResourceUrl>,
    /// Set on sourcemap nodes: the resource owning them
    pub sourcemap_owner: Option<ResourceUrl>,

    // Graph state (edges change only through `DependencyCollection`)
    pub(crate) dependencies: FxHashSet<ResourceUrl>,
    pub(crate) dependents: FxHashSet<ResourceUrl>,
    pub(crate) implicit_urls: FxHashSet<ResourceUrl>,
    /// Current outgoing references, in discovery order
    pub(crate) references: Vec<ReferenceId>,
    pub is_entry_point: bool,
    pub is_inline: bool,
    pub is_external: bool,
    pub allows_directory: bool,
    pub inline_url_site: Option<InlineUrlSite>,

    // Lifecycle
    pub modified_generation: u64,
    pub modified_at: Option<SystemTime>,
    pub content_etag: Option<String>,
    pub state: CookState,
    pub error: Option<Arc<KitchenError>>,
    /// Trace of the reference that created this node
    pub first_trace: Option<ReferenceTrace>,
}

impl UrlInfo {
    pub(crate) fn new(url: ResourceUrl) -> Self {
        Self {
            url,
            original_content: None,
            content: None,
            content_type: None,
            kind: UrlType::Other,
            subtype: None,
            sourcemap: None,
            sourcemap_url: None,
            sourcemap_owner: None,
            dependencies: FxHashSet::default(),
            dependents: FxHashSet::default(),
            implicit_urls: FxHashSet::default(),
            references: Vec::new(),
            is_entry_point: false,
            is_inline: false,
            is_external: false,
            allows_directory: false,
            inline_url_site: None,
            modified_generation: 0,
            modified_at: None,
            content_etag: None,
            state: CookState::Unresolved,
            error: None,
            first_trace: None,
        }
    }

    /// URLs this resource references.
    pub fn dependencies(&self) -> &FxHashSet<ResourceUrl> {
        &self.dependencies
    }

    /// URLs of resources referencing this one.
    pub fn dependents(&self) -> &FxHashSet<ResourceUrl> {
        &self.dependents
    }

    /// Dependencies referenced implicitly (invalidation only).
    pub fn implicit_urls(&self) -> &FxHashSet<ResourceUrl> {
        &self.implicit_urls
    }

    /// Current outgoing references.
    pub fn references(&self) -> &[ReferenceId] {
        &self.references
    }

    /// Current content as text, if textual.
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Content::as_text)
    }

    #[inline]
    pub fn is_cooked(&self) -> bool {
        self.state == CookState::Cooked
    }

    /// Dependencies sorted by URL, for deterministic traversal.
    pub fn sorted_dependencies(&self) -> Vec<ResourceUrl> {
        let mut deps: Vec<_> = self.dependencies.iter().cloned().collect();
        deps.sort();
        deps
    }

    /// Mark as modified now.
    pub(crate) fn touch(&mut self) {
        self.modified_generation += 1;
        self.modified_at = Some(SystemTime::now());
    }
}
