//! References: usage sites of a URL inside an owner resource.
//!
//! A reference is a fact ("this owner, at this location, used this
//! specifier"), not an edge to a target. References are stored in an
//! append-only [`ReferenceLog`]:
//!
//! - `redirect` and `becomes_inline` push a successor and link it through
//!   `prev` / `next` / `original`
//! - identity fields of a published reference never change
//! - only resolve outputs (`url`, `generated_url`, `generated_specifier`)
//!   are written after publication

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use super::{Content, UrlType};
use crate::core::ResourceUrl;

// =============================================================================
// Identity & classification
// =============================================================================

/// Handle into the [`ReferenceLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceId(u32);

impl ReferenceId {
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Syntactic origin of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceType {
    EntryPoint,
    /// `<link href>`, `<a href>`
    HtmlHref,
    /// `<script src>`, `<img src>`, `<source src>`
    HtmlSrc,
    /// Inline `<script>` / `<style>` content
    HtmlInlineContent,
    CssImport,
    CssUrl,
    JsImport,
    JsDynamicImport,
    /// `new URL("./x", import.meta.url)`
    JsUrl,
    /// `new Worker(..)`, `serviceWorker.register(..)`
    JsWorker,
    Sourcemap,
    /// Created by a plugin, not found in source
    Injected,
}

impl ReferenceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EntryPoint => "entry_point",
            Self::HtmlHref => "html_href",
            Self::HtmlSrc => "html_src",
            Self::HtmlInlineContent => "html_inline_content",
            Self::CssImport => "css_import",
            Self::CssUrl => "css_url",
            Self::JsImport => "js_import",
            Self::JsDynamicImport => "js_dynamic_import",
            Self::JsUrl => "js_url",
            Self::JsWorker => "js_worker",
            Self::Sourcemap => "sourcemap",
            Self::Injected => "injected",
        }
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source location of a reference, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTrace {
    pub url: ResourceUrl,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ReferenceTrace {
    pub fn new(url: ResourceUrl) -> Self {
        Self {
            url,
            line: None,
            column: None,
        }
    }
}

impl fmt::Display for ReferenceTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Reference
// =============================================================================

/// One usage site of a URL inside an owner resource.
#[derive(Debug, Clone)]
pub struct Reference {
    pub id: ReferenceId,
    pub owner: ResourceUrl,
    pub specifier: String,
    pub kind: ReferenceType,
    pub subtype: Option<String>,
    pub expected_type: Option<UrlType>,
    pub expected_subtype: Option<String>,
    pub trace: ReferenceTrace,

    pub is_inline: bool,
    pub is_entry_point: bool,
    /// Affects invalidation only, never counts as a usage
    pub is_implicit: bool,
    pub injected: bool,
    /// Weak hint (preload, prefetch): never makes its target used
    pub is_resource_hint: bool,
    /// Emitted text must be looked up at runtime after versioning
    pub needs_runtime_lookup: bool,
    pub allows_directory: bool,

    /// Inline content and its type (inline references only)
    pub content: Option<Content>,
    pub content_type: Option<String>,

    // Resolve outputs
    pub url: Option<ResourceUrl>,
    pub generated_url: Option<ResourceUrl>,
    pub generated_specifier: Option<String>,
    pub search_params: Vec<(String, String)>,

    // History
    pub prev: Option<ReferenceId>,
    pub next: Option<ReferenceId>,
    pub original: Option<ReferenceId>,
}

impl Reference {
    /// Not superseded by a redirect or an inline replacement.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.next.is_none()
    }

    /// Never counts as a usage of its target.
    #[inline]
    pub fn is_weak(&self) -> bool {
        self.is_resource_hint || self.is_implicit
    }

    /// Text to emit at the usage site.
    pub fn emitted_specifier(&self) -> &str {
        self.generated_specifier.as_deref().unwrap_or(&self.specifier)
    }
}

/// Description of a reference found by a plugin.
#[derive(Debug, Clone)]
pub struct ReferenceSpec {
    pub kind: ReferenceType,
    pub specifier: String,
    pub subtype: Option<String>,
    pub expected_type: Option<UrlType>,
    pub expected_subtype: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub is_implicit: bool,
    pub injected: bool,
    pub is_resource_hint: bool,
    pub needs_runtime_lookup: bool,
    pub allows_directory: bool,
}

impl ReferenceSpec {
    pub fn new(kind: ReferenceType, specifier: impl Into<String>) -> Self {
        Self {
            kind,
            specifier: specifier.into(),
            subtype: None,
            expected_type: None,
            expected_subtype: None,
            line: None,
            column: None,
            is_implicit: false,
            injected: kind == ReferenceType::Injected,
            is_resource_hint: false,
            needs_runtime_lookup: false,
            allows_directory: false,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn expected_type(mut self, kind: UrlType) -> Self {
        self.expected_type = Some(kind);
        self
    }

    pub fn expected_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.expected_subtype = Some(subtype.into());
        self
    }

    pub fn subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn resource_hint(mut self) -> Self {
        self.is_resource_hint = true;
        self
    }

    pub fn implicit(mut self) -> Self {
        self.is_implicit = true;
        self
    }

    pub fn runtime_lookup(mut self) -> Self {
        self.needs_runtime_lookup = true;
        self
    }

    pub fn allow_directory(mut self) -> Self {
        self.allows_directory = true;
        self
    }
}

/// Description of an inline resource found by a plugin.
#[derive(Debug, Clone)]
pub struct InlineSpec {
    pub kind: ReferenceType,
    pub expected_type: UrlType,
    pub expected_subtype: Option<String>,
    pub content_type: String,
    pub content: Content,
    pub line: u32,
    pub column: u32,
}

impl InlineSpec {
    pub fn new(
        kind: ReferenceType,
        expected_type: UrlType,
        content_type: impl Into<String>,
        content: impl Into<Content>,
        line: u32,
        column: u32,
    ) -> Self {
        Self {
            kind,
            expected_type,
            expected_subtype: None,
            content_type: content_type.into(),
            content: content.into(),
            line,
            column,
        }
    }
}

// =============================================================================
// ReferenceLog
// =============================================================================

/// Append-only store of references.
///
/// Entries are only removed as whole histories, once no current reference
/// of their owner descends from them.
#[derive(Debug, Default)]
pub struct ReferenceLog {
    entries: FxHashMap<ReferenceId, Reference>,
    next_id: u32,
}

impl ReferenceLog {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, id: ReferenceId) -> Option<&Reference> {
        self.entries.get(&id)
    }

    /// Publish a new reference owned by `owner`.
    pub fn create(&mut self, owner: ResourceUrl, spec: ReferenceSpec) -> ReferenceId {
        let id = self.allocate();
        let trace = ReferenceTrace {
            url: owner.clone(),
            line: spec.line,
            column: spec.column,
        };
        self.entries.insert(
            id,
            Reference {
                id,
                owner,
                specifier: spec.specifier,
                kind: spec.kind,
                subtype: spec.subtype,
                expected_type: spec.expected_type,
                expected_subtype: spec.expected_subtype,
                trace,
                is_inline: false,
                is_entry_point: spec.kind == ReferenceType::EntryPoint,
                is_implicit: spec.is_implicit,
                injected: spec.injected,
                is_resource_hint: spec.is_resource_hint,
                needs_runtime_lookup: spec.needs_runtime_lookup,
                allows_directory: spec.allows_directory,
                content: None,
                content_type: None,
                url: None,
                generated_url: None,
                generated_specifier: None,
                search_params: Vec::new(),
                prev: None,
                next: None,
                original: None,
            },
        );
        id
    }

    /// Publish an inline reference whose URL is already known.
    pub fn create_inline(
        &mut self,
        owner: ResourceUrl,
        url: ResourceUrl,
        spec: InlineSpec,
    ) -> ReferenceId {
        let id = self.create(
            owner,
            ReferenceSpec::new(spec.kind, url.as_str()).at(spec.line, spec.column),
        );
        if let Some(reference) = self.entries.get_mut(&id) {
            reference.is_inline = true;
            reference.expected_type = Some(spec.expected_type);
            reference.expected_subtype = spec.expected_subtype;
            reference.content = Some(spec.content);
            reference.content_type = Some(spec.content_type);
            reference.url = Some(url);
        }
        id
    }

    /// Replace `id` with a successor pointing at `url`.
    ///
    /// Returns `None` if `id` is unknown or already superseded.
    pub fn redirect(&mut self, id: ReferenceId, url: ResourceUrl) -> Option<ReferenceId> {
        let mut successor = self.successor_of(id)?;
        successor.url = Some(url);
        successor.generated_url = None;
        successor.generated_specifier = None;
        successor.search_params.clear();
        Some(self.link(id, successor))
    }

    /// Replace `id` with an inline successor carrying `spec`'s content.
    pub fn becomes_inline(
        &mut self,
        id: ReferenceId,
        url: ResourceUrl,
        spec: InlineSpec,
    ) -> Option<ReferenceId> {
        let mut successor = self.successor_of(id)?;
        successor.is_inline = true;
        successor.specifier = url.as_str().to_string();
        successor.url = Some(url);
        successor.generated_url = None;
        successor.generated_specifier = None;
        successor.expected_type = Some(spec.expected_type);
        successor.expected_subtype = spec.expected_subtype;
        successor.content = Some(spec.content);
        successor.content_type = Some(spec.content_type);
        successor.trace.line = Some(spec.line);
        successor.trace.column = Some(spec.column);
        Some(self.link(id, successor))
    }

    /// Follow `next` links to the current reference.
    pub fn current(&self, mut id: ReferenceId) -> ReferenceId {
        let mut seen = 0usize;
        while let Some(next) = self.entries.get(&id).and_then(|r| r.next) {
            id = next;
            seen += 1;
            if seen > self.entries.len() {
                break;
            }
        }
        id
    }

    /// Full history of the reference chain containing `id`, oldest first.
    pub fn history(&self, id: ReferenceId) -> Vec<ReferenceId> {
        let Some(reference) = self.entries.get(&id) else {
            return Vec::new();
        };
        let mut cursor = reference.original.unwrap_or(id);
        let mut chain = vec![cursor];
        while let Some(next) = self.entries.get(&cursor).and_then(|r| r.next) {
            if chain.contains(&next) {
                break;
            }
            chain.push(next);
            cursor = next;
        }
        chain
    }

    /// Entry point references published for `specifier`.
    pub fn entry_references(&self, specifier: &str) -> Vec<ReferenceId> {
        self.entries
            .values()
            .filter(|reference| reference.is_entry_point && reference.specifier == specifier)
            .map(|reference| reference.id)
            .collect()
    }

    /// Drop histories of `previous` references no longer reachable from `current`.
    pub fn retire(&mut self, previous: &[ReferenceId], current: &[ReferenceId]) {
        let keep: FxHashSet<ReferenceId> = current
            .iter()
            .flat_map(|&id| self.history(id))
            .collect();
        for &id in previous {
            for old in self.history(id) {
                if !keep.contains(&old) {
                    self.entries.remove(&old);
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Resolve outputs
    // -------------------------------------------------------------------------

    pub(crate) fn set_url(&mut self, id: ReferenceId, url: ResourceUrl) {
        if let Some(reference) = self.entries.get_mut(&id) {
            reference.url = Some(url);
        }
    }

    pub(crate) fn set_generated(
        &mut self,
        id: ReferenceId,
        generated_url: ResourceUrl,
        search_params: Vec<(String, String)>,
    ) {
        if let Some(reference) = self.entries.get_mut(&id) {
            reference.generated_url = Some(generated_url);
            reference.search_params = search_params;
        }
    }

    pub(crate) fn set_generated_specifier(&mut self, id: ReferenceId, specifier: String) {
        if let Some(reference) = self.entries.get_mut(&id) {
            reference.generated_specifier = Some(specifier);
        }
    }

    // -------------------------------------------------------------------------
    // Private
    // -------------------------------------------------------------------------

    fn allocate(&mut self) -> ReferenceId {
        let id = ReferenceId(self.next_id);
        self.next_id += 1;
        id
    }

    fn successor_of(&self, id: ReferenceId) -> Option<Reference> {
        let reference = self.entries.get(&id)?;
        if !reference.is_current() {
            return None;
        }
        let mut successor = reference.clone();
        successor.prev = Some(id);
        successor.original = Some(reference.original.unwrap_or(id));
        successor.next = None;
        Some(successor)
    }

    fn link(&mut self, prev: ReferenceId, mut successor: Reference) -> ReferenceId {
        let id = self.allocate();
        successor.id = id;
        self.entries.insert(id, successor);
        if let Some(previous) = self.entries.get_mut(&prev) {
            previous.next = Some(id);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> ResourceUrl {
        ResourceUrl::new("file:///site/index.html")
    }

    #[test]
    fn test_redirect_keeps_history() {
        let mut log = ReferenceLog::new();
        let first = log.create(owner(), ReferenceSpec::new(ReferenceType::HtmlSrc, "./a.js"));
        log.set_url(first, ResourceUrl::new("file:///site/a.js"));

        let second = log
            .redirect(first, ResourceUrl::new("file:///site/a.min.js"))
            .unwrap();

        let old = log.get(first).unwrap();
        assert_eq!(old.url.as_ref().unwrap().as_str(), "file:///site/a.js");
        assert_eq!(old.next, Some(second));
        assert!(!old.is_current());

        let new = log.get(second).unwrap();
        assert_eq!(new.specifier, "./a.js");
        assert_eq!(new.prev, Some(first));
        assert_eq!(new.original, Some(first));
        assert_eq!(log.current(first), second);
        assert_eq!(log.history(second), vec![first, second]);
    }

    #[test]
    fn test_superseded_reference_cannot_redirect() {
        let mut log = ReferenceLog::new();
        let first = log.create(owner(), ReferenceSpec::new(ReferenceType::HtmlSrc, "./a.js"));
        log.redirect(first, ResourceUrl::new("file:///site/b.js"))
            .unwrap();
        assert!(log.redirect(first, ResourceUrl::new("file:///site/c.js")).is_none());
    }

    #[test]
    fn test_becomes_inline() {
        let mut log = ReferenceLog::new();
        let first = log.create(owner(), ReferenceSpec::new(ReferenceType::HtmlHref, "./a.css"));
        let inline_url = ResourceUrl::new("file:///site/index.html@L3C5.css");
        let spec = InlineSpec::new(
            ReferenceType::HtmlInlineContent,
            UrlType::Css,
            "text/css",
            "body{}",
            3,
            5,
        );
        let inline = log.becomes_inline(first, inline_url.clone(), spec).unwrap();

        let reference = log.get(inline).unwrap();
        assert!(reference.is_inline);
        assert_eq!(reference.url.as_ref(), Some(&inline_url));
        assert_eq!(reference.content.as_ref().and_then(Content::as_text), Some("body{}"));
        assert_eq!(reference.trace.to_string(), "file:///site/index.html:3:5");
        assert!(!log.get(first).unwrap().is_inline);
    }

    #[test]
    fn test_retire_drops_stale_histories() {
        let mut log = ReferenceLog::new();
        let a = log.create(owner(), ReferenceSpec::new(ReferenceType::HtmlSrc, "./a.js"));
        let a2 = log.redirect(a, ResourceUrl::new("file:///site/a2.js")).unwrap();
        let b = log.create(owner(), ReferenceSpec::new(ReferenceType::HtmlSrc, "./b.js"));

        // `a` survives through its successor, `b` is gone
        log.retire(&[a2, b], &[a2]);
        assert!(log.get(a).is_some());
        assert!(log.get(a2).is_some());
        assert!(log.get(b).is_none());
    }
}
