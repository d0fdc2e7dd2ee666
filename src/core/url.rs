//! Canonical resource URL type.
//!
//! - Internal representation: the serialized form of a parsed [`url::Url`]
//! - Graph nodes are keyed by this string, never by pointers

use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

/// Canonical URL of a resource.
///
/// Invariants:
/// - Produced from a successfully parsed URL (or an inline URL derived from one)
/// - Cheap to clone (shared string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceUrl(Arc<str>);

impl ResourceUrl {
    /// Wrap an already canonical URL string.
    pub fn new(url: impl AsRef<str>) -> Self {
        Self(Arc::from(url.as_ref()))
    }

    /// Create from a parsed URL.
    pub fn from_url(url: &Url) -> Self {
        Self(Arc::from(url.as_str()))
    }

    /// Parse a string into a canonical URL.
    pub fn parse(input: &str) -> Result<Self, url::ParseError> {
        Url::parse(input).map(|url| Self::from_url(&url))
    }

    /// Create a `file://` URL from an absolute path.
    pub fn from_file_path(path: &Path) -> Option<Self> {
        Url::from_file_path(path).ok().map(|url| Self::from_url(&url))
    }

    /// Create a `file://` directory URL (with trailing slash) from an absolute path.
    pub fn from_directory_path(path: &Path) -> Option<Self> {
        Url::from_directory_path(path)
            .ok()
            .map(|url| Self::from_url(&url))
    }

    /// Get the URL as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse into a [`Url`] for joining and inspection.
    pub fn to_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.0)
    }

    /// Resolve `specifier` against this URL.
    pub fn join(&self, specifier: &str) -> Result<Self, url::ParseError> {
        let base = self.to_url()?;
        base.join(specifier).map(|url| Self::from_url(&url))
    }

    /// URL scheme (text before the first `:`).
    pub fn scheme(&self) -> &str {
        self.0.split_once(':').map_or("", |(scheme, _)| scheme)
    }

    /// Check if this is a `file://` URL.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.scheme() == "file"
    }

    /// Convert a `file://` URL to a filesystem path.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if !self.is_file() {
            return None;
        }
        self.to_url().ok()?.to_file_path().ok()
    }

    /// The URL without its search (`?..`) and hash (`#..`) parts.
    pub fn without_search_and_hash(&self) -> &str {
        strip_search_and_hash(&self.0)
    }

    /// Last path segment (file name), without search and hash.
    pub fn basename(&self) -> &str {
        let path = self.without_search_and_hash();
        path.rsplit('/').next().unwrap_or(path)
    }

    /// File extension of the last path segment, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.basename();
        let (stem, ext) = name.rsplit_once('.')?;
        (!stem.is_empty() && !ext.is_empty()).then_some(ext)
    }

    /// Append search params, keeping identity of everything else.
    pub fn with_search_params(&self, params: &[(String, String)]) -> Self {
        if params.is_empty() {
            return self.clone();
        }
        match self.to_url() {
            Ok(mut url) => {
                {
                    let mut pairs = url.query_pairs_mut();
                    for (key, value) in params {
                        pairs.append_pair(key, value);
                    }
                }
                Self::from_url(&url)
            }
            Err(_) => Self(Arc::from(append_search_params(&self.0, params))),
        }
    }

    /// Check if `self` is located under the directory URL `dir`.
    pub fn is_inside(&self, dir: &ResourceUrl) -> bool {
        let dir = dir.as_str();
        dir.ends_with('/') && self.0.starts_with(dir) && self.0.len() > dir.len()
    }
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ResourceUrl {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ResourceUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ResourceUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Strip `?search` and `#hash` from a URL or specifier.
pub fn strip_search_and_hash(input: &str) -> &str {
    input.split(['?', '#']).next().unwrap_or(input)
}

/// Append `key=value` pairs to a URL-ish string (specifiers, relative paths).
///
/// Keeps an existing `#hash` at the end.
pub fn append_search_params(input: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return input.to_string();
    }
    let (before_hash, hash) = match input.split_once('#') {
        Some((before, hash)) => (before, Some(hash)),
        None => (input, None),
    };
    let query: Vec<String> = params
        .iter()
        .map(|(key, value)| {
            use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
            format!(
                "{}={}",
                utf8_percent_encode(key, NON_ALPHANUMERIC),
                utf8_percent_encode(value, NON_ALPHANUMERIC)
            )
        })
        .collect();
    let separator = if before_hash.contains('?') { '&' } else { '?' };
    let mut out = format!("{before_hash}{separator}{}", query.join("&"));
    if let Some(hash) = hash {
        out.push('#');
        out.push_str(hash);
    }
    out
}

/// Generate the URL of an inline resource.
///
/// `file:///site/index.html` + L12 C4 + `js` → `file:///site/index.html@L12C4.js`
pub fn generate_inline_url(owner: &ResourceUrl, line: u32, column: u32, extension: &str) -> ResourceUrl {
    let base = owner.without_search_and_hash();
    ResourceUrl::new(format!("{base}@L{line}C{column}.{extension}"))
}

// ============================================================================
// Tests
// ============================================================================
