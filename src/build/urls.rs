//! Build-relative output paths.
//!
//! Files under the source directory keep their relative path; files outside
//! go under `other/`. A taken path gets a numeric suffix before its
//! extension (`other/logo-1.png`).
//!
//! Cooks run concurrently, so while loading, references are formatted with a
//! provisional path derived from the URL alone. Once the graph is complete,
//! [`BuildUrlsGenerator::assign_all`] hands out final paths in sorted URL
//! order and [`relocate_specifiers`] swaps them into content and references.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use super::rewrite::replace_specifiers;
use crate::core::ResourceUrl;
use crate::graph::{Content, Reference, ReferenceId, UrlGraph};
use crate::kitchen::{HookName, HookResult, KitchenContext, Plugin};
use crate::utils::hash::ContentHash;

/// Directory of provisional paths; never part of a final path.
const PENDING_DIR: &str = ".kiln-pending";

/// Allocates one build path per resource URL.
#[derive(Debug)]
pub struct BuildUrlsGenerator {
    source_directory_url: ResourceUrl,
    assigned: FxHashMap<ResourceUrl, String>,
    taken: FxHashSet<String>,
}

impl BuildUrlsGenerator {
    pub fn new(source_directory_url: ResourceUrl) -> Self {
        Self {
            source_directory_url,
            assigned: FxHashMap::default(),
            taken: FxHashSet::default(),
        }
    }

    /// Path already assigned to `url`.
    pub fn get(&self, url: &ResourceUrl) -> Option<&str> {
        self.assigned.get(url).map(String::as_str)
    }

    /// Path of `url` while the graph is still loading.
    ///
    /// Depends on nothing but `url`, so it is the same whichever cook asks
    /// first.
    pub fn provisional(&self, url: &ResourceUrl) -> String {
        let tag = ContentHash::of(url.as_str()).short(12);
        format!("{PENDING_DIR}/{tag}/{}", self.candidate(url))
    }

    /// Allocate final paths for `urls`, in the order given.
    pub fn assign_all(&mut self, urls: &[ResourceUrl]) {
        for url in urls {
            self.generate(url);
        }
    }

    /// Path of `url`, allocating it on first call.
    pub fn generate(&mut self, url: &ResourceUrl) -> String {
        if let Some(path) = self.assigned.get(url) {
            return path.clone();
        }

        let candidate = self.candidate(url);
        let mut path = candidate.clone();
        let mut n = 1;
        while self.taken.contains(&path) {
            path = with_suffix(&candidate, n);
            n += 1;
        }

        self.taken.insert(path.clone());
        self.assigned.insert(url.clone(), path.clone());
        path
    }

    fn candidate(&self, url: &ResourceUrl) -> String {
        let base = url.without_search_and_hash();
        match base.strip_prefix(self.source_directory_url.as_str()) {
            Some(relative) => relative.to_string(),
            None => format!("other/{}", url.basename()),
        }
    }
}

/// Replace provisional specifiers with final build paths, in the content of
/// every owner and in its references. Returns how many owners changed.
pub fn relocate_specifiers(graph: &mut UrlGraph, urls: &BuildUrlsGenerator, base: &str) -> usize {
    let mut changed = 0;
    for owner in graph.sorted_urls() {
        let moves: Vec<(ReferenceId, String, String)> = graph
            .references_of(owner.as_str())
            .filter(|reference| reference.is_current())
            .filter_map(|reference| {
                let url = reference.url.as_ref()?;
                let emitted = reference.generated_specifier.as_ref()?;
                let path = urls.get(url)?;
                let pending = format!("{base}{}", urls.provisional(url));
                let rest = emitted.strip_prefix(&pending)?;
                Some((reference.id, emitted.clone(), format!("{base}{path}{rest}")))
            })
            .collect();
        if moves.is_empty() {
            continue;
        }

        let table: FxHashMap<String, String> = moves
            .iter()
            .map(|(_, from, to)| (from.clone(), to.clone()))
            .collect();
        for (id, _, to) in moves {
            graph.references.set_generated_specifier(id, to);
        }
        let Some(info) = graph.get_mut(&owner) else {
            continue;
        };
        let Some(text) = info.text().map(|text| replace_specifiers(text, &table)) else {
            continue;
        };
        info.content_etag = Some(ContentHash::of(&text).to_hex());
        info.content = Some(Content::Text(text));
        changed += 1;
    }
    changed
}

/// `a/b.css` + 2 → `a/b-2.css`
fn with_suffix(path: &str, n: usize) -> String {
    if let Some(directory) = path.strip_suffix('/') {
        return format!("{}/", with_suffix(directory, n));
    }
    let (dir, name) = match path.rsplit_once('/') {
        Some((dir, name)) => (&path[..=dir.len()], name),
        None => ("", path),
    };
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{dir}{stem}-{n}.{ext}"),
        _ => format!("{dir}{name}-{n}"),
    }
}

// =============================================================================
// Formatting plugin
// =============================================================================

/// Emits `<base><provisional path>` for every `file:` reference during a build.
///
/// Inline and entry references keep their specifier. The fragment of the
/// authored specifier is carried over.
pub struct BuildSpecifiers {
    urls: Arc<Mutex<BuildUrlsGenerator>>,
    base: String,
}

impl BuildSpecifiers {
    pub fn new(urls: Arc<Mutex<BuildUrlsGenerator>>, base: impl Into<String>) -> Self {
        Self {
            urls,
            base: base.into(),
        }
    }
}

impl Plugin for BuildSpecifiers {
    fn name(&self) -> &str {
        "build_specifiers"
    }

    fn hooks(&self) -> &'static [HookName] {
        &[HookName::FormatReference]
    }

    fn format_reference(
        &self,
        reference: &Reference,
        _ctx: &KitchenContext,
    ) -> HookResult<Option<String>> {
        if reference.is_inline || reference.is_entry_point {
            return Ok(None);
        }
        let Some(url) = reference.url.as_ref().filter(|url| url.is_file()) else {
            return Ok(None);
        };

        let path = self.urls.lock().provisional(url);
        let mut specifier = format!("{}{}", self.base, path);
        if let Some((_, search)) = url.as_str().split_once('?') {
            let search = search.split('#').next().unwrap_or_default();
            specifier.push('?');
            specifier.push_str(search);
        }
        let mut specifier = crate::core::append_search_params(&specifier, &reference.search_params);
        if let Some((_, fragment)) = reference.specifier.split_once('#') {
            specifier.push('#');
            specifier.push_str(fragment);
        }
        Ok(Some(specifier))
    }
}
