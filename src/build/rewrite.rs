//! Rewrite emitted specifiers to their versioned form.
//!
//! Static references are replaced where their emitted text appears,
//! bounded by quotes, parentheses, whitespace or `=`. References that need
//! a runtime lookup have their quoted literal wrapped in `__v__("...")`;
//! the lookup table is injected once per output that uses it. Inline
//! children are rewritten first and spliced back into their owner.

use std::ops::Range;

use regex::{Captures, Regex};
use rustc_hash::FxHashMap;

use super::version::{Versions, VersioningOptions};
use super::urls::BuildUrlsGenerator;
use crate::core::ResourceUrl;
use crate::graph::{Reference, UrlGraph, UrlInfo, UrlType};
use crate::{debug, log};

/// Rewritten text of one output and whether it calls `__v__`.
#[derive(Debug, Default)]
struct Rewritten {
    text: String,
    /// Specifier → versioned specifier, for the runtime table
    runtime: FxHashMap<String, String>,
}

/// Rewrites resources against computed versions.
pub struct Rewriter<'a> {
    graph: &'a UrlGraph,
    versions: &'a Versions,
    urls: &'a BuildUrlsGenerator,
    options: &'a VersioningOptions,
    base: &'a str,
}

impl<'a> Rewriter<'a> {
    pub fn new(
        graph: &'a UrlGraph,
        versions: &'a Versions,
        urls: &'a BuildUrlsGenerator,
        options: &'a VersioningOptions,
        base: &'a str,
    ) -> Self {
        Self {
            graph,
            versions,
            urls,
            options,
            base,
        }
    }

    /// Versioned specifier of `url`, if it has a version.
    pub fn versioned_specifier(&self, url: &ResourceUrl) -> Option<String> {
        let version = self.versions.get(url)?;
        let path = self.urls.get(url)?;
        Some(format!(
            "{}{}",
            self.base,
            self.options.versioned_path(path, version)
        ))
    }

    /// Final text of a non-inline output, with the runtime table injected
    /// when needed. `None` for binary content.
    pub fn rewrite(&self, info: &UrlInfo) -> Option<String> {
        let rewritten = self.rewrite_node(info, 0)?;
        if rewritten.runtime.is_empty() {
            return Some(rewritten.text);
        }
        Some(inject_runtime_table(info.kind, rewritten.text, &rewritten.runtime))
    }

    fn rewrite_node(&self, info: &UrlInfo, depth: usize) -> Option<Rewritten> {
        let text = info.text()?;
        let references: Vec<&Reference> = self
            .graph
            .references_of(info.url.as_str())
            .filter(|reference| reference.is_current())
            .collect();

        let mut replacements = Replacements::default();
        let mut inline_children = Vec::new();
        for reference in &references {
            let Some(url) = reference.url.as_ref() else {
                continue;
            };
            if reference.is_inline {
                inline_children.push(url.clone());
                continue;
            }
            let Some(versioned) = self.versioned_specifier(url) else {
                continue;
            };
            let emitted = reference.emitted_specifier().to_string();
            if reference.needs_runtime_lookup {
                replacements.runtime.insert(emitted, versioned);
            } else {
                replacements.fixed.insert(emitted, versioned);
            }
        }
        for key in replacements.runtime.keys() {
            replacements.fixed.remove(key);
        }

        // Splice sites of inline children, outside of which the owner is rewritten
        let mut spliced: Vec<(Range<usize>, Rewritten)> = Vec::new();
        if depth < 8 {
            inline_children.sort();
            for child_url in inline_children {
                let Some(child) = self.graph.get(&child_url) else {
                    continue;
                };
                let Some(range) = locate_inline_site(text, child) else {
                    debug!("rewrite"; "inline site of {} not found in owner", child_url);
                    continue;
                };
                if spliced.iter().any(|(taken, _)| overlaps(taken, &range)) {
                    continue;
                }
                if let Some(rewritten) = self.rewrite_node(child, depth + 1) {
                    spliced.push((range, rewritten));
                }
            }
        }
        spliced.sort_by_key(|(range, _)| range.start);

        let mut out = Rewritten::default();
        let mut cursor = 0;
        for (range, child) in spliced {
            replacements.apply(&text[cursor..range.start], &mut out);
            out.text.push_str(&child.text);
            out.runtime.extend(child.runtime);
            cursor = range.end;
        }
        replacements.apply(&text[cursor..], &mut out);
        Some(out)
    }
}

/// Replace every emitted specifier in `table` found in `text`, with the same
/// boundaries as the versioning rewrite.
pub(super) fn replace_specifiers(text: &str, table: &FxHashMap<String, String>) -> String {
    let replacements = Replacements {
        fixed: table.clone(),
        runtime: FxHashMap::default(),
    };
    let mut out = Rewritten::default();
    replacements.apply(text, &mut out);
    out.text
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Byte range of an inline child's snapshot inside its owner's text.
///
/// Searched from the start of the recorded line, since earlier edits on
/// that line may have moved the column.
fn locate_inline_site(owner_text: &str, child: &UrlInfo) -> Option<Range<usize>> {
    let site = child.inline_url_site.as_ref()?;
    let snapshot = site.content.as_text()?;
    if snapshot.is_empty() {
        return None;
    }
    let line_start = match (site.line as usize).checked_sub(2) {
        Some(newlines) => owner_text
            .match_indices('\n')
            .nth(newlines)
            .map_or(0, |(pos, _)| pos + 1),
        None => 0,
    };
    let start = owner_text[line_start..]
        .find(snapshot)
        .map(|pos| line_start + pos)
        .or_else(|| owner_text.find(snapshot))?;
    Some(start..start + snapshot.len())
}

// =============================================================================
// Replacements
// =============================================================================

#[derive(Debug, Default)]
struct Replacements {
    fixed: FxHashMap<String, String>,
    runtime: FxHashMap<String, String>,
}

impl Replacements {
    fn apply(&self, segment: &str, out: &mut Rewritten) {
        let mut text = segment.to_string();

        if let Some(re) = alternation(&self.runtime, r#"(["'`])("#, r#")(["'`])"#) {
            text = re
                .replace_all(&text, |caps: &Captures<'_>| {
                    let (open, key, close) = (&caps[1], &caps[2], &caps[3]);
                    if open != close {
                        return caps[0].to_string();
                    }
                    if let Some(value) = self.runtime.get(key) {
                        out.runtime.insert(key.to_string(), value.clone());
                    }
                    format!("__v__({open}{key}{close})")
                })
                .into_owned();
        }

        if let Some(re) = alternation(
            &self.fixed,
            r#"(^|[\s"'`(=,])("#,
            r#")($|[\s"'`)>,;])"#,
        ) {
            text = re
                .replace_all(&text, |caps: &Captures<'_>| {
                    let key = &caps[2];
                    let value = self.fixed.get(key).map_or(key, String::as_str);
                    format!("{}{}{}", &caps[1], value, &caps[3])
                })
                .into_owned();
        }

        out.text.push_str(&text);
    }
}

/// `prefix(key1|key2|...)suffix`, longest keys first.
fn alternation(keys: &FxHashMap<String, String>, prefix: &str, suffix: &str) -> Option<Regex> {
    if keys.is_empty() {
        return None;
    }
    let mut sorted: Vec<&str> = keys.keys().map(String::as_str).collect();
    sorted.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let body = sorted
        .iter()
        .map(|key| regex::escape(key))
        .collect::<Vec<_>>()
        .join("|");
    match Regex::new(&format!("{prefix}{body}{suffix}")) {
        Ok(re) => Some(re),
        Err(err) => {
            log!("rewrite"; "cannot build specifier pattern: {}", err);
            None
        }
    }
}

// =============================================================================
// Runtime table
// =============================================================================

fn runtime_snippet(table: &FxHashMap<String, String>) -> String {
    let mut entries: Vec<(&String, &String)> = table.iter().collect();
    entries.sort();
    let map: serde_json::Map<String, serde_json::Value> = entries
        .into_iter()
        .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
        .collect();
    let json = serde_json::Value::Object(map).to_string();
    format!(
        "(function(m){{var t=globalThis.__v__table__||(globalThis.__v__table__={{}});\
         Object.assign(t,m);globalThis.__v__=function(s){{return t[s]||s}}}})({json});"
    )
}

/// Prepend the lookup table to scripts, or put it first in `<head>`.
fn inject_runtime_table(kind: UrlType, text: String, table: &FxHashMap<String, String>) -> String {
    let snippet = runtime_snippet(table);
    match kind {
        UrlType::Html => {
            let tag = format!("<script>{snippet}</script>");
            let lower = text.to_ascii_lowercase();
            let insert_at = lower
                .find("<head")
                .and_then(|start| lower[start..].find('>').map(|end| start + end + 1))
                .unwrap_or(0);
            let mut out = String::with_capacity(text.len() + tag.len());
            out.push_str(&text[..insert_at]);
            out.push_str(&tag);
            out.push_str(&text[insert_at..]);
            out
        }
        _ => format!("{snippet}\n{text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replacements(fixed: &[(&str, &str)], runtime: &[(&str, &str)]) -> Replacements {
        let to_map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        Replacements {
            fixed: to_map(fixed),
            runtime: to_map(runtime),
        }
    }

    #[test]
    fn test_static_replacement_respects_boundaries() {
        let r = replacements(&[("/a.css", "/a.123.css")], &[]);
        let mut out = Rewritten::default();
        r.apply(
            r#"<link href="/a.css"><link href="/a.css.bak"> url(/a.css)"#,
            &mut out,
        );
        assert_eq!(
            out.text,
            r#"<link href="/a.123.css"><link href="/a.css.bak"> url(/a.123.css)"#
        );
        assert!(out.runtime.is_empty());
    }

    #[test]
    fn test_runtime_lookup_wraps_literal() {
        let r = replacements(&[], &[("/data.json", "/data.9.json")]);
        let mut out = Rewritten::default();
        r.apply(r#"new URL("/data.json", import.meta.url)"#, &mut out);
        assert_eq!(out.text, r#"new URL(__v__("/data.json"), import.meta.url)"#);
        assert_eq!(out.runtime.get("/data.json").map(String::as_str), Some("/data.9.json"));
    }

    #[test]
    fn test_longest_key_wins() {
        let r = replacements(&[("/a.js", "/a.1.js"), ("/a.js.map", "/a.2.js.map")], &[]);
        let mut out = Rewritten::default();
        r.apply(r#""/a.js.map" "/a.js""#, &mut out);
        assert_eq!(out.text, r#""/a.2.js.map" "/a.1.js""#);
    }

    #[test]
    fn test_inject_runtime_table_in_head() {
        let mut table = FxHashMap::default();
        table.insert("/w.js".to_string(), "/w.1.js".to_string());
        let html = inject_runtime_table(
            UrlType::Html,
            "<html><head><title>x</title></head></html>".to_string(),
            &table,
        );
        assert!(html.starts_with("<html><head><script>(function(m)"));
        assert!(html.contains(r#"{"/w.js":"/w.1.js"}"#));

        let js = inject_runtime_table(UrlType::JsModule, "run();".to_string(), &table);
        assert!(js.ends_with("\nrun();"));
    }
}
