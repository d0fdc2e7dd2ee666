//! Bundle dispatch.
//!
//! Used, non-inline resources are grouped by type and handed to every
//! plugin declaring the `bundle` hook, one type at a time in a fixed order.
//! Returned outputs replace the content of the resources they name.

use rustc_hash::FxHashMap;

use super::{BuildError, BundleContext, BundleOutput};
use crate::core::ResourceUrl;
use crate::graph::{UrlGraph, UrlInfo, UrlType};
use crate::kitchen::{HookName, PluginController};
use crate::utils::hash::ContentHash;
use crate::{debug, log};

/// Types bundled, in processing order.
pub const BUNDLE_ORDER: [UrlType; 5] = [
    UrlType::JsModule,
    UrlType::JsClassic,
    UrlType::Css,
    UrlType::Html,
    UrlType::Json,
];

/// Bundle candidates grouped by type, each group sorted by URL.
pub fn bundle_groups(graph: &UrlGraph) -> FxHashMap<UrlType, Vec<ResourceUrl>> {
    let mut groups: FxHashMap<UrlType, Vec<ResourceUrl>> = FxHashMap::default();
    for info in graph.url_infos() {
        if is_bundle_candidate(graph, info) {
            groups.entry(info.kind).or_default().push(info.url.clone());
        }
    }
    for urls in groups.values_mut() {
        urls.sort();
    }
    groups
}

fn is_bundle_candidate(graph: &UrlGraph, info: &UrlInfo) -> bool {
    !info.is_inline
        && !info.is_external
        && info.content.is_some()
        && (info.is_entry_point || graph.is_used(&info.url))
}

/// Run every bundler over every group. Returns how many resources changed.
pub fn run_bundlers(
    graph: &mut UrlGraph,
    plugins: &PluginController,
    ctx: &mut BundleContext,
) -> Result<usize, BuildError> {
    if plugins.with_hook(HookName::Bundle).next().is_none() {
        return Ok(0);
    }

    let groups = bundle_groups(graph);
    let mut changed = 0;
    for kind in BUNDLE_ORDER {
        let Some(urls) = groups.get(&kind) else {
            continue;
        };
        for plugin in plugins.with_hook(HookName::Bundle) {
            let outputs = {
                let infos: Vec<&UrlInfo> = urls.iter().filter_map(|url| graph.get(url)).collect();
                plugin
                    .bundle(&infos, ctx)
                    .map_err(|source| BuildError::Bundle {
                        plugin: plugin.name().to_string(),
                        kind,
                        source,
                    })?
            };
            debug!("bundle"; "{} produced {} output(s) for {:?}", plugin.name(), outputs.len(), kind);
            for output in outputs {
                apply_output(graph, output)?;
                changed += 1;
            }
        }
    }

    if changed > 0 {
        log!("bundle"; "{} resource(s) rewritten by bundlers", changed);
    }
    Ok(changed)
}

fn apply_output(graph: &mut UrlGraph, output: BundleOutput) -> Result<(), BuildError> {
    let BundleOutput {
        url,
        content,
        sourcemap,
    } = output;
    let info = graph
        .get_mut(&url)
        .ok_or_else(|| BuildError::UnknownBundleUrl(url.clone()))?;
    info.content_etag = Some(ContentHash::of(content.as_bytes()).to_hex());
    info.content = Some(content);
    if let Some(sourcemap) = sourcemap {
        graph.set_sourcemap(&url, sourcemap);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Content;

    #[test]
    fn test_groups_skip_unused_and_inline() {
        let root = ResourceUrl::new("file:///site/");
        let mut graph = UrlGraph::new(root);
        let entry = graph.add_entry_point(ResourceUrl::new("file:///site/index.html"));
        entry.kind = UrlType::Html;
        entry.content = Some(Content::Text("<p>".into()));

        let groups = bundle_groups(&graph);
        assert_eq!(
            groups.get(&UrlType::Html).map(Vec::len),
            Some(1),
            "entry points are always bundle candidates"
        );
        assert!(!groups.contains_key(&UrlType::Css));
    }
}
