use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::core::ResourceUrl;

// =============================================================================
// Helpers
// =============================================================================

fn url(path: &str) -> ResourceUrl {
    ResourceUrl::new(format!("file:///site/{path}"))
}

fn graph() -> UrlGraph {
    UrlGraph::new(ResourceUrl::new("file:///site/"))
}

fn entry(graph: &mut UrlGraph, path: &str) -> ResourceUrl {
    let id = graph.create_entry_reference(path);
    graph.references.set_url(id, url(path));
    graph.reuse_or_create_url_info(id).unwrap()
}

/// Re-collect `owner` with one resolved reference per `ReferenceSpec`.
fn collect(graph: &mut UrlGraph, owner: &ResourceUrl, specs: Vec<ReferenceSpec>) -> PruneReport {
    let mut collection = graph.start_collecting(owner);
    for spec in specs {
        let target = owner.join(&spec.specifier).unwrap();
        let id = graph.create_reference(owner.clone(), spec);
        graph.references.set_url(id, target);
        collection.add_dependency(graph, id).unwrap();
    }
    collection.finish(graph)
}

fn src(specifier: &str) -> ReferenceSpec {
    ReferenceSpec::new(ReferenceType::HtmlSrc, specifier)
}

fn inline_script(content: &str, line: u32) -> InlineSpec {
    InlineSpec::new(
        ReferenceType::HtmlInlineContent,
        UrlType::JsClassic,
        "text/javascript",
        content,
        line,
        1,
    )
}

fn collect_inline(graph: &mut UrlGraph, owner: &ResourceUrl, spec: InlineSpec) -> ResourceUrl {
    let inline_url = crate::core::generate_inline_url(owner, spec.line, spec.column, "js");
    let mut collection = graph.start_collecting(owner);
    let id = graph
        .references
        .create_inline(owner.clone(), inline_url, spec);
    let target = collection.add_dependency(graph, id).unwrap();
    let _ = collection.finish(graph);
    target
}

fn assert_consistent(graph: &UrlGraph) {
    for info in graph.url_infos() {
        for dependency in info.dependencies() {
            let target = graph
                .get(dependency)
                .unwrap_or_else(|| panic!("{dependency} missing"));
            assert!(
                target.dependents().contains(&info.url),
                "{} -> {dependency} has no reverse edge",
                info.url
            );
        }
        for dependent in info.dependents() {
            let source = graph
                .get(dependent)
                .unwrap_or_else(|| panic!("{dependent} missing"));
            assert!(
                source.dependencies().contains(&info.url),
                "{dependent} <- {} has no forward edge",
                info.url
            );
        }
    }
}

// =============================================================================
// Identity & edges
// =============================================================================

#[test]
fn test_one_node_per_canonical_url() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    collect(&mut graph, &index, vec![src("./style.css"), src("style.css")]);

    assert_eq!(graph.len(), 2);
    assert_eq!(graph.get(&index).unwrap().references().len(), 2);
    assert_eq!(graph.get(&index).unwrap().dependencies().len(), 1);
    assert_consistent(&graph);
}

#[test]
fn test_edges_stay_bidirectional() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    collect(&mut graph, &index, vec![src("a.js"), src("b.js")]);
    collect(&mut graph, &url("a.js"), vec![src("c.js")]);
    assert_consistent(&graph);

    collect(&mut graph, &index, vec![src("b.js")]);
    assert_consistent(&graph);

    graph.delete_url_info(url("b.js").as_str());
    assert_consistent(&graph);
    assert!(graph.get(&index).unwrap().dependencies().is_empty());
}

// =============================================================================
// Pruning
// =============================================================================

#[test]
fn test_pruning_is_transitive() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    collect(&mut graph, &index, vec![src("a.js")]);
    collect(&mut graph, &url("a.js"), vec![src("b.js")]);
    let generation = graph.get(url("b.js").as_str()).unwrap().modified_generation;

    let report = collect(&mut graph, &index, vec![]);

    assert_eq!(report.pruned, vec![url("b.js"), url("a.js")]);
    assert!(report.deleted.is_empty());
    assert!(!graph.is_used(url("a.js").as_str()));
    assert!(!graph.is_used(url("b.js").as_str()));
    let b = graph.get(url("b.js").as_str()).unwrap();
    assert!(b.dependents().is_empty());
    assert!(b.modified_generation > generation);
    assert_consistent(&graph);
}

#[test]
fn test_shared_dependency_survives() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    collect(&mut graph, &index, vec![src("a.js"), src("b.js")]);
    collect(&mut graph, &url("a.js"), vec![src("shared.js")]);
    collect(&mut graph, &url("b.js"), vec![src("shared.js")]);

    let report = collect(&mut graph, &index, vec![src("b.js")]);

    assert_eq!(report.pruned, vec![url("a.js")]);
    assert!(graph.is_used(url("shared.js").as_str()));
    assert_consistent(&graph);
}

#[test]
fn test_entry_points_are_never_pruned() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    let about = entry(&mut graph, "about.html");
    collect(&mut graph, &index, vec![src("about.html")]);

    let report = collect(&mut graph, &index, vec![]);

    assert!(report.is_empty());
    assert!(graph.is_used(&about));
    assert_eq!(graph.entry_points(), vec![about, index]);
}

#[test]
fn test_detached_cycle_removed_at_finalization() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    collect(&mut graph, &index, vec![src("a.js")]);
    collect(&mut graph, &url("a.js"), vec![src("b.js")]);
    collect(&mut graph, &url("b.js"), vec![src("a.js")]);

    // a and b keep each other used
    let report = collect(&mut graph, &index, vec![]);
    assert!(report.is_empty());
    assert_consistent(&graph);

    let removed = graph.prune_unreachable();
    assert_eq!(removed, vec![url("a.js"), url("b.js")]);
    assert_eq!(graph.len(), 1);
    assert_consistent(&graph);
}

#[test]
fn test_resource_hint_never_makes_target_used() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    collect(
        &mut graph,
        &index,
        vec![
            ReferenceSpec::new(ReferenceType::HtmlHref, "font.woff2").resource_hint(),
            src("app.js"),
        ],
    );

    assert!(graph.contains(url("font.woff2").as_str()));
    assert!(!graph.is_used(url("font.woff2").as_str()));

    let removed = graph.prune_unreachable();
    assert_eq!(removed, vec![url("font.woff2")]);
    assert!(graph.contains(url("app.js").as_str()));
    assert_consistent(&graph);
}

#[test]
fn test_implicit_reference_is_not_a_usage() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    collect(
        &mut graph,
        &index,
        vec![ReferenceSpec::new(ReferenceType::Injected, "package.json").implicit()],
    );

    let info = graph.get(&index).unwrap();
    assert!(info.implicit_urls().contains(&url("package.json")));
    assert!(!graph.is_used(url("package.json").as_str()));
}

#[test]
fn test_prune_unreachable_drops_detached_nodes() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    collect(&mut graph, &index, vec![src("a.js")]);
    collect(&mut graph, &index, vec![]);
    assert!(graph.contains(url("a.js").as_str()));

    let removed = graph.prune_unreachable();
    assert_eq!(removed, vec![url("a.js")]);
    assert_eq!(graph.sorted_urls(), vec![index]);
}

// =============================================================================
// Inline resources
// =============================================================================

#[test]
fn test_inline_snapshot_taken_once() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    let inline = collect_inline(&mut graph, &index, inline_script("a()", 3));
    assert_eq!(inline.as_str(), "file:///site/index.html@L3C1.js");

    // Re-discovery does not replace the snapshot
    collect_inline(&mut graph, &index, inline_script("b()", 3));
    let info = graph.get(&inline).unwrap();
    assert!(info.is_inline);
    assert_eq!(info.original_content.as_ref().unwrap().as_text(), Some("a()"));
    assert_eq!(info.inline_url_site.as_ref().unwrap().url, index);

    // Once modified, the next discovery re-takes it
    graph.consider_modified(&index);
    collect_inline(&mut graph, &index, inline_script("b()", 3));
    let info = graph.get(&inline).unwrap();
    assert_eq!(info.original_content.as_ref().unwrap().as_text(), Some("b()"));
}

#[test]
fn test_pruned_inline_node_is_deleted() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    let inline = collect_inline(&mut graph, &index, inline_script("a()", 3));

    let report = collect(&mut graph, &index, vec![]);

    assert_eq!(report.deleted, vec![inline.clone()]);
    assert!(!graph.contains(&inline));
    assert_consistent(&graph);
}

#[test]
fn test_superseded_reference_is_not_a_usage() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    let mut collection = graph.start_collecting(&index);
    let id = graph.create_reference(index.clone(), src("style.css"));
    graph.references.set_url(id, url("style.css"));
    collection.add_dependency(&mut graph, id).unwrap();

    let inline_url = crate::core::generate_inline_url(&index, 2, 1, "css");
    let spec = InlineSpec::new(
        ReferenceType::HtmlInlineContent,
        UrlType::Css,
        "text/css",
        "body{}",
        2,
        1,
    );
    let inline_id = graph
        .references
        .becomes_inline(id, inline_url.clone(), spec)
        .unwrap();
    collection.replace_reference(&mut graph, id, inline_id).unwrap();
    let report = collection.finish(&mut graph);

    assert_eq!(report.pruned, vec![url("style.css")]);
    assert!(graph.is_used(&inline_url));
    assert!(!graph.get(&index).unwrap().dependencies().contains(&url("style.css")));
    // History is still reachable from the current reference
    let history = graph.reference_log().history(inline_id);
    assert_eq!(history, vec![id, inline_id]);
}

// =============================================================================
// Invalidation
// =============================================================================

#[test]
fn test_consider_modified_propagates() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    let inline = collect_inline(&mut graph, &index, inline_script("a()", 3));
    let config = url("kiln.json");
    {
        let mut collection = graph.start_collecting(&index);
        let keep = graph.get(&index).unwrap().references().to_vec();
        for id in keep {
            collection.add_dependency(&mut graph, id);
        }
        let id = graph.create_reference(
            index.clone(),
            ReferenceSpec::new(ReferenceType::Injected, "kiln.json").implicit(),
        );
        graph.references.set_url(id, config.clone());
        collection.add_dependency(&mut graph, id).unwrap();
        let _ = collection.finish(&mut graph);
    }

    let modified = graph.consider_modified(&config);

    assert_eq!(modified, vec![index.clone(), inline.clone(), config.clone()]);
    assert!(graph.get(&inline).unwrap().original_content.is_none());
    assert_eq!(graph.get(&index).unwrap().modified_generation, 1);
}

#[test]
fn test_consider_modified_unknown_url() {
    let mut graph = graph();
    assert!(graph.consider_modified("file:///site/missing.js").is_empty());
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn test_infer_reference_matches_encoded_specifier() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    collect(&mut graph, &index, vec![src("./my file.js")]);

    let found = graph.infer_reference("./my%20file.js", &index).unwrap();
    assert_eq!(graph.reference(found).unwrap().specifier, "./my file.js");
    assert!(graph.infer_reference("./other.js", &index).is_none());
}

#[test]
fn test_find_dependent_walks_upward() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    collect(&mut graph, &index, vec![src("a.js")]);
    collect(&mut graph, &url("a.js"), vec![src("b.js")]);

    let found = graph.find_dependent(url("b.js").as_str(), |info| info.is_entry_point);
    assert_eq!(found, Some(index));
    assert!(graph.find_dependent(url("b.js").as_str(), |info| info.is_inline).is_none());
}

#[test]
fn test_delete_cascades_to_sourcemap() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    collect(&mut graph, &index, vec![src("app.js")]);
    let map_url = graph
        .set_sourcemap(&url("app.js"), "{\"version\":3}".to_string())
        .unwrap();
    assert_eq!(map_url, url("app.js.map"));
    assert!(graph.is_used(&map_url));

    graph.delete_url_info(url("app.js").as_str());
    assert!(!graph.contains(&map_url));
    assert_consistent(&graph);
}

// =============================================================================
// Observers
// =============================================================================

#[test]
fn test_pruned_callbacks_fire_once() {
    let mut graph = graph();
    let created = Arc::new(AtomicUsize::new(0));
    let pruned = Arc::new(AtomicUsize::new(0));
    let once = Arc::new(AtomicUsize::new(0));
    {
        let created = Arc::clone(&created);
        graph.on_url_info_created(move |_| {
            created.fetch_add(1, Ordering::SeqCst);
        });
        let pruned = Arc::clone(&pruned);
        graph.on_url_info_pruned(move |_| {
            pruned.fetch_add(1, Ordering::SeqCst);
        });
    }

    let index = entry(&mut graph, "index.html");
    collect(&mut graph, &index, vec![src("a.js")]);
    {
        let once = Arc::clone(&once);
        graph.register_pruned_callback(&url("a.js"), move |info| {
            assert_eq!(info.url.as_str(), "file:///site/a.js");
            once.fetch_add(1, Ordering::SeqCst);
        });
    }

    collect(&mut graph, &index, vec![]);
    collect(&mut graph, &index, vec![src("a.js")]);
    collect(&mut graph, &index, vec![]);

    assert_eq!(created.load(Ordering::SeqCst), 2);
    assert_eq!(pruned.load(Ordering::SeqCst), 2);
    assert_eq!(once.load(Ordering::SeqCst), 1);
}

#[test]
fn test_repeated_entry_keeps_one_reference() {
    let mut graph = graph();
    let index = entry(&mut graph, "index.html");
    entry(&mut graph, "about.html");
    let len = graph.reference_log().len();

    for _ in 0..3 {
        assert_eq!(entry(&mut graph, "index.html"), index);
    }

    assert_eq!(graph.reference_log().len(), len);
    let entries = graph.references.entry_references("index.html");
    assert_eq!(entries.len(), 1);
    assert_eq!(graph.references.entry_references("about.html").len(), 1);
}
