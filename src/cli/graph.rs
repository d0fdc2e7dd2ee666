//! `kiln graph`: load the resource graph in development mode and print it.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::config::KilnConfig;
use crate::core::{AbortSignal, BuildMode, ResourceUrl};
use crate::graph::{UrlGraph, UrlType};
use crate::kitchen::{ErrorSummary, GraphLoader, Kitchen, KitchenContext};
use crate::log;
use crate::plugins::default_plugins;

/// One node as printed.
#[derive(Debug, Serialize)]
pub struct GraphNode {
    pub url: ResourceUrl,
    pub kind: UrlType,
    pub entry: bool,
    pub inline: bool,
    pub external: bool,
    pub used: bool,
    pub dependencies: Vec<ResourceUrl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Load the graph and print every node with its dependencies.
pub async fn print_graph(config: &KilnConfig, json: bool, signal: AbortSignal) -> Result<()> {
    let root = fs::canonicalize(&config.build.root)
        .with_context(|| format!("cannot open {}", config.build.root.display()))?;
    let root_url = ResourceUrl::from_directory_path(&root)
        .with_context(|| format!("{} is not a directory path", root.display()))?;

    let context = KitchenContext::new(root_url, BuildMode::DEVELOPMENT)
        .with_signal(signal)
        .allow_directory_references(config.build.allow_directory_references);
    let kitchen = Arc::new(Kitchen::new(context, default_plugins()));

    let mut entries = Vec::with_capacity(config.build.entries.len());
    for entry in &config.build.entries {
        entries.push(kitchen.add_entry(entry)?);
    }

    let report = GraphLoader::new(Arc::clone(&kitchen))
        .load(&entries)
        .await
        .map_err(|err| anyhow::anyhow!("{}", ErrorSummary(&err)))?;

    let nodes = snapshot(&kitchen.graph().read());
    if json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
    } else {
        print_tree(&nodes, kitchen.context().root_directory_url.as_str());
    }

    for deferred in &report.deferred {
        log!("warning"; "{}", ErrorSummary(deferred));
    }
    if !report.errors.is_empty() {
        bail!("{} resource(s) failed to load", report.errors.len());
    }
    Ok(())
}

/// Every node, sorted by URL.
pub fn snapshot(graph: &UrlGraph) -> Vec<GraphNode> {
    graph
        .sorted_urls()
        .into_iter()
        .filter_map(|url| {
            let info = graph.get(&url)?;
            Some(GraphNode {
                kind: info.kind,
                entry: info.is_entry_point,
                inline: info.is_inline,
                external: info.is_external,
                used: info.is_entry_point || graph.is_used(&url),
                dependencies: info.sorted_dependencies(),
                error: info.error.as_deref().map(|err| ErrorSummary(err).to_string()),
                url,
            })
        })
        .collect()
}

fn print_tree(nodes: &[GraphNode], root: &str) {
    let short = |url: &ResourceUrl| -> String {
        url.as_str().strip_prefix(root).unwrap_or(url.as_str()).to_string()
    };
    for node in nodes {
        let mut flags = Vec::new();
        if node.entry {
            flags.push("entry");
        }
        if node.inline {
            flags.push("inline");
        }
        if node.external {
            flags.push("external");
        }
        if !node.used {
            flags.push("unused");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };
        println!("{} {:?}{}", short(&node.url).bold(), node.kind, flags.dimmed());
        for dependency in &node.dependencies {
            println!("  {} {}", "→".dimmed(), short(dependency));
        }
        if let Some(error) = &node.error {
            println!("  {} {}", "error:".red(), error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_snapshot_lists_edges() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("index.html"),
            r#"<link rel="stylesheet" href="style.css">"#,
        )
        .unwrap();
        fs::write(dir.path().join("style.css"), "p { color: red }").unwrap();

        let root = ResourceUrl::from_directory_path(&fs::canonicalize(dir.path()).unwrap()).unwrap();
        let kitchen = Arc::new(Kitchen::new(
            KitchenContext::new(root, BuildMode::DEVELOPMENT),
            default_plugins(),
        ));
        let entry = kitchen.add_entry("index.html").unwrap();
        GraphLoader::new(Arc::clone(&kitchen))
            .load(&[entry.clone()])
            .await
            .unwrap();

        let nodes = snapshot(&kitchen.graph().read());
        assert_eq!(nodes.len(), 2);
        let index = nodes.iter().find(|node| node.url == entry).unwrap();
        assert!(index.entry);
        assert_eq!(index.kind, UrlType::Html);
        assert_eq!(index.dependencies.len(), 1);
        assert!(index.dependencies[0].as_str().ends_with("/style.css"));

        let style = nodes.iter().find(|node| node.url != entry).unwrap();
        assert!(style.used);
        assert_eq!(style.kind, UrlType::Css);
    }
}
