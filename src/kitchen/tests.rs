use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use super::*;
use crate::core::{AbortSignal, BuildMode, ResourceUrl};
use crate::graph::{Content, Reference, UrlInfo, UrlType};
use crate::plugins::default_plugins;

// =============================================================================
// Helpers
// =============================================================================

fn site(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        write(dir.path(), path, content);
    }
    dir
}

fn write(root: &Path, path: &str, content: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn context(dir: &TempDir, mode: BuildMode) -> KitchenContext {
    let root = fs::canonicalize(dir.path()).unwrap();
    KitchenContext::new(ResourceUrl::from_directory_path(&root).unwrap(), mode)
}

fn kitchen(dir: &TempDir, mode: BuildMode) -> Arc<Kitchen> {
    Arc::new(Kitchen::new(context(dir, mode), default_plugins()))
}

fn find_url(kitchen: &Kitchen, suffix: &str) -> Option<ResourceUrl> {
    kitchen
        .graph()
        .read()
        .sorted_urls()
        .into_iter()
        .find(|url| url.as_str().ends_with(suffix))
}

// =============================================================================
// Memoization
// =============================================================================

#[tokio::test]
async fn test_concurrent_cooks_share_result() {
    let dir = site(&[("index.html", "<p>hello</p>")]);
    let kitchen = kitchen(&dir, BuildMode::DEVELOPMENT);
    let url = kitchen.add_entry("index.html").unwrap();

    let (a, b) = tokio::join!(kitchen.cook(&url), kitchen.cook(&url));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));

    // settled: a later call still returns the memoized cook
    let c = kitchen.cook(&url).await.unwrap();
    assert!(Arc::ptr_eq(&a, &c));
}

#[tokio::test]
async fn test_consider_modified_starts_fresh_cook() {
    let dir = site(&[("index.html", "<p>one</p>")]);
    let kitchen = kitchen(&dir, BuildMode::DEVELOPMENT);
    let url = kitchen.add_entry("index.html").unwrap();
    let first = kitchen.cook(&url).await.unwrap();

    write(dir.path(), "index.html", "<p>two</p>");
    kitchen.consider_modified(&url);
    let second = kitchen.cook(&url).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.generation > first.generation);
    let graph = kitchen.graph().read();
    assert_eq!(graph.get(&url).and_then(|info| info.text()), Some("<p>two</p>"));
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let dir = site(&[]);
    let kitchen = kitchen(&dir, BuildMode::DEVELOPMENT);
    let url = kitchen.add_entry("missing.html").unwrap();

    let err = kitchen.cook(&url).await.unwrap_err();
    assert_eq!(err.code(), "FETCH_URL_CONTENT_ERROR");
    assert_eq!(err.sub_code(), Some("NOT_FOUND"));

    let graph = kitchen.graph().read();
    let info = graph.get(&url).unwrap();
    assert!(info.error.is_some(), "error is stored on the node");
}

struct Forbid;

impl Plugin for Forbid {
    fn name(&self) -> &str {
        "forbid"
    }

    fn hooks(&self) -> &'static [HookName] {
        &[HookName::ResolveReference]
    }

    fn resolve_reference(
        &self,
        reference: &Reference,
        _ctx: &KitchenContext,
    ) -> HookResult<Option<ResourceUrl>> {
        if reference.specifier.contains("forbidden") {
            return Err(HookError::NotAllowed);
        }
        Ok(None)
    }
}

#[tokio::test]
async fn test_resolve_failure_fails_owner() {
    let dir = site(&[("index.html", r#"<img src="forbidden.png">"#)]);
    let mut plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(Forbid)];
    plugins.extend(default_plugins());
    let kitchen = Kitchen::new(context(&dir, BuildMode::PRODUCTION), plugins);
    let url = kitchen.add_entry("index.html").unwrap();

    let err = kitchen.cook(&url).await.unwrap_err();
    assert_eq!(err.code(), "RESOLVE_URL_ERROR");
    assert_eq!(err.plugin(), Some("forbid"));
}

#[tokio::test]
async fn test_directory_reference_needs_opt_in() {
    let files = [
        ("index.html", r#"<iframe src="./assets/"></iframe>"#),
        ("assets/a.txt", "a"),
    ];

    let dir = site(&files);
    let denied = kitchen(&dir, BuildMode::DEVELOPMENT);
    let entry = denied.add_entry("index.html").unwrap();
    let report = GraphLoader::new(Arc::clone(&denied))
        .load(&[entry])
        .await
        .unwrap();
    assert_eq!(report.errors.len(), 1);
    assert_eq!(
        report.errors[0].sub_code(),
        Some("DIRECTORY_REFERENCE_NOT_ALLOWED")
    );

    let allowed = Arc::new(Kitchen::new(
        context(&dir, BuildMode::DEVELOPMENT).allow_directory_references(true),
        default_plugins(),
    ));
    let entry = allowed.add_entry("index.html").unwrap();
    let report = GraphLoader::new(Arc::clone(&allowed))
        .load(&[entry])
        .await
        .unwrap();
    assert!(report.is_ok());
    let assets = find_url(&allowed, "/assets/").unwrap();
    let graph = allowed.graph().read();
    let info = graph.get(&assets).unwrap();
    assert_eq!(info.kind, UrlType::Directory);
    assert_eq!(info.text(), Some("a.txt"));
}

#[tokio::test]
async fn test_parse_error_deferred_in_development() {
    let source = "<p>\n  <script>let a = 1;\n";
    let dir = site(&[("index.html", source)]);

    let dev = kitchen(&dir, BuildMode::DEVELOPMENT);
    let url = dev.add_entry("index.html").unwrap();
    let cooked = dev.cook(&url).await.unwrap();
    let deferred = cooked.deferred_error.as_ref().unwrap();
    assert_eq!(deferred.code(), "TRANSFORM_URL_CONTENT_ERROR");
    assert_eq!(deferred.sub_code(), Some("PARSE_ERROR"));
    assert_eq!(
        dev.graph().read().get(&url).and_then(|info| info.text()),
        Some(source),
        "content is kept"
    );

    let build = kitchen(&dir, BuildMode::PRODUCTION);
    let url = build.add_entry("index.html").unwrap();
    let err = build.cook(&url).await.unwrap_err();
    assert_eq!(err.sub_code(), Some("PARSE_ERROR"));
}

#[tokio::test]
async fn test_deferred_parse_error_keeps_previous_dependencies() {
    let link = r#"<link rel="stylesheet" href="style.css">"#;
    let dir = site(&[("index.html", link), ("style.css", "p {}")]);
    let kitchen = kitchen(&dir, BuildMode::DEVELOPMENT);
    let entry = kitchen.add_entry("index.html").unwrap();
    GraphLoader::new(Arc::clone(&kitchen))
        .load(&[entry.clone()])
        .await
        .unwrap();
    let style = find_url(&kitchen, "/style.css").unwrap();

    write(dir.path(), "index.html", &format!("{link}\n<script>let a = 1;\n"));
    kitchen.consider_modified(&entry);
    let cooked = kitchen.cook(&entry).await.unwrap();

    let deferred = cooked.deferred_error.as_ref().unwrap();
    assert_eq!(deferred.sub_code(), Some("PARSE_ERROR"));
    assert!(cooked.pruned.pruned.is_empty());
    assert_eq!(cooked.dependencies, vec![style.clone()]);
    let graph = kitchen.graph().read();
    assert!(graph.is_used(&style));
    assert_eq!(
        graph.references_of(entry.as_str()).filter(|r| r.is_current()).count(),
        1
    );
}

struct AbortOnFetch {
    signal: AbortSignal,
}

impl Plugin for AbortOnFetch {
    fn name(&self) -> &str {
        "abort-on-fetch"
    }

    fn hooks(&self) -> &'static [HookName] {
        &[HookName::FetchUrlContent]
    }

    fn fetch_url_content(
        &self,
        url_info: &UrlInfo,
        _ctx: &KitchenContext,
    ) -> HookResult<Option<FetchedContent>> {
        if url_info.url.as_str().ends_with("/b.png") {
            self.signal.abort();
        }
        Ok(None)
    }
}

#[tokio::test]
async fn test_abort_during_load() {
    let dir = site(&[("index.html", r#"<img src="b.png">"#), ("b.png", "b")]);
    let signal = AbortSignal::new();
    let mut plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(AbortOnFetch {
        signal: signal.clone(),
    })];
    plugins.extend(default_plugins());
    let context = context(&dir, BuildMode::DEVELOPMENT).with_signal(signal.clone());
    let kitchen = Arc::new(Kitchen::new(context, plugins));
    let entry = kitchen.add_entry("index.html").unwrap();

    let err = GraphLoader::new(Arc::clone(&kitchen))
        .load(&[entry])
        .await
        .unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(err.code(), "ABORTED");
    assert!(signal.is_aborted());
}

// =============================================================================
// Hooks
// =============================================================================

struct Stamp;

impl Plugin for Stamp {
    fn name(&self) -> &str {
        "stamp"
    }

    fn hooks(&self) -> &'static [HookName] {
        &[HookName::TransformReferenceSearchParams]
    }

    fn transform_reference_search_params(
        &self,
        reference: &Reference,
        _ctx: &KitchenContext,
    ) -> HookResult<Vec<(String, String)>> {
        if reference.specifier.ends_with(".css") {
            return Ok(vec![("v".to_string(), "1".to_string())]);
        }
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_search_params_reach_generated_url_only() {
    let dir = site(&[
        ("index.html", r#"<link rel="stylesheet" href="style.css">"#),
        ("style.css", "p {}"),
    ]);
    let mut plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(Stamp)];
    plugins.extend(default_plugins());
    let kitchen = Arc::new(Kitchen::new(context(&dir, BuildMode::DEVELOPMENT), plugins));
    let entry = kitchen.add_entry("index.html").unwrap();
    GraphLoader::new(Arc::clone(&kitchen))
        .load(&[entry.clone()])
        .await
        .unwrap();

    let style = find_url(&kitchen, "/style.css").unwrap();
    let graph = kitchen.graph().read();
    assert!(!graph.sorted_urls().iter().any(|url| url.as_str().contains("?v=1")));

    let reference = graph
        .references_of(entry.as_str())
        .find(|r| r.is_current())
        .unwrap();
    assert_eq!(reference.url.as_ref(), Some(&style));
    assert_eq!(
        reference.generated_url.as_ref().map(ResourceUrl::as_str),
        Some(format!("{style}?v=1").as_str())
    );
    assert_eq!(reference.search_params, vec![("v".to_string(), "1".to_string())]);
    assert_eq!(
        graph.get(&entry).and_then(|info| info.text()),
        Some(r#"<link rel="stylesheet" href="style.css?v=1">"#)
    );
}

struct Banner;

impl Plugin for Banner {
    fn name(&self) -> &str {
        "banner"
    }

    fn hooks(&self) -> &'static [HookName] {
        &[HookName::FinalizeUrlContent]
    }

    fn finalize_url_content(
        &self,
        url_info: &UrlInfo,
        _ctx: &KitchenContext,
    ) -> HookResult<Option<Content>> {
        if url_info.kind != UrlType::Css {
            return Ok(None);
        }
        let text = url_info.text().unwrap_or_default();
        Ok(Some(Content::from(format!("/* banner */\n{text}"))))
    }
}

#[tokio::test]
async fn test_finalize_replaces_content() {
    let dir = site(&[
        ("index.html", r#"<link rel="stylesheet" href="style.css">"#),
        ("style.css", "p {}"),
    ]);
    let mut plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(Banner)];
    plugins.extend(default_plugins());
    let kitchen = Arc::new(Kitchen::new(context(&dir, BuildMode::DEVELOPMENT), plugins));
    let entry = kitchen.add_entry("index.html").unwrap();
    GraphLoader::new(Arc::clone(&kitchen))
        .load(&[entry.clone()])
        .await
        .unwrap();

    let style = find_url(&kitchen, "/style.css").unwrap();
    let graph = kitchen.graph().read();
    let info = graph.get(&style).unwrap();
    assert_eq!(info.text(), Some("/* banner */\np {}"));
    assert_eq!(
        info.original_content.as_ref().and_then(Content::as_text),
        Some("p {}")
    );
    assert_eq!(
        graph.get(&entry).and_then(|info| info.text()),
        Some(r#"<link rel="stylesheet" href="style.css">"#),
        "markup is not finalized"
    );
}

/// Records every stylesheet once it is pruned.
struct WatchPruned {
    pruned: Arc<Mutex<Vec<ResourceUrl>>>,
}

impl Plugin for WatchPruned {
    fn name(&self) -> &str {
        "watch-pruned"
    }

    fn hooks(&self) -> &'static [HookName] {
        &[HookName::Cooked]
    }

    fn cooked(&self, ctx: &mut CookedContext<'_>) -> HookResult<()> {
        if ctx.url().as_str().ends_with(".css") {
            let pruned = Arc::clone(&self.pruned);
            ctx.on_pruned(move |info| pruned.lock().push(info.url.clone()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_on_pruned_fires_when_link_removed() {
    let dir = site(&[
        ("index.html", r#"<link rel="stylesheet" href="style.css">"#),
        ("style.css", "p {}"),
    ]);
    let pruned = Arc::new(Mutex::new(Vec::new()));
    let mut plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(WatchPruned {
        pruned: Arc::clone(&pruned),
    })];
    plugins.extend(default_plugins());
    let kitchen = Arc::new(Kitchen::new(context(&dir, BuildMode::DEVELOPMENT), plugins));
    let entry = kitchen.add_entry("index.html").unwrap();
    GraphLoader::new(Arc::clone(&kitchen))
        .load(&[entry.clone()])
        .await
        .unwrap();
    let style = find_url(&kitchen, "/style.css").unwrap();
    assert!(pruned.lock().is_empty());

    write(dir.path(), "index.html", "<p>plain</p>");
    kitchen.consider_modified(&entry);
    kitchen.cook(&entry).await.unwrap();

    assert_eq!(*pruned.lock(), vec![style]);
}

#[tokio::test]
async fn test_style_attribute_becomes_inline_stylesheet() {
    let dir = site(&[
        ("index.html", r#"<div title="a>b" style="background: url(bg.png)"></div>"#),
        ("bg.png", "png"),
    ]);
    let kitchen = kitchen(&dir, BuildMode::DEVELOPMENT);
    let entry = kitchen.add_entry("index.html").unwrap();
    let report = GraphLoader::new(Arc::clone(&kitchen))
        .load(&[entry.clone()])
        .await
        .unwrap();
    assert!(report.is_ok());

    let bg = find_url(&kitchen, "/bg.png").unwrap();
    let graph = kitchen.graph().read();
    let inline: Vec<&UrlInfo> = graph
        .url_infos()
        .filter(|info| info.is_inline && info.kind == UrlType::Css)
        .collect();
    assert_eq!(inline.len(), 1);
    assert_eq!(inline[0].sorted_dependencies(), vec![bg.clone()]);
    assert!(graph.is_used(&bg));
}

// =============================================================================
// Loader & pruning
// =============================================================================

#[tokio::test]
async fn test_loader_fail_fast() {
    let dir = site(&[("index.html", r#"<img src="missing.png"><img src="b.png">"#), ("b.png", "b")]);

    let build = kitchen(&dir, BuildMode::PRODUCTION);
    let entry = build.add_entry("index.html").unwrap();
    let err = GraphLoader::new(Arc::clone(&build))
        .load(&[entry])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FETCH_URL_CONTENT_ERROR");

    let dev = kitchen(&dir, BuildMode::DEVELOPMENT);
    let entry = dev.add_entry("index.html").unwrap();
    let report = GraphLoader::new(Arc::clone(&dev))
        .load(&[entry])
        .await
        .unwrap();
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.cooked.len(), 2, "index.html and b.png still cook");
}

#[tokio::test]
async fn test_removing_link_prunes_stylesheet() {
    let dir = site(&[
        ("index.html", r#"<link rel="stylesheet" href="style.css">"#),
        ("style.css", "@import \"base.css\";"),
        ("base.css", "p { margin: 0 }"),
    ]);
    let kitchen = kitchen(&dir, BuildMode::DEVELOPMENT);
    let entry = kitchen.add_entry("index.html").unwrap();
    GraphLoader::new(Arc::clone(&kitchen))
        .load(&[entry.clone()])
        .await
        .unwrap();
    let style = find_url(&kitchen, "/style.css").unwrap();
    let base = find_url(&kitchen, "/base.css").unwrap();
    assert!(kitchen.graph().read().is_used(&style));

    write(dir.path(), "index.html", "<p>no styles</p>");
    kitchen.consider_modified(&entry);
    let cooked = kitchen.cook(&entry).await.unwrap();

    assert!(cooked.dependencies.is_empty());
    assert!(cooked.pruned.pruned.contains(&style));
    assert!(cooked.pruned.pruned.contains(&base), "pruning is transitive");
    let graph = kitchen.graph().read();
    assert!(!graph.is_used(&style));
    assert!(!graph.is_used(&base));
}

struct Rename;

impl Plugin for Rename {
    fn name(&self) -> &str {
        "rename"
    }

    fn hooks(&self) -> &'static [HookName] {
        &[HookName::RedirectReference]
    }

    fn redirect_reference(
        &self,
        reference: &Reference,
        _ctx: &KitchenContext,
    ) -> HookResult<Option<ResourceUrl>> {
        let Some(url) = &reference.url else {
            return Ok(None);
        };
        Ok(url
            .as_str()
            .strip_suffix("/old.css")
            .map(|dir| ResourceUrl::new(format!("{dir}/new.css"))))
    }
}

#[tokio::test]
async fn test_redirect_creates_successor_reference() {
    let dir = site(&[
        ("index.html", r#"<link rel="stylesheet" href="old.css">"#),
        ("new.css", "p {}"),
    ]);
    let mut plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(Rename)];
    plugins.extend(default_plugins());
    let kitchen = Arc::new(Kitchen::new(context(&dir, BuildMode::DEVELOPMENT), plugins));
    let entry = kitchen.add_entry("index.html").unwrap();
    let report = GraphLoader::new(Arc::clone(&kitchen))
        .load(&[entry.clone()])
        .await
        .unwrap();
    assert!(report.is_ok());

    let graph = kitchen.graph().read();
    let current: Vec<&Reference> = graph
        .references_of(entry.as_str())
        .filter(|reference| reference.is_current())
        .collect();
    assert_eq!(current.len(), 1);
    let reference = current[0];
    assert!(reference.url.as_ref().unwrap().as_str().ends_with("/new.css"));
    assert!(reference.prev.is_some(), "redirect keeps the original in the log");
    assert!(find_url(&kitchen, "/old.css").is_none());
}
