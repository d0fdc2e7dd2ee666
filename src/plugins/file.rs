//! `file:` URLs: resolving specifiers and reading the filesystem.

use std::fs;
use std::path::Path;

use crate::core::{LinkKind, ResourceUrl};
use crate::graph::{Reference, UrlInfo};
use crate::kitchen::{
    FetchedContent, HookError, HookName, HookResult, KitchenContext, Plugin,
};
use crate::utils::mime;

// =============================================================================
// Resolution
// =============================================================================

/// Resolves specifiers against their owner, `/`-prefixed ones against the
/// root directory. Fragments are dropped; the search part is kept.
pub struct FileUrlResolution;

impl Plugin for FileUrlResolution {
    fn name(&self) -> &str {
        "file_url_resolution"
    }

    fn hooks(&self) -> &'static [HookName] {
        &[HookName::ResolveReference]
    }

    fn resolve_reference(
        &self,
        reference: &Reference,
        ctx: &KitchenContext,
    ) -> HookResult<Option<ResourceUrl>> {
        let specifier = reference.specifier.trim();
        if LinkKind::is_ignorable(specifier) {
            return Ok(None);
        }

        let joined = match LinkKind::parse(specifier) {
            LinkKind::Fragment(_) => return Ok(None),
            LinkKind::External(link) => match link.strip_prefix("//") {
                Some(rest) => ResourceUrl::parse(&format!("https://{rest}")),
                None => ResourceUrl::parse(link),
            },
            LinkKind::SiteRoot(path) => ctx
                .root_directory_url
                .join(path.trim_start_matches('/')),
            LinkKind::FileRelative(path) => reference.owner.join(path),
        };
        let url = joined.map_err(|err| anyhow::anyhow!("invalid specifier `{specifier}`: {err}"))?;
        Ok(Some(without_fragment(url)))
    }
}

fn without_fragment(url: ResourceUrl) -> ResourceUrl {
    if !url.as_str().contains('#') {
        return url;
    }
    match url.to_url() {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            ResourceUrl::from_url(&parsed)
        }
        Err(_) => url,
    }
}

// =============================================================================
// Fetch
// =============================================================================

/// Reads `file:` URLs from disk.
///
/// A sibling `<file>.map` is attached as the resource sourcemap.
pub struct FileFetch;

impl Plugin for FileFetch {
    fn name(&self) -> &str {
        "file"
    }

    fn hooks(&self) -> &'static [HookName] {
        &[HookName::FetchUrlContent]
    }

    fn fetch_url_content(
        &self,
        url_info: &UrlInfo,
        _ctx: &KitchenContext,
    ) -> HookResult<Option<FetchedContent>> {
        let Some(path) = url_info.url.to_file_path() else {
            return Ok(None);
        };

        let metadata = fs::metadata(&path)?;
        if metadata.is_dir() {
            return Ok(Some(FetchedContent::directory(&list_directory(&path)?)));
        }

        let bytes = fs::read(&path)?;
        let content_type = mime::from_extension(url_info.url.extension());
        let mut fetched = FetchedContent::from_bytes(bytes, content_type);

        let map_path = path.with_file_name(format!(
            "{}.map",
            path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default()
        ));
        if map_path.is_file() {
            let sourcemap = fs::read_to_string(&map_path).map_err(HookError::Io)?;
            fetched = fetched.with_sourcemap(sourcemap);
        }
        Ok(Some(fetched))
    }
}

/// Sorted entry names, directories suffixed with `/`.
fn list_directory(path: &Path) -> HookResult<Vec<String>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() {
            name.push('/');
        }
        entries.push(name);
    }
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BuildMode;
    use crate::graph::{ReferenceSpec, ReferenceType, UrlGraph};
    use crate::kitchen::FetchErrorCode;

    fn ctx() -> KitchenContext {
        KitchenContext::new(ResourceUrl::new("file:///site/"), BuildMode::DEVELOPMENT)
    }

    fn resolve(owner: &str, specifier: &str) -> Option<String> {
        let mut graph = UrlGraph::new(ResourceUrl::new("file:///site/"));
        let id = graph.create_reference(
            ResourceUrl::new(owner),
            ReferenceSpec::new(ReferenceType::HtmlHref, specifier),
        );
        let reference = graph.reference(id).unwrap().clone();
        FileUrlResolution
            .resolve_reference(&reference, &ctx())
            .unwrap()
            .map(|url| url.to_string())
    }

    #[test]
    fn test_resolve_relative_and_site_root() {
        let owner = "file:///site/pages/index.html";
        assert_eq!(
            resolve(owner, "../style.css").as_deref(),
            Some("file:///site/style.css")
        );
        assert_eq!(
            resolve(owner, "/assets/app.js").as_deref(),
            Some("file:///site/assets/app.js")
        );
    }

    #[test]
    fn test_resolve_drops_fragment_keeps_search() {
        let owner = "file:///site/index.html";
        assert_eq!(
            resolve(owner, "./icons.svg?x=1#home").as_deref(),
            Some("file:///site/icons.svg?x=1")
        );
    }

    #[test]
    fn test_resolve_external_and_ignorable() {
        let owner = "file:///site/index.html";
        assert_eq!(
            resolve(owner, "//cdn.test/lib.js").as_deref(),
            Some("https://cdn.test/lib.js")
        );
        assert_eq!(resolve(owner, "#main"), None);
        assert_eq!(resolve(owner, "data:text/plain,hi"), None);
    }

    #[test]
    fn test_fetch_file_and_sourcemap() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
        fs::write(dir.path().join("app.js.map"), "{\"version\":3}").unwrap();

        let url = ResourceUrl::from_file_path(&dir.path().join("app.js")).unwrap();
        let mut graph = UrlGraph::new(ResourceUrl::from_directory_path(dir.path()).unwrap());
        graph.add_entry_point(url.clone());
        let info = graph.get(&url).unwrap();

        let fetched = FileFetch.fetch_url_content(info, &ctx()).unwrap().unwrap();
        assert_eq!(fetched.content.as_text(), Some("console.log(1)"));
        assert_eq!(fetched.content_type, mime::types::JAVASCRIPT);
        assert_eq!(fetched.sourcemap.as_deref(), Some("{\"version\":3}"));
    }

    #[test]
    fn test_fetch_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let url = ResourceUrl::from_file_path(&dir.path().join("missing.css")).unwrap();
        let mut graph = UrlGraph::new(ResourceUrl::from_directory_path(dir.path()).unwrap());
        graph.add_entry_point(url.clone());

        let err = FileFetch
            .fetch_url_content(graph.get(&url).unwrap(), &ctx())
            .unwrap_err();
        assert_eq!(err.fetch_code(), FetchErrorCode::NotFound);
    }

    #[test]
    fn test_fetch_directory_lists_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();

        let url = ResourceUrl::from_directory_path(dir.path()).unwrap();
        let mut graph = UrlGraph::new(url.clone());
        graph.add_entry_point(url.clone());

        let fetched = FileFetch
            .fetch_url_content(graph.get(&url).unwrap(), &ctx())
            .unwrap()
            .unwrap();
        assert!(fetched.is_directory);
        assert_eq!(fetched.content.as_text(), Some("a.txt\nb.txt\nsub/"));
    }
}
