//! Production build.
//!
//! Phases, in order:
//! - **Load**: cook every entry point and what it reaches, failing fast
//! - **Prune**: drop nodes no entry point reaches
//! - **Place**: give every file its final build path, in sorted URL order
//! - **Bundle**: hand each type group to `bundle` plugins
//! - **Version**: hash eligible resources bottom-up
//! - **Rewrite**: replace emitted specifiers with versioned ones
//! - **Write**: output files, manifest and debug mirror, only once all of
//!   the above succeeded. Each directory is filled next to its final
//!   location and moved into place whole.

mod bundle;
mod rewrite;
mod urls;
mod version;


use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLockWriteGuard};
use percent_encoding::percent_decode_str;
use rayon::prelude::*;
use thiserror::Error;

use crate::core::{AbortSignal, BuildMode, ResourceUrl};
use crate::graph::{Content, UrlGraph, UrlInfo, UrlType};
use crate::kitchen::{
    ErrorSummary, GraphLoader, HookError, Kitchen, KitchenContext, KitchenError, Plugin,
};
use crate::plugins::default_plugins;
use crate::{debug, debug_do, log};

pub use bundle::{BUNDLE_ORDER, bundle_groups, run_bundlers};
pub use rewrite::Rewriter;
pub use urls::{BuildSpecifiers, BuildUrlsGenerator, relocate_specifiers};
pub use version::{
    VersioningMethod, VersioningOptions, Versions, compute_versions, is_versionable,
};

// =============================================================================
// Bundle hook types
// =============================================================================

/// State handed to `bundle` hooks.
pub struct BundleContext {
    urls: Arc<Mutex<BuildUrlsGenerator>>,
    base: String,
}

impl BundleContext {
    pub fn new(urls: Arc<Mutex<BuildUrlsGenerator>>, base: impl Into<String>) -> Self {
        Self {
            urls,
            base: base.into(),
        }
    }

    /// Build path of `url`, allocated on first use.
    pub fn build_path(&self, url: &ResourceUrl) -> String {
        self.urls.lock().generate(url)
    }

    /// Specifier a bundle should emit to reference `url`.
    pub fn specifier(&self, url: &ResourceUrl) -> String {
        format!("{}{}", self.base, self.build_path(url))
    }
}

/// New content for one resource of a bundled group.
#[derive(Debug, Clone)]
pub struct BundleOutput {
    pub url: ResourceUrl,
    pub content: Content,
    pub sourcemap: Option<String>,
}

impl BundleOutput {
    pub fn new(url: ResourceUrl, content: impl Into<Content>) -> Self {
        Self {
            url,
            content: content.into(),
            sourcemap: None,
        }
    }

    pub fn with_sourcemap(mut self, sourcemap: impl Into<String>) -> Self {
        self.sourcemap = Some(sourcemap.into());
        self
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{}", ErrorSummary(.0))]
    Kitchen(Arc<KitchenError>),

    #[error("bundler `{plugin}` failed on {kind:?} resources")]
    Bundle {
        plugin: String,
        kind: UrlType,
        #[source]
        source: HookError,
    },

    #[error("bundler returned content for unknown resource {0}")]
    UnknownBundleUrl(ResourceUrl),

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize manifest")]
    Manifest(#[from] serde_json::Error),

    #[error("source directory {} is not usable", .0.display())]
    Root(PathBuf),

    #[error("refusing to replace {}: it contains the source directory", .0.display())]
    OutputContainsRoot(PathBuf),

    #[error("build aborted")]
    Aborted,
}

impl From<KitchenError> for BuildError {
    fn from(err: KitchenError) -> Self {
        Self::Kitchen(Arc::new(err))
    }
}

impl From<Arc<KitchenError>> for BuildError {
    fn from(err: Arc<KitchenError>) -> Self {
        if err.is_aborted() {
            Self::Aborted
        } else {
            Self::Kitchen(err)
        }
    }
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Source directory; entry specifiers resolve against it
    pub root: PathBuf,
    pub entries: Vec<String>,
    pub output: PathBuf,
    /// Prefix of every emitted specifier
    pub base: String,
    /// `None` disables versioning
    pub versioning: Option<VersioningOptions>,
    /// Manifest file name inside `output`
    pub manifest: Option<String>,
    /// Directory receiving every cooked resource as-is
    pub debug_dir: Option<PathBuf>,
    pub allow_directory_references: bool,
}

impl BuildOptions {
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: vec!["index.html".to_string()],
            output: output.into(),
            base: "/".to_string(),
            versioning: Some(VersioningOptions::default()),
            manifest: Some("manifest.json".to_string()),
            debug_dir: None,
            allow_directory_references: false,
        }
    }
}

// =============================================================================
// Plan
// =============================================================================

/// One file to write, at a build-relative URL path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: String,
    pub contents: Vec<u8>,
}

impl OutputFile {
    fn new(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    /// Filesystem location under `dir` (percent-decoded).
    pub fn location(&self, dir: &Path) -> PathBuf {
        let decoded = percent_decode_str(&self.path).decode_utf8_lossy();
        dir.join(decoded.as_ref())
    }

    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }
}

/// Everything a build would write, computed without touching the output.
pub struct BuildPlan {
    pub kitchen: Arc<Kitchen>,
    pub files: Vec<OutputFile>,
    /// Build path → versioned build path, sorted by key
    pub manifest: serde_json::Map<String, serde_json::Value>,
    pub debug_files: Vec<OutputFile>,
    pub versions: Versions,
}

impl BuildPlan {
    pub fn file(&self, path: &str) -> Option<&OutputFile> {
        self.files.iter().find(|file| file.path == path)
    }

    pub fn manifest_json(&self) -> Result<String, BuildError> {
        Ok(serde_json::to_string_pretty(&self.manifest)?)
    }
}

/// Summary of a written build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub written: usize,
    pub versioned: usize,
    pub manifest: Option<PathBuf>,
    pub debug_written: usize,
}

// =============================================================================
// Driver
// =============================================================================

pub struct Build {
    options: BuildOptions,
    plugins: Vec<Arc<dyn Plugin>>,
    signal: AbortSignal,
}

impl Build {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            plugins: Vec::new(),
            signal: AbortSignal::new(),
        }
    }

    /// Extra plugins, run after build formatting and before the built-ins.
    pub fn with_plugins(mut self, plugins: Vec<Arc<dyn Plugin>>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = signal;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Load, bundle, version and rewrite, without writing anything.
    pub async fn plan(&self) -> Result<BuildPlan, BuildError> {
        let root = fs::canonicalize(&self.options.root)
            .map_err(|_| BuildError::Root(self.options.root.clone()))?;
        let root_url = ResourceUrl::from_directory_path(&root)
            .ok_or_else(|| BuildError::Root(self.options.root.clone()))?;
        let urls = Arc::new(Mutex::new(BuildUrlsGenerator::new(root_url.clone())));

        let mut plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(BuildSpecifiers::new(
            Arc::clone(&urls),
            self.options.base.clone(),
        ))];
        plugins.extend(self.plugins.iter().cloned());
        plugins.extend(default_plugins());

        let context = KitchenContext::new(root_url, BuildMode::PRODUCTION)
            .with_signal(self.signal.clone())
            .allow_directory_references(self.options.allow_directory_references);
        let kitchen = Arc::new(Kitchen::new(context, plugins));

        let entries = self
            .options
            .entries
            .iter()
            .map(|entry| kitchen.add_entry(entry))
            .collect::<Result<Vec<_>, _>>()?;

        let report = GraphLoader::new(Arc::clone(&kitchen))
            .fail_fast(true)
            .prune_unreachable(true)
            .load(&entries)
            .await?;
        if let Some(err) = report.errors.into_iter().next() {
            return Err(err.into());
        }
        if self.signal.is_aborted() {
            return Err(BuildError::Aborted);
        }
        log!(
            "build";
            "cooked {} resource(s), pruned {}",
            report.cooked.len(),
            report.pruned.len()
        );

        let mut graph = kitchen.graph().write();
        {
            let mut generator = urls.lock();
            let targets: Vec<ResourceUrl> = graph
                .sorted_urls()
                .into_iter()
                .filter(|url| {
                    url.is_file()
                        && graph
                            .get(url)
                            .is_some_and(|info| !info.is_inline && !info.is_external)
                })
                .collect();
            generator.assign_all(&targets);
            let relocated = relocate_specifiers(&mut graph, &generator, &self.options.base);
            debug!("build"; "{} resource(s) relocated to final paths", relocated);
        }

        let mut bundle_ctx = BundleContext::new(Arc::clone(&urls), self.options.base.clone());
        run_bundlers(&mut graph, kitchen.plugins(), &mut bundle_ctx)?;
        let graph = RwLockWriteGuard::downgrade(graph);

        let versioning = self.options.versioning.unwrap_or_default();
        let versions = match &self.options.versioning {
            Some(options) => compute_versions(&graph, options),
            None => Versions::default(),
        };
        debug_do! {
            let mut listed: Vec<_> = versions.iter().collect();
            listed.sort_unstable();
            for (url, version) in listed {
                debug!("version"; "{} {}", version, url);
            }
        }

        let mut generator = urls.lock();
        let debug_files = if self.options.debug_dir.is_some() {
            debug_mirror(&graph, &generator)
        } else {
            Vec::new()
        };

        let outputs: Vec<(ResourceUrl, String)> = graph
            .sorted_urls()
            .into_iter()
            .filter(|url| graph.get(url).is_some_and(|info| is_output(&graph, info)))
            .map(|url| {
                let path = generator.generate(&url);
                (url, path)
            })
            .collect();

        let rewriter = Rewriter::new(
            &graph,
            &versions,
            &generator,
            &versioning,
            &self.options.base,
        );
        let mut files = Vec::with_capacity(outputs.len());
        for (url, path) in &outputs {
            let Some(info) = graph.get(url) else {
                continue;
            };
            let Some(content) = &info.content else {
                continue;
            };
            let file = match versions.get(url) {
                Some(version) => versioning.versioned_file(path, version),
                None => path.clone(),
            };
            let contents = match content {
                Content::Text(_) => rewriter
                    .rewrite(info)
                    .map(String::into_bytes)
                    .unwrap_or_else(|| content.as_bytes().to_vec()),
                Content::Binary(bytes) => bytes.clone(),
            };
            debug!("build"; "{} -> {}", url, file);
            if let Some(sourcemap) = &info.sourcemap {
                files.push(OutputFile::new(format!("{file}.map"), sourcemap.as_bytes()));
            }
            files.push(OutputFile::new(file, contents));
        }

        let mut entries: Vec<(String, String)> = versions
            .iter()
            .filter_map(|(url, version)| {
                let path = generator.get(url)?;
                Some((path.to_string(), versioning.versioned_path(path, version)))
            })
            .collect();
        entries.sort();
        let manifest = entries
            .into_iter()
            .map(|(path, versioned)| (path, serde_json::Value::String(versioned)))
            .collect();

        drop(rewriter);
        drop(generator);
        drop(graph);

        Ok(BuildPlan {
            kitchen,
            files,
            manifest,
            debug_files,
            versions,
        })
    }

    /// Plan the build, then write it.
    pub async fn run(&self) -> Result<BuildReport, BuildError> {
        let plan = self.plan().await?;
        if self.signal.is_aborted() {
            return Err(BuildError::Aborted);
        }
        self.write(&plan)
    }

    /// Write a plan to the configured output and debug directories.
    ///
    /// Both directories are replaced; on failure they keep their previous
    /// contents.
    pub fn write(&self, plan: &BuildPlan) -> Result<BuildReport, BuildError> {
        let output = &self.options.output;
        let root = &self.options.root;
        let manifest_name = match &self.options.manifest {
            Some(name) if self.options.versioning.is_some() => Some(name),
            _ => None,
        };

        publish(output, root, |staging| {
            write_files(staging, &plan.files)?;
            if let Some(name) = manifest_name {
                write_file(&staging.join(name), plan.manifest_json()?.as_bytes())?;
            }
            Ok(())
        })?;
        let manifest = manifest_name.map(|name| output.join(name));

        let debug_written = match &self.options.debug_dir {
            Some(dir) => {
                publish(dir, root, |staging| write_files(staging, &plan.debug_files))?;
                plan.debug_files.len()
            }
            None => 0,
        };

        log!(
            "build";
            "wrote {} file(s) to {}, {} versioned",
            plan.files.len(),
            output.display(),
            plan.versions.len()
        );
        Ok(BuildReport {
            written: plan.files.len(),
            versioned: plan.versions.len(),
            manifest,
            debug_written,
        })
    }
}

/// Whether `info` produces an output file.
fn is_output(graph: &UrlGraph, info: &UrlInfo) -> bool {
    !info.is_inline
        && !info.is_external
        && info.content.is_some()
        && info.kind != UrlType::Directory
        && info.sourcemap_owner.is_none()
        && (info.is_entry_point || graph.is_used(&info.url))
}

/// Cooked content of every node, by build path when it has one.
fn debug_mirror(graph: &UrlGraph, urls: &BuildUrlsGenerator) -> Vec<OutputFile> {
    let root = graph.root_directory_url().as_str();
    graph
        .url_infos()
        .filter(|info| !info.is_external)
        .filter_map(|info| {
            let content = info.content.as_ref()?;
            let path = match urls.get(&info.url) {
                Some(path) => path.to_string(),
                None => {
                    let url = info.url.without_search_and_hash();
                    match url.strip_prefix(root) {
                        Some(relative) => relative.to_string(),
                        None => format!("other/{}", info.url.basename()),
                    }
                }
            };
            Some(OutputFile::new(safe_file_name(&path), content.as_bytes()))
        })
        .collect()
}

/// Directory listings end with `/`; give them a file name.
fn safe_file_name(path: &str) -> String {
    match path.strip_suffix('/') {
        Some(dir) if dir.is_empty() => "index.dir".to_string(),
        Some(dir) => format!("{dir}.dir"),
        None => path.to_string(),
    }
}

const STAGING_SUFFIX: &str = ".kiln-staging";
const PREVIOUS_SUFFIX: &str = ".kiln-previous";

/// Fill a sibling of `dir` with `fill`, then swap it in for `dir`.
fn publish(
    dir: &Path,
    root: &Path,
    fill: impl FnOnce(&Path) -> Result<(), BuildError>,
) -> Result<(), BuildError> {
    if root.starts_with(dir) {
        return Err(BuildError::OutputContainsRoot(dir.to_path_buf()));
    }
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| BuildError::Write { path, source }
    };

    let staging = sibling(dir, STAGING_SUFFIX);
    remove_dir_if_exists(&staging).map_err(io_err(&staging))?;
    fs::create_dir_all(&staging).map_err(io_err(&staging))?;
    if let Err(err) = fill(&staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }

    let previous = sibling(dir, PREVIOUS_SUFFIX);
    remove_dir_if_exists(&previous).map_err(io_err(&previous))?;
    let had_previous = dir.exists();
    if had_previous {
        fs::rename(dir, &previous).map_err(io_err(dir))?;
    }
    if let Err(source) = fs::rename(&staging, dir) {
        if had_previous {
            let _ = fs::rename(&previous, dir);
        }
        let _ = fs::remove_dir_all(&staging);
        return Err(BuildError::Write {
            path: dir.to_path_buf(),
            source,
        });
    }
    remove_dir_if_exists(&previous).map_err(io_err(&previous))
}

/// `<parent>/<name><suffix>` for `<parent>/<name>`.
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir
        .file_name()
        .map_or_else(|| OsString::from("output"), |name| name.to_os_string());
    name.push(suffix);
    dir.with_file_name(name)
}

fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

fn write_files(dir: &Path, files: &[OutputFile]) -> Result<(), BuildError> {
    files
        .par_iter()
        .try_for_each(|file| write_file(&file.location(dir), &file.contents))
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), BuildError> {
    let io_err = |source: io::Error| BuildError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, contents).map_err(io_err)
}
