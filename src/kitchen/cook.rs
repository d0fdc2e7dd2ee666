//! The kitchen: cooks one resource through the plugin pipeline.
//!
//! ```text
//! Unresolved → Resolving → Fetching → Transforming → Finalizing → Cooked
//!                  └──────────────┴───────────┴────────────┴──→ Errored
//! ```
//!
//! # Memoization
//!
//! Cooks are keyed by URL and generation. Concurrent callers for the same
//! generation share one `OnceCell` and receive the same `Arc` result; a new
//! generation (after `consider_modified`) gets a fresh cell. Failed results
//! are evicted so the next call retries. A per-URL async mutex keeps two
//! generations of one URL from running phases at the same time.
//!
//! Graph locks are never held across an await: every phase is synchronous
//! and the abort signal is checked between phases.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};

use super::resolve::resolve_reference;
use super::{
    CookedContext, ErrorSummary, FetchErrorCode, HookError, HookFailure, HookName,
    KitchenContext, KitchenError, Plugin, PluginController, TransformContext,
};
use crate::core::ResourceUrl;
use crate::graph::{
    Content, CookState, PruneReport, ReferenceId, ReferenceTrace, UrlGraph, UrlInfo, UrlType,
};
use crate::utils::hash::ContentHash;
use crate::{debug, log};

/// Outcome of a cook, shared by every caller of the same generation.
pub type CookResult = Result<Arc<Cooked>, Arc<KitchenError>>;

/// A successfully cooked resource.
#[derive(Debug)]
pub struct Cooked {
    pub url: ResourceUrl,
    /// Generation the cook started from
    pub generation: u64,
    /// Dependencies after the transform, sorted
    pub dependencies: Vec<ResourceUrl>,
    /// Nodes pruned by the transform
    pub pruned: PruneReport,
    /// Parse error kept for the consumer (dev only)
    pub deferred_error: Option<Arc<KitchenError>>,
}

struct InFlight {
    generation: u64,
    cell: Arc<OnceCell<CookResult>>,
}

/// Cooks resources and owns the graph they live in.
pub struct Kitchen {
    graph: Arc<RwLock<UrlGraph>>,
    plugins: PluginController,
    context: KitchenContext,
    in_flight: DashMap<ResourceUrl, InFlight>,
    locks: DashMap<ResourceUrl, Arc<AsyncMutex<()>>>,
}

impl Kitchen {
    pub fn new(context: KitchenContext, plugins: Vec<Arc<dyn Plugin>>) -> Self {
        let graph = UrlGraph::new(context.root_directory_url.clone());
        Self {
            graph: Arc::new(RwLock::new(graph)),
            plugins: PluginController::new(plugins),
            context,
            in_flight: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    #[inline]
    pub fn graph(&self) -> &Arc<RwLock<UrlGraph>> {
        &self.graph
    }

    #[inline]
    pub fn context(&self) -> &KitchenContext {
        &self.context
    }

    #[inline]
    pub fn plugins(&self) -> &PluginController {
        &self.plugins
    }

    // =========================================================================
    // Entry points & invalidation
    // =========================================================================

    /// Resolve `specifier` against the root directory and mark it as an entry point.
    pub fn add_entry(&self, specifier: &str) -> Result<ResourceUrl, KitchenError> {
        let mut graph = self.graph.write();
        let id = graph.create_entry_reference(specifier);
        self.resolve_and_create(&mut graph, id)
    }

    /// Resolve a reference and return its node URL.
    pub fn resolve_reference(&self, id: ReferenceId) -> Result<ResourceUrl, KitchenError> {
        let mut graph = self.graph.write();
        self.resolve_and_create(&mut graph, id)
    }

    /// Mark `url` modified; the next `cook` starts a fresh generation.
    pub fn consider_modified(&self, url: &ResourceUrl) -> Vec<ResourceUrl> {
        self.graph.write().consider_modified(url)
    }

    fn resolve_and_create(
        &self,
        graph: &mut UrlGraph,
        id: ReferenceId,
    ) -> Result<ResourceUrl, KitchenError> {
        let id = resolve_reference(graph, &self.plugins, &self.context, id)?;
        graph
            .reuse_or_create_url_info(id)
            .ok_or_else(|| KitchenError::Task {
                url: graph.root_directory_url().clone(),
                message: format!("reference {id} resolved without url"),
            })
    }

    // =========================================================================
    // Cooking
    // =========================================================================

    /// Cook `url`, or join the cook already running for its generation.
    pub async fn cook(&self, url: &ResourceUrl) -> CookResult {
        let generation = self
            .graph
            .read()
            .get(url)
            .map(|info| info.modified_generation)
            .ok_or_else(|| Arc::new(KitchenError::UnknownUrl { url: url.clone() }))?;

        let cell = match self.in_flight.entry(url.clone()) {
            Entry::Occupied(entry) if entry.get().generation == generation => {
                Arc::clone(&entry.get().cell)
            }
            Entry::Occupied(mut entry) => {
                let cell = Arc::new(OnceCell::new());
                entry.insert(InFlight {
                    generation,
                    cell: Arc::clone(&cell),
                });
                cell
            }
            Entry::Vacant(entry) => {
                let cell = Arc::new(OnceCell::new());
                entry.insert(InFlight {
                    generation,
                    cell: Arc::clone(&cell),
                });
                cell
            }
        };

        let result = cell
            .get_or_init(|| self.cook_generation(url.clone(), generation))
            .await
            .clone();

        if result.is_err() {
            self.in_flight
                .remove_if(url, |_, in_flight| Arc::ptr_eq(&in_flight.cell, &cell));
        }
        result
    }

    async fn cook_generation(&self, url: ResourceUrl, generation: u64) -> CookResult {
        let lock = Arc::clone(&self.locks.entry(url.clone()).or_default());
        let _guard = lock.lock().await;

        match self.run_phases(&url, generation).await {
            Ok(cooked) => Ok(Arc::new(cooked)),
            Err(err) => {
                let err = Arc::new(err);
                if let Some(info) = self.graph.write().get_mut(&url) {
                    info.state = CookState::Errored;
                    info.error = Some(Arc::clone(&err));
                }
                if !err.is_aborted() {
                    debug!("cook"; "{}", ErrorSummary(&err));
                }
                Err(err)
            }
        }
    }

    async fn run_phases(&self, url: &ResourceUrl, generation: u64) -> Result<Cooked, KitchenError> {
        self.checkpoint().await?;
        let external = {
            let mut graph = self.graph.write();
            let info = graph
                .get_mut(url)
                .ok_or_else(|| KitchenError::UnknownUrl { url: url.clone() })?;
            info.state = CookState::Resolving;
            info.error = None;
            info.is_external
        };

        let mut pruned = PruneReport::default();
        let mut deferred_error = None;

        if !external {
            self.set_state(url, CookState::Fetching);
            self.fetch(url)?;
            self.checkpoint().await?;

            self.set_state(url, CookState::Transforming);
            let (report, deferred) = self.transform(url)?;
            pruned = report;
            deferred_error = deferred;
            self.checkpoint().await?;

            self.set_state(url, CookState::Finalizing);
            self.finalize(url)?;
            self.checkpoint().await?;
        }

        self.notify_cooked(url)?;

        let mut graph = self.graph.write();
        let info = graph
            .get_mut(url)
            .ok_or_else(|| KitchenError::UnknownUrl { url: url.clone() })?;
        info.state = CookState::Cooked;
        info.error.clone_from(&deferred_error);
        let dependencies = info.sorted_dependencies();
        debug!("cook"; "{} ({} deps)", url, dependencies.len());

        Ok(Cooked {
            url: url.clone(),
            generation,
            dependencies,
            pruned,
            deferred_error,
        })
    }

    async fn checkpoint(&self) -> Result<(), KitchenError> {
        if self.context.signal.is_aborted() {
            return Err(KitchenError::Aborted);
        }
        tokio::task::yield_now().await;
        if self.context.signal.is_aborted() {
            return Err(KitchenError::Aborted);
        }
        Ok(())
    }

    fn set_state(&self, url: &ResourceUrl, state: CookState) {
        if let Some(info) = self.graph.write().get_mut(url) {
            info.state = state;
        }
    }

    // =========================================================================
    // Phases
    // =========================================================================

    fn fetch(&self, url: &ResourceUrl) -> Result<(), KitchenError> {
        let info = self
            .graph
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| KitchenError::UnknownUrl { url: url.clone() })?;
        let trace = trace_of(&info);

        let fetched = if info.is_inline {
            let content = info
                .original_content
                .clone()
                .or_else(|| info.inline_url_site.as_ref().map(|site| site.content.clone()))
                .unwrap_or_else(|| Content::from(""));
            let content_type = info
                .content_type
                .clone()
                .unwrap_or_else(|| crate::utils::mime::from_extension(url.extension()).to_string());
            Fetched {
                content,
                content_type,
                kind: None,
                subtype: None,
                sourcemap: None,
                snapshot: false,
            }
        } else {
            let result = self
                .plugins
                .call_first(HookName::FetchUrlContent, |plugin| {
                    plugin.fetch_url_content(&info, &self.context)
                })
                .map_err(|failure| fetch_error(url, &trace, failure))?;
            let Some((fetched, plugin)) = result else {
                return Err(KitchenError::FetchUrlContent {
                    url: url.clone(),
                    code: FetchErrorCode::Other,
                    trace,
                    plugin: None,
                    source: Some(HookError::Other(anyhow::anyhow!(
                        "no plugin fetched this url"
                    ))),
                });
            };
            if fetched.is_directory
                && !(info.allows_directory || self.context.allow_directory_references)
            {
                return Err(KitchenError::FetchUrlContent {
                    url: url.clone(),
                    code: FetchErrorCode::DirectoryReferenceNotAllowed,
                    trace,
                    plugin: Some(plugin),
                    source: None,
                });
            }
            Fetched {
                content: fetched.content,
                content_type: fetched.content_type,
                kind: fetched.kind,
                subtype: fetched.subtype,
                sourcemap: fetched.sourcemap,
                snapshot: true,
            }
        };

        let mut graph = self.graph.write();
        let Some(info) = graph.get_mut(url) else {
            return Ok(());
        };
        info.kind = fetched.kind.unwrap_or_else(|| match info.kind {
            UrlType::Other => UrlType::from_content_type(&fetched.content_type),
            kind => kind,
        });
        if fetched.subtype.is_some() {
            info.subtype = fetched.subtype;
        }
        info.content_etag = Some(ContentHash::of(fetched.content.as_bytes()).to_hex());
        if fetched.snapshot {
            info.original_content = Some(fetched.content.clone());
        }
        info.content = Some(fetched.content);
        info.content_type = Some(fetched.content_type);

        if let Some(sourcemap) = fetched.sourcemap {
            graph.set_sourcemap(url, sourcemap);
        }
        Ok(())
    }

    /// Run transform hooks inside a dependency collection.
    fn transform(
        &self,
        url: &ResourceUrl,
    ) -> Result<(PruneReport, Option<Arc<KitchenError>>), KitchenError> {
        let mut graph = self.graph.write();
        let trace = graph.get(url).map_or_else(|| ReferenceTrace::new(url.clone()), trace_of);
        let mut collection = graph.start_collecting(url);

        let result = {
            let mut ctx = TransformContext::new(
                url.clone(),
                &mut graph,
                &mut collection,
                &self.plugins,
                &self.context,
            );
            self.plugins
                .call_all(HookName::TransformUrlContent, |plugin| {
                    if let Some(output) = plugin.transform_url_content(&mut ctx)? {
                        ctx.apply(output);
                    }
                    Ok(())
                })
        };

        match result {
            Ok(()) => Ok((collection.finish(&mut graph), None)),
            Err(failure) => {
                let err = transform_error(url, &trace, failure);
                let has_content = graph.get(url).is_some_and(|info| info.content.is_some());
                collection.abort(&mut graph);
                if err.is_parse_error() && self.context.mode.defer_parse_errors && has_content {
                    // previous edges stay: the served content still references them
                    log!("cook"; "{}", ErrorSummary(&err));
                    Ok((PruneReport::default(), Some(Arc::new(err))))
                } else {
                    Err(err)
                }
            }
        }
    }

    fn finalize(&self, url: &ResourceUrl) -> Result<(), KitchenError> {
        self.plugins
            .call_all(HookName::FinalizeUrlContent, |plugin| {
                let output = {
                    let graph = self.graph.read();
                    let Some(info) = graph.get(url) else {
                        return Ok(());
                    };
                    plugin.finalize_url_content(info, &self.context)?
                };
                if let Some(content) = output
                    && let Some(info) = self.graph.write().get_mut(url)
                {
                    info.content_etag = Some(ContentHash::of(content.as_bytes()).to_hex());
                    info.content = Some(content);
                }
                Ok(())
            })
            .map_err(|failure| {
                let trace = self
                    .graph
                    .read()
                    .get(url)
                    .map_or_else(|| ReferenceTrace::new(url.clone()), trace_of);
                finalize_error(url, &trace, failure)
            })
    }

    fn notify_cooked(&self, url: &ResourceUrl) -> Result<(), KitchenError> {
        let mut graph = self.graph.write();
        let trace = graph.get(url).map_or_else(|| ReferenceTrace::new(url.clone()), trace_of);
        let mut ctx = CookedContext::new(url.clone(), &mut graph, &self.context);
        self.plugins
            .call_all(HookName::Cooked, |plugin| plugin.cooked(&mut ctx))
            .map_err(|failure| finalize_error(url, &trace, failure))
    }
}

/// Content gathered by the fetch phase.
struct Fetched {
    content: Content,
    content_type: String,
    kind: Option<UrlType>,
    subtype: Option<String>,
    sourcemap: Option<String>,
    /// Record as `original_content` (inline nodes keep their snapshot)
    snapshot: bool,
}

// =============================================================================
// Error wrapping
// =============================================================================

fn trace_of(info: &UrlInfo) -> ReferenceTrace {
    info.first_trace
        .clone()
        .unwrap_or_else(|| ReferenceTrace::new(info.url.clone()))
}

fn fetch_error(url: &ResourceUrl, trace: &ReferenceTrace, failure: HookFailure) -> KitchenError {
    match failure.error {
        HookError::Kitchen(inner) => *inner,
        error => KitchenError::FetchUrlContent {
            url: url.clone(),
            code: error.fetch_code(),
            trace: trace.clone(),
            plugin: Some(failure.plugin),
            source: Some(error),
        },
    }
}

fn transform_error(url: &ResourceUrl, trace: &ReferenceTrace, failure: HookFailure) -> KitchenError {
    match failure.error {
        HookError::Kitchen(inner) => *inner,
        error => {
            let mut trace = trace.clone();
            if let HookError::Parse { line, column, .. } = &error {
                trace = ReferenceTrace {
                    url: url.clone(),
                    line: *line,
                    column: *column,
                };
            }
            KitchenError::TransformUrlContent {
                url: url.clone(),
                code: error.transform_code(),
                trace,
                plugin: Some(failure.plugin),
                source: Some(error),
            }
        }
    }
}

fn finalize_error(url: &ResourceUrl, trace: &ReferenceTrace, failure: HookFailure) -> KitchenError {
    match failure.error {
        HookError::Kitchen(inner) => *inner,
        error => KitchenError::FinalizeUrlContent {
            url: url.clone(),
            trace: trace.clone(),
            plugin: Some(failure.plugin),
            source: Some(error),
        },
    }
}
