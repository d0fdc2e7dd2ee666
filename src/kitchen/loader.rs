//! Graph loading: cook entry points and everything they reach.
//!
//! Breadth-expanding fixpoint over a `JoinSet`: every finished cook
//! schedules its newly seen dependencies, until no task is left.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tokio::task::JoinSet;

use super::{CookResult, ErrorSummary, Kitchen, KitchenError};
use crate::core::ResourceUrl;
use crate::{debug, log};

/// Outcome of a graph load.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Cooked resources, in completion order
    pub cooked: Vec<ResourceUrl>,
    /// Errors collected when not failing fast
    pub errors: Vec<Arc<KitchenError>>,
    /// Parse errors deferred to the consumer
    pub deferred: Vec<Arc<KitchenError>>,
    /// Nodes removed by the final reachability pass
    pub pruned: Vec<ResourceUrl>,
}

impl LoadReport {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Drives cooks until the graph stops growing.
pub struct GraphLoader {
    kitchen: Arc<Kitchen>,
    fail_fast: bool,
    prune_unreachable: bool,
}

impl GraphLoader {
    pub fn new(kitchen: Arc<Kitchen>) -> Self {
        let fail_fast = kitchen.context().mode.fail_fast;
        Self {
            kitchen,
            fail_fast,
            prune_unreachable: false,
        }
    }

    /// Abort every task on the first error.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Delete unreachable nodes once loading is done.
    pub fn prune_unreachable(mut self, prune: bool) -> Self {
        self.prune_unreachable = prune;
        self
    }

    /// Cook `entries` and every non-external resource they reach.
    pub async fn load(&self, entries: &[ResourceUrl]) -> Result<LoadReport, Arc<KitchenError>> {
        let signal = self.kitchen.context().signal.clone();
        let mut report = LoadReport::default();
        let mut seen: FxHashSet<ResourceUrl> = FxHashSet::default();
        let mut tasks: JoinSet<CookResult> = JoinSet::new();
        let mut urls: FxHashMap<tokio::task::Id, ResourceUrl> = FxHashMap::default();

        for url in entries {
            if seen.insert(url.clone()) {
                self.spawn(&mut tasks, &mut urls, url.clone());
            }
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            if signal.is_aborted() {
                tasks.abort_all();
                return Err(Arc::new(KitchenError::Aborted));
            }

            let (url, result) = match joined {
                Ok((id, result)) => (urls.remove(&id), result),
                Err(join_error) => {
                    let url = urls.remove(&join_error.id());
                    let err = Arc::new(KitchenError::Task {
                        url: url.clone().unwrap_or_else(|| {
                            self.kitchen.context().root_directory_url.clone()
                        }),
                        message: join_error.to_string(),
                    });
                    (url, Err(err))
                }
            };

            match result {
                Ok(cooked) => {
                    if let Some(deferred) = &cooked.deferred_error {
                        report.deferred.push(Arc::clone(deferred));
                    }
                    let pending: Vec<ResourceUrl> = {
                        let graph = self.kitchen.graph().read();
                        cooked
                            .dependencies
                            .iter()
                            .filter(|dep| {
                                graph.get(*dep).is_some_and(|info| !info.is_external)
                            })
                            .filter(|dep| seen.insert((*dep).clone()))
                            .cloned()
                            .collect()
                    };
                    for dep in pending {
                        self.spawn(&mut tasks, &mut urls, dep);
                    }
                    report.cooked.push(cooked.url.clone());
                }
                Err(err) => {
                    if self.fail_fast {
                        tasks.abort_all();
                        return Err(err);
                    }
                    log!("error"; "{}", ErrorSummary(&err));
                    if let Some(url) = url {
                        debug!("graph"; "{} left uncooked", url);
                    }
                    report.errors.push(err);
                }
            }
        }

        if self.prune_unreachable {
            report.pruned = self.kitchen.graph().write().prune_unreachable();
            debug!("graph"; "pruned {} unreachable", report.pruned.len());
        }
        Ok(report)
    }

    fn spawn(
        &self,
        tasks: &mut JoinSet<CookResult>,
        urls: &mut FxHashMap<tokio::task::Id, ResourceUrl>,
        url: ResourceUrl,
    ) {
        let kitchen = Arc::clone(&self.kitchen);
        let task_url = url.clone();
        let handle = tasks.spawn(async move { kitchen.cook(&task_url).await });
        urls.insert(handle.id(), url);
    }
}
