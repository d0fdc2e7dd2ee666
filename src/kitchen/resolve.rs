//! Reference resolution chain.
//!
//! `resolve_reference` → `redirect_reference` → `transform_reference_search_params`
//! → `format_reference`. Runs on the reference, before its node exists, so it
//! never touches cook state.

use super::{HookError, HookFailure, HookName, KitchenContext, KitchenError, PluginController};
use crate::core::append_search_params;
use crate::graph::{Reference, ReferenceId, UrlGraph};

/// Resolve reference `id` and return the current reference id.
///
/// Redirects push successors into the log, so the returned id differs from
/// `id` whenever a plugin redirected the reference.
pub fn resolve_reference(
    graph: &mut UrlGraph,
    plugins: &PluginController,
    ctx: &KitchenContext,
    id: ReferenceId,
) -> Result<ReferenceId, KitchenError> {
    let reference = current(graph, id)?;
    let mut id = reference.id;

    // 1. Candidate URL (inline references already have one)
    if reference.url.is_none() {
        let resolved = plugins
            .call_first(HookName::ResolveReference, |plugin| {
                plugin.resolve_reference(&reference, ctx)
            })
            .map_err(|failure| resolve_error(&reference, failure))?;
        let Some((url, plugin)) = resolved else {
            return Err(KitchenError::ResolveUrl {
                specifier: reference.specifier.clone(),
                trace: reference.trace.clone(),
                plugin: None,
                source: None,
            });
        };
        crate::debug!("resolve"; "{} -> {} ({})", reference.specifier, url, plugin);
        graph.references.set_url(id, url);
    }

    // 2. Redirects, each one a new reference
    for plugin in plugins.with_hook(HookName::RedirectReference) {
        let reference = current(graph, id)?;
        let redirected = plugin
            .redirect_reference(&reference, ctx)
            .map_err(|error| {
                resolve_error(
                    &reference,
                    HookFailure {
                        plugin: plugin.name().to_string(),
                        error,
                    },
                )
            })?;
        if let Some(url) = redirected
            && reference.url.as_ref() != Some(&url)
            && let Some(next) = graph.references.redirect(id, url)
        {
            id = next;
        }
    }

    // 3. Cosmetic search params
    let reference = current(graph, id)?;
    let mut params = Vec::new();
    plugins
        .call_all(HookName::TransformReferenceSearchParams, |plugin| {
            params.extend(plugin.transform_reference_search_params(&reference, ctx)?);
            Ok(())
        })
        .map_err(|failure| resolve_error(&reference, failure))?;
    let Some(url) = reference.url.clone() else {
        return Err(KitchenError::ResolveUrl {
            specifier: reference.specifier.clone(),
            trace: reference.trace.clone(),
            plugin: None,
            source: None,
        });
    };
    graph
        .references
        .set_generated(id, url.with_search_params(&params), params.clone());

    // 4. Emitted text
    let reference = current(graph, id)?;
    let formatted = plugins
        .call_first(HookName::FormatReference, |plugin| {
            plugin.format_reference(&reference, ctx)
        })
        .map_err(|failure| resolve_error(&reference, failure))?;
    let specifier = match formatted {
        Some((specifier, _)) => specifier,
        None => append_search_params(&reference.specifier, &params),
    };
    graph.references.set_generated_specifier(id, specifier);

    Ok(id)
}

fn current(graph: &UrlGraph, id: ReferenceId) -> Result<Reference, KitchenError> {
    let id = graph.references.current(id);
    graph
        .reference(id)
        .cloned()
        .ok_or_else(|| KitchenError::Task {
            url: graph.root_directory_url().clone(),
            message: format!("reference {id} is not in the log"),
        })
}

fn resolve_error(reference: &Reference, failure: HookFailure) -> KitchenError {
    match failure.error {
        HookError::Kitchen(inner) => *inner,
        error => KitchenError::ResolveUrl {
            specifier: reference.specifier.clone(),
            trace: reference.trace.clone(),
            plugin: Some(failure.plugin),
            source: Some(error),
        },
    }
}
