//! Resource graph.
//!
//! - [`UrlInfo`]: one node per canonical URL
//! - [`Reference`]: one usage site, stored in the append-only [`ReferenceLog`]
//! - [`UrlGraph`]: nodes, bidirectional edges, pruning
//! - [`DependencyCollection`]: the only write path for edges

mod collector;
mod reference;
mod url_graph;
mod url_info;

#[cfg(test)]
mod tests;

pub use collector::{DependencyCollection, PruneReport};
pub use reference::{
    InlineSpec, Reference, ReferenceId, ReferenceLog, ReferenceSpec, ReferenceTrace,
    ReferenceType,
};
pub use url_graph::{PrunedCallback, UrlGraph, UrlInfoObserver};
pub use url_info::{Content, CookState, InlineUrlSite, UrlInfo, UrlType, subtype};
