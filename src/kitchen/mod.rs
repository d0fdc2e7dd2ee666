//! Cooking pipeline.
//!
//! - `cook`: per-resource state machine, memoization, phases
//! - `resolve`: reference resolution chain
//! - `plugin`: hook contract and ordered dispatch
//! - `context`: contexts handed to hooks
//! - `loader`: graph loading fixpoint
//! - `error`: error taxonomy

mod context;
mod cook;
mod error;
mod loader;
mod plugin;
mod resolve;

#[cfg(test)]
mod tests;

pub use context::{CookedContext, FoundReference, KitchenContext, TransformContext};
pub use cook::{CookResult, Cooked, Kitchen};
pub use error::{
    ErrorSummary, FetchErrorCode, HookError, HookResult, KitchenError, TransformErrorCode,
};
pub use loader::{GraphLoader, LoadReport};
pub use plugin::{FetchedContent, HookFailure, HookName, Plugin, PluginController, TransformOutput};
pub use resolve::resolve_reference;
