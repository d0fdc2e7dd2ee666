//! Core types - pure abstractions shared across the codebase.

mod driver;
mod link;
mod state;
mod url;

pub use driver::BuildMode;
pub use link::{LinkKind, has_scheme};
pub use state::{AbortSignal, setup_abort_handler};
pub use url::{ResourceUrl, append_search_params, generate_inline_url, strip_search_and_hash};
