//! Kiln - resource graph, cooking pipeline and build-time versioning for
//! web assets.
//!
//! | Module    | Purpose                                                  |
//! |-----------|----------------------------------------------------------|
//! | `core`    | `ResourceUrl`, specifier classification, abort signal    |
//! | `graph`   | `UrlInfo`, `Reference`, `UrlGraph`, dependency collection |
//! | `kitchen` | cook state machine, plugin hooks, graph loader           |
//! | `plugins` | file resolution and fetch, HTML/CSS/JS reference scanners |
//! | `build`   | bundling, versioning, rewriting, output writing          |
//! | `config`  | `kiln.toml`                                              |
//! | `cli`     | command-line definitions and commands                    |

pub mod build;
pub mod cli;
pub mod config;
pub mod core;
pub mod graph;
pub mod kitchen;
pub mod logger;
pub mod plugins;
pub mod utils;
