//! Utility modules shared across the crate.

pub mod hash;
pub mod html;
pub mod mime;
pub mod text;
