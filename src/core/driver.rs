//! Cooking mode for production builds and interactive development.

/// Cooking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildMode {
    /// Keep content and record `PARSE_ERROR` instead of failing the cook.
    pub defer_parse_errors: bool,

    /// Abort graph loading on the first error.
    pub fail_fast: bool,
}

impl BuildMode {
    /// Production mode: every error is fatal.
    pub const PRODUCTION: Self = Self {
        defer_parse_errors: false,
        fail_fast: true,
    };

    /// Development mode: errors are collected, syntax errors are deferred.
    pub const DEVELOPMENT: Self = Self {
        defer_parse_errors: true,
        fail_fast: false,
    };

    #[inline]
    pub const fn is_dev(&self) -> bool {
        self.defer_parse_errors
    }

    pub const fn as_str(&self) -> &'static str {
        if self.is_dev() { "dev" } else { "build" }
    }
}

impl Default for BuildMode {
    fn default() -> Self {
        Self::PRODUCTION
    }
}
