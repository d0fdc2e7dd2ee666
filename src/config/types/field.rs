//! Config field paths.

use owo_colors::OwoColorize;
use std::fmt;

/// Dotted path of a config field, e.g. `build.versioning.length`.
///
/// Declared as associated constants next to the section that owns the
/// field, so diagnostics never spell paths by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPath(&'static str);

impl FieldPath {
    #[inline]
    pub const fn new(path: &'static str) -> Self {
        Self(path)
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_args!("`{}`", self.0).bright_blue())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_path() {
        owo_colors::set_override(false);
        let field = FieldPath::new("build.versioning.length");
        assert_eq!(field.as_str(), "build.versioning.length");
        assert_eq!(field.to_string(), "`build.versioning.length`");
    }
}
