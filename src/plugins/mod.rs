//! Built-in plugins.
//!
//! | Plugin               | Hooks                                      |
//! |----------------------|--------------------------------------------|
//! | `FileUrlResolution`  | resolve specifiers to `file:` / remote URLs |
//! | `FileFetch`          | read `file:` URLs from disk                 |
//! | `HtmlReferences`     | attributes, inline `<script>` / `<style>`   |
//! | `CssReferences`      | `@import`, `url()`                          |
//! | `JsReferences`       | imports, workers, `new URL()`               |
//!
//! The scanners are regex based: they find usage sites, report them through
//! the transform context and write the emitted specifier back in place.

mod css;
mod file;
mod html;
mod js;

use std::ops::Range;
use std::sync::Arc;

use regex::Captures;

pub use css::CssReferences;
pub use file::{FileFetch, FileUrlResolution};
pub use html::HtmlReferences;
pub use js::JsReferences;

use crate::graph::ReferenceSpec;
use crate::kitchen::{HookResult, Plugin, TransformContext, TransformOutput};
use crate::utils::text::{TextEdits, line_column};

/// Resolution, filesystem fetch and the three reference scanners, in order.
pub fn default_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(FileUrlResolution),
        Arc::new(FileFetch),
        Arc::new(HtmlReferences),
        Arc::new(CssReferences),
        Arc::new(JsReferences),
    ]
}

/// Span and text of the first participating group among `groups`.
fn group_span<'h>(caps: &Captures<'h>, groups: &[usize]) -> Option<(Range<usize>, &'h str)> {
    groups
        .iter()
        .find_map(|&group| caps.get(group))
        .map(|m| (m.range(), m.as_str()))
}

/// Edits collected while scanning one resource.
struct Rewrites {
    source: String,
    edits: TextEdits,
}

impl Rewrites {
    fn new(source: String) -> Self {
        Self {
            source,
            edits: TextEdits::new(),
        }
    }

    fn source(&self) -> &str {
        &self.source
    }

    /// Position of `offset` as reported in traces.
    fn position(&self, offset: usize) -> (u32, u32) {
        line_column(&self.source, offset)
    }

    /// Report a reference found at `range` and write back its emitted text.
    ///
    /// `write` maps the emitted specifier to the text stored in the source
    /// (e.g. attribute escaping).
    fn report(
        &mut self,
        ctx: &mut TransformContext<'_>,
        spec: ReferenceSpec,
        range: Range<usize>,
        write: impl Fn(&str) -> String,
    ) -> HookResult<()> {
        let (line, column) = self.position(range.start);
        let raw = self.source[range.clone()].to_string();
        let found = ctx.found_reference(spec.at(line, column))?;
        let written = write(&found.generated_specifier);
        if written != raw {
            self.edits.replace(range, written);
        }
        Ok(())
    }

    /// Rewritten content, or `None` if nothing changed.
    fn finish(self) -> Option<TransformOutput> {
        if self.edits.is_empty() {
            return None;
        }
        Some(TransformOutput::new(self.edits.apply(&self.source)))
    }
}
