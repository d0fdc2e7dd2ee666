//! Stylesheet reference scanner: `@import` and `url()`.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::{Rewrites, group_span};
use crate::core::LinkKind;
use crate::graph::{ReferenceSpec, ReferenceType, UrlType};
use crate::kitchen::{HookName, HookResult, Plugin, TransformContext, TransformOutput};

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?(?:"([^"\n]*)"|'([^'\n]*)'|([^\s"'();]+))"#).unwrap()
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\burl\(\s*(?:"([^"\n]*)"|'([^'\n]*)'|([^\s"'()]+))\s*\)"#).unwrap()
});

pub struct CssReferences;

impl Plugin for CssReferences {
    fn name(&self) -> &str {
        "css"
    }

    fn hooks(&self) -> &'static [HookName] {
        &[HookName::TransformUrlContent]
    }

    fn transform_url_content(
        &self,
        ctx: &mut TransformContext<'_>,
    ) -> HookResult<Option<TransformOutput>> {
        if ctx.kind() != UrlType::Css {
            return Ok(None);
        }
        let Some(text) = ctx.text().map(str::to_owned) else {
            return Ok(None);
        };
        let mut rewrites = Rewrites::new(text);
        let comments: Vec<Range<usize>> = COMMENT_RE
            .find_iter(rewrites.source())
            .map(|m| m.range())
            .collect();
        let in_comment = |offset: usize| comments.iter().any(|range| range.contains(&offset));

        let mut found: Vec<(ReferenceType, Range<usize>, String)> = Vec::new();
        for caps in IMPORT_RE.captures_iter(rewrites.source()) {
            if let Some((range, value)) = group_span(&caps, &[1, 2, 3])
                && !in_comment(range.start)
            {
                found.push((ReferenceType::CssImport, range, value.to_string()));
            }
        }
        for caps in URL_RE.captures_iter(rewrites.source()) {
            if let Some((range, value)) = group_span(&caps, &[1, 2, 3])
                && !in_comment(range.start)
                && !found.iter().any(|(_, seen, _)| seen.start == range.start)
            {
                found.push((ReferenceType::CssUrl, range, value.to_string()));
            }
        }
        found.sort_by_key(|(_, range, _)| range.start);

        for (kind, range, value) in found {
            let specifier = value.trim().to_string();
            if LinkKind::is_ignorable(&specifier) {
                continue;
            }
            let mut spec = ReferenceSpec::new(kind, specifier);
            if kind == ReferenceType::CssImport {
                spec = spec.expected_type(UrlType::Css);
            }
            rewrites.report(ctx, spec, range, str::to_string)?;
        }

        Ok(rewrites.finish())
    }
}
