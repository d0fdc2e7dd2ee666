//! Script reference scanner.
//!
//! | Pattern                                   | Reference                    |
//! |-------------------------------------------|------------------------------|
//! | `import x from "s"`, `export * from "s"`  | `JsImport` (modules only)    |
//! | `import("s")`                             | `JsDynamicImport`            |
//! | `new URL("s", import.meta.url)`           | `JsUrl`, runtime lookup      |
//! | `new Worker("s")`, `new SharedWorker("s")`| `JsWorker`, runtime lookup   |
//! | `navigator.serviceWorker.register("s")`   | `JsWorker`, runtime lookup   |
//!
//! Bare specifiers (`"react"`) are left to an import map and not reported.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::{Rewrites, group_span};
use crate::core::{LinkKind, has_scheme};
use crate::graph::{ReferenceSpec, ReferenceType, UrlType, subtype};
use crate::kitchen::{HookName, HookResult, Plugin, TransformContext, TransformOutput};

/// String literal: group 1 (double quotes) or group 2 (single quotes).
macro_rules! string_literal {
    () => {
        r#"(?:"([^"\\\n]*)"|'([^'\\\n]*)')"#
    };
}

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?m)(?:^|[;\s])(?:import\s*(?:[\w$*{}\s,]+?\s*from\s*)?|export\s*[\w$*{}\s,]*?\s*from\s*)",
        string_literal!()
    ))
    .unwrap()
});

static DYNAMIC_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(r"\bimport\s*\(\s*", string_literal!(), r"\s*[,)]")).unwrap()
});

static NEW_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\bnew\s+URL\s*\(\s*",
        string_literal!(),
        r"\s*,\s*import\.meta\.url\s*\)"
    ))
    .unwrap()
});

static WORKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(r"\bnew\s+(Shared)?Worker\s*\(\s*", string_literal!())).unwrap()
});

static SERVICE_WORKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\bserviceWorker\s*\.\s*register\s*\(\s*",
        string_literal!()
    ))
    .unwrap()
});

pub struct JsReferences;

impl Plugin for JsReferences {
    fn name(&self) -> &str {
        "js"
    }

    fn hooks(&self) -> &'static [HookName] {
        &[HookName::TransformUrlContent]
    }

    fn transform_url_content(
        &self,
        ctx: &mut TransformContext<'_>,
    ) -> HookResult<Option<TransformOutput>> {
        let kind = ctx.kind();
        if !kind.is_js() {
            return Ok(None);
        }
        let Some(text) = ctx.text().map(str::to_owned) else {
            return Ok(None);
        };
        let mut rewrites = Rewrites::new(text);

        let mut found = scan(rewrites.source(), kind == UrlType::JsModule);
        found.sort_by_key(|site| site.range.start);
        found.dedup_by_key(|site| site.range.start);

        for site in found {
            rewrites.report(ctx, site.spec, site.range, str::to_string)?;
        }
        Ok(rewrites.finish())
    }
}

/// A specifier literal and the reference it produces.
struct Site {
    range: Range<usize>,
    spec: ReferenceSpec,
}

fn scan(source: &str, is_module: bool) -> Vec<Site> {
    let mut sites = Vec::new();
    let mut push = |range: Range<usize>, specifier: &str, spec: fn(&str) -> ReferenceSpec| {
        if !is_bare(specifier) && !LinkKind::is_ignorable(specifier) {
            sites.push(Site {
                range,
                spec: spec(specifier),
            });
        }
    };

    if is_module {
        for caps in IMPORT_RE.captures_iter(source) {
            if let Some((range, value)) = group_span(&caps, &[1, 2]) {
                push(range, value, |s| {
                    ReferenceSpec::new(ReferenceType::JsImport, s).expected_type(UrlType::JsModule)
                });
            }
        }
    }
    for caps in DYNAMIC_IMPORT_RE.captures_iter(source) {
        if let Some((range, value)) = group_span(&caps, &[1, 2]) {
            push(range, value, |s| {
                ReferenceSpec::new(ReferenceType::JsDynamicImport, s)
                    .expected_type(UrlType::JsModule)
            });
        }
    }
    for caps in NEW_URL_RE.captures_iter(source) {
        if let Some((range, value)) = group_span(&caps, &[1, 2]) {
            push(range, value, |s| {
                ReferenceSpec::new(ReferenceType::JsUrl, s).runtime_lookup()
            });
        }
    }
    for caps in WORKER_RE.captures_iter(source) {
        let shared = caps.get(1).is_some();
        if let Some((range, value)) = group_span(&caps, &[2, 3]) {
            let spec: fn(&str) -> ReferenceSpec = if shared {
                |s| worker(s, subtype::SHARED_WORKER)
            } else {
                |s| worker(s, subtype::WORKER)
            };
            push(range, value, spec);
        }
    }
    for caps in SERVICE_WORKER_RE.captures_iter(source) {
        if let Some((range, value)) = group_span(&caps, &[1, 2]) {
            push(range, value, |s| worker(s, subtype::SERVICE_WORKER));
        }
    }
    sites
}

fn worker(specifier: &str, kind: &str) -> ReferenceSpec {
    ReferenceSpec::new(ReferenceType::JsWorker, specifier)
        .expected_type(UrlType::JsClassic)
        .expected_subtype(kind)
        .runtime_lookup()
}

/// `"react"`, `"lodash/get"`: resolved by an import map, not by URL.
fn is_bare(specifier: &str) -> bool {
    !(specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || has_scheme(specifier))
}
