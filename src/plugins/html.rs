//! Markup reference scanner.
//!
//! Reports `src` / `href` / `srcset` attribute values, turns `<script>` and
//! `<style>` bodies (and `style` attributes that hold a `url()`) into inline
//! resources, and writes emitted specifiers back into the attributes.
//!
//! Start tags are matched with quoted attribute values skipped as a whole,
//! so a `>` inside quotes does not end the tag.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::Rewrites;
use crate::core::LinkKind;
use crate::graph::{InlineSpec, ReferenceSpec, ReferenceType, UrlType};
use crate::kitchen::{HookError, HookName, HookResult, Plugin, TransformContext, TransformOutput};
use crate::utils::html::{Attribute, escape_attr, find_attribute, parse_attributes, unescape};
use crate::utils::mime;

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

/// Attributes of a start tag: anything up to `>`, quoted values as a unit.
const ATTRS: &str = r#"((?:[^>"']|"[^"]*"|'[^']*')*)"#;

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?is)<script\b{ATTRS}>(.*?)</script\s*>")).unwrap()
});

static STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?is)<style\b{ATTRS}>(.*?)</style\s*>")).unwrap()
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)<([a-z][a-z0-9-]*)\b{ATTRS}>")).unwrap());

static CSS_URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\burl\(").unwrap());

static SCRIPT_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<script\b").unwrap());

/// `(tag, attribute)` pairs holding a single URL.
const URL_ATTRIBUTES: &[(&str, &str)] = &[
    ("img", "src"),
    ("source", "src"),
    ("video", "src"),
    ("video", "poster"),
    ("audio", "src"),
    ("track", "src"),
    ("iframe", "src"),
    ("embed", "src"),
    ("input", "src"),
    ("use", "href"),
    ("image", "href"),
];

pub struct HtmlReferences;

impl Plugin for HtmlReferences {
    fn name(&self) -> &str {
        "html"
    }

    fn hooks(&self) -> &'static [HookName] {
        &[HookName::TransformUrlContent]
    }

    fn transform_url_content(
        &self,
        ctx: &mut TransformContext<'_>,
    ) -> HookResult<Option<TransformOutput>> {
        if ctx.kind() != UrlType::Html {
            return Ok(None);
        }
        let Some(text) = ctx.text().map(str::to_owned) else {
            return Ok(None);
        };
        let mut rewrites = Rewrites::new(text);
        let skipped = skipped_ranges(rewrites.source())?;

        let scripts: Vec<_> = SCRIPT_RE
            .captures_iter(rewrites.source())
            .filter(|caps| !inside(&skipped.comments, caps.get_match().start()))
            .map(|caps| RawElement::new(&caps))
            .collect();
        for script in scripts {
            scan_script(ctx, &mut rewrites, &script)?;
        }

        let styles: Vec<_> = STYLE_RE
            .captures_iter(rewrites.source())
            .filter(|caps| !inside(&skipped.comments, caps.get_match().start()))
            .map(|caps| RawElement::new(&caps))
            .collect();
        for style in styles {
            if !style.body.trim().is_empty() {
                report_inline(
                    ctx,
                    &mut rewrites,
                    &style,
                    ReferenceType::HtmlInlineContent,
                    UrlType::Css,
                    mime::types::CSS,
                )?;
            }
        }

        let tags: Vec<(String, Range<usize>)> = TAG_RE
            .captures_iter(rewrites.source())
            .filter(|caps| {
                let start = caps.get_match().start();
                !inside(&skipped.comments, start) && !inside(&skipped.raw_bodies, start)
            })
            .filter_map(|caps| {
                let name = caps.get(1)?.as_str().to_ascii_lowercase();
                let attrs = caps.get(2)?;
                (name != "script").then(|| (name, attrs.range()))
            })
            .collect();
        for (name, attrs_range) in tags {
            let attrs = parse_attributes(&rewrites.source()[attrs_range.clone()], attrs_range.start);
            scan_tag(ctx, &mut rewrites, &name, &attrs)?;
        }

        Ok(rewrites.finish())
    }
}

// =============================================================================
// Elements
// =============================================================================

/// A `<script>` or `<style>` element.
struct RawElement {
    attrs: Vec<Attribute>,
    body: String,
    body_start: usize,
}

impl RawElement {
    fn new(caps: &regex::Captures<'_>) -> Self {
        let attrs = caps
            .get(1)
            .map(|m| parse_attributes(m.as_str(), m.start()))
            .unwrap_or_default();
        let (body, body_start) = caps
            .get(2)
            .map_or((String::new(), caps.get_match().end()), |m| {
                (m.as_str().to_string(), m.start())
            });
        Self {
            attrs,
            body,
            body_start,
        }
    }
}

fn scan_script(
    ctx: &mut TransformContext<'_>,
    rewrites: &mut Rewrites,
    script: &RawElement,
) -> HookResult<()> {
    let script_type = find_attribute(&script.attrs, "type")
        .map(|attr| unescape(&attr.value).trim().to_ascii_lowercase())
        .unwrap_or_default();
    let kind = match script_type.as_str() {
        "module" => UrlType::JsModule,
        "" | "text/javascript" | "application/javascript" => UrlType::JsClassic,
        "importmap" | "application/json" | "application/ld+json" => UrlType::Json,
        _ => return Ok(()),
    };

    if let Some(src) = find_attribute(&script.attrs, "src") {
        return report_attribute(ctx, rewrites, ReferenceType::HtmlSrc, src, |spec| {
            spec.expected_type(kind)
        });
    }
    if script.body.trim().is_empty() {
        return Ok(());
    }
    let content_type = match kind {
        UrlType::Json => mime::types::JSON,
        _ => mime::types::JAVASCRIPT,
    };
    report_inline(ctx, rewrites, script, ReferenceType::HtmlInlineContent, kind, content_type)
}

fn scan_tag(
    ctx: &mut TransformContext<'_>,
    rewrites: &mut Rewrites,
    name: &str,
    attrs: &[Attribute],
) -> HookResult<()> {
    if name == "link" {
        return scan_link(ctx, rewrites, attrs);
    }
    for attr in attrs {
        if URL_ATTRIBUTES.contains(&(name, attr.name.as_str())) {
            let kind = if attr.name == "href" {
                ReferenceType::HtmlHref
            } else {
                ReferenceType::HtmlSrc
            };
            report_attribute(ctx, rewrites, kind, attr, |spec| spec)?;
        } else if attr.name == "srcset" && matches!(name, "img" | "source") {
            report_srcset(ctx, rewrites, attr)?;
        } else if attr.name == "style" && CSS_URL_RE.is_match(&attr.value) {
            report_style_attribute(ctx, rewrites, attr)?;
        }
    }
    Ok(())
}

fn scan_link(
    ctx: &mut TransformContext<'_>,
    rewrites: &mut Rewrites,
    attrs: &[Attribute],
) -> HookResult<()> {
    let Some(href) = find_attribute(attrs, "href") else {
        return Ok(());
    };
    let rel = find_attribute(attrs, "rel")
        .map(|attr| unescape(&attr.value).to_ascii_lowercase())
        .unwrap_or_default();
    let rels: Vec<&str> = rel.split_ascii_whitespace().collect();

    // origins only
    if rels.iter().any(|rel| matches!(*rel, "preconnect" | "dns-prefetch")) {
        return Ok(());
    }
    let hint = rels
        .iter()
        .any(|rel| matches!(*rel, "preload" | "prefetch" | "modulepreload"));
    let expected = if rels.contains(&"stylesheet") {
        Some(UrlType::Css)
    } else if rels.contains(&"manifest") {
        Some(UrlType::WebManifest)
    } else if rels.contains(&"modulepreload") {
        Some(UrlType::JsModule)
    } else {
        None
    };

    report_attribute(ctx, rewrites, ReferenceType::HtmlHref, href, |mut spec| {
        if let Some(kind) = expected {
            spec = spec.expected_type(kind);
        }
        if hint { spec.resource_hint() } else { spec }
    })
}

// =============================================================================
// Reporting
// =============================================================================

fn report_attribute(
    ctx: &mut TransformContext<'_>,
    rewrites: &mut Rewrites,
    kind: ReferenceType,
    attr: &Attribute,
    configure: impl FnOnce(ReferenceSpec) -> ReferenceSpec,
) -> HookResult<()> {
    let specifier = unescape(&attr.value).trim().to_string();
    if LinkKind::is_ignorable(&specifier) {
        return Ok(());
    }
    let spec = configure(ReferenceSpec::new(kind, specifier));
    rewrites.report(ctx, spec, attr.value_range.clone(), |emitted| {
        escape_attr(emitted).into_owned()
    })
}

/// `srcset="a.png 1x, b.png 2x"`: one reference per candidate.
fn report_srcset(
    ctx: &mut TransformContext<'_>,
    rewrites: &mut Rewrites,
    attr: &Attribute,
) -> HookResult<()> {
    let mut offset = attr.value_range.start;
    for candidate in attr.value.split(',') {
        let trimmed = candidate.trim_start();
        let lead = candidate.len() - trimmed.len();
        let url_len = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        let start = offset + lead;
        let url = &trimmed[..url_len];
        offset += candidate.len() + 1;

        let specifier = unescape(url).into_owned();
        if LinkKind::is_ignorable(&specifier) {
            continue;
        }
        let spec = ReferenceSpec::new(ReferenceType::HtmlSrc, specifier);
        rewrites.report(ctx, spec, start..start + url_len, |emitted| {
            escape_attr(emitted).into_owned()
        })?;
    }
    Ok(())
}

fn report_inline(
    ctx: &mut TransformContext<'_>,
    rewrites: &mut Rewrites,
    element: &RawElement,
    kind: ReferenceType,
    expected: UrlType,
    content_type: &str,
) -> HookResult<()> {
    let (line, column) = rewrites.position(element.body_start);
    let spec = InlineSpec::new(kind, expected, content_type, element.body.clone(), line, column);
    ctx.found_inline(spec)?;
    Ok(())
}

/// `style="background: url(a.png)"`: the declarations become an inline
/// stylesheet, scanned by the stylesheet plugin.
fn report_style_attribute(
    ctx: &mut TransformContext<'_>,
    rewrites: &mut Rewrites,
    attr: &Attribute,
) -> HookResult<()> {
    let (line, column) = rewrites.position(attr.value_range.start);
    let spec = InlineSpec::new(
        ReferenceType::HtmlInlineContent,
        UrlType::Css,
        mime::types::CSS,
        attr.value.clone(),
        line,
        column,
    );
    ctx.found_inline(spec)?;
    Ok(())
}

// =============================================================================
// Skipped ranges
// =============================================================================

struct Skipped {
    comments: Vec<Range<usize>>,
    /// `<script>` / `<style>` bodies
    raw_bodies: Vec<Range<usize>>,
}

fn inside(ranges: &[Range<usize>], offset: usize) -> bool {
    ranges.iter().any(|range| range.contains(&offset))
}

/// Comment and raw-text ranges. An unterminated `<script>` is a parse error.
fn skipped_ranges(source: &str) -> HookResult<Skipped> {
    let comments: Vec<Range<usize>> = COMMENT_RE.find_iter(source).map(|m| m.range()).collect();

    let mut raw_bodies = Vec::new();
    let mut elements = Vec::new();
    for re in [&*SCRIPT_RE, &*STYLE_RE] {
        for caps in re.captures_iter(source) {
            if inside(&comments, caps.get_match().start()) {
                continue;
            }
            elements.push(caps.get_match().range());
            if let Some(body) = caps.get(2) {
                raw_bodies.push(body.range());
            }
        }
    }

    for open in SCRIPT_OPEN_RE.find_iter(source) {
        let start = open.start();
        if inside(&comments, start) || inside(&raw_bodies, start) || inside(&elements, start) {
            continue;
        }
        let (line, column) = crate::utils::text::line_column(source, start);
        return Err(HookError::parse("unterminated <script> element").at(line, column));
    }

    Ok(Skipped {
        comments,
        raw_bodies,
    })
}
