//! MIME type detection utilities.
//!
//! Provides consistent content-type detection for fetched resources.

/// Common MIME type constants.
pub mod types {
    // Text
    pub const HTML: &str = "text/html";
    pub const PLAIN: &str = "text/plain";
    pub const CSS: &str = "text/css";
    pub const JAVASCRIPT: &str = "text/javascript";
    pub const JSON: &str = "application/json";
    pub const WEBMANIFEST: &str = "application/manifest+json";
    pub const SOURCEMAP: &str = "application/source-map+json";
    pub const XML: &str = "application/xml";
    pub const MARKDOWN: &str = "text/markdown";

    // Binary
    pub const OCTET_STREAM: &str = "application/octet-stream";
    pub const WASM: &str = "application/wasm";

    // Images
    pub const PNG: &str = "image/png";
    pub const JPEG: &str = "image/jpeg";
    pub const GIF: &str = "image/gif";
    pub const WEBP: &str = "image/webp";
    pub const AVIF: &str = "image/avif";
    pub const SVG: &str = "image/svg+xml";
    pub const ICO: &str = "image/x-icon";

    // Fonts
    pub const WOFF: &str = "font/woff";
    pub const WOFF2: &str = "font/woff2";
    pub const TTF: &str = "font/ttf";
    pub const OTF: &str = "font/otf";

    // Filesystem
    pub const DIRECTORY: &str = "application/x-directory";
}

/// Guess MIME type from file extension string.
pub fn from_extension(ext: Option<&str>) -> &'static str {
    let lower = ext.map(str::to_ascii_lowercase);
    match lower.as_deref() {
        Some("html" | "htm") => types::HTML,
        Some("css") => types::CSS,
        Some("js" | "mjs" | "cjs") => types::JAVASCRIPT,
        Some("json") => types::JSON,
        Some("webmanifest") => types::WEBMANIFEST,
        Some("map") => types::SOURCEMAP,
        Some("xml") => types::XML,
        Some("md") => types::MARKDOWN,
        Some("txt") => types::PLAIN,

        Some("svg") => types::SVG,
        Some("png") => types::PNG,
        Some("jpg" | "jpeg") => types::JPEG,
        Some("gif") => types::GIF,
        Some("webp") => types::WEBP,
        Some("avif") => types::AVIF,
        Some("ico") => types::ICO,

        Some("woff") => types::WOFF,
        Some("woff2") => types::WOFF2,
        Some("ttf") => types::TTF,
        Some("otf") => types::OTF,

        Some("wasm") => types::WASM,
        _ => types::OCTET_STREAM,
    }
}

/// Strip parameters (`; charset=utf-8`) from a content type.
pub fn essence(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

/// Check if the MIME type represents text content.
pub fn is_text(mime: &str) -> bool {
    let mime = essence(mime);
    mime.starts_with("text/")
        || mime == types::JSON
        || mime == types::XML
        || mime == types::SVG
        || mime == types::WEBMANIFEST
        || mime == types::SOURCEMAP
        || mime.ends_with("+json")
        || mime.ends_with("+xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(from_extension(Some("html")), types::HTML);
        assert_eq!(from_extension(Some("CSS")), types::CSS);
        assert_eq!(from_extension(Some("mjs")), types::JAVASCRIPT);
        assert_eq!(from_extension(Some("webmanifest")), types::WEBMANIFEST);
        assert_eq!(from_extension(Some("png")), types::PNG);
        assert_eq!(from_extension(Some("xyz")), types::OCTET_STREAM);
        assert_eq!(from_extension(None), types::OCTET_STREAM);
    }

    #[test]
    fn test_essence() {
        assert_eq!(essence("text/html; charset=utf-8"), "text/html");
        assert_eq!(essence("text/css"), "text/css");
    }

    #[test]
    fn test_is_text() {
        assert!(is_text(types::HTML));
        assert!(is_text("text/css; charset=utf-8"));
        assert!(is_text(types::JSON));
        assert!(is_text(types::SVG));
        assert!(is_text(types::WEBMANIFEST));
        assert!(!is_text(types::PNG));
        assert!(!is_text(types::WOFF2));
    }
}
