//! Specifier classification utilities.

/// Syntactic classification of specifiers found in resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind<'a> {
    /// Absolute URL with scheme (https://, data:, mailto:, etc.)
    External(&'a str),
    /// Pure fragment/anchor link (#section). Value is anchor without `#`.
    Fragment(&'a str),
    /// Site-root-relative path (/about, /assets/app.js).
    SiteRoot(&'a str),
    /// File-relative path (./image.png, ../other, image.png).
    FileRelative(&'a str),
}

impl<'a> LinkKind<'a> {
    /// Parse a specifier into its syntactic kind.
    #[inline]
    pub fn parse(link: &'a str) -> Self {
        if has_scheme(link) {
            Self::External(link)
        } else if let Some(anchor) = link.strip_prefix('#') {
            Self::Fragment(anchor)
        } else if let Some(anchor) = link.strip_prefix("./#") {
            // ./#fragment is semantically equivalent to #fragment (current page anchor)
            Self::Fragment(anchor)
        } else if link.starts_with('/') && !link.starts_with("//") {
            Self::SiteRoot(link)
        } else if link.starts_with("//") {
            // protocol-relative
            Self::External(link)
        } else {
            Self::FileRelative(link)
        }
    }

    /// Check if link is HTTP/HTTPS.
    #[inline]
    pub fn is_http(link: &str) -> bool {
        link.starts_with("http://") || link.starts_with("https://") || link.starts_with("//")
    }

    /// Check if a specifier never designates a fetchable resource
    /// (empty, fragments, `data:`, `javascript:`, `mailto:`, `tel:`).
    pub fn is_ignorable(link: &str) -> bool {
        let link = link.trim();
        link.is_empty()
            || link.starts_with('#')
            || ["data:", "javascript:", "mailto:", "tel:", "about:", "blob:"]
                .iter()
                .any(|scheme| {
                    link.get(..scheme.len())
                        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
                })
    }
}

/// Check if a link starts with a URL scheme (`scheme:`).
pub fn has_scheme(link: &str) -> bool {
    link.find(':').is_some_and(|pos| {
        pos > 1
            && link[..pos]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_external() {
        assert!(matches!(
            LinkKind::parse("https://example.com/app.js"),
            LinkKind::External("https://example.com/app.js")
        ));
        assert!(matches!(
            LinkKind::parse("data:image/png;base64,AAAA"),
            LinkKind::External(_)
        ));
        assert!(matches!(
            LinkKind::parse("//cdn.example.com/lib.js"),
            LinkKind::External(_)
        ));
    }

    #[test]
    fn test_parse_fragment() {
        assert!(matches!(LinkKind::parse("#icon"), LinkKind::Fragment("icon")));
        assert!(matches!(LinkKind::parse("./#top"), LinkKind::Fragment("top")));
        assert!(matches!(LinkKind::parse("#"), LinkKind::Fragment("")));
    }

    #[test]
    fn test_parse_site_root() {
        assert!(matches!(
            LinkKind::parse("/assets/app.js"),
            LinkKind::SiteRoot("/assets/app.js")
        ));
    }

    #[test]
    fn test_parse_file_relative() {
        assert!(matches!(
            LinkKind::parse("./style.css"),
            LinkKind::FileRelative("./style.css")
        ));
        assert!(matches!(
            LinkKind::parse("../img/logo.png"),
            LinkKind::FileRelative("../img/logo.png")
        ));
        assert!(matches!(
            LinkKind::parse("logo.png"),
            LinkKind::FileRelative("logo.png")
        ));
    }

    #[test]
    fn test_windows_drive_is_not_a_scheme() {
        // single letter before ':' is a drive, not a scheme
        assert!(!has_scheme("C:/assets/app.js"));
        assert!(has_scheme("file:///C:/assets/app.js"));
    }

    #[test]
    fn test_is_ignorable() {
        assert!(LinkKind::is_ignorable(""));
        assert!(LinkKind::is_ignorable("#main"));
        assert!(LinkKind::is_ignorable("data:text/plain,hello"));
        assert!(LinkKind::is_ignorable("JavaScript:void(0)"));
        assert!(LinkKind::is_ignorable("mailto:me@example.com"));
        assert!(!LinkKind::is_ignorable("./app.js"));
        assert!(!LinkKind::is_ignorable("https://cdn.example.com/a.js"));
    }
}
