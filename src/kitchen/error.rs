//! Kitchen error taxonomy.
//!
//! Hooks fail with [`HookError`]; the kitchen wraps it into a
//! [`KitchenError`] carrying the reference trace and the plugin name.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::core::ResourceUrl;
use crate::graph::ReferenceTrace;

// ============================================================================
// Codes
// ============================================================================

/// Sub-code of `FETCH_URL_CONTENT_ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorCode {
    NotAllowed,
    NotFound,
    DirectoryReferenceNotAllowed,
    Other,
}

impl FetchErrorCode {
    pub const fn as_str(self) -> Option<&'static str> {
        match self {
            Self::NotAllowed => Some("NOT_ALLOWED"),
            Self::NotFound => Some("NOT_FOUND"),
            Self::DirectoryReferenceNotAllowed => Some("DIRECTORY_REFERENCE_NOT_ALLOWED"),
            Self::Other => None,
        }
    }
}

/// Sub-code of `TRANSFORM_URL_CONTENT_ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorCode {
    ParseError,
    Other,
}

impl TransformErrorCode {
    pub const fn as_str(self) -> Option<&'static str> {
        match self {
            Self::ParseError => Some("PARSE_ERROR"),
            Self::Other => None,
        }
    }
}

// ============================================================================
// HookError
// ============================================================================

/// Error raised by a plugin hook.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("not found")]
    NotFound,

    #[error("not allowed")]
    NotAllowed,

    #[error("{message}")]
    Parse {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Already wrapped error, passed through unchanged
    #[error(transparent)]
    Kitchen(Box<KitchenError>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HookError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Attach a position to a parse error.
    pub fn at(self, line: u32, column: u32) -> Self {
        match self {
            Self::Parse { message, .. } => Self::Parse {
                message,
                line: Some(line),
                column: Some(column),
            },
            other => other,
        }
    }

    pub fn fetch_code(&self) -> FetchErrorCode {
        match self {
            Self::NotFound => FetchErrorCode::NotFound,
            Self::NotAllowed => FetchErrorCode::NotAllowed,
            Self::Io(err) => match err.kind() {
                std::io::ErrorKind::NotFound => FetchErrorCode::NotFound,
                std::io::ErrorKind::PermissionDenied => FetchErrorCode::NotAllowed,
                _ => FetchErrorCode::Other,
            },
            _ => FetchErrorCode::Other,
        }
    }

    pub fn transform_code(&self) -> TransformErrorCode {
        match self {
            Self::Parse { .. } => TransformErrorCode::ParseError,
            _ => TransformErrorCode::Other,
        }
    }
}

pub type HookResult<T> = Result<T, HookError>;

// ============================================================================
// KitchenError
// ============================================================================

/// Error raised while cooking a resource.
#[derive(Debug, Error)]
pub enum KitchenError {
    #[error("failed to resolve \"{specifier}\" referenced at {trace}{}", by_plugin(plugin))]
    ResolveUrl {
        specifier: String,
        trace: ReferenceTrace,
        plugin: Option<String>,
        #[source]
        source: Option<HookError>,
    },

    #[error("failed to fetch {url}{} referenced at {trace}{}", with_code(code.as_str()), by_plugin(plugin))]
    FetchUrlContent {
        url: ResourceUrl,
        code: FetchErrorCode,
        trace: ReferenceTrace,
        plugin: Option<String>,
        #[source]
        source: Option<HookError>,
    },

    #[error("failed to transform {url}{} referenced at {trace}{}", with_code(code.as_str()), by_plugin(plugin))]
    TransformUrlContent {
        url: ResourceUrl,
        code: TransformErrorCode,
        trace: ReferenceTrace,
        plugin: Option<String>,
        #[source]
        source: Option<HookError>,
    },

    #[error("failed to finalize {url} referenced at {trace}{}", by_plugin(plugin))]
    FinalizeUrlContent {
        url: ResourceUrl,
        trace: ReferenceTrace,
        plugin: Option<String>,
        #[source]
        source: Option<HookError>,
    },

    #[error("no resource known for {url}")]
    UnknownUrl { url: ResourceUrl },

    #[error("cooking aborted")]
    Aborted,

    #[error("cook task for {url} failed: {message}")]
    Task { url: ResourceUrl, message: String },
}

impl KitchenError {
    /// Error code, e.g. `FETCH_URL_CONTENT_ERROR`.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ResolveUrl { .. } => "RESOLVE_URL_ERROR",
            Self::FetchUrlContent { .. } => "FETCH_URL_CONTENT_ERROR",
            Self::TransformUrlContent { .. } => "TRANSFORM_URL_CONTENT_ERROR",
            Self::FinalizeUrlContent { .. } => "FINALIZE_URL_CONTENT_ERROR",
            Self::UnknownUrl { .. } => "UNKNOWN_URL",
            Self::Aborted => "ABORTED",
            Self::Task { .. } => "TASK_ERROR",
        }
    }

    /// Sub-code, e.g. `NOT_FOUND` or `PARSE_ERROR`.
    pub fn sub_code(&self) -> Option<&'static str> {
        match self {
            Self::FetchUrlContent { code, .. } => code.as_str(),
            Self::TransformUrlContent { code, .. } => code.as_str(),
            _ => None,
        }
    }

    pub fn trace(&self) -> Option<&ReferenceTrace> {
        match self {
            Self::ResolveUrl { trace, .. }
            | Self::FetchUrlContent { trace, .. }
            | Self::TransformUrlContent { trace, .. }
            | Self::FinalizeUrlContent { trace, .. } => Some(trace),
            _ => None,
        }
    }

    pub fn plugin(&self) -> Option<&str> {
        match self {
            Self::ResolveUrl { plugin, .. }
            | Self::FetchUrlContent { plugin, .. }
            | Self::TransformUrlContent { plugin, .. }
            | Self::FinalizeUrlContent { plugin, .. } => plugin.as_deref(),
            _ => None,
        }
    }

    #[inline]
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::TransformUrlContent {
                code: TransformErrorCode::ParseError,
                ..
            }
        )
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

fn by_plugin(plugin: &Option<String>) -> String {
    plugin
        .as_deref()
        .map(|name| format!(" (plugin \"{name}\")"))
        .unwrap_or_default()
}

fn with_code(code: Option<&str>) -> String {
    code.map(|code| format!(" [{code}]")).unwrap_or_default()
}

/// Short one-line description, for logs.
pub struct ErrorSummary<'a>(pub &'a KitchenError);

impl fmt::Display for ErrorSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.code())?;
        if let Some(sub_code) = self.0.sub_code() {
            write!(f, "/{sub_code}")?;
        }
        write!(f, ": {}", self.0)?;
        let mut source = StdError::source(self.0);
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace() -> ReferenceTrace {
        ReferenceTrace {
            url: ResourceUrl::new("file:///site/index.html"),
            line: Some(3),
            column: Some(7),
        }
    }

    #[test]
    fn test_io_errors_map_to_fetch_codes() {
        let missing = HookError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(missing.fetch_code(), FetchErrorCode::NotFound);

        let denied = HookError::from(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(denied.fetch_code(), FetchErrorCode::NotAllowed);

        assert_eq!(HookError::parse("x").fetch_code(), FetchErrorCode::Other);
    }

    #[test]
    fn test_codes_and_message() {
        let err = KitchenError::FetchUrlContent {
            url: ResourceUrl::new("file:///site/missing.css"),
            code: FetchErrorCode::NotFound,
            trace: trace(),
            plugin: Some("file".into()),
            source: Some(HookError::NotFound),
        };
        assert_eq!(err.code(), "FETCH_URL_CONTENT_ERROR");
        assert_eq!(err.sub_code(), Some("NOT_FOUND"));
        assert_eq!(err.plugin(), Some("file"));
        assert_eq!(
            err.to_string(),
            "failed to fetch file:///site/missing.css [NOT_FOUND] referenced at \
             file:///site/index.html:3:7 (plugin \"file\")"
        );
    }

    #[test]
    fn test_parse_error_code() {
        let err = KitchenError::TransformUrlContent {
            url: ResourceUrl::new("file:///site/app.js"),
            code: HookError::parse("unexpected token").at(1, 4).transform_code(),
            trace: trace(),
            plugin: None,
            source: None,
        };
        assert!(err.is_parse_error());
        assert_eq!(err.sub_code(), Some("PARSE_ERROR"));
    }

    #[test]
    fn test_summary_includes_source_chain() {
        let err = KitchenError::ResolveUrl {
            specifier: "./x.js".into(),
            trace: trace(),
            plugin: None,
            source: Some(HookError::NotAllowed),
        };
        let summary = ErrorSummary(&err).to_string();
        assert!(summary.starts_with("RESOLVE_URL_ERROR: failed to resolve \"./x.js\""));
        assert!(summary.ends_with(": not allowed"));
    }
}
