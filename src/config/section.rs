//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! root = "src"                  # Source directory (relative to kiln.toml)
//! entries = ["index.html"]      # Entry files, relative to `root`
//! output = "dist"               # Output directory (relative to kiln.toml)
//! base = "/"                    # Prefix of every emitted URL
//! manifest = "manifest.json"    # Written inside `output`; omit to skip
//! debug_dir = ".kiln/debug"     # Mirror of every cooked resource
//! allow_directory_references = false
//!
//! [build.versioning]
//! enable = true
//! method = "filename"           # filename | search_param
//! length = 8                    # Hex chars kept from the content hash
//! ```

use std::path::PathBuf;

use serde::Deserialize;

use super::{ConfigDiagnostics, FieldPath};
use crate::build::{VersioningMethod, VersioningOptions};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildSectionConfig {
    /// Source directory; entries resolve against it.
    pub root: PathBuf,

    pub entries: Vec<String>,

    pub output: PathBuf,

    /// `/`, `/sub/` or an absolute URL ending with `/`.
    pub base: String,

    /// Manifest file name inside `output`.
    pub manifest: Option<String>,

    pub debug_dir: Option<PathBuf>,

    /// Accept references that resolve to a directory.
    pub allow_directory_references: bool,

    pub versioning: VersioningConfig,
}

impl Default for BuildSectionConfig {
    fn default() -> Self {
        Self {
            root: ".".into(),
            entries: vec!["index.html".to_string()],
            output: "dist".into(),
            base: "/".to_string(),
            manifest: Some("manifest.json".to_string()),
            debug_dir: None,
            allow_directory_references: false,
            versioning: VersioningConfig::default(),
        }
    }
}

impl BuildSectionConfig {
    pub const ROOT: FieldPath = FieldPath::new("build.root");
    pub const ENTRIES: FieldPath = FieldPath::new("build.entries");
    pub const OUTPUT: FieldPath = FieldPath::new("build.output");
    pub const BASE: FieldPath = FieldPath::new("build.base");
    pub const MANIFEST: FieldPath = FieldPath::new("build.manifest");

    /// Check values that do not depend on the filesystem.
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.entries.is_empty() {
            diag.error_with_hint(
                Self::ENTRIES,
                "no entry files",
                r#"list at least one file, e.g. entries = ["index.html"]"#,
            );
        }
        for entry in &self.entries {
            if entry.trim().is_empty() {
                diag.error(Self::ENTRIES, "empty entry");
            }
        }

        if !self.base.ends_with('/') {
            diag.error_with_hint(
                Self::BASE,
                format!("`{}` must end with `/`", self.base),
                format!("use \"{}/\"", self.base),
            );
        }
        if !self.base.starts_with('/') && url::Url::parse(&self.base).is_err() {
            diag.error(
                Self::BASE,
                format!("`{}` is neither an absolute path nor a URL", self.base),
            );
        }

        if let Some(manifest) = &self.manifest
            && (manifest.is_empty() || manifest.contains(['/', '\\']))
        {
            diag.error(Self::MANIFEST, "manifest must be a plain file name");
        }

        if self.output == self.root {
            diag.error_with_hint(
                Self::OUTPUT,
                "output directory is the source directory",
                "write to a separate directory such as \"dist\"",
            );
        }

        self.versioning.validate(diag);
    }
}

// ============================================================================
// [build.versioning]
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    pub enable: bool,
    pub method: VersioningMethod,
    pub length: usize,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            enable: true,
            method: VersioningMethod::Filename,
            length: 8,
        }
    }
}

impl VersioningConfig {
    pub const LENGTH: FieldPath = FieldPath::new("build.versioning.length");

    fn validate(&self, diag: &mut ConfigDiagnostics) {
        if !(4..=64).contains(&self.length) {
            diag.error(
                Self::LENGTH,
                format!("{} is out of range (4 to 64)", self.length),
            );
        }
    }

    /// `None` when versioning is disabled.
    pub fn options(&self) -> Option<VersioningOptions> {
        self.enable.then_some(VersioningOptions {
            method: self.method,
            length: self.length,
        })
    }
}
