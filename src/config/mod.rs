//! Project configuration from `kiln.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section.rs   # [build] and [build.versioning]
//! ├── types/       # ConfigError, diagnostics, FieldPath
//! ├── util.rs      # config file lookup, path normalization
//! └── mod.rs       # KilnConfig (this file)
//! ```
//!
//! Paths in the file are relative to the directory holding it. A missing
//! `kiln.toml` is not an error: defaults apply, rooted at the working
//! directory, unless `-C` names a file explicitly.

mod section;
pub mod types;
mod util;

pub use section::{BuildSectionConfig, VersioningConfig};
pub use types::{ConfigDiagnostic, ConfigDiagnostics, ConfigError, FieldPath};
pub use util::{find_config_file, normalize_path};

use crate::build::BuildOptions;
use crate::cli::{BuildArgs, Cli, Commands, DEFAULT_CONFIG};
use crate::{debug, log};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing kiln.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KilnConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project directory, parent of the config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub build: BuildSectionConfig,
}

impl KilnConfig {
    /// Load configuration for a CLI invocation, searching upward from cwd.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;
        Self::load_from(cli, &cwd)
    }

    fn load_from(cli: &Cli, cwd: &Path) -> Result<Self> {
        let (mut config, config_path) = match find_config_file(&cli.config, cwd) {
            Some(path) => (Self::from_path(&path)?, path),
            None if cli.config == Path::new(DEFAULT_CONFIG) => {
                debug!("config"; "no {} found, using defaults", DEFAULT_CONFIG);
                (Self::default(), cwd.join(DEFAULT_CONFIG))
            }
            None => return Err(ConfigError::NotFound(cli.config.clone()).into()),
        };

        config.root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());
        config.config_path = config_path;
        config.apply_command_options(cli);

        // relative-path checks run before normalization makes everything absolute
        let mut diag = ConfigDiagnostics::new();
        config.build.validate(&mut diag);
        diag.into_result().map_err(ConfigError::Diagnostics)?;

        config.normalize_paths();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a file, warning about unknown fields.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    fn apply_command_options(&mut self, cli: &Cli) {
        crate::logger::set_verbose(cli.verbose());
        if !cli.entries().is_empty() {
            self.build.entries = cli.entries().to_vec();
        }
        if let Commands::Build { build_args } = &cli.command {
            self.apply_build_args(build_args);
        }
    }

    fn apply_build_args(&mut self, args: &BuildArgs) {
        Self::update_option(&mut self.build.output, args.output.as_ref());
        Self::update_option(&mut self.build.base, args.base.as_ref());
        Self::update_option(&mut self.build.versioning.enable, args.versioning.as_ref());
        if args.debug_dir.is_some() {
            self.build.debug_dir = args.debug_dir.clone();
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // paths & validation
    // ========================================================================

    /// Make every directory absolute, relative to the project root.
    fn normalize_paths(&mut self) {
        let root = &self.root;
        self.build.root = normalize_path(&root.join(&self.build.root));
        self.build.output = normalize_path(&root.join(&self.build.output));
        self.build.debug_dir = self
            .build
            .debug_dir
            .take()
            .map(|dir| normalize_path(&root.join(dir)));
    }

    /// Checks against the filesystem, after normalization.
    pub fn validate(&self) -> Result<()> {
        let mut diag = ConfigDiagnostics::new();

        if !self.build.root.is_dir() {
            diag.error(
                BuildSectionConfig::ROOT,
                format!("`{}` is not a directory", self.build.root.display()),
            );
        }
        for entry in &self.build.entries {
            let path = self.build.root.join(entry.trim_start_matches('/'));
            if !path.is_file() {
                diag.warn(
                    BuildSectionConfig::ENTRIES,
                    format!("`{entry}` not found in source directory"),
                );
            }
        }
        if self.build.root.starts_with(&self.build.output) {
            diag.error(
                BuildSectionConfig::OUTPUT,
                "output directory contains the source directory",
            );
        }

        diag.print_warnings();
        diag.into_result()
            .map_err(|e| ConfigError::Diagnostics(e).into())
    }

    /// Options for a build driven by this configuration.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            root: self.build.root.clone(),
            entries: self.build.entries.clone(),
            output: self.build.output.clone(),
            base: self.build.base.clone(),
            versioning: self.build.versioning.options(),
            manifest: self.build.manifest.clone(),
            debug_dir: self.build.debug_dir.clone(),
            allow_directory_references: self.build.allow_directory_references,
        }
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

/// Parse config, panicking on unknown fields (to catch typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> KilnConfig {
    let (parsed, ignored) = KilnConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_from_str_invalid_toml() {
        assert!(KilnConfig::from_str("[build\nroot = \"src\"").is_err());
    }

    #[test]
    fn test_unknown_fields_detected() {
        let content = "[build]\nroot = \"src\"\nminify = true\n[server]\nport = 1";
        let (config, ignored) = KilnConfig::parse_with_ignored(content).unwrap();

        assert_eq!(config.build.root, PathBuf::from("src"));
        assert!(ignored.iter().any(|f| f == "build.minify"));
        assert!(ignored.iter().any(|f| f.contains("server")));
    }

    #[test]
    fn test_no_unknown_fields() {
        let content = "[build]\nroot = \"src\"\n[build.versioning]\nlength = 10";
        let (_, ignored) = KilnConfig::parse_with_ignored(content).unwrap();
        assert!(ignored.is_empty());
    }

    fn project(config: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::write(dir.path().join("src/index.html"), "<p>").unwrap();
        fs::write(dir.path().join(DEFAULT_CONFIG), config).unwrap();
        dir
    }

    #[test]
    fn test_load_resolves_paths_and_cli_overrides() {
        let dir = project("[build]\nroot = \"src\"\noutput = \"public\"\n");
        let cli = Cli::parse_from(["kiln", "build", "--base", "/app/", "--versioning=false"]);
        let config = KilnConfig::load_from(&cli, &dir.path().join("src/nested")).unwrap();

        assert_eq!(config.root, dir.path());
        assert_eq!(config.build.root, dir.path().join("src"));
        assert_eq!(config.build.output, dir.path().join("public"));

        let options = config.build_options();
        assert_eq!(options.base, "/app/");
        assert!(options.versioning.is_none());
        assert_eq!(options.entries, ["index.html"]);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = project("[build]\nroot = \"src\"\nbase = \"app\"\n");
        let cli = Cli::parse_from(["kiln", "build"]);
        let err = KilnConfig::load_from(&cli, dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Diagnostics(_))
        ));
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let cli = Cli::parse_from(["kiln", "-C", "other.toml", "graph"]);
        let err = KilnConfig::load_from(&cli, dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::NotFound(_))
        ));
    }
}
