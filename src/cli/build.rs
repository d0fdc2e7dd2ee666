//! `kiln build`: load, version and write the output directory.

use std::time::Instant;

use anyhow::Result;

use crate::build::Build;
use crate::config::KilnConfig;
use crate::core::AbortSignal;
use crate::{debug, log};

/// Build the project described by `config`.
pub async fn build_project(config: &KilnConfig, signal: AbortSignal) -> Result<()> {
    let options = config.build_options();
    log!(
        "build";
        "{} -> {}",
        relative(config, &options.root),
        relative(config, &options.output)
    );

    let started = Instant::now();
    let report = Build::new(options).with_signal(signal).run().await?;

    log!(
        "build";
        "done in {:.2?}: {} file(s), {} versioned",
        started.elapsed(),
        report.written,
        report.versioned
    );
    if let Some(manifest) = &report.manifest {
        debug!("build"; "manifest written to {}", manifest.display());
    }
    if report.debug_written > 0 {
        debug!("build"; "{} resource(s) mirrored for debugging", report.debug_written);
    }
    Ok(())
}

/// Path relative to the project directory, for display.
fn relative(config: &KilnConfig, path: &std::path::Path) -> String {
    let shown = path.strip_prefix(&config.root).unwrap_or(path);
    if shown.as_os_str().is_empty() {
        ".".to_string()
    } else {
        shown.display().to_string()
    }
}
