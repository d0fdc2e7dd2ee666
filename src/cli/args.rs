//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Default config file name, searched upward from the working directory.
pub const DEFAULT_CONFIG: &str = "kiln.toml";

/// Kiln: web asset graph builder
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path
    #[arg(short = 'C', long, global = true, default_value = DEFAULT_CONFIG, value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build versioned output files
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Load the resource graph and print it
    #[command(visible_alias = "g")]
    Graph {
        #[command(flatten)]
        args: GraphArgs,
    },
}

/// Build command arguments (override `[build]`).
#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// Entry files, relative to the source directory
    #[arg(value_name = "ENTRY")]
    pub entries: Vec<String>,

    /// Output directory
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Prefix of every emitted URL (e.g. "/app/")
    #[arg(short, long)]
    pub base: Option<String>,

    /// Content-hash output names
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub versioning: Option<bool>,

    /// Mirror every cooked resource into this directory
    #[arg(short, long = "debug-dir", value_hint = clap::ValueHint::DirPath)]
    pub debug_dir: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long)]
    pub verbose: bool,
}

/// Graph command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct GraphArgs {
    /// Entry files, relative to the source directory
    #[arg(value_name = "ENTRY")]
    pub entries: Vec<String>,

    /// Print JSON instead of a tree
    #[arg(short, long)]
    pub json: bool,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long)]
    pub verbose: bool,
}

impl Cli {
    pub const fn is_build(&self) -> bool {
        matches!(self.command, Commands::Build { .. })
    }

    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Build { build_args } => build_args.verbose,
            Commands::Graph { args } => args.verbose,
        }
    }

    /// Entry files given on the command line.
    pub fn entries(&self) -> &[String] {
        match &self.command {
            Commands::Build { build_args } => &build_args.entries,
            Commands::Graph { args } => &args.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args() {
        let cli = Cli::parse_from([
            "kiln",
            "build",
            "index.html",
            "about.html",
            "-o",
            "out",
            "--versioning=false",
            "-V",
        ]);
        assert!(cli.is_build());
        assert!(cli.verbose());
        assert_eq!(cli.entries(), ["index.html", "about.html"]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG));
        let Commands::Build { build_args } = &cli.command else {
            unreachable!()
        };
        assert_eq!(build_args.output, Some(PathBuf::from("out")));
        assert_eq!(build_args.versioning, Some(false));
    }

    #[test]
    fn test_graph_args() {
        let cli = Cli::parse_from(["kiln", "-C", "site/kiln.toml", "graph", "--json"]);
        assert!(!cli.is_build());
        assert_eq!(cli.config, PathBuf::from("site/kiln.toml"));
        let Commands::Graph { args } = &cli.command else {
            unreachable!()
        };
        assert!(args.json);
        assert!(args.entries.is_empty());
    }
}
