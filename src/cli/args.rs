//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// notepub — publish Markdown notes as an SEO-conscious website
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (default: $CONFIG_PATH, then config.yaml)
    #[arg(short = 'C', long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Rules file path (overrides config; default: $RULES_PATH)
    #[arg(long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub rules: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Scan the content source and emit resolve artifacts
    #[command(visible_alias = "i")]
    Index,

    /// Serve pages on demand from the artifacts
    #[command(visible_alias = "s")]
    Serve {
        /// HTTP listen address (overrides config)
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Reproduce the whole site statically
    #[command(visible_alias = "b")]
    Build {
        /// Output directory for the static site
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        dist: Option<PathBuf>,

        /// Artifacts directory (resolve.json, sitemap, robots)
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        artifacts: Option<PathBuf>,

        /// Do not run index if resolve.json is missing
        #[arg(long)]
        no_index: bool,

        /// Generate search.json when missing
        #[arg(long)]
        generate_search: bool,
    },

    /// Re-check rules and the persisted resolve index
    #[command(visible_alias = "v")]
    Validate {
        /// Path to resolve.json (defaults to the artifacts dir)
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        resolve: Option<PathBuf>,

        /// Re-run link resolution against the index
        #[arg(long)]
        links: bool,
    },
}
