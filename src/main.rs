//! notepub - publish a corpus of Markdown notes as an SEO-conscious website.

mod artifacts;
mod builder;
mod cli;
mod collections;
mod config;
mod core;
mod frontmatter;
mod indexer;
mod logger;
mod media;
mod page;
mod resolver;
mod rules;
mod server;
mod source;
mod store;
mod wikilink;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};

fn main() -> Result<()> {
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    match &cli.command {
        Commands::Index => cli::run_index(&cli),
        Commands::Serve { addr } => cli::run_serve(&cli, addr.as_deref()),
        Commands::Build {
            dist,
            artifacts,
            no_index,
            generate_search,
        } => cli::run_build(
            &cli,
            dist.clone(),
            artifacts.clone(),
            *no_index,
            *generate_search,
        ),
        Commands::Validate { resolve, links } => {
            cli::run_validate(&cli, resolve.clone(), *links)
        }
    }
}
