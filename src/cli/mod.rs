//! Command wiring: load config and rules, build the content source,
//! hand off to the engine.

mod args;
pub mod validate;

pub use args::{Cli, Commands};

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::builder::{self, BuildOptions};
use crate::config::Config;
use crate::rules::{self, Rules};
use crate::source;
use crate::{indexer, log, server};

/// Load config, then resolve the rules path with flag > env > config
/// precedence.
fn load_environment(cli: &Cli) -> Result<(Config, Rules)> {
    let mut config = Config::load(cli.config.as_deref()).context("load config")?;
    if let Some(rules_path) = &cli.rules {
        config.rules_path = checked_rules_path(rules_path)?;
    } else if let Ok(env) = std::env::var("RULES_PATH") {
        if !env.is_empty() {
            config.rules_path = checked_rules_path(&PathBuf::from(env))?;
        }
    }
    let rules = rules::load(&config.rules_path)?;
    Ok((config, rules))
}

fn checked_rules_path(path: &PathBuf) -> Result<String> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => bail!("rules path is a directory: {}", path.display()),
        Ok(_) => Ok(path.to_string_lossy().into_owned()),
        Err(_) => bail!("rules file not found: {}", path.display()),
    }
}

pub fn run_index(cli: &Cli) -> Result<()> {
    let (config, _rules) = load_environment(cli)?;
    let source = source::from_config(&config, None)?;
    indexer::run(&config, source.as_ref()).context("index")?;
    log!("index"; "index completed");
    Ok(())
}

pub fn run_serve(cli: &Cli, addr: Option<&str>) -> Result<()> {
    let (mut config, rules) = load_environment(cli)?;
    if let Some(addr) = addr {
        config.server.listen = addr.to_string();
    }
    let source = source::from_config(&config, None)?;
    server::serve(config, rules, source)
}

pub fn run_build(
    cli: &Cli,
    dist: Option<PathBuf>,
    artifacts: Option<PathBuf>,
    no_index: bool,
    generate_search: bool,
) -> Result<()> {
    let (config, rules) = load_environment(cli)?;
    let source = source::from_config(&config, None)?;
    let opts = BuildOptions {
        dist_dir: dist,
        artifacts_dir: artifacts,
        no_index,
        generate_search,
    };
    builder::build(&config, &rules, source.as_ref(), &opts).context("build")?;
    log!("build"; "build completed");
    Ok(())
}

pub fn run_validate(cli: &Cli, resolve: Option<PathBuf>, links: bool) -> Result<()> {
    let (config, rules) = load_environment(cli)?;
    validate::run(&config, &rules, resolve.as_deref(), links)
}
