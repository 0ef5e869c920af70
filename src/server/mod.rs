//! HTTP server over the durable artifacts.
//!
//! One `ResolveStore` is the only shared mutable state; requests run on
//! a small worker pool so a slow source fetch cannot block the accept
//! loop. Ctrl+C unblocks the loop via `core::state`.

pub mod cache;
mod handler;
pub mod markdown;
pub mod page;
pub mod response;

pub use cache::{CacheOutcome, HtmlCache};

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::config::Config;
use crate::log;
use crate::rules::Rules;
use crate::source::ContentSource;
use crate::store::ResolveStore;

/// Bind and run the request loop until shutdown.
pub fn serve(config: Config, rules: Rules, source: Box<dyn ContentSource>) -> Result<()> {
    let listen = config.server.listen.clone();
    let store = ResolveStore::new(
        config.resolve_path(),
        rules,
        config.media.expose_all_under_prefix,
    );
    let cache = HtmlCache::new(&config.paths.cache_root, &config.theme.name);
    let app = Arc::new(handler::App {
        config,
        store,
        cache,
        source,
    });

    let server =
        Arc::new(tiny_http::Server::http(&listen).map_err(|e| anyhow!("bind {listen}: {e}"))?);
    crate::core::register_server(Arc::clone(&server));
    log!("serve"; "listening on http://{listen}");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .context("create worker pool")?;
    for request in server.incoming_requests() {
        let app = Arc::clone(&app);
        pool.spawn(move || {
            if let Err(err) = handler::handle(&app, request) {
                log!("serve"; "request error: {err}");
            }
        });
    }
    log!("serve"; "server stopped");
    Ok(())
}
