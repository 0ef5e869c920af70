//! Core shared state and small cross-cutting helpers.

pub mod metrics;
pub mod state;
pub mod url;

pub use state::{is_shutdown, register_server, setup_shutdown_handler};
