//! Logging utilities with colored output and progress display.
//!
//! This module provides:
//! - `log!` macro for formatted terminal output with colored prefixes
//! - `debug!` macro gated on the global `--verbose` flag
//! - `ProgressLine` for single-line progress display with multiple counters
//!
//! # Example
//!
//! ```ignore
//! log!("index"; "listing {} objects", count);
//!
//! let progress = ProgressLine::new(&[("reused", 0), ("fetched", 0)]);
//! progress.inc("fetched");
//! progress.finish();
//! ```

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::{
    io::{stdout, Write},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Global verbose flag (set by --verbose CLI argument)
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set verbose mode globally
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Active progress bar count (for log coordination)
static BAR_COUNT: AtomicUsize = AtomicUsize::new(0);

// ============================================================================
// Log Macros
// ============================================================================

/// Log a message with a colored module prefix
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when --verbose is enabled)
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Log a message with a colored module prefix
#[inline]
#[allow(clippy::cast_possible_truncation)] // Safe: bars count is always small
pub fn log(module: &str, message: &str) {
    let module_lower = module.to_ascii_lowercase();
    let prefix = colorize_prefix(module, &module_lower);

    let mut stdout = stdout().lock();

    let bar_count = BAR_COUNT.load(Ordering::SeqCst);
    if bar_count > 0 {
        execute!(stdout, cursor::MoveUp(bar_count as u16)).ok();
        execute!(stdout, Clear(ClearType::FromCursorDown)).ok();
    }

    writeln!(stdout, "{prefix} {message}").ok();

    if bar_count > 0 {
        for _ in 0..bar_count {
            writeln!(stdout).ok();
        }
    }

    stdout.flush().ok();
}

/// Apply color to a module prefix based on module type
#[inline]
fn colorize_prefix(module: &str, module_lower: &str) -> String {
    let prefix = format!("[{module}]");
    match module_lower {
        "serve" => prefix.bright_blue().bold().to_string(),
        "index" => prefix.bright_green().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Progress Line
// ============================================================================

/// Single-line progress display with multiple named counters
///
/// Renders `label: n` pairs on one line, redrawing in place as counters
/// advance. Counter names must be registered up front via `new`.
pub struct ProgressLine {
    counters: Mutex<Vec<(&'static str, usize)>>,
}

impl ProgressLine {
    /// Create a progress line and reserve a terminal row for it.
    pub fn new(counters: &[(&'static str, usize)]) -> Self {
        BAR_COUNT.fetch_add(1, Ordering::SeqCst);
        let line = Self {
            counters: Mutex::new(counters.to_vec()),
        };
        line.draw(false);
        line
    }

    /// Increment a named counter and redraw.
    pub fn inc(&self, name: &str) {
        {
            let mut counters = self.counters.lock();
            if let Some(entry) = counters.iter_mut().find(|(n, _)| *n == name) {
                entry.1 += 1;
            }
        }
        self.draw(true);
    }

    /// Finalize the line and release the reserved row.
    pub fn finish(self) {
        self.draw(true);
        let mut out = stdout().lock();
        writeln!(out).ok();
        out.flush().ok();
        BAR_COUNT.fetch_sub(1, Ordering::SeqCst);
    }

    fn draw(&self, redraw: bool) {
        let counters = self.counters.lock();
        let rendered: Vec<String> = counters
            .iter()
            .map(|(name, count)| format!("{}: {}", name.dimmed(), count.bold()))
            .collect();
        let mut out = stdout().lock();
        if redraw {
            execute!(out, cursor::MoveToColumn(0), Clear(ClearType::UntilNewLine)).ok();
        }
        write!(out, "  {}", rendered.join("  ")).ok();
        out.flush().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_flag() {
        set_verbose(true);
        assert!(is_verbose());
        set_verbose(false);
        assert!(!is_verbose());
    }
}
