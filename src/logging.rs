//! Console logging.
//!
//! Everything goes through `tracing`. Third-party crates (the HTTP stack in
//! particular) can be silenced around specific calls with [`quiet`], which
//! returns a guard; while any guard is alive only this crate's own events
//! reach the console.

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::Metadata;
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

const CRATE_TARGET: &str = "receipt_watch";

/// Nesting depth of active quiet scopes.
pub struct QuietState {
    depth: AtomicUsize,
}

impl QuietState {
    pub const fn new() -> Self {
        Self {
            depth: AtomicUsize::new(0),
        }
    }

    pub fn enter(&'static self) -> QuietGuard {
        self.depth.fetch_add(1, Ordering::SeqCst);
        QuietGuard { state: self }
    }

    pub fn is_quiet(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    /// Whether an event with this target is printed under the current state.
    pub fn allows_target(&self, target: &str) -> bool {
        !self.is_quiet() || target == CRATE_TARGET || target.starts_with("receipt_watch::")
    }
}

static QUIET: QuietState = QuietState::new();

/// Keeps third-party logging suppressed until dropped.
#[must_use = "logging is restored as soon as the guard is dropped"]
pub struct QuietGuard {
    state: &'static QuietState,
}

impl Drop for QuietGuard {
    fn drop(&mut self) {
        self.state.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn quiet() -> QuietGuard {
    QUIET.enter()
}

pub fn is_quiet() -> bool {
    QUIET.is_quiet()
}

fn allows(meta: &Metadata<'_>) -> bool {
    QUIET.allows_target(meta.target())
}

pub fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(level)
        .with_filter(filter_fn(allows));

    // A subscriber may already be installed by an embedding program or test
    let _ = tracing_subscriber::registry().with(console).try_init();
}
