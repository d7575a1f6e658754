//! Structured logging setup.
//!
//! One `init()` at process startup wires a tracing subscriber with an
//! environment-derived filter. Components log through the `tracing` macros
//! with structured fields (`workflow_id`, `task_run_id`, `worker_id`) so
//! a single run can be traced end to end.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize the global tracing subscriber. Safe to call more than once;
/// later calls (and tests that already installed a subscriber) are no-ops.
pub fn init() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(filter);

        // A subscriber may already be installed (e.g. by a test harness);
        // that is not an error.
        if subscriber.try_init().is_err() {
            tracing::debug!("global tracing subscriber already initialized");
        }
    });
}
