use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::events::EventHub;
use crate::metrics::Collector;
use crate::service::Service;

/// Shared state for the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
    pub hub: EventHub,
    pub metrics: Arc<Collector>,
    /// Ambient cancellation; request work stops once it fires.
    pub cancel: CancellationToken,
    /// Reported by `/healthz`.
    pub service_name: &'static str,
}
