//! Application state shared by every handler.

use marketplace_runtime::Marketplace;
use metrics_exporter_prometheus::PrometheusHandle;

/// Services plus the optional metrics render handle.
///
/// Cloning is cheap: every service holds `Arc`s to the shared environment.
#[derive(Clone)]
pub struct AppState {
    /// Marketplace services.
    pub marketplace: Marketplace,
    /// Prometheus handle; `None` when metrics are disabled.
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("marketplace", &self.marketplace)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl AppState {
    /// State without a metrics endpoint.
    #[must_use]
    pub const fn new(marketplace: Marketplace) -> Self {
        Self {
            marketplace,
            metrics: None,
        }
    }

    /// Attach the handle `/metrics` renders from.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
