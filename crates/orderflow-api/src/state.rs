use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use orderflow_core::{
    AuthService, Cache, Config, Database, InventoryService, OrderService, PaymentService,
};

/// Application state shared by all handlers
///
/// Clients are constructed once at startup and threaded through here; there
/// is no hidden global state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub cache: Cache,
    pub auth: Arc<AuthService>,
    pub inventory: Arc<InventoryService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub metrics: PrometheusHandle,
}
