pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;
pub mod transport;

use {
    services::{correlator::Correlator, gateway::PaymentGateway},
    std::sync::Arc,
};

#[derive(Clone)]
pub struct AppState {
    pub correlator: Arc<Correlator>,
    /// `None` when no Daraja credentials are configured; callbacks are still
    /// accepted.
    pub gateway: Option<Arc<PaymentGateway>>,
}
