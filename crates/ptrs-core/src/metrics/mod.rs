//! Payment times metrics: per-record rules and the run-level derivation pass.

pub mod engine;
pub mod payment_times;

pub use engine::{derive_metrics, MetricsDerivationOutput};
