use clap::Args;
use serde_json::Value;

use ptrs_core::config::EngineConfig;

use super::dataset::{self, RunScope};

/// Arguments for payment metrics derivation
#[derive(Args)]
pub struct DeriveMetricsArgs {
    #[command(flatten)]
    pub scope: RunScope,

    /// Override the default payment term in days
    #[arg(long)]
    pub default_term_days: Option<i64>,
}

pub fn run_derive_metrics(
    args: DeriveMetricsArgs,
    mut config: EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(days) = args.default_term_days {
        config.metrics.default_payment_term_days = days;
    }
    let service = dataset::open_service(&args.scope, config)?;
    let result = service.derive_metrics(&args.scope.tenant, args.scope.run)?;
    dataset::persist(&args.scope, &service)?;
    Ok(serde_json::to_value(result)?)
}
