use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::payment_times::{derive_record, PaymentTermSource};
use crate::config::MetricsConfig;
use crate::error::PtrsError;
use crate::store::{ComplianceRepository, DerivedMetricsUpdate, Session};
use crate::tenancy::TenantTransaction;
use crate::types::{with_metadata, ComputationOutput, RunId};
use crate::PtrsResult;

/// Outcome of one derivation pass over a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsDerivationOutput {
    pub run_id: RunId,
    pub applied_count: u64,
    /// Records whose applicable payment-time rule lacked a date.
    pub null_payment_time_count: u64,
    pub invoice_date_term_count: u64,
    pub fallback_term_count: u64,
    pub default_term_count: u64,
    /// Subset of `default_term_count` whose term text could not be read.
    pub unreadable_term_count: u64,
    pub partial_payment_count: u64,
}

/// Recomputes payment time, payment term and partial payment for every
/// reportable, non-excluded record of `run_id`.
///
/// All rows are computed first and written in a single batched update, so a
/// failure leaves the run untouched once the caller rolls back.
pub fn derive_metrics<S: Session>(
    tx: &mut TenantTransaction<S>,
    run_id: RunId,
    config: &MetricsConfig,
) -> PtrsResult<ComputationOutput<MetricsDerivationOutput>> {
    let start = Instant::now();
    let tenant = tx.tenant_id().clone();
    let session = tx.session()?;

    if session.find_run(run_id)?.is_none() {
        return Err(PtrsError::RunNotFound(run_id));
    }
    if config.default_payment_term_days < 0 {
        return Err(PtrsError::InvalidInput {
            field: "metrics.default_payment_term_days".to_string(),
            reason: "Default payment term must not be negative".to_string(),
        });
    }

    let records = session.reportable_records(run_id)?;

    let mut output = MetricsDerivationOutput {
        run_id,
        applied_count: 0,
        null_payment_time_count: 0,
        invoice_date_term_count: 0,
        fallback_term_count: 0,
        default_term_count: 0,
        unreadable_term_count: 0,
        partial_payment_count: 0,
    };

    let updates: Vec<DerivedMetricsUpdate> = records
        .iter()
        .map(|record| {
            let (update, term) = derive_record(record, config.default_payment_term_days);
            match term.source {
                PaymentTermSource::InvoiceDates => output.invoice_date_term_count += 1,
                source if source.is_default() => {
                    output.default_term_count += 1;
                    if source == PaymentTermSource::UnreadableTerms {
                        output.unreadable_term_count += 1;
                    }
                }
                _ => output.fallback_term_count += 1,
            }
            if update.payment_time_days.is_none() {
                output.null_payment_time_count += 1;
            }
            if update.partial_payment {
                output.partial_payment_count += 1;
            }
            update
        })
        .collect();

    output.applied_count = session.apply_derived_metrics(run_id, &updates)?;

    let mut warnings = Vec::new();
    if output.null_payment_time_count > 0 {
        warnings.push(format!(
            "{} record(s) lack the dates needed to compute payment time",
            output.null_payment_time_count
        ));
    }
    if output.default_term_count > 0 {
        warnings.push(format!(
            "{} record(s) use the default {}-day payment term",
            output.default_term_count, config.default_payment_term_days
        ));
    }

    if output.unreadable_term_count > 0 {
        warnings.push(format!(
            "{} record(s) have payment terms with no readable day count",
            output.unreadable_term_count
        ));
    }

    info!(
        tenant = %tenant,
        run = %run_id,
        applied = output.applied_count,
        "payment metrics derived"
    );

    let assumptions = HashMap::from([
        ("rcti_day_count", "inclusive, negative clamps to 0".to_string()),
        ("invoice_day_count", "exclusive, shortest of issue/receipt".to_string()),
        (
            "default_payment_term_days",
            config.default_payment_term_days.to_string(),
        ),
        ("partial_payment_missing_amounts", "false".to_string()),
    ]);

    Ok(with_metadata(
        "Payment times derivation (set-based, single transaction)",
        &assumptions,
        warnings,
        start.elapsed().as_micros() as u64,
        output,
    ))
}
