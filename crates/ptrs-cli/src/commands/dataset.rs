use clap::Args;
use uuid::Uuid;

use ptrs_core::config::EngineConfig;
use ptrs_core::store::memory::{DatasetSnapshot, MemoryDatabase};
use ptrs_core::ComplianceService;

use crate::input;

/// Dataset, tenant and run shared by every run-scoped command
#[derive(Args)]
pub struct RunScope {
    /// Path to a JSON dataset snapshot (reads stdin when omitted)
    #[arg(long)]
    pub dataset: Option<String>,

    /// 10-character tenant token the transaction is bound to
    #[arg(long)]
    pub tenant: String,

    /// Reporting run id
    #[arg(long)]
    pub run: Uuid,

    /// Write the committed dataset back to --dataset
    #[arg(long, default_value_t = false)]
    pub write: bool,
}

pub fn open_service(
    scope: &RunScope,
    config: EngineConfig,
) -> Result<ComplianceService<MemoryDatabase>, Box<dyn std::error::Error>> {
    if scope.write && scope.dataset.is_none() {
        return Err("--write requires --dataset <file.json>".into());
    }
    let snapshot: DatasetSnapshot = if let Some(ref path) = scope.dataset {
        input::file::read_json(path)?
    } else if let Some(snapshot) = input::stdin::read_dataset()? {
        snapshot
    } else {
        return Err("--dataset <file.json> or stdin required".into());
    };
    Ok(ComplianceService::new(
        MemoryDatabase::from_snapshot(snapshot),
        config,
    ))
}

/// Persists committed state when `--write` was given.
pub fn persist(
    scope: &RunScope,
    service: &ComplianceService<MemoryDatabase>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let (true, Some(path)) = (scope.write, scope.dataset.as_deref()) {
        input::file::write_json(path, &service.database().snapshot())?;
        tracing::info!(path, "dataset written");
    }
    Ok(())
}
