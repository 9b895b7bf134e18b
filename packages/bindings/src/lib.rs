//! Node bindings. Every call takes a JSON request carrying the dataset
//! snapshot, tenant token and run id, and returns the operation result
//! together with the dataset as committed.

use napi::bindgen_prelude::Buffer;
use napi::Result as NapiResult;
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ptrs_core::config::EngineConfig;
use ptrs_core::store::memory::{DatasetSnapshot, MemoryDatabase};
use ptrs_core::{ComplianceService, PtrsError};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Engine errors keep their stable code so callers can branch on it.
fn engine_error(e: PtrsError) -> napi::Error {
    napi::Error::from_reason(format!("{}: {}", e.code(), e))
}

#[derive(Deserialize)]
struct RunRequest {
    dataset: DatasetSnapshot,
    tenant_id: String,
    run_id: Uuid,
    #[serde(default)]
    config: EngineConfig,
    #[serde(default)]
    upload_id: Option<Uuid>,
    #[serde(default)]
    actor_id: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
}

#[derive(Serialize)]
struct RunResponse<T: Serialize> {
    result: T,
    dataset: DatasetSnapshot,
}

fn run<T, F>(request_json: &str, op: F) -> NapiResult<String>
where
    T: Serialize,
    F: FnOnce(&ComplianceService<MemoryDatabase>, &RunRequest) -> Result<T, PtrsError>,
{
    let request: RunRequest = serde_json::from_str(request_json).map_err(to_napi_error)?;
    let service = ComplianceService::new(
        MemoryDatabase::from_snapshot(request.dataset.clone()),
        request.config.clone(),
    );
    let result = op(&service, &request).map_err(engine_error)?;
    let response = RunResponse {
        result,
        dataset: service.database().snapshot(),
    };
    serde_json::to_string(&response).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[napi]
pub fn derive_metrics(request_json: String) -> NapiResult<String> {
    run(&request_json, |service, req| {
        service.derive_metrics(&req.tenant_id, req.run_id)
    })
}

// ---------------------------------------------------------------------------
// SBI
// ---------------------------------------------------------------------------

#[napi]
pub fn import_sbi_results(request_json: String, file: Buffer) -> NapiResult<String> {
    run(&request_json, |service, req| {
        service.import_sbi_results(
            &req.tenant_id,
            req.run_id,
            req.actor_id.as_deref().unwrap_or_default(),
            &file,
            req.file_name.as_deref().unwrap_or("sbi-results.csv"),
        )
    })
}

#[napi]
pub fn validate_sbi(request_json: String) -> NapiResult<String> {
    run(&request_json, |service, req| {
        service.validate_sbi(&req.tenant_id, req.run_id)
    })
}

#[napi]
pub fn export_sbi_abns(request_json: String) -> NapiResult<String> {
    run(&request_json, |service, req| {
        service.export_sbi_abns(&req.tenant_id, req.run_id)
    })
}

#[napi]
pub fn sbi_upload(request_json: String) -> NapiResult<String> {
    run(&request_json, |service, req| {
        service.sbi_upload(&req.tenant_id, req.run_id, req.upload_id)
    })
}

#[napi]
pub fn certify_run(request_json: String) -> NapiResult<String> {
    run(&request_json, |service, req| {
        service.certify_run(&req.tenant_id, req.run_id)
    })
}
