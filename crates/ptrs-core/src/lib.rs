pub mod audit;
pub mod config;
pub mod error;
pub mod service;
pub mod store;
pub mod tenancy;
pub mod types;

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "sbi")]
pub mod sbi;

#[cfg(feature = "sbi")]
pub mod certification;

pub use error::PtrsError;
pub use service::ComplianceService;
pub use tenancy::{begin_tenant_transaction, with_tenant_transaction, TenantId, TenantTransaction};

/// Standard result type for all engine operations
pub type PtrsResult<T> = Result<T, PtrsError>;
