pub mod dataset;
pub mod metrics;
pub mod sbi;
