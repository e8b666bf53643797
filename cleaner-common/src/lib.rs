pub mod crd;
pub mod duration;
pub mod execution;
pub mod metrics;
pub mod retry;
