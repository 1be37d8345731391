//! Process-level observability: tracing initialization, a panic hook
//! that logs through tracing, and the shared prometheus metrics
//! registry with its HTTP endpoint.

pub mod metrics;
pub mod panic_hook;
pub mod tracing;
