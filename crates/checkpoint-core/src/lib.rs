//! Service plumbing shared by Checkpoint binaries: tracing setup, health
//! probes, HTTP middleware and timestamp serializers.

pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;
