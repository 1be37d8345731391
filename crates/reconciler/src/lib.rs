//! The ingestion and reconciliation service.
//!
//! One cooperative worker walks the raw buffer and promotes rows into
//! deduplicated, SKU-linked offers, consulting the deterministic title
//! parser, the pattern engine, the FX service and (within a strict
//! budget) the LLM candidate matcher. The pattern suggester runs on its
//! own slower cadence.

pub mod arguments;
pub mod database;
pub mod explain;
pub mod ingest;
pub mod reconcile;
pub mod run;
pub mod run_loop;
pub mod suggest;

/// Generates a random public identifier (raw offers, offers, suggest
/// runs). Collision chance over 16 random bytes is not a concern.
pub(crate) fn generate_public_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}
