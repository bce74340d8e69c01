//! Pipeline orchestration for pelican.
//!
//! One [`Pipeline`](supervisor::Pipeline) wires a scanner to a pool of
//! [`Processor`](processor::Processor) workers sharing a single marker
//! queue. Each worker drives the per-marker state machine (readiness wait,
//! matching, fan-out replication, aggregation) and hands completed
//! [`MarkerResult`](pl_types::MarkerResult)s to its
//! [`Remover`](remover::Remover), which deletes local copies once every
//! backend succeeded.

mod processor;
mod readiness;
mod remover;
mod stats;
mod supervisor;

pub use processor::{Processor, SharedMarkerQueue};
pub use readiness::{wait_until_ready, MarkerCheck};
pub use remover::{removal_set, Remover};
pub use stats::{PipelineStats, StatsSnapshot};
pub use supervisor::Pipeline;
