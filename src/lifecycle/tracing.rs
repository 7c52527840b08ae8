//! # Observability & Tracing
//!
//! This module provides the tracing infrastructure for operations.
//!
//! ## Overview
//!
//! The [`setup_tracing`] function initializes structured logging with the `tracing` crate.
//! Every finished operation run emits one `OP` event carrying its name and profiler timings,
//! unless the operation declared `skip_logging`.
//!
//! ## Configuration
//!
//! The framework uses a compact format that hides the crate/module prefix (`with_target(false)`).
//! Log levels come from the `RUST_LOG` environment variable.
//!
//! ## What Gets Traced
//!
//! - **Operation runs**: one `OP` line per run with own and children time
//! - **Definitions**: when an operation type is first assembled
//! - **Model persistence**: loads, saves, deletes and rollbacks with `entity_type`
//! - **Authorization failures**: action, subject and the denial
//! - **Hookups**: loading the config, triggering and skipping targets
//!
//! ## Usage Examples
//!
//! ```bash
//! # Saves, deletes and denied authorizations
//! RUST_LOG=info cargo test
//!
//! # Per-run OP lines, lookups and hook triggers
//! RUST_LOG=debug cargo test
//!
//! # Filter to the framework only
//! RUST_LOG=ops_recipe::framework=trace cargo test
//! ```
//!
//! ## Run Trace Example
//!
//! **With `RUST_LOG=debug`**, a create with a nested mainboard:
//!
//! ```text
//! INFO Saved entity_type="Mainboard" id=1 size=1
//! DEBUG OP op="CreateMainboard" id=op#12 self_ms=0.21 kids_ms=0.0
//! INFO Saved entity_type="Computer" id=1 size=1
//! DEBUG OP op="CreateComputer" id=op#11 self_ms=0.35 kids_ms=0.21
//! ```
//!
//! Children are logged before their parent because a node's timings are only
//! known once it finished.

use tracing::debug;

use crate::framework::OpId;
use crate::runtime::Profiler;

pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false) // Operation names are carried in the `op` field
        .compact()
        .init();
}

/// Emits the `OP` line for a finished run and frees it if it was a root.
pub(crate) fn log_operation_run(op: &'static str, id: OpId, profiler: &Profiler, skip: bool) {
    if !skip {
        if let Some(timings) = profiler.timings(id) {
            debug!(
                op,
                %id,
                self_ms = timings.own_ms(),
                kids_ms = timings.children_ms(),
                "OP"
            );
        }
    }
    profiler.free(id);
}
