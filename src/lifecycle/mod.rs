//! Wiring and observability.
//!
//! # Main Components
//!
//! - [`InventorySystem`] - A ready-made runtime over the sample models and operations
//! - [`setup_tracing`] - Initializes the tracing/logging infrastructure

pub mod inventory_system;
pub mod tracing;

pub use inventory_system::*;
pub use self::tracing::setup_tracing;
