//! Persistence seams used by model operations.
//!
//! Model operations never talk to storage directly. They go through a
//! [`Repository`] registered on the [`Runtime`](crate::runtime::Runtime) for
//! their model type. Repositories that can undo their writes also
//! implement [`Transactional`], which lets the runtime wrap a root operation
//! and everything it triggers in one all-or-nothing unit.

pub mod memory;

pub use memory::MemoryRepository;

use serde_json::Value;

use crate::framework::{LockMode, Model, OpError};

pub trait Repository<M: Model>: Send + Sync {
    /// Finds one row whose `field` equals `value`, optionally locking it.
    fn find_by(&self, field: &str, value: &Value, lock: Option<LockMode>)
        -> Result<Option<M>, OpError>;

    /// Inserts or updates `model`, assigning an id to new rows.
    fn save(&self, model: &mut M) -> Result<(), OpError>;

    fn destroy(&self, model: &M) -> Result<(), OpError>;
}

/// Nested transaction support. Calls are always balanced by the runtime, and a
/// transaction belongs to the thread that began it.
pub trait Transactional: Send + Sync {
    fn begin(&self);

    fn commit(&self);

    fn rollback(&self);
}
