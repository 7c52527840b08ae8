//! Generic operation framework.
//!
//! This module provides the building blocks for writing business operations:
//! self-contained units of work with declared policies, authorization and
//! (optionally) a persisted model.
//!
//! # Main Components
//!
//! - [`Operation`] - Trait that operation types implement
//! - [`Op`] - One operation instance and its lifecycle
//! - [`Definition`] - Per-type declarations: policies, authorization, nesting
//! - [`Context`] - Caller identity, ability and op chain
//! - [`Model`] - Contract for entities handled by model operations
//! - [`OpError`] - Common error type
//!
//! # Testing
//!
//! See [`crate::persistence::MemoryRepository`] and [`RuleAbility`] for
//! test doubles that need neither a database nor an auth system.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod auth;
pub mod context;
pub mod definition;
pub mod error;
pub mod model;
mod model_op;
pub mod nesting;
pub mod operation;
pub mod params;
pub mod policy;
pub mod schema;

pub use auth::{
    Ability, AbilityBackend, AuthSubject, AuthorizationBackend, AuthorizationRequest, RuleAbility,
};
pub use context::{Actor, Context, ContextField, OpId, OpRef, UrlOptions};
pub use definition::{Definition, LockMode, OpKind};
pub use error::{AccessDenied, FieldError, OpError, ValidationErrors};
pub use model::{
    cast_attribute, downcast_association, Association, AssociationKind, Inheritance,
    InverseAssociation, Model, ModelId, NoModel,
};
pub use model_op::AssignOptions;
pub use nesting::NestOptions;
pub use operation::{DynOperation, Op, OpArgs, Operation};
pub use params::{IntoParams, Params, RESERVED_PARAM_KEYS};
pub use policy::{Policy, PolicyChain};
pub use schema::{JsonSchema, Schema};

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
