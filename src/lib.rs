//! # Ops Recipe
//!
//! > **A Recipe for Business Operations in Rust.**
//!
//! This crate demonstrates a pattern for structuring business logic as *operations*:
//! self-contained units of work that validate their input, authorize the caller,
//! load or build a model, persist it and let other operations react afterwards.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Why Operations?
//!
//! Controllers, jobs and consoles all end up doing the same things: check params,
//! check permissions, touch the database, notify someone. Operations put each of
//! those steps in one well-defined place:
//! - **Policies**: guards attached to fixed points of the lifecycle.
//! - **Authorization**: pluggable backends, with a fail-closed check that *something* was authorized.
//! - **Model handling**: load, create, update and destroy with nested model delegation.
//! - **Hookups**: declarative "after X ran, run Y" wiring.
//!
//! ## 🚀 Core Concepts
//!
//! ### Generics: The Power of `K`
//! You'll see `Op<K: Operation>` everywhere. The operation type `K` only declares
//! *what* happens (its [`Definition`](framework::Definition) and `perform`); `Op<K>`
//! supplies the lifecycle plumbing once for every operation.
//!
//! ### Declarations are built once
//! [`Operation::define`](framework::Operation::define) runs the first time an
//! operation type is constructed. The resulting definition is shared by every
//! instance, so declaring a policy costs nothing at run time.
//!
//! ### Testing without a database
//! [`MemoryRepository`](persistence::MemoryRepository) stores models in memory and
//! takes part in transactions; [`RuleAbility`](framework::RuleAbility) is a small
//! permission table. Together they run every operation without external services.
//!
//! ## 👩‍💻 Architecture Notes
//!
//! ### 1. Type-Safe Error Handling
//! Every failure is an [`OpError`](framework::OpError). Validation-class errors are the
//! only ones [`run_lenient`](framework::Op::run_lenient) swallows; errors of sub operations
//! and hook targets are wrapped so they can't be mistaken for the parent's own.
//!
//! ### 2. Context Injection
//! Callers pass a [`Context`](framework::Context) (actor, ability, session). Sub
//! operations receive a spawned copy that remembers the chain of calling operations.
//!
//! ### 3. Transactions
//! A root operation runs inside [`Runtime::transaction`](runtime::Runtime::transaction).
//! Anything it runs, including hook targets, shares that transaction.
//!
//! ### 4. Observability
//! We use `tracing` everywhere with structured fields, and every run is timed by the
//! session's [`Profiler`](runtime::Profiler).
//! See the [`lifecycle::tracing`] module for details.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Engine ([`framework`])
//! - **Role**: The operation lifecycle, policies, authorization and model handling.
//! - **Key items**: [`Operation`](framework::Operation), [`Op`](framework::Op), [`Definition`](framework::Definition).
//!
//! ### 2. The Runtime ([`runtime`], [`persistence`], [`hookup`])
//! - **Role**: Configuration, repositories, the operation registry, hookups and profiling.
//! - **Key items**: [`Runtime`](runtime::Runtime), [`Hookup`](hookup::Hookup), [`Repository`](persistence::Repository).
//!
//! ### 3. The Orchestrator ([`lifecycle`])
//! - **Role**: Wires the sample runtime together and sets up logging.
//! - **Key items**: [`InventorySystem`](lifecycle::InventorySystem), [`setup_tracing`](lifecycle::setup_tracing).
//!
//! ### 4. The Implementation ([`domain`], [`group_ops`], [`computer_ops`])
//! - **Role**: Sample models and the operations built on them using the recipe.
//!
//! ## 🚀 Quick Start
//!
//! ```rust,ignore
//! use ops_recipe::group_ops::CreateGroup;
//! use ops_recipe::lifecycle::InventorySystem;
//! use serde_json::json;
//!
//! let system = InventorySystem::new();
//! let op = system.context().run::<CreateGroup>(json!({ "group": { "name": "Admins" } }))?;
//! assert_eq!(op.model().id, Some(1));
//! ```
//!
//! ### Running Tests
//!
//! ```bash
//! cargo test
//! ```

pub mod computer_ops;
pub mod domain;
pub mod framework;
pub mod group_ops;
pub mod hookup;
pub mod lifecycle;
pub mod persistence;
pub mod runtime;
