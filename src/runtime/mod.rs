//! Runtime wiring for operations.
//!
//! The [`Runtime`] is the one object every context points at. It holds:
//!
//! - **Configuration** ([`OpsConfig`])
//! - **The authorization backend**, if any
//! - **Repositories** per model type, used by model operations
//! - **The operation registry**, used to resolve hook targets by name
//! - **The hookup registry** ([`Hookup`])
//!
//! # Main Components
//!
//! - [`Runtime`] / [`RuntimeBuilder`] - Assembled once at startup, then shared as `Arc<Runtime>`
//! - [`OperationRegistry`] - Name to constructor mapping for hook targets
//! - [`profiler`] - Per-session operation timings

pub mod config;
pub mod profiler;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

pub use config::OpsConfig;
pub use profiler::{Profiler, Timings};

use crate::framework::{
    AuthorizationBackend, Context, DynOperation, Model, Op, OpError, Operation, Params,
};
use crate::hookup::Hookup;
use crate::persistence::{Repository, Transactional};

type Factory = Arc<dyn Fn(Context, Params) -> Result<Box<dyn DynOperation>, OpError> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    factory: Factory,
    is_validation_error: fn(&OpError) -> bool,
}

/// Operation types addressable by name.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    entries: HashMap<&'static str, Registration>,
}

impl OperationRegistry {
    pub fn register<K: Operation>(&mut self) {
        let factory: Factory = Arc::new(
            |context: Context, params: Params| -> Result<Box<dyn DynOperation>, OpError> {
                let op = Op::<K>::new((context, params))?;
                Ok(Box::new(op))
            },
        );
        self.entries.insert(
            K::NAME,
            Registration {
                factory,
                is_validation_error: K::is_validation_error,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Constructs the operation registered as `name`.
    pub fn instantiate(
        &self,
        name: &str,
        context: Context,
        params: Params,
    ) -> Result<Box<dyn DynOperation>, OpError> {
        let registration = self
            .entries
            .get(name)
            .ok_or_else(|| OpError::HookTargetNotFound(name.to_string()))?;
        (registration.factory)(context, params)
    }

    /// Whether `error` is validation-class for the operation registered as `name`.
    pub fn is_validation_error(&self, name: &str, error: &OpError) -> bool {
        self.entries
            .get(name)
            .map_or_else(|| error.is_validation(), |r| (r.is_validation_error)(error))
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

pub struct Runtime {
    config: OpsConfig,
    authorization_backend: Option<Arc<dyn AuthorizationBackend>>,
    repositories: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    transactional: Vec<Arc<dyn Transactional>>,
    operations: OperationRegistry,
    hookup: Hookup,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// A fresh root context bound to this runtime.
    pub fn context(self: &Arc<Self>) -> Context {
        Context::new(Arc::clone(self))
    }

    pub fn config(&self) -> &OpsConfig {
        &self.config
    }

    pub fn authorization_backend(&self) -> Option<&dyn AuthorizationBackend> {
        self.authorization_backend.as_deref()
    }

    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    pub fn hookup(&self) -> &Hookup {
        &self.hookup
    }

    pub fn repository<M: Model>(&self) -> Result<Arc<dyn Repository<M>>, OpError> {
        self.repositories
            .get(&TypeId::of::<M>())
            .and_then(|entry| entry.downcast_ref::<Arc<dyn Repository<M>>>())
            .cloned()
            .ok_or_else(|| OpError::Config(format!("No repository registered for {}.", M::NAME)))
    }

    /// Runs `f` in a transaction spanning every transactional repository,
    /// confined to the calling thread.
    ///
    /// Any error rolls all of them back.
    pub fn transaction<T>(&self, f: impl FnOnce() -> Result<T, OpError>) -> Result<T, OpError> {
        for store in &self.transactional {
            store.begin();
        }
        match f() {
            Ok(value) => {
                for store in &self.transactional {
                    store.commit();
                }
                Ok(value)
            }
            Err(error) => {
                for store in self.transactional.iter().rev() {
                    store.rollback();
                }
                debug!(%error, "Transaction rolled back");
                Err(error)
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        RuntimeBuilder::default().build_inner()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("authorization_backend", &self.authorization_backend)
            .field("repositories", &self.repositories.len())
            .field("operations", &self.operations)
            .field("hookup", &self.hookup)
            .finish()
    }
}

#[derive(Default)]
pub struct RuntimeBuilder {
    config: OpsConfig,
    authorization_backend: Option<Arc<dyn AuthorizationBackend>>,
    repositories: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    transactional: Vec<Arc<dyn Transactional>>,
    operations: OperationRegistry,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: OpsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn authorization_backend(mut self, backend: impl AuthorizationBackend + 'static) -> Self {
        self.authorization_backend = Some(Arc::new(backend));
        self
    }

    /// Registers a repository that also takes part in transactions.
    pub fn repository<M, R>(mut self, repository: Arc<R>) -> Self
    where
        M: Model,
        R: Repository<M> + Transactional + 'static,
    {
        let transactional: Arc<dyn Transactional> = repository.clone();
        self.transactional.push(transactional);
        self.plain_repository::<M>(repository)
    }

    /// Registers a repository without transaction support.
    pub fn plain_repository<M: Model>(mut self, repository: Arc<dyn Repository<M>>) -> Self {
        self.repositories
            .insert(TypeId::of::<M>(), Box::new(repository));
        self
    }

    /// Makes `K` addressable as a hook target.
    pub fn register<K: Operation>(mut self) -> Self {
        self.operations.register::<K>();
        self
    }

    pub fn build(self) -> Arc<Runtime> {
        let runtime = self.build_inner();
        info!(
            operations = runtime.operations.entries.len(),
            repositories = runtime.repositories.len(),
            authorization = runtime.authorization_backend.is_some(),
            "Runtime built"
        );
        Arc::new(runtime)
    }

    fn build_inner(self) -> Runtime {
        let hookup = Hookup::new(self.config.hookup_config_path.clone());
        Runtime {
            config: self.config,
            authorization_backend: self.authorization_backend,
            repositories: self.repositories,
            transactional: self.transactional,
            operations: self.operations,
            hookup,
        }
    }
}
