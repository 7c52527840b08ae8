use std::sync::Arc;

use tracing::info;

use crate::computer_ops::{
    CreateComputer, CreateCpu, CreateMainboard, UpdateComputer, UpdateCpu, UpdateMainboard,
};
use crate::domain::{Computer, Cpu, Group, Mainboard};
use crate::framework::{AbilityBackend, Context};
use crate::group_ops::{
    CreateGroup, DestroyGroup, LoadGroup, SetGroupColor, UpdateGroup, UpdateGroupLazily,
};
use crate::persistence::MemoryRepository;
use crate::runtime::{OpsConfig, Runtime, RuntimeBuilder};

/// A runtime wired with in-memory repositories and every sample operation.
///
/// `InventorySystem` is responsible for:
/// - **Storage**: one [`MemoryRepository`] per sample model, kept here so callers can seed and inspect rows
/// - **Registration**: every sample operation is addressable as a hook target
///
/// # Example
///
/// ```ignore
/// let system = InventorySystem::new();
/// let op = system.context().run::<CreateGroup>(json!({ "group": { "name": "Admins" } }))?;
/// assert_eq!(system.groups.len(), 1);
/// ```
pub struct InventorySystem {
    pub runtime: Arc<Runtime>,
    pub groups: Arc<MemoryRepository<Group>>,
    pub computers: Arc<MemoryRepository<Computer>>,
    pub mainboards: Arc<MemoryRepository<Mainboard>>,
    pub cpus: Arc<MemoryRepository<Cpu>>,
}

impl InventorySystem {
    /// Without authorization and without a hookup file.
    pub fn new() -> Self {
        Self::build(Self::test_config(), false)
    }

    /// With the [`AbilityBackend`]; contexts need an ability to pass checks.
    pub fn with_authorization() -> Self {
        Self::build(Self::test_config(), true)
    }

    pub fn with_config(config: OpsConfig, authorization: bool) -> Self {
        Self::build(config, authorization)
    }

    fn test_config() -> OpsConfig {
        OpsConfig {
            hookup_config_path: None,
            ..OpsConfig::default()
        }
    }

    fn build(config: OpsConfig, authorization: bool) -> Self {
        let groups = Arc::new(MemoryRepository::<Group>::new());
        let computers = Arc::new(MemoryRepository::<Computer>::new());
        let mainboards = Arc::new(MemoryRepository::<Mainboard>::new());
        let cpus = Arc::new(MemoryRepository::<Cpu>::new());

        let mut builder = Runtime::builder()
            .config(config)
            .repository::<Group, _>(Arc::clone(&groups))
            .repository::<Computer, _>(Arc::clone(&computers))
            .repository::<Mainboard, _>(Arc::clone(&mainboards))
            .repository::<Cpu, _>(Arc::clone(&cpus));
        if authorization {
            builder = builder.authorization_backend(AbilityBackend);
        }
        let runtime = Self::register_operations(builder).build();
        info!(authorization, "Inventory system ready");

        Self {
            runtime,
            groups,
            computers,
            mainboards,
            cpus,
        }
    }

    fn register_operations(builder: RuntimeBuilder) -> RuntimeBuilder {
        builder
            .register::<CreateGroup>()
            .register::<LoadGroup>()
            .register::<UpdateGroup>()
            .register::<UpdateGroupLazily>()
            .register::<DestroyGroup>()
            .register::<SetGroupColor>()
            .register::<CreateCpu>()
            .register::<UpdateCpu>()
            .register::<CreateMainboard>()
            .register::<UpdateMainboard>()
            .register::<CreateComputer>()
            .register::<UpdateComputer>()
    }

    /// A root context without actor or ability.
    pub fn context(&self) -> Context {
        self.runtime.context()
    }
}

impl Default for InventorySystem {
    fn default() -> Self {
        Self::new()
    }
}
