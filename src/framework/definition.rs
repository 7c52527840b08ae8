//! # Operation Definitions
//!
//! Everything declared *about* an operation type lives in its
//! [`Definition`]: policy chains, authorization settings, nested model ops,
//! an optional params schema and a few model-loading knobs.
//!
//! A definition is assembled once per operation type, the first time an
//! instance is constructed, and then shared through an `Arc` by every
//! instance. Assembly happens in two steps:
//!
//! 1. The framework installs the policies implied by the operation's
//!    [`OpKind`] (model building, lazy authorization, the deletability check
//!    and the "was authorization performed" guard).
//! 2. [`Operation::define`] adds the type's own declarations.
//!
//! Because (1) always precedes (2), policies a kind contributes run before
//! the ones an operation type declares, unless the type explicitly prepends.
//!
//! Declarations that don't fit the operation's kind (for example a
//! `before_attr_assign` policy on an operation without a model) fail with
//! [`OpError::Definition`]. A definition that failed is not cached, so the
//! error surfaces again on the next construction.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use super::context::ContextField;
use super::error::{OpError, ValidationErrors};
use super::lock;
use super::nesting::NestedModelOpConfig;
use super::operation::{Op, Operation};
use super::policy::{Policy, PolicyChain, PolicyChains};
use super::schema::Schema;

/// What an operation does with its model, if it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// No model involved.
    Plain,
    /// Loads a model by id and authorizes reading it.
    Load,
    /// Builds and saves a fresh model.
    Create,
    /// Loads, assigns params and saves an existing model.
    Update,
    /// Loads and deletes an existing model.
    Destroy,
}

impl OpKind {
    pub fn is_model(self) -> bool {
        !matches!(self, Self::Plain)
    }

    /// Kinds that write params into their model.
    pub fn assigns_attributes(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }

    pub fn loads_model(self) -> bool {
        matches!(self, Self::Load | Self::Update | Self::Destroy)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Load => "load",
            Self::Create => "create",
            Self::Update => "update",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Row lock requested when loading a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

pub type ModelValidator<K> =
    Arc<dyn Fn(&<K as Operation>::Model, &mut ValidationErrors) + Send + Sync>;

pub struct Definition<K: Operation> {
    kind: OpKind,
    chains: PolicyChains<K>,
    authorization_disabled: bool,
    model_authorization_action: Option<String>,
    load_model_authorization_action: Option<String>,
    lazy_model_authorization: bool,
    lock_mode: LockMode,
    lock_model_at_build: Option<bool>,
    model_id_field: String,
    nested: Vec<NestedModelOpConfig<K>>,
    validators: Vec<ModelValidator<K>>,
    schema: Option<Arc<dyn Schema>>,
    skip_schema_validation: bool,
    skip_logging: bool,
}

type Registry = Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Default::default)
}

pub(crate) fn policy_fn<K, F>(f: F) -> Policy<K>
where
    K: Operation,
    F: Fn(&mut Op<K>) -> Result<(), OpError> + Send + Sync + 'static,
{
    Arc::new(f)
}

impl<K: Operation> Definition<K> {
    /// The shared definition of `K`, assembling it on first use.
    pub fn get() -> Result<Arc<Self>, OpError> {
        let key = TypeId::of::<K>();
        let cached = lock(registry()).get(&key).cloned();
        let entry = match cached {
            Some(entry) => entry,
            None => {
                // Assembled outside the lock; `define` may construct other definitions.
                let built: Arc<dyn Any + Send + Sync> = Arc::new(Self::assemble()?);
                lock(registry()).entry(key).or_insert(built).clone()
            }
        };
        entry
            .downcast::<Self>()
            .map_err(|_| OpError::definition(format!("Corrupt definition cache for {}.", K::NAME)))
    }

    fn assemble() -> Result<Self, OpError> {
        let mut definition = Self::for_kind(K::KIND);
        K::define(&mut definition)?;
        debug!(op = K::NAME, kind = %K::KIND, "Operation defined");
        Ok(definition)
    }

    fn for_kind(kind: OpKind) -> Self {
        let mut definition = Self {
            kind,
            chains: PolicyChains::default(),
            authorization_disabled: false,
            model_authorization_action: match kind {
                OpKind::Create => Some("create".into()),
                OpKind::Update => Some("update".into()),
                OpKind::Destroy => Some("destroy".into()),
                OpKind::Plain | OpKind::Load => None,
            },
            load_model_authorization_action: kind.loads_model().then(|| "read".into()),
            lazy_model_authorization: false,
            lock_mode: if kind == OpKind::Load {
                LockMode::Shared
            } else {
                LockMode::Exclusive
            },
            lock_model_at_build: None,
            model_id_field: "id".into(),
            nested: Vec::new(),
            validators: Vec::new(),
            schema: None,
            skip_schema_validation: false,
            skip_logging: false,
        };

        let chains = &mut definition.chains;
        chains.push(
            PolicyChain::AfterPerform,
            policy_fn(|op: &mut Op<K>| op.ensure_authorize_called()),
            false,
        );
        if kind.is_model() {
            chains.push(
                PolicyChain::OnInit,
                policy_fn(|op: &mut Op<K>| op.ensure_model_built()),
                false,
            );
        }
        match kind {
            OpKind::Update => chains.push(
                PolicyChain::BeforePerform,
                policy_fn(|op: &mut Op<K>| op.authorize_lazily()),
                false,
            ),
            OpKind::Destroy => chains.push(
                PolicyChain::BeforePerform,
                policy_fn(|op: &mut Op<K>| op.ensure_deleteable()),
                false,
            ),
            _ => {}
        }
        definition
    }

    /// Appends a policy to `chain`.
    pub fn policy<F>(&mut self, chain: PolicyChain, f: F) -> Result<&mut Self, OpError>
    where
        F: Fn(&mut Op<K>) -> Result<(), OpError> + Send + Sync + 'static,
    {
        self.register(chain, Arc::new(f), false)
    }

    /// Inserts a policy at the front of `chain`.
    pub fn prepend_policy<F>(&mut self, chain: PolicyChain, f: F) -> Result<&mut Self, OpError>
    where
        F: Fn(&mut Op<K>) -> Result<(), OpError> + Send + Sync + 'static,
    {
        self.register(chain, Arc::new(f), true)
    }

    fn register(
        &mut self,
        chain: PolicyChain,
        policy: Policy<K>,
        prepend: bool,
    ) -> Result<&mut Self, OpError> {
        if chain.requires_attribute_assignment() && !self.kind.assigns_attributes() {
            return Err(OpError::definition(format!(
                "Policy chain {chain} may only be used by operations that assign model attributes, \
                 {} is a {} operation.",
                K::NAME,
                self.kind
            )));
        }
        if chain.requires_model() && !self.kind.is_model() {
            return Err(OpError::definition(format!(
                "Policy chain {chain} may only be used by operations that build a model, \
                 {} is a {} operation.",
                K::NAME,
                self.kind
            )));
        }
        self.chains.push(chain, policy, prepend);
        Ok(self)
    }

    /// Fails construction unless every field is present on the context.
    pub fn require_context(&mut self, fields: &[ContextField]) -> Result<&mut Self, OpError> {
        let fields = fields.to_vec();
        self.policy(PolicyChain::OnInit, move |op| {
            match fields.iter().find(|field| !op.context().has(**field)) {
                Some(missing) => Err(OpError::MissingContextAttribute(missing.name())),
                None => Ok(()),
            }
        })
    }

    pub fn without_authorization(&mut self) -> &mut Self {
        self.authorization_disabled = true;
        self
    }

    /// Disabling authorization for sub operations is not available.
    pub fn without_authorization_for_sub_ops(&mut self) -> Result<&mut Self, OpError> {
        Err(OpError::definition(
            "Option include_sub_ops is not yet supported.",
        ))
    }

    /// Checks `action` on `subject` during construction when the param at
    /// `path` is present, even if its value is null.
    pub fn authorize_param(
        &mut self,
        path: &[&str],
        action: &str,
        subject: super::auth::AuthSubject,
    ) -> Result<&mut Self, OpError> {
        if path.is_empty() {
            return Err(OpError::definition("authorize_param needs a non-empty path."));
        }
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        let action = action.to_string();
        self.policy(PolicyChain::OnInit, move |op| {
            let keys: Vec<&str> = path.iter().map(String::as_str).collect();
            if op.params().dig(&keys).is_none() {
                return Ok(());
            }
            op.authorize_only(&action, &subject).map_err(|e| match e {
                OpError::AccessDenied(denied) => OpError::AccessDenied(
                    denied.with_message(format!("Got unauthorized param {:?}.", path.join("."))),
                ),
                other => other,
            })
        })
    }

    pub fn model_authorization_action(
        &mut self,
        action: Option<&str>,
    ) -> Result<&mut Self, OpError> {
        self.require_kind(self.kind.is_model(), "model_authorization_action")?;
        self.model_authorization_action = action.map(str::to_string);
        self.lazy_model_authorization = false;
        Ok(self)
    }

    /// Checks `action` in `before_perform` against the model as it was
    /// loaded, instead of during construction.
    pub fn lazy_model_authorization_action(&mut self, action: &str) -> Result<&mut Self, OpError> {
        self.require_kind(self.kind == OpKind::Update, "lazy_model_authorization_action")?;
        self.model_authorization_action = Some(action.to_string());
        self.lazy_model_authorization = true;
        Ok(self)
    }

    pub fn load_model_authorization_action(
        &mut self,
        action: Option<&str>,
    ) -> Result<&mut Self, OpError> {
        self.require_kind(self.kind.loads_model(), "load_model_authorization_action")?;
        self.load_model_authorization_action = action.map(str::to_string);
        Ok(self)
    }

    pub fn lock_mode(&mut self, mode: LockMode) -> Result<&mut Self, OpError> {
        self.require_kind(self.kind.loads_model(), "lock_mode")?;
        self.lock_mode = mode;
        Ok(self)
    }

    /// Overrides the runtime-wide `lock_models_at_build` setting.
    pub fn lock_model_at_build(&mut self, enabled: bool) -> Result<&mut Self, OpError> {
        self.require_kind(self.kind.loads_model(), "lock_model_at_build")?;
        self.lock_model_at_build = Some(enabled);
        Ok(self)
    }

    pub fn model_id_field(&mut self, field: &str) -> Result<&mut Self, OpError> {
        self.require_kind(self.kind.loads_model(), "model_id_field")?;
        self.model_id_field = field.to_string();
        Ok(self)
    }

    /// Adds a validation that only applies to models handled by this operation.
    pub fn validate<F>(&mut self, f: F) -> Result<&mut Self, OpError>
    where
        F: Fn(&K::Model, &mut ValidationErrors) + Send + Sync + 'static,
    {
        self.require_kind(self.kind.assigns_attributes(), "validate")?;
        self.validators.push(Arc::new(f));
        Ok(self)
    }

    /// Validates params against `schema` during construction.
    pub fn schema(&mut self, schema: impl Schema + 'static) -> &mut Self {
        if self.schema.is_none() {
            self.chains.push(
                PolicyChain::OnInit,
                policy_fn(|op: &mut Op<K>| {
                    if op.definition().skips_schema_validation() {
                        Ok(())
                    } else {
                        op.validate_schema()
                    }
                }),
                true,
            );
        }
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Leaves schema validation to an explicit [`Op::validate_schema`] call.
    pub fn skip_schema_validation(&mut self) -> &mut Self {
        self.skip_schema_validation = true;
        self
    }

    /// Suppresses the per-run log line.
    pub fn skip_logging(&mut self) -> &mut Self {
        self.skip_logging = true;
        self
    }

    pub(crate) fn push_nested(&mut self, config: NestedModelOpConfig<K>) {
        self.nested.retain(|existing| existing.attribute != config.attribute);
        self.nested.push(config);
    }

    pub(crate) fn require_kind(&self, allowed: bool, declaration: &str) -> Result<(), OpError> {
        if allowed {
            Ok(())
        } else {
            Err(OpError::definition(format!(
                "{declaration} is not available for {} operations like {}.",
                self.kind,
                K::NAME
            )))
        }
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn policies(&self, chain: PolicyChain) -> &[Policy<K>] {
        self.chains.get(chain)
    }

    pub fn authorization_disabled(&self) -> bool {
        self.authorization_disabled
    }

    pub fn model_authorization(&self) -> Option<&str> {
        self.model_authorization_action.as_deref()
    }

    pub fn load_model_authorization(&self) -> Option<&str> {
        self.load_model_authorization_action.as_deref()
    }

    pub fn lazy(&self) -> bool {
        self.lazy_model_authorization
    }

    pub fn lock(&self) -> LockMode {
        self.lock_mode
    }

    pub fn locks_model_at_build(&self) -> Option<bool> {
        self.lock_model_at_build
    }

    pub fn id_field(&self) -> &str {
        &self.model_id_field
    }

    pub(crate) fn nested(&self) -> &[NestedModelOpConfig<K>] {
        &self.nested
    }

    /// Param keys reserved for nested model ops, e.g. `mainboard_attributes`.
    pub fn nested_model_param_keys(&self) -> Vec<String> {
        self.nested
            .iter()
            .map(|config| format!("{}_attributes", config.attribute))
            .collect()
    }

    pub(crate) fn validators(&self) -> &[ModelValidator<K>] {
        &self.validators
    }

    pub(crate) fn params_schema(&self) -> Option<&dyn Schema> {
        self.schema.as_deref()
    }

    pub fn skips_schema_validation(&self) -> bool {
        self.skip_schema_validation
    }

    pub fn skips_logging(&self) -> bool {
        self.skip_logging
    }
}

impl<K: Operation> fmt::Debug for Definition<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("op", &K::NAME)
            .field("kind", &self.kind)
            .field("chains", &self.chains)
            .field("authorization_disabled", &self.authorization_disabled)
            .field("model_authorization_action", &self.model_authorization_action)
            .field("lazy", &self.lazy_model_authorization)
            .field("nested", &self.nested_model_param_keys())
            .finish_non_exhaustive()
    }
}
