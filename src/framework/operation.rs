//! # The Operation Lifecycle
//!
//! An operation type implements [`Operation`]; an *instance* of it is an
//! [`Op<K>`]. The split mirrors the rest of the framework: the trait holds the
//! business logic and declarations, the generic struct holds the plumbing
//! (params, context, authorization bookkeeping, the model and nested ops).
//!
//! ## Lifecycle
//!
//! ```text
//! Op::new ──► on_init policies ──► run ──► before_perform ──► perform ──► after_perform
//!                                    │                                           │
//!                                    └── profiled, wrapped in a transaction ─────┘
//!                                                        │
//!                                                        ▼
//!                                             "after_run" hookup trigger
//! ```
//!
//! * [`Op::run`] is strict: any error propagates.
//! * [`Op::run_lenient`] turns the operation's validation-class errors into
//!   `Ok(false)` and keeps the error for inspection.
//! * An instance runs at most once; a second call fails with
//!   [`OpError::AlreadyPerformed`].
//!
//! A *root* operation (one whose context has an empty op chain) runs inside
//! [`Runtime::transaction`](crate::runtime::Runtime::transaction); sub
//! operations and hook targets join that transaction.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use super::auth::{AuthSubject, AuthorizationRequest};
use super::context::{Context, OpId, OpRef};
use super::definition::{Definition, OpKind};
use super::error::{OpError, ValidationErrors};
use super::model::Model;
use super::nesting::NestedEntry;
use super::params::{IntoParams, Params};
use super::policy::PolicyChain;
use crate::hookup::AFTER_RUN;
use crate::lifecycle::tracing::log_operation_run;

/// A business operation type.
///
/// ```rust,ignore
/// #[derive(Debug, Default)]
/// struct ArchiveGroup;
///
/// impl Operation for ArchiveGroup {
///     type Model = NoModel;
///     const NAME: &'static str = "ArchiveGroup";
///
///     fn define(def: &mut Definition<Self>) -> Result<(), OpError> {
///         def.policy(PolicyChain::OnInit, |op| op.authorize("archive", &AuthSubject::named("groups")))?;
///         Ok(())
///     }
///
///     fn perform(op: &mut Op<Self>) -> Result<(), OpError> {
///         op.run_sub::<UpdateGroup>(json!({ "id": 1, "group": { "archived": true } }))?;
///         Ok(())
///     }
/// }
/// ```
pub trait Operation: Default + Sized + 'static {
    type Model: Model;

    const NAME: &'static str;
    const KIND: OpKind = OpKind::Plain;

    /// Declares policies, authorization settings, nested ops and the schema.
    fn define(_def: &mut Definition<Self>) -> Result<(), OpError> {
        Ok(())
    }

    /// The operation's business logic. Model kinds save or destroy by default.
    fn perform(op: &mut Op<Self>) -> Result<(), OpError> {
        op.default_perform()
    }

    /// Errors `run_lenient` treats as recoverable.
    fn is_validation_error(error: &OpError) -> bool {
        error.is_validation()
    }

    /// Params handed to `after_run` hook targets.
    fn after_run_params(op: &Op<Self>) -> Params {
        op.default_after_run_params()
    }
}

/// Construction arguments: an optional context plus params.
pub struct OpArgs {
    context: Option<Context>,
    params: Result<Params, OpError>,
}

impl From<()> for OpArgs {
    fn from(_: ()) -> Self {
        Self {
            context: None,
            params: Ok(Params::new()),
        }
    }
}

impl From<Context> for OpArgs {
    fn from(context: Context) -> Self {
        Self {
            context: Some(context),
            params: Ok(Params::new()),
        }
    }
}

impl From<&Context> for OpArgs {
    fn from(context: &Context) -> Self {
        Self::from(context.clone())
    }
}

impl From<Params> for OpArgs {
    fn from(params: Params) -> Self {
        Self {
            context: None,
            params: Ok(params),
        }
    }
}

impl From<Value> for OpArgs {
    fn from(params: Value) -> Self {
        Self {
            context: None,
            params: params.into_params(),
        }
    }
}

impl From<(Context, Params)> for OpArgs {
    fn from((context, params): (Context, Params)) -> Self {
        Self {
            context: Some(context),
            params: Ok(params),
        }
    }
}

impl From<(Context, Value)> for OpArgs {
    fn from((context, params): (Context, Value)) -> Self {
        Self {
            context: Some(context),
            params: params.into_params(),
        }
    }
}

impl From<(&Context, Params)> for OpArgs {
    fn from((context, params): (&Context, Params)) -> Self {
        Self::from((context.clone(), params))
    }
}

impl From<(&Context, Value)> for OpArgs {
    fn from((context, params): (&Context, Value)) -> Self {
        Self::from((context.clone(), params))
    }
}

/// One operation instance.
pub struct Op<K: Operation> {
    pub(crate) id: OpId,
    pub(crate) context: Context,
    pub(crate) params: Params,
    pub(crate) def: Arc<Definition<K>>,
    state: K,
    performed: bool,
    authorize_called: bool,
    pub(crate) model: K::Model,
    pub(crate) model_built: bool,
    pub(crate) auth_snapshot: Option<K::Model>,
    /// Param values the model could not cast, reported on validation.
    pub(crate) assignment_errors: ValidationErrors,
    pub(crate) nested: Option<Vec<NestedEntry<K::Model>>>,
    pub(crate) nested_performed: bool,
    validation_error: Option<OpError>,
}

impl<K: Operation> Op<K> {
    /// Constructs an instance and runs its `on_init` policies.
    pub fn new(args: impl Into<OpArgs>) -> Result<Self, OpError> {
        let OpArgs { context, params } = args.into();
        let params = params?.without_reserved();
        let def = Definition::<K>::get()?;

        let mut op = Self {
            id: OpId::next(),
            context: context.unwrap_or_default(),
            params,
            def,
            state: K::default(),
            performed: false,
            authorize_called: false,
            model: K::Model::default(),
            model_built: false,
            auth_snapshot: None,
            assignment_errors: ValidationErrors::new(),
            nested: None,
            nested_performed: false,
            validation_error: None,
        };
        trace!(op = K::NAME, id = %op.id, "Initializing operation");
        op.run_policies(PolicyChain::OnInit)?;
        Ok(op)
    }

    /// Constructs and strictly runs an instance.
    pub fn execute(args: impl Into<OpArgs>) -> Result<Self, OpError> {
        let mut op = Self::new(args)?;
        op.run()?;
        Ok(op)
    }

    /// Constructs and leniently runs an instance.
    pub fn execute_lenient(args: impl Into<OpArgs>) -> Result<bool, OpError> {
        Self::new(args)?.run_lenient()
    }

    /// Runs the operation, propagating every error.
    pub fn run(&mut self) -> Result<&mut Self, OpError> {
        if self.performed {
            return Err(OpError::AlreadyPerformed);
        }
        if self.is_root() {
            let runtime = Arc::clone(self.context.runtime_arc());
            runtime.transaction(|| self.run_profiled())?;
        } else {
            self.run_profiled()?;
        }
        Ok(self)
    }

    /// Runs the operation; validation-class errors yield `Ok(false)`.
    pub fn run_lenient(&mut self) -> Result<bool, OpError> {
        let outcome = self.run().map(|_| ());
        match outcome {
            Ok(()) => Ok(true),
            Err(error) if K::is_validation_error(&error) => {
                debug!(op = K::NAME, id = %self.id, %error, "Operation failed validation");
                self.validation_error = Some(error);
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    fn run_profiled(&mut self) -> Result<(), OpError> {
        let profiler = self.context.profiler().clone();
        let description = self.inspect();
        let outcome = profiler.profile(self.id, description, || self.perform_once());
        log_operation_run(K::NAME, self.id, &profiler, self.def.skips_logging());
        outcome?;

        let params = K::after_run_params(self);
        self.trigger(AFTER_RUN, params)
    }

    fn perform_once(&mut self) -> Result<(), OpError> {
        self.performed = true;
        self.run_policies(PolicyChain::BeforePerform)?;
        K::perform(self)?;
        self.run_policies(PolicyChain::AfterPerform)
    }

    /// Runs every policy of `chain` in order, stopping at the first error.
    pub fn run_policies(&mut self, chain: PolicyChain) -> Result<(), OpError> {
        let def = Arc::clone(&self.def);
        for policy in def.policies(chain) {
            policy(self)?;
        }
        Ok(())
    }

    pub(crate) fn default_perform(&mut self) -> Result<(), OpError> {
        match self.def.kind() {
            OpKind::Create | OpKind::Update => self.save(),
            OpKind::Destroy => self.destroy_model(),
            OpKind::Plain | OpKind::Load => Err(OpError::NotImplemented("perform")),
        }
    }

    pub(crate) fn default_after_run_params(&self) -> Params {
        if self.def.kind().is_model() {
            Params::new().with("model", Value::Object(self.model.attributes()))
        } else {
            Params::new()
        }
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        K::NAME
    }

    pub fn op_ref(&self) -> OpRef {
        OpRef {
            id: self.id,
            name: K::NAME,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /// The operation type's own fields.
    pub fn state(&self) -> &K {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut K {
        &mut self.state
    }

    pub fn definition(&self) -> &Definition<K> {
        &self.def
    }

    pub fn performed(&self) -> bool {
        self.performed
    }

    pub fn check_performed(&self) -> Result<(), OpError> {
        if self.performed {
            Ok(())
        } else {
            Err(OpError::lifecycle("Operation has not yet been performed."))
        }
    }

    /// The error swallowed by the last lenient run.
    pub fn validation_error(&self) -> Option<&OpError> {
        self.validation_error.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.context.op_chain().is_empty()
    }

    pub fn filtered_params(&self) -> Params {
        self.params
            .filtered(&self.context.runtime().config().filter_parameters)
    }

    /// Name and filtered params, e.g. `CreateGroup ({"group":{"name":"x"}})`.
    pub fn inspect(&self) -> String {
        format!("{} ({})", K::NAME, self.filtered_params())
    }

    pub fn authorization_enabled(&self) -> bool {
        self.context.runtime().authorization_backend().is_some()
            && !self.context.authorization_suppressed()
            && !self.def.authorization_disabled()
            && self.context.ability().is_some()
    }

    pub fn authorize_called(&self) -> bool {
        self.authorize_called
    }

    /// Checks `action` on `subject` and records that authorization happened.
    pub fn authorize(&mut self, action: &str, subject: &AuthSubject) -> Result<(), OpError> {
        self.authorize_with(action, subject, &[])
    }

    pub fn authorize_with(
        &mut self,
        action: &str,
        subject: &AuthSubject,
        extra: &[Value],
    ) -> Result<(), OpError> {
        self.authorize_only_with(action, subject, extra)?;
        self.authorize_called = true;
        Ok(())
    }

    /// Checks `action` on `subject` without counting toward the
    /// "authorization was performed" guard.
    pub fn authorize_only(&self, action: &str, subject: &AuthSubject) -> Result<(), OpError> {
        self.authorize_only_with(action, subject, &[])
    }

    pub fn authorize_only_with(
        &self,
        action: &str,
        subject: &AuthSubject,
        extra: &[Value],
    ) -> Result<(), OpError> {
        if !self.authorization_enabled() {
            return Ok(());
        }
        let Some(backend) = self.context.runtime().authorization_backend() else {
            return Ok(());
        };
        let request = AuthorizationRequest {
            operation: K::NAME,
            context: &self.context,
            action,
            subject,
            extra,
        };
        backend.authorize(&request).map_err(|error| {
            warn!(op = K::NAME, action, %subject, %error, "Authorization failed");
            error
        })
    }

    pub(crate) fn ensure_authorize_called(&mut self) -> Result<(), OpError> {
        if !self.context.runtime().config().ensure_authorize_called
            || !self.authorization_enabled()
            || self.authorize_called
        {
            return Ok(());
        }
        Err(OpError::NoAuthorizationPerformed(format!(
            "Operation {} must have performed authorization.",
            K::NAME
        )))
    }

    /// Constructs `S` with a context spawned from this operation.
    pub fn sub_op<S: Operation>(&self, params: impl IntoParams) -> Result<Op<S>, OpError> {
        let context = self.context.spawn(self.op_ref());
        Op::<S>::new((context, params.into_params()?)).map_err(wrap_sub_op_error::<S>)
    }

    /// Constructs and strictly runs `S` as a sub operation.
    pub fn run_sub<S: Operation>(&self, params: impl IntoParams) -> Result<Op<S>, OpError> {
        let mut op = self.sub_op::<S>(params)?;
        op.run().map(|_| ()).map_err(wrap_sub_op_error::<S>)?;
        Ok(op)
    }

    /// Constructs and leniently runs `S` as a sub operation.
    pub fn run_sub_lenient<S: Operation>(&self, params: impl IntoParams) -> Result<bool, OpError> {
        self.sub_op::<S>(params)?.run_lenient()
    }

    /// Fires hookup `event` with this operation as the source.
    pub fn trigger(&self, event: &str, params: Params) -> Result<(), OpError> {
        let runtime = Arc::clone(self.context.runtime_arc());
        runtime
            .hookup()
            .trigger(&self.context, &self.op_ref(), event, params)
    }

    /// Runs `f`, converting any error into [`OpError::RollbackRequired`].
    pub fn with_rollback_on_error<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, OpError>,
    ) -> Result<T, OpError> {
        f(self).map_err(|error| OpError::RollbackRequired(Box::new(error)))
    }

    /// Validates params against the declared schema, applying its defaults.
    pub fn validate_schema(&mut self) -> Result<(), OpError> {
        let def = Arc::clone(&self.def);
        match def.params_schema() {
            Some(schema) => schema.validate(&mut self.params),
            None => Ok(()),
        }
    }
}

fn wrap_sub_op_error<S: Operation>(error: OpError) -> OpError {
    if S::is_validation_error(&error) {
        OpError::SubOpValidationFailed(Box::new(error))
    } else {
        error
    }
}

impl<K: Operation> fmt::Debug for Op<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Op")
            .field("name", &K::NAME)
            .field("id", &self.id)
            .field("params", &self.filtered_params())
            .field("performed", &self.performed)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Object-safe view of an operation instance, used by hookup targets.
pub trait DynOperation {
    fn name(&self) -> &'static str;

    fn run_dyn(&mut self) -> Result<(), OpError>;

    fn is_validation_error(&self, error: &OpError) -> bool;

    fn performed(&self) -> bool;

    fn model_attributes(&self) -> Map<String, Value>;
}

impl<K: Operation> DynOperation for Op<K> {
    fn name(&self) -> &'static str {
        K::NAME
    }

    fn run_dyn(&mut self) -> Result<(), OpError> {
        self.run().map(|_| ())
    }

    fn is_validation_error(&self, error: &OpError) -> bool {
        K::is_validation_error(error)
    }

    fn performed(&self) -> bool {
        self.performed
    }

    fn model_attributes(&self) -> Map<String, Value> {
        self.model.attributes()
    }
}
