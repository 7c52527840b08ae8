//! # Operation Context
//!
//! A [`Context`] carries everything an operation needs from its caller: who is
//! acting ([`Actor`]), what they may do (an [`Ability`]), an opaque session
//! blob, url options for building links, and the chain of operations that led
//! to this call.
//!
//! Contexts are cheap to clone and never mutated after construction. Sub
//! operations and hook targets receive a *spawned* context: identical
//! attributes plus the calling operation appended to `op_chain`. The shared
//! [`Runtime`] and [`Profiler`] travel along with every spawned context.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use super::auth::Ability;
use super::error::OpError;
use super::operation::{Op, Operation};
use super::params::IntoParams;
use crate::runtime::profiler::Profiler;
use crate::runtime::Runtime;

/// Process-unique identity of one operation instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u64);

impl OpId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// An entry of the op chain: which operation instance called further down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpRef {
    pub id: OpId,
    pub name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlOptions {
    pub host: String,
    pub protocol: Option<String>,
    pub port: Option<u16>,
}

/// Context attributes an operation can require to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextField {
    Actor,
    Ability,
    Session,
    UrlOptions,
}

impl ContextField {
    pub fn name(self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::Ability => "ability",
            Self::Session => "session",
            Self::UrlOptions => "url_options",
        }
    }
}

#[derive(Clone)]
pub struct Context {
    runtime: Arc<Runtime>,
    actor: Option<Actor>,
    ability: Option<Arc<dyn Ability>>,
    session: Option<Value>,
    url_options: Option<UrlOptions>,
    op_chain: Vec<OpRef>,
    called_via_hook: bool,
    authorization_suppressed: bool,
    profiler: Profiler,
}

impl Context {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            actor: None,
            ability: None,
            session: None,
            url_options: None,
            op_chain: Vec::new(),
            called_via_hook: false,
            authorization_suppressed: false,
            profiler: Profiler::new(),
        }
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_ability(self, ability: impl Ability + 'static) -> Self {
        self.with_shared_ability(Arc::new(ability))
    }

    pub fn with_shared_ability(mut self, ability: Arc<dyn Ability>) -> Self {
        self.ability = Some(ability);
        self
    }

    pub fn with_session(mut self, session: Value) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_url_options(mut self, url_options: UrlOptions) -> Self {
        self.url_options = Some(url_options);
        self
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_arc(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    pub fn ability(&self) -> Option<&dyn Ability> {
        self.ability.as_deref()
    }

    pub fn session(&self) -> Option<&Value> {
        self.session.as_ref()
    }

    /// Url options for building links; errors when the caller did not provide any.
    pub fn url_options(&self) -> Result<&UrlOptions, OpError> {
        self.url_options.as_ref().ok_or(OpError::RoutingNotAvailable)
    }

    pub fn op_chain(&self) -> &[OpRef] {
        &self.op_chain
    }

    pub fn called_via_hook(&self) -> bool {
        self.called_via_hook
    }

    pub fn authorization_suppressed(&self) -> bool {
        self.authorization_suppressed
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn has(&self, field: ContextField) -> bool {
        match field {
            ContextField::Actor => self.actor.is_some(),
            ContextField::Ability => self.ability.is_some(),
            ContextField::Session => self.session.is_some(),
            ContextField::UrlOptions => self.url_options.is_some(),
        }
    }

    /// Whether an operation with this name is already being executed upstream.
    pub fn chain_contains(&self, name: &str) -> bool {
        self.op_chain.iter().any(|op| op.name == name)
    }

    /// A copy of this context with `op` appended to the op chain.
    pub fn spawn(&self, op: OpRef) -> Context {
        let mut child = self.clone();
        child.op_chain.push(op);
        child.called_via_hook = false;
        child
    }

    pub(crate) fn via_hook(mut self) -> Self {
        self.called_via_hook = true;
        self
    }

    pub(crate) fn suppress_authorization(mut self) -> Self {
        self.authorization_suppressed = true;
        self
    }

    /// Runs `f` with a context whose authorization is switched off.
    ///
    /// Operations constructed from the context passed to `f`, and everything
    /// they spawn, skip all authorization checks. `self` is left untouched.
    pub fn without_authorization<R>(&self, f: impl FnOnce(&Context) -> R) -> R {
        let unchecked = self.clone().suppress_authorization();
        f(&unchecked)
    }

    /// Constructs and strictly runs `K` under this context.
    pub fn run<K: Operation>(&self, params: impl IntoParams) -> Result<Op<K>, OpError> {
        Op::<K>::execute((self.clone(), params.into_params()?))
    }

    /// Constructs and leniently runs `K`, returning the instance and the outcome.
    pub fn run_lenient<K: Operation>(
        &self,
        params: impl IntoParams,
    ) -> Result<(Op<K>, bool), OpError> {
        let mut op = Op::<K>::new((self.clone(), params.into_params()?))?;
        let succeeded = op.run_lenient()?;
        Ok((op, succeeded))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Arc::new(Runtime::default()))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("actor", &self.actor)
            .field("ability", &self.ability)
            .field("session", &self.session)
            .field("url_options", &self.url_options)
            .field("op_chain", &self.op_chain)
            .field("called_via_hook", &self.called_via_hook)
            .field("authorization_suppressed", &self.authorization_suppressed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_appends_to_op_chain_only() {
        let ctx = Context::default().with_actor(Actor::new("jane"));
        let parent = OpRef {
            id: OpId::next(),
            name: "Parent",
        };

        let child = ctx.spawn(parent.clone());

        assert!(ctx.op_chain().is_empty());
        assert_eq!(child.op_chain(), &[parent]);
        assert_eq!(child.actor(), ctx.actor());
        assert!(child.chain_contains("Parent"));
    }

    #[test]
    fn without_authorization_leaves_original_untouched() {
        let ctx = Context::default();

        let inner = ctx.without_authorization(|unchecked| unchecked.authorization_suppressed());

        assert!(inner);
        assert!(!ctx.authorization_suppressed());
    }

    #[test]
    fn url_options_are_required_for_routing() {
        let ctx = Context::default();
        assert!(matches!(ctx.url_options(), Err(OpError::RoutingNotAvailable)));

        let ctx = ctx.with_url_options(UrlOptions {
            host: "example.com".into(),
            ..UrlOptions::default()
        });
        assert_eq!(ctx.url_options().unwrap().host, "example.com");
    }

    #[test]
    fn op_ids_are_unique() {
        assert_ne!(OpId::next(), OpId::next());
    }
}
