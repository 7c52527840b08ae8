//! # Authorization
//!
//! Operations never decide permissions themselves. They call
//! [`Op::authorize`](super::Op::authorize) with an action verb and an
//! [`AuthSubject`], and the runtime's [`AuthorizationBackend`] answers.
//!
//! The stock backend, [`AbilityBackend`], delegates to the [`Ability`] object
//! carried by the context. [`RuleAbility`] is a small rule list in the spirit
//! of role-based permission tables: later rules win, `"manage"` matches every
//! action and `"all"` every subject.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::context::Context;
use super::error::{AccessDenied, OpError};
use super::model::{Model, ModelId};

/// What an action is performed on.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthSubject {
    /// A model type as a whole, e.g. "may create groups".
    Type(String),
    /// One concrete record with a snapshot of its attributes.
    Record {
        model: String,
        id: Option<ModelId>,
        attributes: Map<String, Value>,
    },
    /// A free-form subject, e.g. "dashboard".
    Named(String),
}

impl AuthSubject {
    pub fn of<M: Model>() -> Self {
        Self::Type(M::NAME.to_string())
    }

    pub fn record<M: Model>(model: &M) -> Self {
        Self::Record {
            model: M::NAME.to_string(),
            id: model.id(),
            attributes: model.attributes(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// The name rules match against: the model name or the free-form name.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Type(name) | Self::Named(name) => name,
            Self::Record { model, .. } => model,
        }
    }

    pub fn attributes(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Record { attributes, .. } => Some(attributes),
            _ => None,
        }
    }
}

impl fmt::Display for AuthSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(name) | Self::Named(name) => f.write_str(name),
            Self::Record {
                model, id: Some(id), ..
            } => write!(f, "{model}#{id}"),
            Self::Record { model, id: None, .. } => write!(f, "new {model}"),
        }
    }
}

/// Permission oracle attached to a context.
pub trait Ability: fmt::Debug + Send + Sync {
    fn can(&self, action: &str, subject: &AuthSubject) -> bool;
}

/// Everything a backend gets to look at for one check.
#[derive(Debug)]
pub struct AuthorizationRequest<'a> {
    pub operation: &'static str,
    pub context: &'a Context,
    pub action: &'a str,
    pub subject: &'a AuthSubject,
    pub extra: &'a [Value],
}

pub trait AuthorizationBackend: fmt::Debug + Send + Sync {
    /// Returns `Ok(())` when permitted; [`OpError::AccessDenied`] otherwise.
    fn authorize(&self, request: &AuthorizationRequest<'_>) -> Result<(), OpError>;
}

/// Asks the context's [`Ability`]; fails when the context carries none.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbilityBackend;

impl AuthorizationBackend for AbilityBackend {
    fn authorize(&self, request: &AuthorizationRequest<'_>) -> Result<(), OpError> {
        let ability = request
            .context
            .ability()
            .ok_or(OpError::AuthorizationNotPerformable)?;

        if ability.can(request.action, request.subject) {
            Ok(())
        } else {
            Err(AccessDenied::new(request.action, request.subject.to_string()).into())
        }
    }
}

type Condition = Arc<dyn Fn(&Map<String, Value>) -> bool + Send + Sync>;

#[derive(Clone)]
struct Rule {
    action: String,
    subject: String,
    condition: Option<Condition>,
    allow: bool,
}

impl Rule {
    fn matches(&self, action: &str, subject: &AuthSubject) -> bool {
        let action_matches = self.action == "manage" || self.action == action;
        let subject_matches = self.subject == "all" || self.subject == subject.type_name();
        if !(action_matches && subject_matches) {
            return false;
        }
        match (&self.condition, subject.attributes()) {
            (Some(condition), Some(attributes)) => condition(attributes),
            // Type-level checks ignore conditions of allowing rules only.
            (Some(_), None) => self.allow,
            (None, _) => true,
        }
    }
}

/// An ordered permission table; the last matching rule decides.
#[derive(Clone, Default)]
pub struct RuleAbility {
    rules: Vec<Rule>,
}

impl RuleAbility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(self, action: &str, subject: &str) -> Self {
        self.rule(action, subject, None, true)
    }

    /// Allows the action on records whose attributes satisfy `condition`.
    pub fn allow_if<F>(self, action: &str, subject: &str, condition: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> bool + Send + Sync + 'static,
    {
        self.rule(action, subject, Some(Arc::new(condition)), true)
    }

    pub fn deny(self, action: &str, subject: &str) -> Self {
        self.rule(action, subject, None, false)
    }

    fn rule(mut self, action: &str, subject: &str, condition: Option<Condition>, allow: bool) -> Self {
        self.rules.push(Rule {
            action: action.to_string(),
            subject: subject.to_string(),
            condition,
            allow,
        });
        self
    }
}

impl Ability for RuleAbility {
    fn can(&self, action: &str, subject: &AuthSubject) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(action, subject))
            .is_some_and(|rule| rule.allow)
    }
}

impl fmt::Debug for RuleAbility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleAbility")
            .field("rules", &self.rules.len())
            .finish()
    }
}
