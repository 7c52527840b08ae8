//! # Operation Errors
//!
//! This module defines the error taxonomy shared by every operation, policy,
//! authorization backend and hookup. Keeping one enum for the whole framework
//! lets callers pattern-match on the *kind* of failure (recoverable input
//! error, denied access, programming error) regardless of where it was raised.
//!
//! ## Recoverable vs. fatal
//!
//! Only validation-class errors ([`OpError::ValidationFailed`],
//! [`OpError::RecordInvalid`] and [`OpError::InvalidAttribute`] by default)
//! are ever swallowed, and only by
//! [`Op::run_lenient`](crate::framework::Op::run_lenient). Everything else
//! propagates unchanged.
//!
//! The wrapper kinds ([`OpError::SubOpValidationFailed`],
//! [`OpError::HookupOpValidationFailed`], [`OpError::RollbackRequired`]) are
//! *not* validation-class, even when the error they wrap is.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// A single attribute-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub attribute: String,
    pub message: String,
}

impl FieldError {
    /// Renders the error the way a form would display it, e.g. `Name can't be blank`.
    pub fn full_message(&self) -> String {
        if self.attribute == "base" {
            self.message.clone()
        } else {
            format!("{} {}", humanize(&self.attribute), self.message)
        }
    }
}

/// Collected validation failures of one model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            attribute: attribute.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    pub fn first(&self) -> Option<&FieldError> {
        self.errors.first()
    }

    /// Messages recorded for one attribute.
    pub fn on(&self, attribute: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.attribute == attribute)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn full_messages(&self) -> Vec<String> {
        self.errors.iter().map(FieldError::full_message).collect()
    }

    /// Converts a non-empty error set into [`OpError::RecordInvalid`].
    pub fn into_result(self, model: &'static str) -> Result<(), OpError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(OpError::RecordInvalid {
                model,
                errors: self,
            })
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_messages().join(", "))
    }
}

fn humanize(attribute: &str) -> String {
    let base = attribute.strip_suffix("_id").unwrap_or(attribute).replace('_', " ");
    let mut chars = base.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Raised by an authorization backend when the ability refuses an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub action: String,
    pub subject: String,
    message: Option<String>,
}

impl AccessDenied {
    pub fn new(action: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            subject: subject.into(),
            message: None,
        }
    }

    /// Replaces the default message while keeping action and subject.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => f.write_str(message),
            None => write!(f, "You are not authorized to {} {}.", self.action, self.subject),
        }
    }
}

impl StdError for AccessDenied {}

/// Every failure an operation can surface.
#[derive(Debug, Error)]
pub enum OpError {
    /// Generic user-input error; recoverable by `run_lenient`.
    #[error("{0}")]
    ValidationFailed(String),

    /// A model failed its validations; recoverable by `run_lenient`.
    #[error("Validation failed: {errors}")]
    RecordInvalid {
        model: &'static str,
        errors: ValidationErrors,
    },

    /// Params did not match the operation's declared schema.
    #[error("Params do not match the schema: {}", .errors.join(", "))]
    ParamsInvalid { errors: Vec<String> },

    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),

    #[error("Authorization is not performable: the context carries no ability.")]
    AuthorizationNotPerformable,

    #[error("{0}")]
    NoAuthorizationPerformed(String),

    #[error("This operation requires the context attribute {0:?} to be present.")]
    MissingContextAttribute(&'static str),

    #[error("{model} can not be deleted.")]
    ModelNotDeleteable { model: &'static str },

    #[error("Couldn't find {model} with {field}={value}")]
    NotFound {
        model: &'static str,
        field: String,
        value: String,
    },

    #[error("Param {0:?} must be given.")]
    MissingParam(String),

    #[error("Params must be a JSON object, got {0}.")]
    InvalidParams(String),

    #[error("unknown attribute {attribute:?} for {model}")]
    UnknownAttribute {
        model: &'static str,
        attribute: String,
    },

    #[error("invalid value for {model}.{attribute}: {message}")]
    InvalidAttribute {
        model: &'static str,
        attribute: String,
        message: String,
    },

    #[error(
        "This operation model does not allow receiving nested attributes for {attribute}, \
         as this is saved using a nested model operation."
    )]
    NestedAttributesNotAllowed { attribute: String },

    /// A nested or sub operation failed validation after the parent passed its own.
    #[error("{0}")]
    SubOpValidationFailed(#[source] Box<OpError>),

    /// An operation triggered by a hookup failed validation.
    #[error("{0}")]
    HookupOpValidationFailed(#[source] Box<OpError>),

    /// Forces the surrounding transaction to roll back regardless of run mode.
    #[error("{0}")]
    RollbackRequired(#[source] Box<OpError>),

    #[error("Routing is not available: the context carries no url options.")]
    RoutingNotAvailable,

    #[error("Method `{0}` must be implemented.")]
    NotImplemented(&'static str),

    #[error("An operation can only be performed once.")]
    AlreadyPerformed,

    /// Misuse of an operation instance at runtime (e.g. building twice).
    #[error("{0}")]
    Lifecycle(String),

    /// Invalid operation definition; always a programming error.
    #[error("{0}")]
    Definition(String),

    #[error("Infinite loop detected in hooks configuration: {trace}.")]
    HookupCycle { trace: String },

    #[error("Hooks can't be drawn twice.")]
    HooksAlreadyDrawn,

    #[error("Hooks are not drawn.")]
    HooksNotDrawn,

    #[error("Could not find hook target operation {0}.")]
    HookTargetNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Application-specific errors raised from policies or `perform`.
    #[error(transparent)]
    Custom(Box<dyn StdError + Send + Sync>),
}

impl OpError {
    pub fn custom<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Custom(Box::new(error))
    }

    /// Whether this error belongs to the default validation error set.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed(_) | Self::RecordInvalid { .. } | Self::InvalidAttribute { .. }
        )
    }

    /// The error wrapped by a sub-op, hookup or rollback wrapper.
    pub fn original(&self) -> Option<&OpError> {
        match self {
            Self::SubOpValidationFailed(inner)
            | Self::HookupOpValidationFailed(inner)
            | Self::RollbackRequired(inner) => Some(inner),
            _ => None,
        }
    }

    /// Borrows a [`OpError::Custom`] payload as its concrete type.
    pub fn downcast_custom<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Custom(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub(crate) fn definition(message: impl Into<String>) -> Self {
        Self::Definition(message.into())
    }

    pub(crate) fn lifecycle(message: impl Into<String>) -> Self {
        Self::Lifecycle(message.into())
    }
}
