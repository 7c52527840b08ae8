//! The persisted-entity contract used by model operations.
//!
//! A [`Model`] exposes its attributes by name so the framework can assign
//! params, look rows up by arbitrary fields and hand nested models to their
//! owners without knowing the concrete type.

use std::any::Any;
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::auth::AuthSubject;
use super::context::OpRef;
use super::error::{OpError, ValidationErrors};

pub type ModelId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
}

/// The other side of an association, as seen from the associated model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InverseAssociation {
    pub name: &'static str,
    pub autosave: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Association {
    pub name: &'static str,
    pub kind: AssociationKind,
    pub foreign_key: &'static str,
    pub autosave: bool,
    pub validate: bool,
    pub inverse: Option<InverseAssociation>,
}

impl Association {
    pub fn belongs_to(name: &'static str, foreign_key: &'static str) -> Self {
        Self::new(name, AssociationKind::BelongsTo, foreign_key)
    }

    pub fn has_one(name: &'static str, foreign_key: &'static str) -> Self {
        Self::new(name, AssociationKind::HasOne, foreign_key)
    }

    pub fn has_many(name: &'static str, foreign_key: &'static str) -> Self {
        Self::new(name, AssociationKind::HasMany, foreign_key)
    }

    fn new(name: &'static str, kind: AssociationKind, foreign_key: &'static str) -> Self {
        Self {
            name,
            kind,
            foreign_key,
            autosave: false,
            validate: true,
            inverse: None,
        }
    }

    pub fn autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn inverse_of(mut self, name: &'static str, autosave: bool) -> Self {
        self.inverse = Some(InverseAssociation { name, autosave });
        self
    }
}

/// Discriminator column written on create for single-table inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inheritance {
    pub column: &'static str,
    pub type_name: &'static str,
}

pub trait Model: Clone + Debug + Default + Send + Sync + 'static {
    const NAME: &'static str;
    /// Key under which params carry this model's attributes.
    const PARAM_KEY: &'static str;
    const INHERITANCE: Option<Inheritance> = None;

    fn id(&self) -> Option<ModelId>;

    fn set_id(&mut self, id: ModelId);

    /// `None` for unknown attributes, `Some(Value::Null)` for unset known ones.
    fn read_attribute(&self, name: &str) -> Option<Value>;

    fn write_attribute(&mut self, name: &str, value: Value) -> Result<(), OpError>;

    fn attributes(&self) -> Map<String, Value>;

    fn validate(&self, _errors: &mut ValidationErrors) {}

    fn associations() -> Vec<Association> {
        Vec::new()
    }

    fn association(name: &str) -> Option<Association> {
        Self::associations().into_iter().find(|a| a.name == name)
    }

    /// Stores an associated model. `value` is the associated model's concrete type.
    fn set_association(&mut self, name: &str, _value: &dyn Any) -> Result<(), OpError> {
        Err(OpError::UnknownAttribute {
            model: Self::NAME,
            attribute: name.to_string(),
        })
    }

    /// Id of the currently associated model, if any.
    fn association_id(&self, _name: &str) -> Option<ModelId> {
        None
    }

    fn deleteable(&self) -> bool {
        true
    }

    /// Told which operation built or loaded this instance. Models that want to
    /// know during validation keep it; the rest ignore it.
    fn set_parent_op(&mut self, _op: OpRef) {}

    fn persisted(&self) -> bool {
        self.id().is_some()
    }

    fn auth_subject(&self) -> AuthSubject {
        AuthSubject::record(self)
    }
}

/// Casts a raw param value for an attribute write.
pub fn cast_attribute<T: DeserializeOwned>(
    model: &'static str,
    attribute: &str,
    value: Value,
) -> Result<T, OpError> {
    serde_json::from_value(value).map_err(|e| OpError::InvalidAttribute {
        model,
        attribute: attribute.to_string(),
        message: e.to_string(),
    })
}

/// Downcasts an associated model handed over through [`Model::set_association`].
pub fn downcast_association<T: Model>(
    owner: &'static str,
    name: &str,
    value: &dyn Any,
) -> Result<T, OpError> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| {
            OpError::Definition(format!("Association {owner}.{name} expects a {}.", T::NAME))
        })
}

/// The model of operations that do not own one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoModel;

impl Model for NoModel {
    const NAME: &'static str = "NoModel";
    const PARAM_KEY: &'static str = "";

    fn id(&self) -> Option<ModelId> {
        None
    }

    fn set_id(&mut self, _id: ModelId) {}

    fn read_attribute(&self, _name: &str) -> Option<Value> {
        None
    }

    fn write_attribute(&mut self, name: &str, _value: Value) -> Result<(), OpError> {
        Err(OpError::UnknownAttribute {
            model: Self::NAME,
            attribute: name.to_string(),
        })
    }

    fn attributes(&self) -> Map<String, Value> {
        Map::new()
    }
}
