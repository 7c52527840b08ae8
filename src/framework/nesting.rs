//! Nested model operations.
//!
//! A create or update operation can delegate a `belongs_to` association to
//! another operation. The nested op is constructed while the owner builds its
//! model, receives `<attribute>_attributes` from the owner's model params, and
//! runs right before the owner saves. Its model is attached to the owner both
//! times so the owner always sees the nested model's latest state.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::definition::Definition;
use super::error::{OpError, ValidationErrors};
use super::model::{AssociationKind, Model};
use super::operation::{Op, Operation};
use super::params::Params;
use super::policy::PolicyChain;

type ParamsTransform<K> =
    Arc<dyn Fn(&Op<K>, Map<String, Value>) -> Result<Map<String, Value>, OpError> + Send + Sync>;

type SpawnNested<K> = Arc<
    dyn Fn(&Op<K>, Option<Value>, Map<String, Value>) -> Result<Box<dyn NestedModelOp<<K as Operation>::Model>>, OpError>
        + Send
        + Sync,
>;

/// Options for [`Definition::nest_model_op`].
pub struct NestOptions<K: Operation> {
    lookup_via_id_on_update: bool,
    transform: Option<ParamsTransform<K>>,
}

impl<K: Operation> NestOptions<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `false`, updates find the nested model through the loaded
    /// association instead of the owner's foreign key.
    pub fn lookup_via_id_on_update(mut self, enabled: bool) -> Self {
        self.lookup_via_id_on_update = enabled;
        self
    }

    /// Rewrites the nested model's attributes before the nested op is built.
    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&Op<K>, Map<String, Value>) -> Result<Map<String, Value>, OpError>
            + Send
            + Sync
            + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }
}

impl<K: Operation> Default for NestOptions<K> {
    fn default() -> Self {
        Self {
            lookup_via_id_on_update: true,
            transform: None,
        }
    }
}

pub(crate) struct NestedModelOpConfig<K: Operation> {
    pub(crate) attribute: &'static str,
    lookup_via_id_on_update: bool,
    transform: Option<ParamsTransform<K>>,
    spawn: SpawnNested<K>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NestAction {
    Create,
    Update,
}

/// Type-erased nested op as seen by its owner.
pub(crate) trait NestedModelOp<M: Model> {
    fn model_any(&self) -> &dyn Any;

    fn back_assign(&mut self, inverse: &str, owner: &M) -> Result<(), OpError>;

    fn graph_errors(&self) -> ValidationErrors;

    fn run_nested(&mut self) -> Result<(), OpError>;
}

impl<N: Operation, M: Model> NestedModelOp<M> for Op<N> {
    fn model_any(&self) -> &dyn Any {
        &self.model
    }

    fn back_assign(&mut self, inverse: &str, owner: &M) -> Result<(), OpError> {
        self.model.set_association(inverse, owner)
    }

    fn graph_errors(&self) -> ValidationErrors {
        self.collect_validation_errors(true)
    }

    fn run_nested(&mut self) -> Result<(), OpError> {
        self.run().map(|_| ()).map_err(|error| {
            if N::is_validation_error(&error) {
                OpError::SubOpValidationFailed(Box::new(error))
            } else {
                error
            }
        })
    }
}

pub(crate) struct NestedEntry<M: Model> {
    pub(crate) attribute: &'static str,
    pub(crate) op: Box<dyn NestedModelOp<M>>,
}

impl<M: Model> fmt::Debug for NestedEntry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedEntry")
            .field("attribute", &self.attribute)
            .finish_non_exhaustive()
    }
}

impl<K: Operation> Definition<K> {
    /// Delegates the `belongs_to` association `attribute` to operation `N`.
    ///
    /// The association must validate its target and neither side may
    /// autosave, since the nested op is the only thing allowed to persist it.
    pub fn nest_model_op<N: Operation>(
        &mut self,
        attribute: &'static str,
        options: NestOptions<K>,
    ) -> Result<&mut Self, OpError> {
        if !self.kind().assigns_attributes() {
            return Err(OpError::definition(format!(
                "{} must build or update its model to nest model operations.",
                K::NAME
            )));
        }
        let model = K::Model::NAME;
        let association = K::Model::association(attribute).ok_or_else(|| {
            OpError::definition(format!(
                "Association {attribute} could not be found for {model}."
            ))
        })?;
        if association.kind != AssociationKind::BelongsTo {
            return Err(OpError::definition(format!(
                "Method nest_model_op only supports belongs_to associations, {model}.{attribute} is not one."
            )));
        }
        if association.autosave {
            return Err(OpError::definition(format!(
                "Association {model}.{attribute} has autosave enabled, which is not allowed for nested model ops."
            )));
        }
        if !association.validate {
            return Err(OpError::definition(format!(
                "Association {model}.{attribute} has validate disabled, which is not allowed for nested model ops."
            )));
        }
        if association.inverse.is_some_and(|inverse| inverse.autosave) {
            return Err(OpError::definition(format!(
                "Inverse association of {model}.{attribute} has autosave enabled, \
                 which is not allowed for nested model ops."
            )));
        }
        if !N::KIND.is_model() {
            return Err(OpError::definition(format!(
                "Nested operation {} for {model}.{attribute} does not operate on a model.",
                N::NAME
            )));
        }

        let spawn: SpawnNested<K> = Arc::new(
            |owner: &Op<K>,
             id: Option<Value>,
             attributes: Map<String, Value>|
             -> Result<Box<dyn NestedModelOp<K::Model>>, OpError> {
                let mut params = Params::new();
                if let Some(id) = id {
                    params.insert("id", id);
                }
                params.insert(N::Model::PARAM_KEY, Value::Object(attributes));
                let op = owner.sub_op::<N>(params)?;
                Ok(Box::new(op) as Box<dyn NestedModelOp<K::Model>>)
            },
        );

        self.push_nested(NestedModelOpConfig {
            attribute,
            lookup_via_id_on_update: options.lookup_via_id_on_update,
            transform: options.transform,
            spawn,
        });
        Ok(self)
    }
}

impl<K: Operation> Op<K> {
    pub(crate) fn build_nested_model_ops(&mut self, action: NestAction) -> Result<(), OpError> {
        if self.nested.is_some() {
            return Err(OpError::lifecycle(
                "Nested model operations can only be built once.",
            ));
        }
        let def = Arc::clone(&self.def);
        let attributes = self.extract_attributes_from_params();
        let mut built = Vec::with_capacity(def.nested().len());

        for config in def.nested() {
            let key = format!("{}_attributes", config.attribute);
            let mut op_params = match attributes.get(&key) {
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            op_params.remove("id");
            if let Some(transform) = &config.transform {
                op_params = transform(&*self, op_params)?;
            }

            let association = K::Model::association(config.attribute);
            let id = match action {
                NestAction::Create => None,
                NestAction::Update if config.lookup_via_id_on_update => Some(
                    association
                        .and_then(|a| self.model.read_attribute(a.foreign_key))
                        .unwrap_or(Value::Null),
                ),
                NestAction::Update => Some(
                    self.model
                        .association_id(config.attribute)
                        .map(Value::from)
                        .unwrap_or(Value::Null),
                ),
            };

            let mut op = (config.spawn)(&*self, id, op_params)?;
            self.model.set_association(config.attribute, op.model_any())?;
            if let Some(inverse) = association.and_then(|a| a.inverse) {
                op.back_assign(inverse.name, &self.model)?;
            }
            built.push(NestedEntry {
                attribute: config.attribute,
                op,
            });
        }

        self.nested = Some(built);
        Ok(())
    }

    /// Validates the model graph and runs every nested op, once.
    pub fn perform_nested_model_ops(&mut self) -> Result<(), OpError> {
        if self.nested_performed {
            return Err(OpError::lifecycle(
                "Nested model operations can only be performed once.",
            ));
        }
        self.ensure_model_built()?;
        if self.nested.is_none() && !self.def.nested().is_empty() {
            return Err(OpError::lifecycle(
                "Nested model operations are not built yet. Make sure the model is built.",
            ));
        }

        self.run_policies(PolicyChain::BeforeModelValidation)?;
        self.collect_validation_errors(true)
            .into_result(K::Model::NAME)?;

        if let Some(nested) = self.nested.as_mut() {
            for entry in nested.iter_mut() {
                entry.op.run_nested()?;
                self.model
                    .set_association(entry.attribute, entry.op.model_any())?;
            }
        }
        self.nested_performed = true;
        Ok(())
    }

    /// The model of the nested op handling `attribute`.
    pub fn nested_model<T: Model>(&self, attribute: &str) -> Option<&T> {
        self.nested
            .iter()
            .flatten()
            .find(|entry| entry.attribute == attribute)
            .and_then(|entry| entry.op.model_any().downcast_ref::<T>())
    }
}
