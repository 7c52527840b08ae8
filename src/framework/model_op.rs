//! Model handling for the `Load`, `Create`, `Update` and `Destroy` kinds.
//!
//! The model is built eagerly during construction, so that authorization
//! and nested-op construction errors surface from [`Op::new`] rather than
//! halfway through `perform`.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::auth::AuthSubject;
use super::definition::OpKind;
use super::error::{OpError, ValidationErrors};
use super::model::Model;
use super::nesting::NestAction;
use super::operation::{Op, Operation};
use super::policy::PolicyChain;

/// Options for [`Op::assign_attributes_from`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignOptions {
    /// Keeps params reserved for nested model ops, which the model then
    /// rejects with [`OpError::NestedAttributesNotAllowed`].
    pub with_nested_models: bool,
}

impl<K: Operation> Op<K> {
    pub fn model(&self) -> &K::Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut K::Model {
        &mut self.model
    }

    pub fn model_built(&self) -> bool {
        self.model_built
    }

    pub(crate) fn ensure_model_built(&mut self) -> Result<(), OpError> {
        if self.model_built {
            Ok(())
        } else {
            self.build_model()
        }
    }

    /// Builds (or loads) the model, authorizes it and assigns params.
    pub fn build_model(&mut self) -> Result<(), OpError> {
        if self.model_built {
            return Err(OpError::lifecycle("Model can only be built once."));
        }
        match self.def.kind() {
            OpKind::Plain => Err(OpError::NotImplemented("build_model")),
            OpKind::Load => {
                self.load_model()?;
                self.authorize_load()
            }
            OpKind::Create => {
                self.model = K::Model::default();
                self.model.set_parent_op(self.op_ref());
                self.model_built = true;
                self.build_nested_model_ops(NestAction::Create)?;
                self.assign_attributes()?;
                self.authorize_model_action()
            }
            OpKind::Update => {
                self.load_model()?;
                if self.def.lazy() {
                    self.authorize_load_lazily()?;
                } else {
                    self.authorize_load()?;
                    self.authorize_model_action()?;
                }
                self.build_nested_model_ops(NestAction::Update)?;
                self.assign_attributes()
            }
            OpKind::Destroy => {
                self.load_model()?;
                self.authorize_load()?;
                self.authorize_model_action()
            }
        }
    }

    fn load_model(&mut self) -> Result<(), OpError> {
        let mut model = self.find_model()?;
        debug!(op = K::NAME, model = K::Model::NAME, id = ?model.id(), "Model loaded");
        model.set_parent_op(self.op_ref());
        self.model = model;
        self.model_built = true;
        Ok(())
    }

    /// Looks the model up by the id field, locking it if configured.
    pub fn find_model(&self) -> Result<K::Model, OpError> {
        let field = self.def.id_field();
        let value = self
            .params
            .get(field)
            .filter(|value| !value.is_null())
            .ok_or_else(|| OpError::MissingParam(field.to_string()))?;

        let runtime = self.context.runtime();
        let lock = self
            .def
            .locks_model_at_build()
            .unwrap_or(runtime.config().lock_models_at_build)
            .then(|| self.def.lock());

        runtime
            .repository::<K::Model>()?
            .find_by(field, value, lock)?
            .ok_or_else(|| OpError::NotFound {
                model: K::Model::NAME,
                field: field.to_string(),
                value: value.to_string(),
            })
    }

    fn authorize_load(&mut self) -> Result<(), OpError> {
        let def = Arc::clone(&self.def);
        match def.load_model_authorization() {
            Some(action) => self.authorize_only(action, &self.model.auth_subject()),
            None => Ok(()),
        }
    }

    fn authorize_load_lazily(&mut self) -> Result<(), OpError> {
        self.auth_snapshot = Some(self.model.clone());
        if !self.authorization_enabled() {
            return Ok(());
        }
        let def = Arc::clone(&self.def);
        let action = def.load_model_authorization().ok_or_else(|| {
            OpError::NoAuthorizationPerformed(format!(
                "Operation {} uses lazy model authorization and must declare a load model authorization action.",
                K::NAME
            ))
        })?;
        let subject = self.model.auth_subject();
        self.authorize(action, &subject)
    }

    fn authorize_model_action(&mut self) -> Result<(), OpError> {
        let def = Arc::clone(&self.def);
        match def.model_authorization() {
            Some(action) => {
                let subject = self.model.auth_subject();
                self.authorize(action, &subject)
            }
            None => Ok(()),
        }
    }

    /// Checks the model authorization action against the model as loaded.
    pub(crate) fn authorize_lazily(&mut self) -> Result<(), OpError> {
        let def = Arc::clone(&self.def);
        if !def.lazy() {
            return Ok(());
        }
        let Some(action) = def.model_authorization() else {
            return Ok(());
        };
        let subject = self
            .auth_snapshot
            .as_ref()
            .unwrap_or(&self.model)
            .auth_subject();
        self.authorize(action, &subject)
    }

    /// Authorizes `action` on the current model.
    pub fn authorize_model(&mut self, action: &str) -> Result<(), OpError> {
        let subject = self.model.auth_subject();
        self.authorize(action, &subject)
    }

    /// Authorizes `action` on the model type rather than one record.
    pub fn authorize_model_type(&mut self, action: &str) -> Result<(), OpError> {
        self.authorize(action, &AuthSubject::of::<K::Model>())
    }

    pub(crate) fn ensure_deleteable(&mut self) -> Result<(), OpError> {
        if self.model.deleteable() {
            Ok(())
        } else {
            Err(OpError::ModelNotDeleteable {
                model: K::Model::NAME,
            })
        }
    }

    /// The model's attributes as given in params.
    pub fn extract_attributes_from_params(&self) -> Map<String, Value> {
        self.params.object(K::Model::PARAM_KEY)
    }

    /// Assigns the model attributes found in params.
    pub fn assign_attributes(&mut self) -> Result<(), OpError> {
        let attributes = self.extract_attributes_from_params();
        self.assign_attributes_from(attributes, AssignOptions::default())
    }

    pub fn assign_attributes_from(
        &mut self,
        mut attributes: Map<String, Value>,
        options: AssignOptions,
    ) -> Result<(), OpError> {
        self.run_policies(PolicyChain::BeforeAttrAssign)?;

        let nested_keys = self.def.nested_model_param_keys();
        if !options.with_nested_models {
            attributes.retain(|key, _| !nested_keys.contains(key));
        } else if let Some(key) = attributes.keys().find(|key| nested_keys.contains(*key)) {
            return Err(OpError::NestedAttributesNotAllowed {
                attribute: key.trim_end_matches("_attributes").to_string(),
            });
        }

        if let Some(inheritance) = K::Model::INHERITANCE {
            if !self.model.persisted() {
                attributes
                    .entry(inheritance.column)
                    .or_insert_with(|| Value::String(inheritance.type_name.to_string()));
            }
        }

        for (name, value) in attributes {
            match self.model.write_attribute(&name, value) {
                Err(OpError::InvalidAttribute { attribute, message, .. }) => {
                    debug!(op = K::NAME, %attribute, %message, "Param could not be cast");
                    self.assignment_errors.add(attribute, "is invalid");
                }
                result => result?,
            }
        }
        Ok(())
    }

    /// Own validations plus the operation's validators, without nested models.
    pub fn validate_model(&self) -> Result<(), OpError> {
        self.collect_validation_errors(false)
            .into_result(K::Model::NAME)
    }

    /// Validation errors of the whole model graph, nested models included.
    pub fn model_errors(&self) -> ValidationErrors {
        self.collect_validation_errors(true)
    }

    pub(crate) fn collect_validation_errors(&self, deep: bool) -> ValidationErrors {
        let mut errors = self.assignment_errors.clone();
        self.model.validate(&mut errors);
        for validator in self.def.validators() {
            validator(&self.model, &mut errors);
        }
        if deep {
            for entry in self.nested.iter().flatten() {
                if !entry.op.graph_errors().is_empty() {
                    errors.add(entry.attribute, "is invalid");
                }
            }
        }
        errors
    }

    /// Runs nested model ops, validates and persists the model.
    pub fn save(&mut self) -> Result<(), OpError> {
        self.run_policies(PolicyChain::BeforeNestedModelOps)?;
        self.perform_nested_model_ops()?;
        self.run_policies(PolicyChain::BeforeModelSave)?;
        self.validate_model()?;

        let repository = self.context.runtime().repository::<K::Model>()?;
        repository.save(&mut self.model)?;
        info!(op = K::NAME, model = K::Model::NAME, id = ?self.model.id(), "Model saved");
        Ok(())
    }

    pub(crate) fn destroy_model(&mut self) -> Result<(), OpError> {
        let params = K::after_run_params(self);
        self.trigger("before_destroy", params)?;

        let repository = self.context.runtime().repository::<K::Model>()?;
        repository.destroy(&self.model)?;
        info!(op = K::NAME, model = K::Model::NAME, id = ?self.model.id(), "Model destroyed");
        Ok(())
    }
}
