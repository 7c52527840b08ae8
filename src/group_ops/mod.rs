//! Group operations.
//!
//! Plain CRUD on [`Group`] plus [`SetGroupColor`], a small hook target that
//! paints a freshly created group blue.

use serde_json::json;

use crate::domain::Group;
use crate::framework::{Definition, JsonSchema, NoModel, Op, OpError, OpKind, Operation};

#[derive(Debug, Default)]
pub struct CreateGroup;

impl Operation for CreateGroup {
    type Model = Group;
    const NAME: &'static str = "CreateGroup";
    const KIND: OpKind = OpKind::Create;

    fn define(def: &mut Definition<Self>) -> Result<(), OpError> {
        def.validate(|group, errors| {
            if group.name.as_deref().map_or(true, str::is_empty) {
                errors.add("name", "can't be blank");
            }
        })?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LoadGroup;

impl Operation for LoadGroup {
    type Model = Group;
    const NAME: &'static str = "LoadGroup";
    const KIND: OpKind = OpKind::Load;
}

#[derive(Debug, Default)]
pub struct UpdateGroup;

impl Operation for UpdateGroup {
    type Model = Group;
    const NAME: &'static str = "UpdateGroup";
    const KIND: OpKind = OpKind::Update;
}

/// Authorizes `update` against the group as loaded, right before saving.
#[derive(Debug, Default)]
pub struct UpdateGroupLazily;

impl Operation for UpdateGroupLazily {
    type Model = Group;
    const NAME: &'static str = "UpdateGroupLazily";
    const KIND: OpKind = OpKind::Update;

    fn define(def: &mut Definition<Self>) -> Result<(), OpError> {
        def.lazy_model_authorization_action("update")?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DestroyGroup;

impl Operation for DestroyGroup {
    type Model = Group;
    const NAME: &'static str = "DestroyGroup";
    const KIND: OpKind = OpKind::Destroy;
}

/// Sets the color of the group passed as `model` to blue.
#[derive(Debug, Default)]
pub struct SetGroupColor;

impl Operation for SetGroupColor {
    type Model = NoModel;
    const NAME: &'static str = "SetGroupColor";

    fn define(def: &mut Definition<Self>) -> Result<(), OpError> {
        def.without_authorization().schema(JsonSchema::new(json!({
            "type": "object",
            "properties": { "model": { "type": "object" } },
            "required": ["model"]
        }))?);
        Ok(())
    }

    fn perform(op: &mut Op<Self>) -> Result<(), OpError> {
        let id = op
            .params()
            .dig(&["model", "id"])
            .cloned()
            .ok_or_else(|| OpError::MissingParam("model.id".to_string()))?;
        op.run_sub::<UpdateGroup>(json!({ "id": id, "group": { "color": "blue" } }))?;
        Ok(())
    }
}
