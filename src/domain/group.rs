use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::framework::{cast_attribute, Model, ModelId, OpError};

/// A named, colored group of users.
///
/// Locked groups can't be destroyed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Option<ModelId>,
    pub name: Option<String>,
    pub color: Option<String>,
    pub locked: bool,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }
}

impl Model for Group {
    const NAME: &'static str = "Group";
    const PARAM_KEY: &'static str = "group";

    fn id(&self) -> Option<ModelId> {
        self.id
    }

    fn set_id(&mut self, id: ModelId) {
        self.id = Some(id);
    }

    fn read_attribute(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(json!(self.id)),
            "name" => Some(json!(self.name)),
            "color" => Some(json!(self.color)),
            "locked" => Some(json!(self.locked)),
            _ => None,
        }
    }

    fn write_attribute(&mut self, name: &str, value: Value) -> Result<(), OpError> {
        match name {
            "name" => self.name = cast_attribute(Self::NAME, name, value)?,
            "color" => self.color = cast_attribute(Self::NAME, name, value)?,
            "locked" => self.locked = cast_attribute(Self::NAME, name, value)?,
            _ => {
                return Err(OpError::UnknownAttribute {
                    model: Self::NAME,
                    attribute: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn attributes(&self) -> Map<String, Value> {
        ["id", "name", "color", "locked"]
            .into_iter()
            .filter_map(|key| Some((key.to_string(), self.read_attribute(key)?)))
            .collect()
    }

    fn deleteable(&self) -> bool {
        !self.locked
    }
}
