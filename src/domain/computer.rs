//! A three-level model graph: a computer belongs to a mainboard, which
//! belongs to a cpu. Each level requires a name.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::framework::{
    cast_attribute, downcast_association, Association, Model, ModelId, OpError, ValidationErrors,
};

fn validate_name(name: &Option<String>, errors: &mut ValidationErrors) {
    if name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        errors.add("name", "can't be blank");
    }
}

fn unknown_attribute(model: &'static str, name: &str) -> OpError {
    OpError::UnknownAttribute {
        model,
        attribute: name.to_string(),
    }
}

fn collect_attributes<M: Model>(model: &M, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| Some((key.to_string(), model.read_attribute(key)?)))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cpu {
    pub id: Option<ModelId>,
    pub name: Option<String>,
}

impl Model for Cpu {
    const NAME: &'static str = "Cpu";
    const PARAM_KEY: &'static str = "cpu";

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
            _ => None,
        }
    }

    fn write_attribute(&mut self, name: &str, value: Value) -> Result<(), OpError> {
        match name {
            "name" => self.name = cast_attribute(Self::NAME, name, value)?,
            _ => return Err(unknown_attribute(Self::NAME, name)),
        }
        Ok(())
    }

    fn attributes(&self) -> Map<String, Value> {
        collect_attributes(self, &["id", "name"])
    }

    fn validate(&self, errors: &mut ValidationErrors) {
        validate_name(&self.name, errors);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mainboard {
    pub id: Option<ModelId>,
    pub name: Option<String>,
    pub cpu_id: Option<ModelId>,
    #[serde(skip)]
    pub cpu: Option<Cpu>,
    /// Back reference set by the owning computer.
    #[serde(skip)]
    pub computer: Option<Box<Computer>>,
}

impl Model for Mainboard {
    const NAME: &'static str = "Mainboard";
    const PARAM_KEY: &'static str = "mainboard";

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
            "cpu_id" => Some(json!(self.cpu_id)),
            _ => None,
        }
    }

    fn write_attribute(&mut self, name: &str, value: Value) -> Result<(), OpError> {
        match name {
            "name" => self.name = cast_attribute(Self::NAME, name, value)?,
            "cpu_id" => self.cpu_id = cast_attribute(Self::NAME, name, value)?,
            _ => return Err(unknown_attribute(Self::NAME, name)),
        }
        Ok(())
    }

    fn attributes(&self) -> Map<String, Value> {
        collect_attributes(self, &["id", "name", "cpu_id"])
    }

    fn validate(&self, errors: &mut ValidationErrors) {
        validate_name(&self.name, errors);
    }

    fn associations() -> Vec<Association> {
        vec![Association::belongs_to("cpu", "cpu_id")]
    }

    fn set_association(&mut self, name: &str, value: &dyn Any) -> Result<(), OpError> {
        match name {
            "cpu" => {
                let cpu: Cpu = downcast_association(Self::NAME, name, value)?;
                self.cpu_id = cpu.id;
                self.cpu = Some(cpu);
            }
            "computer" => {
                let computer: Computer = downcast_association(Self::NAME, name, value)?;
                self.computer = Some(Box::new(computer));
            }
            _ => return Err(unknown_attribute(Self::NAME, name)),
        }
        Ok(())
    }

    fn association_id(&self, name: &str) -> Option<ModelId> {
        match name {
            "cpu" => self.cpu.as_ref().and_then(|cpu| cpu.id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Computer {
    pub id: Option<ModelId>,
    pub name: Option<String>,
    pub mainboard_id: Option<ModelId>,
    #[serde(skip)]
    pub mainboard: Option<Mainboard>,
}

impl Model for Computer {
    const NAME: &'static str = "Computer";
    const PARAM_KEY: &'static str = "computer";

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
            "mainboard_id" => Some(json!(self.mainboard_id)),
            _ => None,
        }
    }

    fn write_attribute(&mut self, name: &str, value: Value) -> Result<(), OpError> {
        match name {
            "name" => self.name = cast_attribute(Self::NAME, name, value)?,
            "mainboard_id" => self.mainboard_id = cast_attribute(Self::NAME, name, value)?,
            _ => return Err(unknown_attribute(Self::NAME, name)),
        }
        Ok(())
    }

    fn attributes(&self) -> Map<String, Value> {
        collect_attributes(self, &["id", "name", "mainboard_id"])
    }

    fn validate(&self, errors: &mut ValidationErrors) {
        validate_name(&self.name, errors);
    }

    fn associations() -> Vec<Association> {
        vec![Association::belongs_to("mainboard", "mainboard_id").inverse_of("computer", false)]
    }

    fn set_association(&mut self, name: &str, value: &dyn Any) -> Result<(), OpError> {
        match name {
            "mainboard" => {
                let mainboard: Mainboard = downcast_association(Self::NAME, name, value)?;
                self.mainboard_id = mainboard.id;
                self.mainboard = Some(mainboard);
            }
            _ => return Err(unknown_attribute(Self::NAME, name)),
        }
        Ok(())
    }

    fn association_id(&self, name: &str) -> Option<ModelId> {
        match name {
            "mainboard" => self.mainboard.as_ref().and_then(|m| m.id),
            _ => None,
        }
    }
}
