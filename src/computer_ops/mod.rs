//! Computer operations.
//!
//! Creating or updating a computer delegates its mainboard to the matching
//! mainboard operation, which in turn delegates its cpu.

use crate::domain::{Computer, Cpu, Mainboard};
use crate::framework::{Definition, NestOptions, OpError, OpKind, Operation};

#[derive(Debug, Default)]
pub struct CreateCpu;

impl Operation for CreateCpu {
    type Model = Cpu;
    const NAME: &'static str = "CreateCpu";
    const KIND: OpKind = OpKind::Create;
}

#[derive(Debug, Default)]
pub struct UpdateCpu;

impl Operation for UpdateCpu {
    type Model = Cpu;
    const NAME: &'static str = "UpdateCpu";
    const KIND: OpKind = OpKind::Update;
}

#[derive(Debug, Default)]
pub struct CreateMainboard;

impl Operation for CreateMainboard {
    type Model = Mainboard;
    const NAME: &'static str = "CreateMainboard";
    const KIND: OpKind = OpKind::Create;

    fn define(def: &mut Definition<Self>) -> Result<(), OpError> {
        def.nest_model_op::<CreateCpu>("cpu", NestOptions::new())?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct UpdateMainboard;

impl Operation for UpdateMainboard {
    type Model = Mainboard;
    const NAME: &'static str = "UpdateMainboard";
    const KIND: OpKind = OpKind::Update;

    fn define(def: &mut Definition<Self>) -> Result<(), OpError> {
        def.nest_model_op::<UpdateCpu>("cpu", NestOptions::new())?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CreateComputer;

impl Operation for CreateComputer {
    type Model = Computer;
    const NAME: &'static str = "CreateComputer";
    const KIND: OpKind = OpKind::Create;

    fn define(def: &mut Definition<Self>) -> Result<(), OpError> {
        def.nest_model_op::<CreateMainboard>("mainboard", NestOptions::new())?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct UpdateComputer;

impl Operation for UpdateComputer {
    type Model = Computer;
    const NAME: &'static str = "UpdateComputer";
    const KIND: OpKind = OpKind::Update;

    fn define(def: &mut Definition<Self>) -> Result<(), OpError> {
        def.nest_model_op::<UpdateMainboard>("mainboard", NestOptions::new())?;
        Ok(())
    }
}
