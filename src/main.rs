//! # Ops Recipe Demo
//!
//! Runs the sample operations against the in-memory [`InventorySystem`]:
//! 1.  Drawing a hook that paints new groups blue.
//! 2.  Creating a group, which triggers the hook.
//! 3.  Creating a computer with its mainboard and cpu in one go.
//! 4.  Trying to destroy a locked group.

use ops_recipe::computer_ops::CreateComputer;
use ops_recipe::domain::Group;
use ops_recipe::framework::{OpError, RuleAbility};
use ops_recipe::group_ops::{CreateGroup, DestroyGroup};
use ops_recipe::lifecycle::{setup_tracing, InventorySystem};
use serde_json::json;
use tracing::{error, info};

fn main() -> Result<(), OpError> {
    // Setup tracing once for the entire application
    setup_tracing();

    info!("Starting inventory demo");

    let system = InventorySystem::with_authorization();
    system.runtime.hookup().draw(|dsl| {
        dsl.run("SetGroupColor", |on| {
            on.source("CreateGroup");
        });
    })?;

    let context = system
        .context()
        .with_ability(RuleAbility::new().allow("manage", "all"));

    let group = tracing::info_span!("group_creation").in_scope(|| {
        context.run::<CreateGroup>(json!({ "group": { "name": "Admins" } }))
    })?;
    info!(id = ?group.model().id, "Group created");

    let computer = tracing::info_span!("computer_creation").in_scope(|| {
        context.run::<CreateComputer>(json!({
            "computer": {
                "name": "Workstation",
                "mainboard_attributes": {
                    "name": "Z790",
                    "cpu_attributes": { "name": "i9" }
                }
            }
        }))
    })?;
    info!(
        id = ?computer.model().id,
        mainboard_id = ?computer.model().mainboard_id,
        "Computer created"
    );

    let locked = system.groups.insert(Group::new("Founders").locked());
    match context.run::<DestroyGroup>(json!({ "id": locked })) {
        Ok(_) => info!(id = locked, "Group destroyed"),
        Err(e) => error!(error = %e, "Group destruction failed"),
    }

    info!(groups = system.groups.len(), "Demo completed successfully");
    Ok(())
}
