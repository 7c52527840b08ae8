use std::sync::{Arc, Mutex};

use ops_recipe::domain::Group;
use ops_recipe::framework::{
    AuthSubject, AuthorizationBackend, AuthorizationRequest, Definition, NoModel, Op, OpError,
    OpKind, Operation, RuleAbility,
};
use ops_recipe::group_ops::{CreateGroup, DestroyGroup, LoadGroup, UpdateGroup, UpdateGroupLazily};
use ops_recipe::lifecycle::InventorySystem;
use ops_recipe::persistence::MemoryRepository;
use ops_recipe::runtime::{OpsConfig, Runtime};
use serde_json::json;

/// Does nothing and authorizes nothing.
#[derive(Debug, Default)]
struct Noop;

impl Operation for Noop {
    type Model = NoModel;
    const NAME: &'static str = "Noop";

    fn perform(_op: &mut Op<Self>) -> Result<(), OpError> {
        Ok(())
    }
}

/// Checks a permission without counting it.
#[derive(Debug, Default)]
struct PeekReports;

impl Operation for PeekReports {
    type Model = NoModel;
    const NAME: &'static str = "PeekReports";

    fn perform(op: &mut Op<Self>) -> Result<(), OpError> {
        op.authorize_only("read", &AuthSubject::named("reports"))
    }
}

#[derive(Debug, Default)]
struct ReadReports;

impl Operation for ReadReports {
    type Model = NoModel;
    const NAME: &'static str = "ReadReports";

    fn perform(op: &mut Op<Self>) -> Result<(), OpError> {
        op.authorize("read", &AuthSubject::named("reports"))
    }
}

#[derive(Debug, Default)]
struct PublicNoop;

impl Operation for PublicNoop {
    type Model = NoModel;
    const NAME: &'static str = "PublicNoop";

    fn define(def: &mut Definition<Self>) -> Result<(), OpError> {
        def.without_authorization();
        Ok(())
    }

    fn perform(_op: &mut Op<Self>) -> Result<(), OpError> {
        Ok(())
    }
}

/// Requires the `lock` permission to set `group.locked`.
#[derive(Debug, Default)]
struct CreateGroupWithLockParam;

impl Operation for CreateGroupWithLockParam {
    type Model = Group;
    const NAME: &'static str = "CreateGroupWithLockParam";
    const KIND: OpKind = OpKind::Create;

    fn define(def: &mut Definition<Self>) -> Result<(), OpError> {
        def.authorize_param(&["group", "locked"], "lock", AuthSubject::of::<Group>())?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct UnsupportedSubOpOption;

impl Operation for UnsupportedSubOpOption {
    type Model = NoModel;
    const NAME: &'static str = "UnsupportedSubOpOption";

    fn define(def: &mut Definition<Self>) -> Result<(), OpError> {
        def.without_authorization_for_sub_ops()?;
        Ok(())
    }
}

/// Lazy authorization without a load action to check eagerly.
#[derive(Debug, Default)]
struct UpdateGroupLazilyWithoutLoadCheck;

impl Operation for UpdateGroupLazilyWithoutLoadCheck {
    type Model = Group;
    const NAME: &'static str = "UpdateGroupLazilyWithoutLoadCheck";
    const KIND: OpKind = OpKind::Update;

    fn define(def: &mut Definition<Self>) -> Result<(), OpError> {
        def.lazy_model_authorization_action("update")?
            .load_model_authorization_action(None)?;
        Ok(())
    }
}

/// Only `create` is checked; publishing a group needs its own permission.
#[derive(Debug, Default)]
struct CreatePublishedGroup;

impl Operation for CreatePublishedGroup {
    type Model = Group;
    const NAME: &'static str = "CreatePublishedGroup";
    const KIND: OpKind = OpKind::Create;

    fn perform(op: &mut Op<Self>) -> Result<(), OpError> {
        op.authorize_model_type("publish")?;
        op.save()
    }
}

#[derive(Debug, Default)]
struct RecordingBackend {
    requests: Arc<Mutex<Vec<String>>>,
}

impl AuthorizationBackend for RecordingBackend {
    fn authorize(&self, request: &AuthorizationRequest<'_>) -> Result<(), OpError> {
        let entry = format!("{} {} {}", request.operation, request.action, request.subject);
        self.requests.lock().expect("Requests lock poisoned").push(entry);
        Ok(())
    }
}

fn red_group_ability() -> RuleAbility {
    RuleAbility::new()
        .allow("read", "Group")
        .allow_if("update", "Group", |attributes| {
            attributes.get("color") == Some(&json!("red"))
        })
}

#[test]
fn test_create_requires_create_permission() {
    let system = InventorySystem::with_authorization();
    let context = system
        .context()
        .with_ability(RuleAbility::new().allow("read", "Group"));

    let error = Op::<CreateGroup>::new((&context, json!({ "group": { "name": "Admins" } })))
        .expect_err("Create should be denied");
    assert!(matches!(error, OpError::AccessDenied(_)));
    assert_eq!(error.to_string(), "You are not authorized to create new Group.");

    let context = context.with_ability(RuleAbility::new().allow("create", "Group"));
    let op = context
        .run::<CreateGroup>(json!({ "group": { "name": "Admins" } }))
        .expect("Create should be allowed");
    assert!(op.authorize_called());
    assert_eq!(system.groups.len(), 1);
}

/// Authorization is only active with a backend, an ability and no opt-out.
#[test]
fn test_authorization_enabled_conditions() {
    let params = json!({ "group": { "name": "Admins" } });
    let deny_all = RuleAbility::new();

    // No backend
    let system = InventorySystem::new();
    let op = Op::<CreateGroup>::new((system.context().with_ability(deny_all.clone()), params.clone()))
        .expect("Without backend nothing is checked");
    assert!(!op.authorization_enabled());

    // No ability
    let system = InventorySystem::with_authorization();
    let op = Op::<CreateGroup>::new((system.context(), params.clone()))
        .expect("Without ability nothing is checked");
    assert!(!op.authorization_enabled());

    // Suppressed context
    let context = system.context().with_ability(deny_all.clone());
    let op = context
        .without_authorization(|unchecked| Op::<CreateGroup>::new((unchecked, params.clone())))
        .expect("Suppressed context skips checks");
    assert!(!op.authorization_enabled());
    assert!(!context.authorization_suppressed());

    // Everything in place
    let error = Op::<CreateGroup>::new((&context, params)).expect_err("Create should be denied");
    assert!(matches!(error, OpError::AccessDenied(_)));
}

#[test]
fn test_missing_authorization_fails_after_perform() {
    let system = InventorySystem::with_authorization();
    let context = system
        .context()
        .with_ability(RuleAbility::new().allow("read", "reports"));

    let error = context.run::<Noop>(()).expect_err("Noop authorizes nothing");
    assert_eq!(error.to_string(), "Operation Noop must have performed authorization.");

    // authorize_only does not count
    let error = context.run::<PeekReports>(()).expect_err("Peeking does not count");
    assert!(matches!(error, OpError::NoAuthorizationPerformed(_)));

    let op = context.run::<ReadReports>(()).expect("Authorized read should pass");
    assert!(op.authorize_called());

    // Explicit opt-out
    context.run::<PublicNoop>(()).expect("Op without authorization should pass");
}

#[test]
fn test_authorize_called_check_can_be_disabled() {
    let config = OpsConfig {
        ensure_authorize_called: false,
        hookup_config_path: None,
        ..OpsConfig::default()
    };
    let system = InventorySystem::with_config(config, true);
    let context = system.context().with_ability(RuleAbility::new());

    context.run::<Noop>(()).expect("Check is disabled");
}

#[test]
fn test_authorize_param_checks_present_params() {
    let system = InventorySystem::with_authorization();
    let context = system
        .context()
        .with_ability(RuleAbility::new().allow("create", "Group"));

    context
        .run::<CreateGroupWithLockParam>(json!({ "group": { "name": "Open" } }))
        .expect("Param is absent, no extra check");

    // Present, whatever the value
    for locked in [json!(true), json!(false)] {
        let error = Op::<CreateGroupWithLockParam>::new((
            &context,
            json!({ "group": { "name": "Closed", "locked": locked } }),
        ))
        .expect_err("Locking needs permission");
        assert_eq!(error.to_string(), "Got unauthorized param \"group.locked\".");
    }

    let context = context.with_ability(
        RuleAbility::new()
            .allow("create", "Group")
            .allow("lock", "Group"),
    );
    let op = context
        .run::<CreateGroupWithLockParam>(json!({ "group": { "name": "Closed", "locked": true } }))
        .expect("Locking is allowed");
    assert!(op.model().locked);
}

#[test]
fn test_without_authorization_for_sub_ops_is_unsupported() {
    let error = Op::<UnsupportedSubOpOption>::new(()).expect_err("Option should be rejected");
    assert_eq!(error.to_string(), "Option include_sub_ops is not yet supported.");
}

#[test]
fn test_load_authorizes_read_without_counting() {
    let system = InventorySystem::with_authorization();
    let id = system.groups.insert(Group::new("Admins"));

    let context = system.context().with_ability(RuleAbility::new());
    let error = Op::<LoadGroup>::new((&context, json!({ "id": id })))
        .expect_err("Read should be denied");
    assert_eq!(error.to_string(), format!("You are not authorized to read Group#{id}."));

    let context = system
        .context()
        .with_ability(RuleAbility::new().allow("read", "Group"));
    let op = Op::<LoadGroup>::new((&context, json!({ "id": id }))).expect("Read should be allowed");
    assert!(!op.authorize_called());
    assert_eq!(op.model().name.as_deref(), Some("Admins"));
}

/// Eager update checks happen at construction, lazy ones right before perform.
#[test]
fn test_lazy_update_authorizes_loaded_state() {
    let system = InventorySystem::with_authorization();
    let red = system.groups.insert(Group::new("Red").with_color("red"));
    let blue = system.groups.insert(Group::new("Blue").with_color("blue"));
    let context = system.context().with_ability(red_group_ability());

    // The check sees the color before the update changes it
    context
        .run::<UpdateGroupLazily>(json!({ "id": red, "group": { "color": "green" } }))
        .expect("Red group may be updated");
    let stored = system.groups.get(red).expect("Group should exist");
    assert_eq!(stored.color.as_deref(), Some("green"));

    // Lazy: construction passes, the run is denied
    let mut op = Op::<UpdateGroupLazily>::new((&context, json!({ "id": blue, "group": { "color": "red" } })))
        .expect("Lazy construction only checks read");
    let error = op.run().expect_err("Blue group may not be updated");
    assert!(matches!(error, OpError::AccessDenied(_)));
    let stored = system.groups.get(blue).expect("Group should exist");
    assert_eq!(stored.color.as_deref(), Some("blue"));

    // Eager: construction is denied
    let error = Op::<UpdateGroup>::new((&context, json!({ "id": blue, "group": { "color": "red" } })))
        .expect_err("Blue group may not be updated");
    assert!(matches!(error, OpError::AccessDenied(_)));
}

/// Eager updates authorize the loaded state; the new color does not matter.
#[test]
fn test_eager_update_authorizes_state_before_assignment() {
    let system = InventorySystem::with_authorization();
    let unchanged = system.groups.insert(Group::new("Unchanged").with_color("red"));
    let repainted = system.groups.insert(Group::new("Repainted").with_color("red"));
    let context = system.context().with_ability(red_group_ability());

    let op = context
        .run::<UpdateGroup>(json!({ "id": unchanged, "group": { "color": "red" } }))
        .expect("Red group may stay red");
    assert!(op.authorize_called());
    let stored = system.groups.get(unchanged).expect("Group should exist");
    assert_eq!(stored.color.as_deref(), Some("red"));

    context
        .run::<UpdateGroup>(json!({ "id": repainted, "group": { "color": "blue" } }))
        .expect("Red group may be painted blue");
    let stored = system.groups.get(repainted).expect("Group should exist");
    assert_eq!(stored.color.as_deref(), Some("blue"));

    // Once blue, the same group may no longer be updated
    let error = context
        .run::<UpdateGroup>(json!({ "id": repainted, "group": { "color": "red" } }))
        .expect_err("Blue group may not be updated");
    assert!(matches!(error, OpError::AccessDenied(_)));
    let stored = system.groups.get(repainted).expect("Group should exist");
    assert_eq!(stored.color.as_deref(), Some("blue"));
}

#[test]
fn test_lazy_update_requires_load_action() {
    let system = InventorySystem::with_authorization();
    let id = system.groups.insert(Group::new("Red").with_color("red"));
    let context = system.context().with_ability(red_group_ability());

    let error = Op::<UpdateGroupLazilyWithoutLoadCheck>::new((&context, json!({ "id": id })))
        .expect_err("Lazy update without load action should fail");
    assert!(matches!(error, OpError::NoAuthorizationPerformed(_)));

    // Without authorization there is nothing to declare
    let system = InventorySystem::new();
    let id = system.groups.insert(Group::new("Red"));
    system
        .context()
        .run::<UpdateGroupLazilyWithoutLoadCheck>(json!({ "id": id, "group": { "name": "Crimson" } }))
        .expect("Unchecked update should pass");
}

#[test]
fn test_destroy_requires_destroy_permission() {
    let system = InventorySystem::with_authorization();
    let id = system.groups.insert(Group::new("Admins"));

    let context = system
        .context()
        .with_ability(RuleAbility::new().allow("read", "Group"));
    let error = Op::<DestroyGroup>::new((&context, json!({ "id": id })))
        .expect_err("Destroy should be denied");
    assert!(matches!(error, OpError::AccessDenied(_)));

    let context = system.context().with_ability(
        RuleAbility::new()
            .allow("manage", "Group")
            .deny("update", "Group"),
    );
    context
        .run::<DestroyGroup>(json!({ "id": id }))
        .expect("Destroy should be allowed");
    assert!(!system.groups.contains(id));
}

#[test]
fn test_type_level_authorization_in_perform() {
    let system = InventorySystem::with_authorization();
    let params = json!({ "group": { "name": "Newsletter" } });

    let context = system
        .context()
        .with_ability(RuleAbility::new().allow("create", "Group"));
    let error = context
        .run::<CreatePublishedGroup>(params.clone())
        .expect_err("Publishing should be denied");
    assert_eq!(error.to_string(), "You are not authorized to publish Group.");
    assert!(system.groups.is_empty());

    let context = context.with_ability(
        RuleAbility::new()
            .allow("create", "Group")
            .allow("publish", "Group"),
    );
    context
        .run::<CreatePublishedGroup>(params)
        .expect("Publishing should be allowed");
    assert_eq!(system.groups.len(), 1);
}

/// Custom backends see which operation asked for what.
#[test]
fn test_custom_authorization_backend() {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let runtime = Runtime::builder()
        .config(OpsConfig {
            hookup_config_path: None,
            ..OpsConfig::default()
        })
        .authorization_backend(RecordingBackend {
            requests: Arc::clone(&requests),
        })
        .repository::<Group, _>(Arc::new(MemoryRepository::<Group>::new()))
        .build();
    let context = runtime.context().with_ability(RuleAbility::new());

    context
        .run::<CreateGroup>(json!({ "group": { "name": "Admins" } }))
        .expect("Recording backend allows everything");
    context
        .run::<LoadGroup>(json!({ "id": 1 }))
        .expect_err("Load ops can not be performed");

    let requests = requests.lock().expect("Requests lock poisoned");
    assert_eq!(
        *requests,
        vec!["CreateGroup create new Group", "LoadGroup read Group#1"]
    );
}
