use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ops_recipe::domain::Group;
use ops_recipe::framework::{
    AbilityBackend, AuthSubject, NoModel, Op, OpError, Operation, Params, RuleAbility,
};
use ops_recipe::group_ops::{CreateGroup, DestroyGroup, SetGroupColor, UpdateGroup};
use ops_recipe::hookup::{find_cycle, Hook, Hookup, HookupDsl};
use ops_recipe::persistence::MemoryRepository;
use ops_recipe::runtime::{OpsConfig, Runtime};
use serde_json::json;

static HOOK_CALLS: Mutex<Vec<(bool, Vec<&'static str>)>> = Mutex::new(Vec::new());
static AUDITS: AtomicUsize = AtomicUsize::new(0);
static PUBLISHED_TITLES: Mutex<Vec<String>> = Mutex::new(Vec::new());
static DESTROYED_NAMES: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// Remembers how it was called.
#[derive(Debug, Default)]
struct RecordHookCall;

impl Operation for RecordHookCall {
    type Model = NoModel;
    const NAME: &'static str = "RecordHookCall";

    fn perform(op: &mut Op<Self>) -> Result<(), OpError> {
        let chain: Vec<&str> = op.context().op_chain().iter().map(|r| r.name).collect();
        HOOK_CALLS
            .lock()
            .expect("Hook calls lock poisoned")
            .push((op.context().called_via_hook(), chain));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AuditEveryRun;

impl Operation for AuditEveryRun {
    type Model = NoModel;
    const NAME: &'static str = "AuditEveryRun";

    fn perform(_op: &mut Op<Self>) -> Result<(), OpError> {
        AUDITS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RejectingTarget;

impl Operation for RejectingTarget {
    type Model = NoModel;
    const NAME: &'static str = "RejectingTarget";

    fn perform(_op: &mut Op<Self>) -> Result<(), OpError> {
        Err(OpError::ValidationFailed("Rejected by hook".to_string()))
    }
}

/// Needs the `audit` permission.
#[derive(Debug, Default)]
struct GuardedAudit;

impl Operation for GuardedAudit {
    type Model = NoModel;
    const NAME: &'static str = "GuardedAudit";

    fn perform(op: &mut Op<Self>) -> Result<(), OpError> {
        op.authorize("audit", &AuthSubject::named("audit_log"))
    }
}

/// Fires a custom event.
#[derive(Debug, Default)]
struct Publisher;

impl Operation for Publisher {
    type Model = NoModel;
    const NAME: &'static str = "Publisher";

    fn perform(op: &mut Op<Self>) -> Result<(), OpError> {
        let title = op.params().get_str("title").unwrap_or("Untitled").to_string();
        op.trigger("published", Params::new().with("title", title))
    }
}

#[derive(Debug, Default)]
struct PublishListener;

impl Operation for PublishListener {
    type Model = NoModel;
    const NAME: &'static str = "PublishListener";

    fn perform(op: &mut Op<Self>) -> Result<(), OpError> {
        let title = op.params().get_str("title").unwrap_or_default().to_string();
        PUBLISHED_TITLES
            .lock()
            .expect("Titles lock poisoned")
            .push(title);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RememberDestroyedGroup;

impl Operation for RememberDestroyedGroup {
    type Model = NoModel;
    const NAME: &'static str = "RememberDestroyedGroup";

    fn perform(op: &mut Op<Self>) -> Result<(), OpError> {
        let name = op
            .params()
            .dig(&["model", "name"])
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        DESTROYED_NAMES
            .lock()
            .expect("Names lock poisoned")
            .push(name);
        Ok(())
    }
}

struct TestRuntime {
    runtime: Arc<Runtime>,
    groups: Arc<MemoryRepository<Group>>,
}

fn test_runtime(config: OpsConfig, authorization: bool) -> TestRuntime {
    let groups = Arc::new(MemoryRepository::<Group>::new());
    let mut builder = Runtime::builder()
        .config(config)
        .repository::<Group, _>(Arc::clone(&groups))
        .register::<CreateGroup>()
        .register::<UpdateGroup>()
        .register::<DestroyGroup>()
        .register::<SetGroupColor>()
        .register::<RecordHookCall>()
        .register::<AuditEveryRun>()
        .register::<RejectingTarget>()
        .register::<GuardedAudit>()
        .register::<Publisher>()
        .register::<PublishListener>()
        .register::<RememberDestroyedGroup>();
    if authorization {
        builder = builder.authorization_backend(AbilityBackend);
    }
    TestRuntime {
        runtime: builder.build(),
        groups,
    }
}

fn config_without_file() -> OpsConfig {
    OpsConfig {
        hookup_config_path: None,
        ..OpsConfig::default()
    }
}

fn targets(hooks: &[Hook]) -> Vec<&str> {
    hooks.iter().map(Hook::target).collect()
}

/// A hook target runs after its source and sees the source's model.
#[test]
fn test_after_run_hook_runs_target() {
    let test = test_runtime(config_without_file(), false);
    test.runtime
        .hookup()
        .draw(|dsl| {
            dsl.run("SetGroupColor", |on| {
                on.source("CreateGroup");
            });
        })
        .expect("Failed to draw hooks");

    test.runtime
        .context()
        .run::<CreateGroup>(json!({ "group": { "name": "Admins" } }))
        .expect("Failed to create group");

    let stored = test.groups.get(1).expect("Group should be stored");
    assert_eq!(stored.color.as_deref(), Some("blue"));
}

#[test]
fn test_hook_target_context() {
    let test = test_runtime(config_without_file(), false);
    test.runtime
        .hookup()
        .draw(|dsl| {
            dsl.run("RecordHookCall", |on| {
                on.source("CreateGroup");
            });
        })
        .expect("Failed to draw hooks");
    let context = test.runtime.context();

    context
        .run::<CreateGroup>(json!({ "group": { "name": "Admins" } }))
        .expect("Failed to create group");
    context
        .run::<RecordHookCall>(())
        .expect("Failed to run directly");

    let calls = HOOK_CALLS.lock().expect("Hook calls lock poisoned");
    assert_eq!(
        *calls,
        vec![(true, vec!["CreateGroup"]), (false, Vec::new())]
    );
}

/// A wildcard target never re-triggers itself.
#[test]
fn test_wildcard_hooks_skip_operations_in_chain() {
    let test = test_runtime(config_without_file(), false);
    test.runtime
        .hookup()
        .draw(|dsl| {
            dsl.run("AuditEveryRun", |on| {
                on.event("*", "*");
            });
        })
        .expect("Failed to draw hooks");

    test.runtime
        .context()
        .run::<CreateGroup>(json!({ "group": { "name": "Admins" } }))
        .expect("Failed to create group");
    assert_eq!(AUDITS.load(Ordering::SeqCst), 1);
}

#[test]
fn test_hooks_match_wildcards_first() {
    let hookup = Hookup::new(None);
    hookup
        .draw(|dsl| {
            dsl.run("ExactBoth", |on| {
                on.source("CreateGroup");
            })
            .run("ExactSource", |on| {
                on.event("CreateGroup", "*");
            })
            .run("ExactEvent", |on| {
                on.event("*", "after_run");
            })
            .run("Everything", |on| {
                on.event("*", "*");
            })
            .run("OtherEvent", |on| {
                on.event("CreateGroup", "before_destroy");
            });
        })
        .expect("Failed to draw hooks");

    let hooks = hookup
        .hooks_for("CreateGroup", "after_run")
        .expect("Failed to match hooks");
    assert_eq!(
        targets(&hooks),
        vec!["Everything", "ExactEvent", "ExactSource", "ExactBoth"]
    );

    let hooks = hookup
        .hooks_for("UpdateGroup", "before_destroy")
        .expect("Failed to match hooks");
    assert_eq!(targets(&hooks), vec!["Everything"]);
}

#[test]
fn test_cycles_are_rejected_when_drawing() {
    let hookup = Hookup::new(None);
    let error = hookup
        .draw(|dsl| {
            dsl.run("B", |on| {
                on.source("A");
            })
            .run("C", |on| {
                on.source("B");
            })
            .run("A", |on| {
                on.event("C", "before_destroy");
            });
        })
        .expect_err("Cycle should be rejected");
    assert_eq!(
        error.to_string(),
        "Infinite loop detected in hooks configuration: A ~> B ~> C ~> A."
    );
    assert!(!hookup.is_drawn());

    let mut dsl = HookupDsl::new();
    dsl.run("B", |on| {
        on.source("A");
    });
    assert!(find_cycle(dsl.hooks()).is_none());
}

#[test]
fn test_hooks_are_drawn_once() {
    let hookup = Hookup::new(None);
    assert!(matches!(hookup.hooks(), Err(OpError::HooksNotDrawn)));

    hookup.draw(|_| {}).expect("Failed to draw hooks");
    let error = hookup.draw(|_| {}).expect_err("Second draw should fail");
    assert!(matches!(error, OpError::HooksAlreadyDrawn));

    // Loading the config keeps what was drawn
    assert!(hookup.load_config().expect("Hooks are drawn").is_empty());
}

#[test]
fn test_unknown_target_fails_the_source() {
    let test = test_runtime(config_without_file(), false);
    test.runtime
        .hookup()
        .draw(|dsl| {
            dsl.run("MissingOperation", |on| {
                on.source("CreateGroup");
            });
        })
        .expect("Failed to draw hooks");

    let error = test
        .runtime
        .context()
        .run::<CreateGroup>(json!({ "group": { "name": "Admins" } }))
        .expect_err("Unknown target should fail");
    assert!(matches!(error, OpError::HookTargetNotFound(ref name) if name == "MissingOperation"));
    assert!(test.groups.is_empty());
}

/// Validation errors of a target are not the source's validation errors.
#[test]
fn test_target_validation_failure_is_wrapped() {
    let test = test_runtime(config_without_file(), false);
    test.runtime
        .hookup()
        .draw(|dsl| {
            dsl.run("RejectingTarget", |on| {
                on.source("CreateGroup");
            });
        })
        .expect("Failed to draw hooks");

    let error = test
        .runtime
        .context()
        .run_lenient::<CreateGroup>(json!({ "group": { "name": "Admins" } }))
        .expect_err("Wrapped error should propagate");
    assert!(matches!(error, OpError::HookupOpValidationFailed(_)));
    assert_eq!(error.to_string(), "Rejected by hook");
    assert!(test.groups.is_empty());
}

#[test]
fn test_custom_and_destroy_events() {
    let test = test_runtime(config_without_file(), false);
    test.runtime
        .hookup()
        .draw(|dsl| {
            dsl.run("PublishListener", |on| {
                on.event("Publisher", "published");
            })
            .run("RememberDestroyedGroup", |on| {
                on.event("DestroyGroup", "before_destroy");
            });
        })
        .expect("Failed to draw hooks");
    let context = test.runtime.context();

    context
        .run::<Publisher>(json!({ "title": "Release notes" }))
        .expect("Failed to publish");
    let titles = PUBLISHED_TITLES.lock().expect("Titles lock poisoned").clone();
    assert_eq!(titles, vec!["Release notes".to_string()]);

    let id = test.groups.insert(Group::new("Obsolete"));
    context
        .run::<DestroyGroup>(json!({ "id": id }))
        .expect("Failed to destroy group");
    let names = DESTROYED_NAMES.lock().expect("Names lock poisoned").clone();
    assert_eq!(names, vec!["Obsolete".to_string()]);
    assert!(test.groups.is_empty());
}

/// Hooks are read lazily from the configured YAML file.
#[test]
fn test_hooks_loaded_from_config_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("hookup.yml");
    fs::write(
        &path,
        "hooks:\n  - run: SetGroupColor\n    on:\n      - source: CreateGroup\n",
    )
    .expect("Failed to write hookup file");

    let config = OpsConfig {
        hookup_config_path: Some(path),
        ..OpsConfig::default()
    };
    let test = test_runtime(config, false);
    assert!(!test.runtime.hookup().is_drawn());

    test.runtime
        .context()
        .run::<CreateGroup>(json!({ "group": { "name": "Admins" } }))
        .expect("Failed to create group");

    assert!(test.runtime.hookup().is_drawn());
    let stored = test.groups.get(1).expect("Group should be stored");
    assert_eq!(stored.color.as_deref(), Some("blue"));
}

#[test]
fn test_missing_config_file_means_no_hooks() {
    let config = OpsConfig {
        hookup_config_path: Some(PathBuf::from("does/not/exist/hookup.yml")),
        ..OpsConfig::default()
    };
    let test = test_runtime(config, false);

    test.runtime
        .context()
        .run::<CreateGroup>(json!({ "group": { "name": "Admins" } }))
        .expect("Failed to create group");

    let hooks = test.runtime.hookup().hooks().expect("Hooks should be loaded");
    assert!(hooks.is_empty());
    let stored = test.groups.get(1).expect("Group should be stored");
    assert!(stored.color.is_none());
}

#[test]
fn test_hook_targets_can_skip_authorization() {
    let ability = RuleAbility::new().allow("create", "Group");
    let hooks = |dsl: &mut HookupDsl| {
        dsl.run("GuardedAudit", |on| {
            on.source("CreateGroup");
        });
    };
    let params = json!({ "group": { "name": "Admins" } });

    let test = test_runtime(config_without_file(), true);
    test.runtime.hookup().draw(hooks).expect("Failed to draw hooks");
    let error = test
        .runtime
        .context()
        .with_ability(ability.clone())
        .run::<CreateGroup>(params.clone())
        .expect_err("Audit should be denied");
    assert_eq!(error.to_string(), "You are not authorized to audit audit_log.");
    assert!(test.groups.is_empty());

    let config = OpsConfig {
        trigger_hookups_without_authorization: true,
        ..config_without_file()
    };
    let test = test_runtime(config, true);
    test.runtime.hookup().draw(hooks).expect("Failed to draw hooks");
    test.runtime
        .context()
        .with_ability(ability)
        .run::<CreateGroup>(params)
        .expect("Hook target runs without authorization");
    assert_eq!(test.groups.len(), 1);
}
