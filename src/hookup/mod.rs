//! # Hookups
//!
//! Hookups let operations react to each other without knowing about each
//! other: "after `CreateGroup` ran, run `NotifyAdmins`". The registry is
//! drawn exactly once, either explicitly through [`Hookup::draw`] or lazily
//! from the configured YAML file on first use. A missing file yields an
//! empty registry.
//!
//! ## Triggering
//!
//! When an operation fires an event, every matching hook target is
//! constructed by name through the runtime's
//! [`OperationRegistry`](crate::runtime::OperationRegistry) and run with a
//! context spawned from the source, flagged as called via hook. Matching
//! considers wildcards in this order:
//!
//! 1. `*` source, `*` event
//! 2. `*` source, exact event
//! 3. exact source, `*` event
//! 4. exact source, exact event
//!
//! Targets already present in the op chain are skipped, so an operation
//! never re-triggers itself through a wildcard hook.

mod dsl;
mod hook;
mod validator;

pub use dsl::{HookMap, HookupDsl, TargetScope};
pub use hook::{Hook, AFTER_RUN, WILDCARD};
pub use validator::find_cycle;

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::{debug, info};

use crate::framework::{Context, OpError, OpRef, Params};

#[derive(Debug, Default)]
pub struct Hookup {
    config_path: Option<PathBuf>,
    hooks: OnceLock<HookMap>,
}

impl Hookup {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self {
            config_path,
            hooks: OnceLock::new(),
        }
    }

    /// Declares all hooks. Fails if hooks were already drawn or loaded.
    pub fn draw(&self, f: impl FnOnce(&mut HookupDsl)) -> Result<(), OpError> {
        let mut dsl = HookupDsl::new();
        f(&mut dsl);
        self.install(dsl)
    }

    pub fn install(&self, dsl: HookupDsl) -> Result<(), OpError> {
        if self.is_drawn() {
            return Err(OpError::HooksAlreadyDrawn);
        }
        dsl.validate()?;
        self.hooks
            .set(dsl.into_hooks())
            .map_err(|_| OpError::HooksAlreadyDrawn)
    }

    pub fn is_drawn(&self) -> bool {
        self.hooks.get().is_some()
    }

    /// The drawn hooks, without loading the config file.
    pub fn hooks(&self) -> Result<&HookMap, OpError> {
        self.hooks.get().ok_or(OpError::HooksNotDrawn)
    }

    /// The drawn hooks, loading the config file on first use.
    pub fn load_config(&self) -> Result<&HookMap, OpError> {
        if let Some(hooks) = self.hooks.get() {
            return Ok(hooks);
        }
        let dsl = match &self.config_path {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading hookup config");
                HookupDsl::from_file(path)?
            }
            _ => {
                debug!("No hookup config, starting with no hooks");
                HookupDsl::new()
            }
        };
        dsl.validate()?;
        // A concurrent draw may have won; its hooks are kept.
        let _ = self.hooks.set(dsl.into_hooks());
        self.hooks()
    }

    /// Hooks matching `operation` and `event`, wildcards first.
    pub fn hooks_for(&self, operation: &str, event: &str) -> Result<Vec<Hook>, OpError> {
        let hooks = self.load_config()?;
        let mut matching = Vec::new();
        for source in [WILDCARD, operation] {
            let Some(events) = hooks.get(source) else {
                continue;
            };
            for key in [WILDCARD, event] {
                if let Some(found) = events.get(key) {
                    matching.extend(found.iter().cloned());
                }
            }
        }
        Ok(matching)
    }

    /// Runs every hook target for `event` fired by `source`.
    ///
    /// Validation failures of a target are wrapped in
    /// [`OpError::HookupOpValidationFailed`].
    pub fn trigger(
        &self,
        context: &Context,
        source: &OpRef,
        event: &str,
        params: Params,
    ) -> Result<(), OpError> {
        let hooks = self.hooks_for(source.name, event)?;
        if hooks.is_empty() {
            return Ok(());
        }

        let mut hook_context = context.spawn(source.clone()).via_hook();
        if context.runtime().config().trigger_hookups_without_authorization {
            hook_context = hook_context.suppress_authorization();
        }
        let registry = context.runtime().operations();

        for hook in hooks {
            let target = hook.target();
            if hook_context.chain_contains(target) {
                debug!(source = source.name, target, event, "Skipping hook already in op chain");
                continue;
            }
            debug!(source = source.name, target, event, "Triggering hook");

            let wrap = |error: OpError| {
                if registry.is_validation_error(target, &error) {
                    OpError::HookupOpValidationFailed(Box::new(error))
                } else {
                    error
                }
            };
            let mut op = registry
                .instantiate(target, hook_context.clone(), params.clone())
                .map_err(wrap)?;
            op.run_dyn().map_err(wrap)?;
        }
        Ok(())
    }
}
