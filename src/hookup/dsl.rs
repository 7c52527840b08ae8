//! Declaring hooks, in code or in a YAML file.
//!
//! ```rust,ignore
//! hookup.draw(|dsl| {
//!     dsl.run("NotifyAdmins", |on| {
//!         on.source("CreateGroup");
//!         on.event("DestroyGroup", "before_destroy");
//!     });
//! })?;
//! ```
//!
//! The same hooks as a file:
//!
//! ```yaml
//! hooks:
//!   - run: NotifyAdmins
//!     on:
//!       - source: CreateGroup
//!       - source: DestroyGroup
//!         event: before_destroy
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::hook::{Hook, AFTER_RUN};
use super::validator;
use crate::framework::OpError;

/// source -> event -> hooks, in declaration order.
pub type HookMap = BTreeMap<String, BTreeMap<String, Vec<Hook>>>;

#[derive(Debug, Clone, Default)]
pub struct HookupDsl {
    hooks: HookMap,
}

impl HookupDsl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the sources that make `target` run.
    pub fn run(&mut self, target: &str, f: impl FnOnce(&mut TargetScope<'_>)) -> &mut Self {
        let mut scope = TargetScope {
            dsl: self,
            target: target.to_string(),
        };
        f(&mut scope);
        self
    }

    fn add(&mut self, source: &str, event: &str, target: &str) {
        self.hooks
            .entry(source.to_string())
            .or_default()
            .entry(event.to_string())
            .or_default()
            .push(Hook::new(source, event, target));
    }

    pub fn hooks(&self) -> &HookMap {
        &self.hooks
    }

    pub(crate) fn into_hooks(self) -> HookMap {
        self.hooks
    }

    /// Fails if following hooks from any operation can lead back to it.
    pub fn validate(&self) -> Result<(), OpError> {
        validator::validate(&self.hooks)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, OpError> {
        let file: HookupFile =
            serde_yaml::from_str(yaml).map_err(|e| OpError::Config(e.to_string()))?;
        let mut dsl = Self::new();
        for entry in file.hooks {
            dsl.run(&entry.run, |scope| {
                for source in &entry.on {
                    scope.event(&source.source, &source.event);
                }
            });
        }
        Ok(dsl)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OpError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .map_err(|e| OpError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }
}

pub struct TargetScope<'a> {
    dsl: &'a mut HookupDsl,
    target: String,
}

impl TargetScope<'_> {
    /// Runs the target after `source` ran successfully.
    pub fn source(&mut self, source: &str) -> &mut Self {
        self.event(source, AFTER_RUN)
    }

    pub fn event(&mut self, source: &str, event: &str) -> &mut Self {
        self.dsl.add(source, event, &self.target);
        self
    }
}

#[derive(Debug, Deserialize)]
struct HookupFile {
    #[serde(default)]
    hooks: Vec<TargetEntry>,
}

#[derive(Debug, Deserialize)]
struct TargetEntry {
    run: String,
    #[serde(default)]
    on: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize)]
struct SourceEntry {
    source: String,
    #[serde(default = "default_event")]
    event: String,
}

fn default_event() -> String {
    AFTER_RUN.to_string()
}
