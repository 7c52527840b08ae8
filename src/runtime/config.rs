//! Runtime-wide settings.
//!
//! Settings can be built in code or loaded from YAML. Every key is optional;
//! missing keys take the defaults below.
//!
//! ```yaml
//! lock_models_at_build: true
//! ensure_authorize_called: true
//! trigger_hookups_without_authorization: false
//! hookup_config_path: config/hookup.yml
//! filter_parameters: [password]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::framework::OpError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    /// Lock loaded models with the operation's lock mode.
    pub lock_models_at_build: bool,
    /// Fail operations that finish without authorizing anything.
    pub ensure_authorize_called: bool,
    /// Run hook targets with authorization switched off.
    pub trigger_hookups_without_authorization: bool,
    /// Where the hookup file is looked up on first use.
    pub hookup_config_path: Option<PathBuf>,
    /// Param keys masked in logs and inspections.
    pub filter_parameters: Vec<String>,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            lock_models_at_build: true,
            ensure_authorize_called: true,
            trigger_hookups_without_authorization: false,
            hookup_config_path: Some(PathBuf::from("config/hookup.yml")),
            filter_parameters: vec!["password".to_string()],
        }
    }
}

impl OpsConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, OpError> {
        serde_yaml::from_str(yaml).map_err(|e| OpError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OpError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .map_err(|e| OpError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }
}
