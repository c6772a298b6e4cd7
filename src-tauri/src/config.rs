//! Feature delivery configuration.
//!
//! Read from the `plugins.feature-delivery` section of `tauri.conf.json`:
//!
//! ```json
//! "plugins": {
//!   "feature-delivery": {
//!     "defaultModule": "pro_features",
//!     "onDemandModules": ["pro_features"],
//!     "emitProgress": true
//!   }
//! }
//! ```

use std::path::PathBuf;

use serde::Deserialize;

/// Module installed when a caller does not name one
pub const DEFAULT_MODULE: &str = "pro_features";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryConfig {
    pub default_module: String,
    /// Modules the desktop cache may install; empty allows any valid name
    pub on_demand_modules: Vec<String>,
    /// Forward `Downloading` progress to the frontend
    pub emit_progress: bool,
    /// Desktop module cache, defaults to `app_cache_dir()/modules`
    pub modules_dir: Option<PathBuf>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_module: DEFAULT_MODULE.to_string(),
            on_demand_modules: Vec::new(),
            emit_progress: true,
            modules_dir: None,
        }
    }
}
