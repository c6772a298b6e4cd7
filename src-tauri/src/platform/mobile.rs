//! Android install service - Play Feature Delivery through the native plugin.
//!
//! The Kotlin side (`FeatureDeliveryPlugin`) owns the `SplitInstallManager`.
//! It answers `getInstalledModules` and `startInstall`, and pushes every
//! `SplitInstallSessionState` into the channel registered via
//! `registerListener`.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tauri::ipc::{Channel, InvokeResponseBody};
use tauri::plugin::{PluginApi, PluginHandle};
use tauri::Runtime;
use tokio::sync::mpsc;

use crate::api::types::{ApiError, SessionId};
use crate::modules::session::SessionStateUpdate;
use crate::platform::{InstallService, RawSessionState};

const PLUGIN_IDENTIFIER: &str = "xyz.ersen.app";
const PLUGIN_CLASS: &str = "FeatureDeliveryPlugin";

#[derive(Debug, Deserialize)]
struct InstalledModulesResponse {
    modules: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartInstallArgs {
    module_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartInstallResponse {
    session_id: SessionId,
}

#[derive(Serialize)]
struct RegisterListenerArgs {
    handler: Channel,
}

pub struct MobileInstallService<R: Runtime> {
    handle: PluginHandle<R>,
}

impl<R: Runtime> MobileInstallService<R> {
    /// Register the Android plugin and subscribe to its session updates.
    pub fn register<C: serde::de::DeserializeOwned>(
        api: &PluginApi<R, C>,
        updates: mpsc::UnboundedSender<SessionStateUpdate>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let handle = api.register_android_plugin(PLUGIN_IDENTIFIER, PLUGIN_CLASS)?;

        let handler = Channel::new(move |body: InvokeResponseBody| {
            match body.deserialize::<RawSessionState>() {
                Ok(raw) => {
                    log::trace!(
                        "Split install state: session_id={}, status={}, error_code={}",
                        raw.session_id,
                        raw.status,
                        raw.error_code
                    );
                    if let Some(update) = raw.into_update() {
                        if updates.send(update).is_err() {
                            log::warn!("Session update dropped: broker listener is gone");
                        }
                    }
                }
                Err(e) => log::warn!("Failed to parse split install state: {e}"),
            }
            Ok(())
        });

        handle.run_mobile_plugin::<()>("registerListener", RegisterListenerArgs { handler })?;
        log::debug!("Registered split install listener");

        Ok(Self { handle })
    }
}

#[async_trait]
impl<R: Runtime> InstallService for MobileInstallService<R> {
    async fn installed_modules(&self) -> HashSet<String> {
        let handle = self.handle.clone();
        let result = tokio::task::spawn_blocking(move || {
            handle.run_mobile_plugin::<InstalledModulesResponse>("getInstalledModules", ())
        })
        .await;

        match result {
            Ok(Ok(response)) => response.modules.into_iter().collect(),
            Ok(Err(e)) => {
                log::warn!("getInstalledModules failed: {e}");
                HashSet::new()
            }
            Err(e) => {
                log::warn!("getInstalledModules task failed: {e}");
                HashSet::new()
            }
        }
    }

    async fn start_install(&self, module_name: &str) -> Result<SessionId, ApiError> {
        let handle = self.handle.clone();
        let args = StartInstallArgs {
            module_name: module_name.to_string(),
        };

        let response = tokio::task::spawn_blocking(move || {
            handle.run_mobile_plugin::<StartInstallResponse>("startInstall", args)
        })
        .await
        .map_err(|e| ApiError::InstallStartFailed {
            module_name: module_name.to_string(),
            message: format!("Failed to spawn blocking task: {e}"),
        })?
        .map_err(|e| ApiError::InstallStartFailed {
            module_name: module_name.to_string(),
            message: e.to_string(),
        })?;

        log::info!(
            "Split install started: module={module_name}, session_id={}",
            response.session_id
        );
        Ok(response.session_id)
    }
}
