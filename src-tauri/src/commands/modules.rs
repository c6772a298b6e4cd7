//! Feature module commands.
//!
//! These commands provide the frontend API for on-demand module delivery.

use std::sync::Arc;

use tauri::State;

use crate::api::types::{ApiError, InstallResponse, InstallSessionSnapshot, ModuleInstalled};
use crate::runtime::install_broker::InstallBroker;

async fn module_is_installed_inner(
    broker: &InstallBroker,
    module_name: Option<String>,
) -> ModuleInstalled {
    let module_name = broker.resolve_module_name(module_name);
    let installed = broker.is_installed(&module_name).await;
    log::debug!("module_is_installed result: module={module_name}, installed={installed}");
    ModuleInstalled { installed }
}

async fn module_install_inner(
    broker: &InstallBroker,
    module_name: Option<String>,
) -> Result<InstallResponse, ApiError> {
    let module_name = broker.resolve_module_name(module_name);
    log::info!("module_install called: module={module_name}");

    let handle = broker.request_install(&module_name).await?;
    let status = handle.outcome().await?;

    log::info!("module_install resolved: module={module_name}, status={status:?}");
    Ok(InstallResponse { status })
}

/// Check whether a feature module is installed.
///
/// # Arguments
///
/// * `module_name` - Module to check; the configured default (`pro_features`) when omitted
///
/// Never fails: unknown or invalid names report `installed: false`.
#[tauri::command]
#[specta::specta]
pub async fn module_is_installed(
    broker: State<'_, Arc<InstallBroker>>,
    module_name: Option<String>,
) -> Result<ModuleInstalled, ApiError> {
    Ok(module_is_installed_inner(broker.inner(), module_name).await)
}

/// Install a feature module and wait for the outcome.
///
/// Concurrent calls for the same module share one install session and
/// resolve together. Progress is reported through
/// `delivery/session_status_changed` events while the call is pending.
///
/// # Returns
///
/// `{ status: "already_installed" }` or `{ status: "installed" }`.
///
/// # Errors
///
/// * `ApiError::InvalidInput` - The module name is invalid
/// * `ApiError::InstallStartFailed` - The platform refused to start the install
/// * `ApiError::InstallFailed` - The session failed; carries the platform error code
/// * `ApiError::InstallAbandoned` - The broker stopped before the session finished
#[tauri::command]
#[specta::specta]
pub async fn module_install(
    broker: State<'_, Arc<InstallBroker>>,
    module_name: Option<String>,
) -> Result<InstallResponse, ApiError> {
    module_install_inner(broker.inner(), module_name).await
}

/// List install sessions that are still in flight.
#[tauri::command]
#[specta::specta]
pub async fn module_install_sessions(
    broker: State<'_, Arc<InstallBroker>>,
) -> Result<Vec<InstallSessionSnapshot>, ApiError> {
    Ok(broker.active_sessions().await)
}
