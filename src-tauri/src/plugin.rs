//! Feature delivery plugin - wires the platform service, broker and event bridge.
//!
//! Setup flow:
//! 1. Read `DeliveryConfig` from `plugins.feature-delivery`
//! 2. Build the platform install service (Android plugin or desktop cache)
//! 3. Manage `Arc<InstallBroker>` for the commands
//! 4. Spawn the update listener and the frontend event bridge

use std::sync::Arc;

use tauri::plugin::{Builder, PluginApi, TauriPlugin};
use tauri::{AppHandle, Manager, Runtime};
use tokio::sync::mpsc;

use crate::config::DeliveryConfig;
use crate::modules::session::SessionStateUpdate;
use crate::platform::InstallService;
use crate::runtime::event_bridge;
use crate::runtime::install_broker::InstallBroker;

pub const PLUGIN_NAME: &str = "feature-delivery";

#[cfg(target_os = "android")]
fn create_service<R: Runtime>(
    _app: &AppHandle<R>,
    api: &PluginApi<R, Option<DeliveryConfig>>,
    _config: &DeliveryConfig,
    updates: mpsc::UnboundedSender<SessionStateUpdate>,
) -> Result<Arc<dyn InstallService>, Box<dyn std::error::Error>> {
    let service = crate::platform::mobile::MobileInstallService::register(api, updates)?;
    Ok(Arc::new(service))
}

#[cfg(not(target_os = "android"))]
fn create_service<R: Runtime>(
    app: &AppHandle<R>,
    _api: &PluginApi<R, Option<DeliveryConfig>>,
    config: &DeliveryConfig,
    updates: mpsc::UnboundedSender<SessionStateUpdate>,
) -> Result<Arc<dyn InstallService>, Box<dyn std::error::Error>> {
    let modules_root = match &config.modules_dir {
        Some(dir) => dir.clone(),
        None => app.path().app_cache_dir()?.join("modules"),
    };
    log::info!("Desktop module cache: {}", modules_root.display());

    let service = crate::platform::desktop::DesktopInstallService::new(
        modules_root,
        config.on_demand_modules.clone(),
        updates,
    );
    Ok(Arc::new(service))
}

/// Build the feature delivery plugin.
pub fn init<R: Runtime>() -> TauriPlugin<R, Option<DeliveryConfig>> {
    Builder::<R, Option<DeliveryConfig>>::new(PLUGIN_NAME)
        .setup(|app, api| {
            let config = api.config().clone().unwrap_or_default();
            log::debug!("Feature delivery config: {config:?}");

            let (tx, rx) = mpsc::unbounded_channel();
            let service = create_service(app, &api, &config, tx)?;

            let broker = Arc::new(InstallBroker::new(service, config.default_module.clone()));
            tauri::async_runtime::spawn(Arc::clone(&broker).run_update_listener(rx));
            event_bridge::spawn(app.clone(), &broker, config.emit_progress);

            app.manage(broker);
            Ok(())
        })
        .build()
}
