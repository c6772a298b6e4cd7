//! Feature delivery backend.
//!
//! Exposes on-demand feature module installs to the frontend:
//! `module_is_installed`, `module_install`, `module_install_sessions`, and the
//! `delivery/session_status_changed` event.

pub mod api;
pub mod commands;
pub mod config;
pub mod modules;
pub mod platform;
pub mod plugin;
pub mod runtime;

use tauri_plugin_log::{Target, TargetKind};

fn specta_builder() -> tauri_specta::Builder<tauri::Wry> {
    tauri_specta::Builder::<tauri::Wry>::new().commands(tauri_specta::collect_commands![
        commands::modules::module_is_installed,
        commands::modules::module_install,
        commands::modules::module_install_sessions,
    ])
}

fn log_plugin() -> tauri::plugin::TauriPlugin<tauri::Wry> {
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    tauri_plugin_log::Builder::new()
        .targets([
            Target::new(TargetKind::Stdout),
            Target::new(TargetKind::LogDir { file_name: None }),
            Target::new(TargetKind::Webview),
        ])
        .level(level)
        .build()
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let builder = specta_builder();

    #[cfg(debug_assertions)]
    builder
        .export(
            specta_typescript::Typescript::default(),
            "../bindings.ts",
        )
        .expect("Failed to export typescript bindings");

    let app = tauri::Builder::default().plugin(log_plugin());

    // Two desktop instances would race on the module cache
    #[cfg(not(any(target_os = "android", target_os = "ios")))]
    let app = app.plugin(tauri_plugin_single_instance::init(|_app, argv, _cwd| {
        log::info!("Second instance blocked: argv={argv:?}");
    }));

    app.plugin(plugin::init())
        .invoke_handler(builder.invoke_handler())
        .setup(|_app| {
            log::info!("Feature delivery ready");
            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_export() {
        let path = std::env::temp_dir().join("feature-delivery-bindings.ts");
        specta_builder()
            .export(specta_typescript::Typescript::default(), &path)
            .expect("export bindings");

        let bindings = std::fs::read_to_string(&path).unwrap();
        assert!(bindings.contains("moduleInstall"));
        assert!(bindings.contains("already_installed"));
    }
}
