//! Desktop install service - feature modules kept in a local cache directory.
//!
//! Desktop builds have no app store delivering split APKs, so a module counts
//! as installed once its directory holds an `install.json` marker.
//!
//! # Cache Directory Structure
//!
//! ```text
//! app_cache_dir()/
//! └── modules/
//!     ├── pro_features/
//!     │   └── install.json    # Module metadata
//!     └── maps/
//!         └── install.json
//! ```

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::api::types::{ApiError, SessionId, SessionStatus};
use crate::modules::session::SessionStateUpdate;
use crate::modules::validate_module_name;
use crate::platform::{error_code, InstallService};

const METADATA_FILE: &str = "install.json";

/// Module installation metadata stored in `install.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInstallMetadata {
    pub module_name: String,
    pub session_id: SessionId,
    /// Milliseconds since epoch, f64 like every timestamp we hand to JS
    pub installed_at_ms: f64,
}

pub struct DesktopInstallService {
    /// Root of the module cache (`app_cache_dir()/modules` by default)
    modules_root: PathBuf,
    /// Modules that may be installed on demand; empty means any valid name
    on_demand_modules: HashSet<String>,
    /// Channel the broker drains for session updates
    updates: mpsc::UnboundedSender<SessionStateUpdate>,
    next_session_id: AtomicI32,
}

impl DesktopInstallService {
    /// Create a new DesktopInstallService.
    ///
    /// # Arguments
    ///
    /// * `modules_root` - Cache directory; created lazily on first install
    /// * `on_demand_modules` - Allow-list of installable modules (empty = all)
    /// * `updates` - Sender for session state updates
    pub fn new(
        modules_root: PathBuf,
        on_demand_modules: impl IntoIterator<Item = String>,
        updates: mpsc::UnboundedSender<SessionStateUpdate>,
    ) -> Self {
        Self {
            modules_root,
            on_demand_modules: on_demand_modules.into_iter().collect(),
            updates,
            next_session_id: AtomicI32::new(1),
        }
    }

    fn is_available(&self, module_name: &str) -> bool {
        self.on_demand_modules.is_empty() || self.on_demand_modules.contains(module_name)
    }

    fn send(updates: &mpsc::UnboundedSender<SessionStateUpdate>, update: SessionStateUpdate) {
        if updates.send(update).is_err() {
            log::warn!("Session update dropped: broker listener is gone");
        }
    }
}

/// Read a module's `install.json`; `None` if it is missing or unreadable.
fn read_metadata(module_dir: &Path) -> Option<ModuleInstallMetadata> {
    let metadata_path = module_dir.join(METADATA_FILE);
    if !metadata_path.is_file() {
        return None;
    }
    match std::fs::read_to_string(&metadata_path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                log::warn!(
                    "Failed to parse {} in '{}': {e}",
                    METADATA_FILE,
                    module_dir.display()
                );
                None
            }
        },
        Err(e) => {
            log::warn!(
                "Failed to read {} in '{}': {e}",
                METADATA_FILE,
                module_dir.display()
            );
            None
        }
    }
}

fn scan_installed(modules_root: &Path) -> std::io::Result<HashSet<String>> {
    let mut installed = HashSet::new();
    if !modules_root.exists() {
        return Ok(installed);
    }

    for entry in std::fs::read_dir(modules_root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if validate_module_name(&name).is_err() {
            continue;
        }
        match read_metadata(&path) {
            Some(metadata) if metadata.module_name == name => {
                installed.insert(name);
            }
            Some(metadata) => log::warn!(
                "Ignoring module dir '{name}': metadata names '{}'",
                metadata.module_name
            ),
            None => {}
        }
    }
    Ok(installed)
}

/// Write `install.json` through a temp file so a partial write never counts as installed.
fn write_module(module_dir: &Path, metadata: &ModuleInstallMetadata) -> Result<(), ApiError> {
    std::fs::create_dir_all(module_dir).map_err(|e| ApiError::IoError {
        message: format!("Failed to create module directory: {e}"),
    })?;

    let metadata_json = serde_json::to_string_pretty(metadata).map_err(|e| ApiError::IoError {
        message: format!("Failed to serialize module metadata: {e}"),
    })?;

    let temp_path = module_dir.join(format!(".{METADATA_FILE}.tmp"));
    let written = std::fs::File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(metadata_json.as_bytes())?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(&temp_path, module_dir.join(METADATA_FILE)));

    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(ApiError::IoError {
            message: format!("Failed to write module metadata: {e}"),
        });
    }
    Ok(())
}

#[async_trait]
impl InstallService for DesktopInstallService {
    async fn installed_modules(&self) -> HashSet<String> {
        let modules_root = self.modules_root.clone();
        match tokio::task::spawn_blocking(move || scan_installed(&modules_root)).await {
            Ok(Ok(installed)) => installed,
            Ok(Err(e)) => {
                log::warn!(
                    "Failed to scan module cache '{}': {e}",
                    self.modules_root.display()
                );
                HashSet::new()
            }
            Err(e) => {
                log::warn!("Module cache scan task failed: {e}");
                HashSet::new()
            }
        }
    }

    async fn start_install(&self, module_name: &str) -> Result<SessionId, ApiError> {
        validate_module_name(module_name)?;

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let available = self.is_available(module_name);
        let module_dir = self.modules_root.join(module_name);
        let module_name = module_name.to_string();
        let updates = self.updates.clone();

        log::info!("Desktop install started: module={module_name}, session_id={session_id}");

        tauri::async_runtime::spawn(async move {
            Self::send(
                &updates,
                SessionStateUpdate::new(session_id, SessionStatus::Pending),
            );

            if !available {
                log::warn!(
                    "Module not available for on-demand install: module={module_name}, session_id={session_id}"
                );
                Self::send(
                    &updates,
                    SessionStateUpdate::failed(session_id, error_code::MODULE_UNAVAILABLE),
                );
                return;
            }

            Self::send(
                &updates,
                SessionStateUpdate::new(session_id, SessionStatus::Downloading),
            );

            let installed_at_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as f64)
                .unwrap_or(0.0);
            let metadata = ModuleInstallMetadata {
                module_name: module_name.clone(),
                session_id,
                installed_at_ms,
            };

            let result = tokio::task::spawn_blocking(move || write_module(&module_dir, &metadata))
                .await
                .map_err(|e| ApiError::IoError {
                    message: format!("Failed to spawn blocking task: {e}"),
                })
                .and_then(|r| r);

            match result {
                Ok(()) => {
                    log::info!(
                        "Desktop install finished: module={module_name}, session_id={session_id}"
                    );
                    Self::send(
                        &updates,
                        SessionStateUpdate::new(session_id, SessionStatus::Installed),
                    );
                }
                Err(e) => {
                    log::error!(
                        "Desktop install failed: module={module_name}, session_id={session_id}, error={e}"
                    );
                    Self::send(
                        &updates,
                        SessionStateUpdate::failed(session_id, error_code::INTERNAL_ERROR),
                    );
                }
            }
        });

        Ok(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_until_terminal(
        rx: &mut mpsc::UnboundedReceiver<SessionStateUpdate>,
    ) -> Vec<SessionStateUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            let terminal = update.status.is_terminal();
            updates.push(update);
            if terminal {
                break;
            }
        }
        updates
    }

    #[tokio::test]
    async fn test_install_writes_metadata_and_reports_installed() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let service = DesktopInstallService::new(temp.path().join("modules"), Vec::new(), tx);

        let session_id = service.start_install("pro_features").await.unwrap();
        let statuses: Vec<_> = collect_until_terminal(&mut rx)
            .await
            .into_iter()
            .map(|u| {
                assert_eq!(u.session_id, session_id);
                u.status
            })
            .collect();

        assert_eq!(
            statuses,
            vec![
                SessionStatus::Pending,
                SessionStatus::Downloading,
                SessionStatus::Installed
            ]
        );
        assert!(temp
            .path()
            .join("modules/pro_features/install.json")
            .is_file());
        assert!(service.installed_modules().await.contains("pro_features"));
    }

    #[tokio::test]
    async fn test_unavailable_module_fails_with_module_unavailable() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let service =
            DesktopInstallService::new(temp.path().to_path_buf(), vec!["maps".to_string()], tx);

        let session_id = service.start_install("pro_features").await.unwrap();
        let updates = collect_until_terminal(&mut rx).await;

        assert_eq!(
            updates.last(),
            Some(&SessionStateUpdate::failed(
                session_id,
                error_code::MODULE_UNAVAILABLE
            ))
        );
        assert!(service.installed_modules().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_name_fails_synchronously() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let service = DesktopInstallService::new(temp.path().to_path_buf(), Vec::new(), tx);

        let result = service.start_install("../escape").await;
        assert!(matches!(result, Err(ApiError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let service = DesktopInstallService::new(temp.path().to_path_buf(), Vec::new(), tx);

        let first = service.start_install("maps").await.unwrap();
        let second = service.start_install("pro_features").await.unwrap();
        assert_ne!(first, second);
    }

    fn write_metadata(modules_root: &Path, dir_name: &str, module_name: &str) {
        let metadata = ModuleInstallMetadata {
            module_name: module_name.to_string(),
            session_id: 1,
            installed_at_ms: 0.0,
        };
        write_module(&modules_root.join(dir_name), &metadata).unwrap();
    }

    #[tokio::test]
    async fn test_installed_modules_ignores_incomplete_dirs() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("half_done")).unwrap();
        write_metadata(temp.path(), "maps", "maps");

        let (tx, _rx) = mpsc::unbounded_channel();
        let service = DesktopInstallService::new(temp.path().to_path_buf(), Vec::new(), tx);

        let installed = service.installed_modules().await;
        assert_eq!(installed, HashSet::from(["maps".to_string()]));
    }

    #[tokio::test]
    async fn test_installed_modules_ignores_unreadable_metadata() {
        let temp = tempfile::tempdir().unwrap();
        write_metadata(temp.path(), "maps", "maps");
        // Truncated marker left by an interrupted write
        std::fs::create_dir_all(temp.path().join("pro_features")).unwrap();
        std::fs::write(
            temp.path().join("pro_features").join(METADATA_FILE),
            "{\"moduleName\": \"pro_fe",
        )
        .unwrap();
        // Marker copied from another module
        write_metadata(temp.path(), "camera", "maps");

        let (tx, _rx) = mpsc::unbounded_channel();
        let service = DesktopInstallService::new(temp.path().to_path_buf(), Vec::new(), tx);

        let installed = service.installed_modules().await;
        assert_eq!(installed, HashSet::from(["maps".to_string()]));
    }

    #[test]
    fn test_write_module_leaves_no_temp_file() {
        let temp = tempfile::tempdir().unwrap();
        write_metadata(temp.path(), "maps", "maps");

        let entries: Vec<_> = std::fs::read_dir(temp.path().join("maps"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(METADATA_FILE)]);
        assert_eq!(
            read_metadata(&temp.path().join("maps")).map(|m| m.module_name),
            Some("maps".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_root_reports_nothing_installed() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let service = DesktopInstallService::new(temp.path().join("absent"), Vec::new(), tx);

        assert!(service.installed_modules().await.is_empty());
    }
}
