//! Platform layer - the install service that actually delivers modules.
//!
//! This module provides:
//! - `InstallService` trait: broker → platform abstraction boundary
//! - `desktop`: local module cache under the app cache directory
//! - `mobile`: Play Feature Delivery through the Android plugin
//!
//! Platform services report progress by sending `SessionStateUpdate`s on the
//! channel they were constructed with. They never call back into the broker
//! directly.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;

use crate::api::types::{ApiError, SessionId, SessionStatus};
use crate::modules::session::SessionStateUpdate;

pub mod desktop;
#[cfg(target_os = "android")]
pub mod mobile;

/// Play Core `SplitInstallErrorCode` values reused by every service
pub mod error_code {
    pub const NO_ERROR: i32 = 0;
    pub const MODULE_UNAVAILABLE: i32 = -2;
    pub const INTERNAL_ERROR: i32 = -100;
}

/// Abstract interface for the platform module installer.
///
/// Implemented by `DesktopInstallService` and `MobileInstallService`.
#[async_trait]
pub trait InstallService: Send + Sync {
    /// Modules the platform currently reports as installed.
    ///
    /// Never fails: platform errors are logged and yield an empty set.
    async fn installed_modules(&self) -> HashSet<String>;

    /// Ask the platform to start installing a module.
    ///
    /// # Returns
    /// * `Ok(SessionId)` - Session the platform will report updates for
    /// * `Err(ApiError)` - The platform refused before a session existed
    async fn start_install(&self, module_name: &str) -> Result<SessionId, ApiError>;
}

/// State update as delivered by the Android plugin.
///
/// Field names and status codes follow `SplitInstallSessionState`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSessionState {
    pub session_id: SessionId,
    pub status: i32,
    #[serde(default)]
    pub error_code: i32,
    #[serde(default)]
    pub bytes_downloaded: i64,
    #[serde(default)]
    pub total_bytes_to_download: i64,
}

/// Map a Play Core `SplitInstallSessionStatus` code onto a broker status.
///
/// Statuses the broker does not track (`UNKNOWN`, `CANCELING`, anything new)
/// map to `None` and the update is dropped.
pub fn map_platform_status(code: i32) -> Option<SessionStatus> {
    match code {
        // PENDING, REQUIRES_USER_CONFIRMATION
        1 | 8 => Some(SessionStatus::Pending),
        // DOWNLOADING, DOWNLOADED, INSTALLING
        2..=4 => Some(SessionStatus::Downloading),
        // INSTALLED
        5 => Some(SessionStatus::Installed),
        // FAILED, CANCELED
        6 | 7 => Some(SessionStatus::Failed),
        _ => None,
    }
}

impl RawSessionState {
    pub fn into_update(self) -> Option<SessionStateUpdate> {
        let status = map_platform_status(self.status)?;
        let error_code = (self.error_code != error_code::NO_ERROR).then_some(self.error_code);
        let (bytes_downloaded, total_bytes) = if status == SessionStatus::Downloading {
            (
                u64::try_from(self.bytes_downloaded).ok(),
                u64::try_from(self.total_bytes_to_download).ok(),
            )
        } else {
            (None, None)
        };

        Some(SessionStateUpdate {
            session_id: self.session_id,
            status,
            error_code,
            bytes_downloaded,
            total_bytes,
        })
    }
}
