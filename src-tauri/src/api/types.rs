//! Bridge types for commands and events.
//!
//! These types provide a stable API surface for the frontend,
//! hiding platform-specific install machinery.

use serde::{Deserialize, Serialize};
use specta::Type;

/// Install session identifier.
///
/// The broker allocates the ids it hands to the frontend; platform services
/// report their own ids, which the broker maps back to its sessions.
pub type SessionId = i32;

/// Status of an install session as seen by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Request accepted, nothing downloaded yet
    Pending,
    /// Module payload is being downloaded or installed
    Downloading,
    /// Module is installed and usable
    Installed,
    /// Install ended with an error
    Failed,
}

impl SessionStatus {
    /// Position along `Pending → Downloading → {Installed | Failed}`.
    pub(crate) fn rank(self) -> u8 {
        match self {
            SessionStatus::Pending => 0,
            SessionStatus::Downloading => 1,
            SessionStatus::Installed | SessionStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Installed | SessionStatus::Failed)
    }
}

/// Result of `module_is_installed`
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInstalled {
    pub installed: bool,
}

/// Successful terminal outcome of an install request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum InstallOutcome {
    /// The module was present before the request
    AlreadyInstalled,
    /// The module was installed by this (or a shared) session
    Installed,
}

/// Result of `module_install`
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
#[serde(rename_all = "camelCase")]
pub struct InstallResponse {
    pub status: InstallOutcome,
}

/// Point-in-time view of an install session.
///
/// Also the payload of the `delivery/session_status_changed` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Type)]
#[serde(rename_all = "camelCase")]
pub struct InstallSessionSnapshot {
    pub session_id: SessionId,
    pub module_name: String,
    pub status: SessionStatus,
    pub error_code: Option<i32>,
    /// Using f64 for JavaScript number compatibility
    pub bytes_downloaded: Option<f64>,
    pub total_bytes: Option<f64>,
}

/// API errors for frontend consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Type, thiserror::Error)]
#[serde(tag = "type")]
pub enum ApiError {
    /// Invalid input parameter
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
    /// IO error in the local module cache
    #[error("IO error: {message}")]
    IoError { message: String },
    /// The platform refused to start the install before a session existed
    #[error("Failed to start installation of {module_name}: {message}")]
    InstallStartFailed { module_name: String, message: String },
    /// A tracked session reached `Failed`
    #[error("Installation failed with error code: {}", display_error_code(.error_code))]
    InstallFailed {
        module_name: String,
        session_id: SessionId,
        error_code: Option<i32>,
    },
    /// The broker went away before the session reached a terminal state
    #[error("Installation of {module_name} was abandoned before completion")]
    InstallAbandoned { module_name: String },
}

fn display_error_code(error_code: &Option<i32>) -> String {
    match error_code {
        Some(code) => code.to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_response_wire_format() {
        let json = serde_json::to_value(InstallResponse {
            status: InstallOutcome::AlreadyInstalled,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "status": "already_installed" }));

        let json = serde_json::to_value(InstallResponse {
            status: InstallOutcome::Installed,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "status": "installed" }));
    }

    #[test]
    fn test_install_failed_message_carries_code() {
        let err = ApiError::InstallFailed {
            module_name: "pro_features".to_string(),
            session_id: 7,
            error_code: Some(-474),
        };
        assert_eq!(err.to_string(), "Installation failed with error code: -474");

        let err = ApiError::InstallFailed {
            module_name: "pro_features".to_string(),
            session_id: 7,
            error_code: None,
        };
        assert!(err.to_string().ends_with("unknown"));
    }

    #[test]
    fn test_api_error_is_tagged() {
        let json = serde_json::to_value(ApiError::InvalidInput {
            message: "nope".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "InvalidInput");
        assert_eq!(json["message"], "nope");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SessionStatus::Pending.is_terminal());
        assert!(!SessionStatus::Downloading.is_terminal());
        assert!(SessionStatus::Installed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
    }
}
