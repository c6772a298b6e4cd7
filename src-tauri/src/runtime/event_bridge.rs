//! Event bridge - re-emits broker session changes to the frontend.

use std::sync::Arc;

use tauri::{AppHandle, Emitter, Runtime};
use tokio::sync::broadcast::error::RecvError;

use crate::api::types::{InstallSessionSnapshot, SessionStatus};
use crate::runtime::install_broker::InstallBroker;

/// Event name for install session status changes
pub const EVENT_SESSION_STATUS_CHANGED: &str = "delivery/session_status_changed";

/// Whether a session change is forwarded to the frontend.
pub fn should_forward(snapshot: &InstallSessionSnapshot, emit_progress: bool) -> bool {
    emit_progress || snapshot.status != SessionStatus::Downloading
}

/// Spawn a task that forwards broker events until the broker is dropped.
pub fn spawn<R: Runtime>(app: AppHandle<R>, broker: &Arc<InstallBroker>, emit_progress: bool) {
    let mut events = broker.subscribe();

    tauri::async_runtime::spawn(async move {
        loop {
            match events.recv().await {
                Ok(snapshot) => {
                    if !should_forward(&snapshot, emit_progress) {
                        continue;
                    }
                    if let Err(e) = app.emit(EVENT_SESSION_STATUS_CHANGED, &snapshot) {
                        log::error!(
                            "Failed to emit {EVENT_SESSION_STATUS_CHANGED}: {e} (session_id={}, module={})",
                            snapshot.session_id,
                            snapshot.module_name
                        );
                    } else {
                        log::trace!(
                            "Emitted {EVENT_SESSION_STATUS_CHANGED}: session_id={}, status={:?}",
                            snapshot.session_id,
                            snapshot.status
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Event bridge lagged, skipped {skipped} session events");
                }
                Err(RecvError::Closed) => break,
            }
        }
        log::debug!("Event bridge stopped");
    });
}
