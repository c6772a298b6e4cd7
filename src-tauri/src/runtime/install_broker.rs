//! Install Broker - deduplicates module installs and resolves waiting callers.
//!
//! The InstallBroker sits between the commands and the platform install service:
//! 1. Answers immediately when the module is already installed
//! 2. Attaches callers to an existing in-flight session for the same module
//! 3. Otherwise asks the platform to start a new session
//! 4. Applies platform state updates to the session table
//! 5. Resolves every attached handle when a session reaches a terminal status
//!
//! Registry and session table share one lock, so requests and platform
//! updates are applied one at a time. Notifications are published while the
//! lock is held, so subscribers see each session's statuses in order.
//!
//! Session ids handed to callers are allocated by the broker. The id the
//! platform reports for the same session is kept as a routing key for its
//! state updates.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};

use crate::api::types::{
    ApiError, InstallOutcome, InstallSessionSnapshot, SessionId, SessionStatus,
};
use crate::modules::registry::ModuleRegistry;
use crate::modules::session::{InstallSession, SessionStateUpdate, TransitionRejected};
use crate::modules::validate_module_name;
use crate::platform::InstallService;

/// Capacity of the session event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

type InstallResult = Result<InstallOutcome, ApiError>;

/// Caller-side view of an install request.
///
/// Resolves once the module is installed, the session fails, or the platform
/// refused to start.
#[derive(Debug)]
pub struct InstallHandle {
    module_name: String,
    session_id: Option<SessionId>,
    rx: oneshot::Receiver<InstallResult>,
}

impl InstallHandle {
    fn resolved(module_name: String, result: InstallResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self {
            module_name,
            session_id: None,
            rx,
        }
    }

    /// Session this handle is attached to, `None` if it resolved without one.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> InstallResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "Install handle dropped without outcome: module={}, session_id={:?}",
                    self.module_name,
                    self.session_id
                );
                Err(ApiError::InstallAbandoned {
                    module_name: self.module_name,
                })
            }
        }
    }
}

struct ActiveSession {
    session: InstallSession,
    platform_session_id: SessionId,
    waiters: Vec<oneshot::Sender<InstallResult>>,
}

#[derive(Default)]
struct BrokerState {
    registry: ModuleRegistry,
    /// Active sessions by broker session id
    sessions: HashMap<SessionId, ActiveSession>,
    /// Active session per module name
    by_module: HashMap<String, SessionId>,
    /// Platform session id -> broker session id
    by_platform_id: HashMap<SessionId, SessionId>,
    last_session_id: SessionId,
}

impl BrokerState {
    fn allocate_session_id(&mut self) -> SessionId {
        self.last_session_id = self.last_session_id.wrapping_add(1).max(1);
        self.last_session_id
    }

    /// Drop a session from every index.
    fn retire(&mut self, session_id: SessionId) -> Option<ActiveSession> {
        let finished = self.sessions.remove(&session_id)?;
        self.by_module.remove(finished.session.module_name());
        self.by_platform_id.remove(&finished.platform_session_id);
        Some(finished)
    }
}

/// Broker for on-demand feature module installs.
///
/// This singleton is injected via `app.manage(Arc::new(InstallBroker::new(...)))`.
pub struct InstallBroker {
    service: Arc<dyn InstallService>,
    default_module: String,
    state: Mutex<BrokerState>,
    events: broadcast::Sender<InstallSessionSnapshot>,
}

impl InstallBroker {
    /// Create a new InstallBroker.
    ///
    /// # Arguments
    ///
    /// * `service` - Platform install service that delivers modules
    /// * `default_module` - Module used when a caller names none
    pub fn new(service: Arc<dyn InstallService>, default_module: String) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            service,
            default_module,
            state: Mutex::new(BrokerState::default()),
            events,
        }
    }

    /// Pick the caller's module name or fall back to the configured default.
    pub fn resolve_module_name(&self, module_name: Option<String>) -> String {
        match module_name {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.default_module.clone(),
        }
    }

    /// Subscribe to session status changes.
    pub fn subscribe(&self) -> broadcast::Receiver<InstallSessionSnapshot> {
        self.events.subscribe()
    }

    /// Check whether a module is installed.
    ///
    /// Consults the registry first, then the platform, so modules installed
    /// outside the broker are picked up. Never fails; invalid names are
    /// simply not installed.
    pub async fn is_installed(&self, module_name: &str) -> bool {
        if validate_module_name(module_name).is_err() {
            return false;
        }

        let mut state = self.state.lock().await;
        if state.registry.is_installed(module_name) {
            return true;
        }

        let installed = self.service.installed_modules().await;
        let found = installed.contains(module_name);
        state.registry.extend(installed);
        found
    }

    /// Request installation of a module.
    ///
    /// # Returns
    ///
    /// An `InstallHandle` that is either already resolved (module installed,
    /// platform refused to start) or attached to an active session. Fails only
    /// when the module name is invalid.
    pub async fn request_install(&self, module_name: &str) -> Result<InstallHandle, ApiError> {
        validate_module_name(module_name)?;

        let mut state = self.state.lock().await;

        if state.registry.is_installed(module_name) {
            log::debug!("Module already installed: module={module_name}");
            return Ok(InstallHandle::resolved(
                module_name.to_string(),
                Ok(InstallOutcome::AlreadyInstalled),
            ));
        }

        let existing = state.by_module.get(module_name).copied();
        if let Some(session_id) = existing {
            if let Some(active) = state.sessions.get_mut(&session_id) {
                let (tx, rx) = oneshot::channel();
                active.waiters.push(tx);
                log::info!(
                    "Attached to in-flight install: module={module_name}, session_id={session_id}, waiters={}",
                    active.waiters.len()
                );
                return Ok(InstallHandle {
                    module_name: module_name.to_string(),
                    session_id: Some(session_id),
                    rx,
                });
            }
        }

        let installed = self.service.installed_modules().await;
        let found = installed.contains(module_name);
        state.registry.extend(installed);
        if found {
            log::debug!("Module installed outside the broker: module={module_name}");
            return Ok(InstallHandle::resolved(
                module_name.to_string(),
                Ok(InstallOutcome::AlreadyInstalled),
            ));
        }

        let platform_session_id = match self.service.start_install(module_name).await {
            Ok(platform_session_id) => platform_session_id,
            Err(e) => {
                log::error!("Failed to start install: module={module_name}, error={e}");
                let error = match e {
                    ApiError::InstallStartFailed { .. } => e,
                    other => ApiError::InstallStartFailed {
                        module_name: module_name.to_string(),
                        message: other.to_string(),
                    },
                };
                return Ok(InstallHandle::resolved(module_name.to_string(), Err(error)));
            }
        };

        if let Some(owner) = state.by_platform_id.get(&platform_session_id).copied() {
            log::error!(
                "Platform reused a tracked session id: module={module_name}, platform_session_id={platform_session_id}, owner_session_id={owner}"
            );
            return Ok(InstallHandle::resolved(
                module_name.to_string(),
                Err(ApiError::InstallStartFailed {
                    module_name: module_name.to_string(),
                    message: format!(
                        "Platform session id {platform_session_id} is already in use by another install"
                    ),
                }),
            ));
        }

        let session_id = state.allocate_session_id();
        let session = InstallSession::new(session_id, module_name.to_string());
        let snapshot = session.snapshot();
        let (tx, rx) = oneshot::channel();
        state.sessions.insert(
            session_id,
            ActiveSession {
                session,
                platform_session_id,
                waiters: vec![tx],
            },
        );
        state.by_module.insert(module_name.to_string(), session_id);
        state.by_platform_id.insert(platform_session_id, session_id);

        log::info!(
            "Install session started: module={module_name}, session_id={session_id}, platform_session_id={platform_session_id}"
        );
        self.publish(snapshot);
        drop(state);

        Ok(InstallHandle {
            module_name: module_name.to_string(),
            session_id: Some(session_id),
            rx,
        })
    }

    /// Apply a state update reported by the platform.
    ///
    /// `update.session_id` is the platform's id. Updates for sessions this
    /// broker does not track are ignored.
    pub async fn handle_state_update(&self, update: SessionStateUpdate) {
        let mut state = self.state.lock().await;

        let platform_session_id = update.session_id;
        let Some(session_id) = state.by_platform_id.get(&platform_session_id).copied() else {
            log::debug!(
                "Ignoring update for untracked session: platform_session_id={platform_session_id}, status={:?}",
                update.status
            );
            return;
        };
        let Some(active) = state.sessions.get_mut(&session_id) else {
            return;
        };

        match active.session.advance(&update) {
            Ok(()) => {}
            Err(TransitionRejected::Unchanged(status)) => {
                log::trace!("Repeated status: session_id={session_id}, status={status:?}");
                return;
            }
            Err(rejected) => {
                log::warn!(
                    "Ignoring out-of-order update: session_id={session_id}, rejected={rejected:?}"
                );
                return;
            }
        }

        let snapshot = active.session.snapshot();
        if !active.session.is_terminal() {
            log::debug!(
                "Install progress: module={}, session_id={session_id}, status={:?}",
                snapshot.module_name,
                snapshot.status
            );
            self.publish(snapshot);
            return;
        }

        let Some(finished) = state.retire(session_id) else {
            return;
        };
        let module_name = finished.session.module_name().to_string();

        let result = match finished.session.status() {
            SessionStatus::Installed => {
                state.registry.mark_installed(&module_name);
                log::info!(
                    "Module installed: module={module_name}, session_id={session_id}, waiters={}",
                    finished.waiters.len()
                );
                Ok(InstallOutcome::Installed)
            }
            _ => {
                log::error!(
                    "Module install failed: module={module_name}, session_id={session_id}, error_code={:?}",
                    finished.session.error_code()
                );
                Err(ApiError::InstallFailed {
                    module_name: module_name.clone(),
                    session_id,
                    error_code: finished.session.error_code(),
                })
            }
        };
        self.publish(snapshot);
        drop(state);

        for waiter in finished.waiters {
            // Receiver gone means the caller stopped waiting
            let _ = waiter.send(result.clone());
        }
    }

    /// Drain platform updates until the sending side closes.
    pub async fn run_update_listener(
        self: Arc<Self>,
        mut updates: mpsc::UnboundedReceiver<SessionStateUpdate>,
    ) {
        while let Some(update) = updates.recv().await {
            self.handle_state_update(update).await;
        }
        log::debug!("Session update channel closed");
    }

    /// Snapshots of sessions that have not reached a terminal status.
    pub async fn active_sessions(&self) -> Vec<InstallSessionSnapshot> {
        let state = self.state.lock().await;
        let mut sessions: Vec<_> = state
            .sessions
            .values()
            .map(|active| active.session.snapshot())
            .collect();
        sessions.sort_by_key(|s| s.session_id);
        sessions
    }

    /// Broadcast a snapshot; callers hold the state lock.
    fn publish(&self, snapshot: InstallSessionSnapshot) {
        // No subscribers is fine
        let _ = self.events.send(snapshot);
    }
}
