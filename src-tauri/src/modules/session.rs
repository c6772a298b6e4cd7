//! InstallSession - one in-flight install request for a feature module.

use crate::api::types::{InstallSessionSnapshot, SessionId, SessionStatus};

/// State change reported by the platform install service.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStateUpdate {
    /// Session id as reported by the platform
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub error_code: Option<i32>,
    pub bytes_downloaded: Option<u64>,
    pub total_bytes: Option<u64>,
}

impl SessionStateUpdate {
    pub fn new(session_id: SessionId, status: SessionStatus) -> Self {
        Self {
            session_id,
            status,
            error_code: None,
            bytes_downloaded: None,
            total_bytes: None,
        }
    }

    pub fn failed(session_id: SessionId, error_code: i32) -> Self {
        Self {
            error_code: Some(error_code),
            ..Self::new(session_id, SessionStatus::Failed)
        }
    }

    pub fn downloading(session_id: SessionId, bytes_downloaded: u64, total_bytes: u64) -> Self {
        Self {
            bytes_downloaded: Some(bytes_downloaded),
            total_bytes: Some(total_bytes),
            ..Self::new(session_id, SessionStatus::Downloading)
        }
    }
}

/// Why an update was not applied to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRejected {
    /// The session already reached `Installed` or `Failed`
    AlreadyTerminal(SessionStatus),
    /// The update repeats the current status
    Unchanged(SessionStatus),
    /// The update would move the session backwards
    Regression {
        from: SessionStatus,
        to: SessionStatus,
    },
}

#[derive(Debug, Clone)]
pub struct InstallSession {
    session_id: SessionId,
    module_name: String,
    status: SessionStatus,
    error_code: Option<i32>,
    bytes_downloaded: Option<u64>,
    total_bytes: Option<u64>,
}

impl InstallSession {
    pub fn new(session_id: SessionId, module_name: String) -> Self {
        Self {
            session_id,
            module_name,
            status: SessionStatus::Pending,
            error_code: None,
            bytes_downloaded: None,
            total_bytes: None,
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn error_code(&self) -> Option<i32> {
        self.error_code
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a platform update if it moves the session forward.
    ///
    /// Repeated `Downloading` reports are accepted and refresh progress.
    pub fn advance(&mut self, update: &SessionStateUpdate) -> Result<(), TransitionRejected> {
        if self.is_terminal() {
            return Err(TransitionRejected::AlreadyTerminal(self.status));
        }

        let refresh = self.status == SessionStatus::Downloading
            && update.status == SessionStatus::Downloading;
        if !refresh && update.status == self.status {
            return Err(TransitionRejected::Unchanged(self.status));
        }
        if !refresh && update.status.rank() <= self.status.rank() {
            return Err(TransitionRejected::Regression {
                from: self.status,
                to: update.status,
            });
        }

        self.status = update.status;
        if update.bytes_downloaded.is_some() {
            self.bytes_downloaded = update.bytes_downloaded;
        }
        if update.total_bytes.is_some() {
            self.total_bytes = update.total_bytes;
        }
        if update.status == SessionStatus::Failed {
            self.error_code = update.error_code;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> InstallSessionSnapshot {
        InstallSessionSnapshot {
            session_id: self.session_id,
            module_name: self.module_name.clone(),
            status: self.status,
            error_code: self.error_code,
            bytes_downloaded: self.bytes_downloaded.map(|b| b as f64),
            total_bytes: self.total_bytes.map(|b| b as f64),
        }
    }
}
