//! Session Secret Storage
//!
//! Holds the backup password for the lifetime of the process so that
//! scheduled backups do not have to prompt. Nothing here touches disk.

use std::sync::RwLock;

/// In-memory, process-scoped password holder
#[derive(Default)]
pub struct SessionSecretStore {
    password: RwLock<Option<String>>,
}

impl SessionSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a password for this session; empty passwords clear it
    pub fn set_password(&self, password: impl Into<String>) {
        let password = password.into();
        let mut guard = self.password.write().unwrap_or_else(|e| e.into_inner());
        *guard = (!password.is_empty()).then_some(password);
    }

    /// Forget the session password
    pub fn clear(&self) {
        let mut guard = self.password.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    /// Current session password, if one was set
    pub fn password(&self) -> Option<String> {
        self.password
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Explicit password if given, otherwise the session password
    pub fn resolve(&self, explicit: Option<String>) -> Option<String> {
        explicit.filter(|p| !p.is_empty()).or_else(|| self.password())
    }

    pub fn has_password(&self) -> bool {
        self.password
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for SessionSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSecretStore")
            .field("password", &if self.has_password() { "<redacted>" } else { "<unset>" })
            .finish()
    }
}
