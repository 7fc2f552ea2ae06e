//! Password resolution for VM connections

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vmdesk_common::store::PASSWORD_PREFIX;
use vmdesk_common::{Error, KvStore, PasswordPolicy, Result, VmDescriptor};

use crate::ui::{PasswordPrompt, Prompts};

/// Resolves and caches the password for each VM.
///
/// Manual entries live in a volatile map (per process) and in the local
/// store (survives restarts). The store is consulted before re-prompting.
pub struct CredentialVault {
    volatile: Mutex<HashMap<String, String>>,
    store: KvStore,
    prompts: Arc<dyn Prompts>,
}

impl CredentialVault {
    pub fn new(store: KvStore, prompts: Arc<dyn Prompts>) -> Self {
        Self {
            volatile: Mutex::new(HashMap::new()),
            store,
            prompts,
        }
    }

    /// Fails with `CredentialCancelled` only when the user cancels the
    /// password prompt.
    pub async fn resolve(&self, vm: &VmDescriptor) -> Result<String> {
        match &vm.password_policy {
            PasswordPolicy::Fixed(value) => Ok(value.clone()),
            PasswordPolicy::None => Ok(String::new()),
            PasswordPolicy::ManualEntry => {
                if let Some(cached) = self.cached(&vm.code) {
                    return Ok(cached);
                }

                debug!("Prompting for password of {}", vm.code);
                match self.prompts.request_password(vm).await {
                    PasswordPrompt::Provided(password) => {
                        self.remember(&vm.code, &password);
                        Ok(password)
                    }
                    PasswordPrompt::Cancelled => {
                        info!("Password entry cancelled for {}", vm.code);
                        Err(Error::CredentialCancelled(vm.code.clone()))
                    }
                }
            }
        }
    }

    /// Cached password without prompting. Promotes persisted entries into
    /// the volatile cache.
    pub fn cached(&self, code: &str) -> Option<String> {
        if let Some(pw) = self.volatile.lock().get(code) {
            return Some(pw.clone());
        }

        match self.store.get(&format!("{}{}", PASSWORD_PREFIX, code)) {
            Ok(Some(pw)) => {
                self.volatile.lock().insert(code.to_string(), pw.clone());
                Some(pw)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read stored password for {}: {}", code, e);
                None
            }
        }
    }

    /// Write a password to both caches
    pub fn remember(&self, code: &str, password: &str) {
        self.volatile.lock().insert(code.to_string(), password.to_string());
        if let Err(e) = self.store.set(&format!("{}{}", PASSWORD_PREFIX, code), password) {
            warn!("Failed to persist password for {}: {}", code, e);
        }
    }

    /// Clear both caches for a VM
    pub fn forget(&self, code: &str) {
        self.volatile.lock().remove(code);
        if let Err(e) = self.store.delete(&format!("{}{}", PASSWORD_PREFIX, code)) {
            warn!("Failed to delete stored password for {}: {}", code, e);
        }
        debug!("Forgot password for {}", code);
    }
}
