//! Rules acceptance gate
//!
//! Acceptance is stored per VM in two forms: a legacy `rules_agreed:<code>`
//! flag and a timestamped `rules_accepted_at:<code>` record. The timestamp is
//! authoritative; the flag alone only satisfies VMs without a rules timeout.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vmdesk_common::store::{GLOBAL_RULES_SEEN_KEY, RULES_ACCEPTED_AT_PREFIX, RULES_AGREED_PREFIX};
use vmdesk_common::{KvStore, Result, VmDescriptor};

use crate::catalog::SharedCatalog;
use crate::clock::Clock;
use crate::ui::{ConsentChoice, Prompts};

/// Persisted acceptance for one VM
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsentRecord {
    pub accepted_at: Option<DateTime<Utc>>,
    /// Legacy "has agreed, ever" flag
    pub legacy_agreed: bool,
}

/// What the caller should do after the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentOutcome {
    /// Continue with the requested VM
    Proceed,
    /// Rules were declined; retry entry on this VM instead
    Redirect(String),
    /// Rules were declined and nothing else qualifies
    NoAlternative,
}

pub struct ConsentGate {
    store: KvStore,
    clock: Arc<dyn Clock>,
    prompts: Arc<dyn Prompts>,
}

impl ConsentGate {
    pub fn new(store: KvStore, clock: Arc<dyn Clock>, prompts: Arc<dyn Prompts>) -> Self {
        Self {
            store,
            clock,
            prompts,
        }
    }

    /// Load the stored record. Unreadable entries count as absent.
    pub fn record(&self, code: &str) -> ConsentRecord {
        let accepted_at = match self.store.get(&format!("{}{}", RULES_ACCEPTED_AT_PREFIX, code)) {
            Ok(Some(raw)) => DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| warn!("Corrupt consent timestamp for {}: {}", code, e))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read consent for {}: {}", code, e);
                None
            }
        };
        let legacy_agreed = matches!(
            self.store.get(&format!("{}{}", RULES_AGREED_PREFIX, code)),
            Ok(Some(ref v)) if v == "true"
        );

        ConsentRecord {
            accepted_at,
            legacy_agreed,
        }
    }

    /// Whether the VM can be entered without showing its rules.
    pub fn is_satisfied(&self, vm: &VmDescriptor) -> bool {
        if vm.always_read_rules {
            return false;
        }
        if !vm.requires_agreement() {
            return true;
        }

        let record = self.record(&vm.code);
        match (record.accepted_at, vm.rules_timeout) {
            (Some(_), None) => true,
            (Some(at), Some(timeout)) => {
                let elapsed = self.clock.now().signed_duration_since(at);
                match chrono::Duration::from_std(timeout) {
                    Ok(limit) => elapsed < limit,
                    Err(_) => true,
                }
            }
            (None, None) => record.legacy_agreed,
            (None, Some(_)) => false,
        }
    }

    /// Persist acceptance as of now, in both forms.
    pub fn record_acceptance(&self, code: &str) -> Result<()> {
        let now = self.clock.now();
        self.store
            .set(&format!("{}{}", RULES_AGREED_PREFIX, code), "true")?;
        self.store
            .set(&format!("{}{}", RULES_ACCEPTED_AT_PREFIX, code), &now.to_rfc3339())?;
        debug!("Recorded rules acceptance for {} at {}", code, now);
        Ok(())
    }

    /// Show the rules if needed and decide how entry continues.
    pub async fn require_agreement(
        &self,
        vm: &VmDescriptor,
        catalog: &SharedCatalog,
        force_show: bool,
    ) -> ConsentOutcome {
        let needs_prompt = force_show || (vm.requires_agreement() && !self.is_satisfied(vm));
        if !needs_prompt {
            return ConsentOutcome::Proceed;
        }

        match self.prompts.show_rules(vm).await {
            ConsentChoice::Agreed => {
                if let Err(e) = self.record_acceptance(&vm.code) {
                    warn!("Failed to persist rules acceptance for {}: {}", vm.code, e);
                }
                ConsentOutcome::Proceed
            }
            ConsentChoice::Declined if !vm.requires_agreement() => ConsentOutcome::Proceed,
            ConsentChoice::Declined => {
                let alternative = catalog
                    .read()
                    .alternative_for(&vm.code, |other| self.is_satisfied(other));
                match alternative {
                    Some(code) => {
                        info!("Rules for {} declined, routing to {}", vm.code, code);
                        ConsentOutcome::Redirect(code)
                    }
                    None => {
                        info!("Rules for {} declined, no alternative available", vm.code);
                        ConsentOutcome::NoAlternative
                    }
                }
            }
        }
    }

    pub fn global_rules_seen(&self) -> bool {
        matches!(self.store.get(GLOBAL_RULES_SEEN_KEY), Ok(Some(ref v)) if v == "true")
    }

    pub fn mark_global_rules_seen(&self) -> Result<()> {
        self.store.set(GLOBAL_RULES_SEEN_KEY, "true")
    }
}
