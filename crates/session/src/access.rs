//! Connection vetoes: blacklist, admin-disabled and ban

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use vmdesk_common::{Error, Result, VmDescriptor};

use crate::ui::Prompts;

/// Blacklist reason that means "only approved users"
pub const WHITELIST_REASON: &str = "whitelist";

/// Query parameter carrying a ban signal
pub const BAN_QUERY_PARAM: &str = "banned";

pub struct AccessGuard {
    prompts: Arc<dyn Prompts>,
    query_ban: bool,
    server_ban: AtomicBool,
}

impl AccessGuard {
    /// `navigation_query` is the query string the session was opened with,
    /// with or without the leading `?`.
    pub fn new(prompts: Arc<dyn Prompts>, navigation_query: &str) -> Self {
        let query_ban = query_has_ban(navigation_query);
        if query_ban {
            warn!("Ban signal present in navigation query");
        }
        Self {
            prompts,
            query_ban,
            server_ban: AtomicBool::new(false),
        }
    }

    /// Pass unless the VM is blacklisted or admin-disabled, in which case
    /// the reason is shown to the user.
    pub async fn check_blacklist(&self, vm: &VmDescriptor) -> Result<()> {
        let Some(message) = denial_message(vm) else {
            return Ok(());
        };
        info!("Access to {} denied: {}", vm.code, message);
        self.prompts.show_blacklist_notice(vm, &message).await;
        Err(Error::AccessDenied {
            code: vm.code.clone(),
            reason: message,
        })
    }

    /// Terminal until restart once true.
    pub fn check_ban(&self) -> bool {
        self.query_ban || self.server_ban.load(Ordering::SeqCst)
    }

    /// Record a ban pushed by the server
    pub fn mark_banned_by_server(&self) {
        if !self.server_ban.swap(true, Ordering::SeqCst) {
            warn!("Server reported this session as banned");
        }
    }
}

/// Text for the blacklist dialog, or `None` when access is allowed.
pub fn denial_message(vm: &VmDescriptor) -> Option<String> {
    if vm.access.is_admin_disabled {
        return Some(format!("{} has been disabled by an administrator.", vm.name));
    }
    if !vm.access.is_blacklisted {
        return None;
    }
    Some(match vm.access.blacklist_reason.as_deref().map(str::trim) {
        Some(WHITELIST_REASON) => format!(
            "{} is whitelist-only. Only approved users can connect to it.",
            vm.name
        ),
        Some(reason) if !reason.is_empty() => {
            format!("{} has been blacklisted. Reason: {}", vm.name, reason)
        }
        _ => format!("{} has been blacklisted.", vm.name),
    })
}

fn query_has_ban(query: &str) -> bool {
    let query = query.trim_start_matches('?');
    url::form_urlencoded::parse(query.as_bytes()).any(|(key, value)| {
        key == BAN_QUERY_PARAM && !matches!(value.as_ref(), "0" | "false")
    })
}
