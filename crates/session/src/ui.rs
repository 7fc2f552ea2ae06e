//! Collaborator interfaces implemented by the surrounding UI
//!
//! The core never renders anything. Modal prompts are awaitable and return a
//! discriminated result; everything else is fire-and-forget.

use async_trait::async_trait;
use vmdesk_common::VmDescriptor;

/// Result of the manual password prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordPrompt {
    Provided(String),
    Cancelled,
}

/// Result of the rules prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentChoice {
    Agreed,
    Declined,
}

/// Blocking modal prompts
#[async_trait]
pub trait Prompts: Send + Sync {
    /// Ask the user for the password of a manual-entry VM
    async fn request_password(&self, vm: &VmDescriptor) -> PasswordPrompt;

    /// Show the VM's rules and prompt, wait for Agree or Decline
    async fn show_rules(&self, vm: &VmDescriptor) -> ConsentChoice;

    /// Show why a VM is blacklisted and wait for dismissal
    async fn show_blacklist_notice(&self, vm: &VmDescriptor, message: &str);
}

/// Non-modal display surface
pub trait Surface: Send + Sync {
    /// Whether the catalog browser is open; refresh ticks are skipped while it is
    fn catalog_browser_open(&self) -> bool;

    /// Present when running inside a host page that owns its own realtime channel
    fn integration_marker_present(&self) -> bool;

    /// Blank the remote-desktop view before a switch
    fn clear_display(&self);

    /// Show a dismissable notice
    fn show_notice(&self, message: &str);

    /// Show a non-blocking error banner
    fn show_error_banner(&self, message: &str);

    /// Switch the page into presence/chat-only mode
    fn activate_fallback(&self);
}
