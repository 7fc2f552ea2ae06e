//! vmdesk CLI
//!
//! Terminal front end for browsing the VM catalog and running sessions.

pub mod commands;
pub mod output;
pub mod terminal;
