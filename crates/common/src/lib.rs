//! vmdesk Common Library
//!
//! Shared types, errors and local storage for the vmdesk session manager.

pub mod error;
pub mod store;
pub mod timeout;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use store::KvStore;
pub use timeout::{format_rules_timeout, parse_rules_timeout};
pub use types::*;

/// vmdesk version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default state directory
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".vmdesk")
}

/// Default local cache database path
pub fn default_db_path() -> std::path::PathBuf {
    default_store_path().join("local.db")
}

/// Default configuration file path
pub fn default_config_path() -> std::path::PathBuf {
    default_store_path().join("config.toml")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
