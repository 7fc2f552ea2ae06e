//! Core types for vmdesk

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::timeout::{parse_rules_timeout, seconds_to_duration};
use crate::{Error, Result};

/// Default port for remote-desktop connections
pub const DEFAULT_PORT: u16 = 443;

/// How a VM is reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionKind {
    /// An embedded page; no protocol handshake
    Embedded { url: String },
    /// A remote-desktop endpoint reached over a WebSocket transport
    RemoteDesktop { host: String, port: u16, path: String },
}

/// Which password to hand to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PasswordPolicy {
    Fixed(String),
    ManualEntry,
    None,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::None
    }
}

/// Visibility and access flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessFlags {
    pub is_private: bool,
    pub is_online: bool,
    pub is_blacklisted: bool,
    pub blacklist_reason: Option<String>,
    pub is_admin_disabled: bool,
    pub is_hidden: bool,
}

/// Normalized catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmDescriptor {
    pub code: String,
    pub name: String,
    pub icon: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub connection: ConnectionKind,
    pub password_policy: PasswordPolicy,
    #[serde(default)]
    pub rules: Vec<String>,
    pub prompt: Option<String>,
    #[serde(default)]
    pub always_read_rules: bool,
    pub rules_timeout: Option<Duration>,
    pub access: AccessFlags,
    /// Identity of the self-host owner, if any
    pub owner: Option<String>,
}

impl VmDescriptor {
    /// Blacklisted or admin-disabled VMs are never connectable.
    pub fn is_connectable(&self) -> bool {
        !self.access.is_blacklisted && !self.access.is_admin_disabled
    }

    /// Password-protected VMs count as locked for auto-spawn purposes.
    pub fn is_locked(&self) -> bool {
        matches!(self.password_policy, PasswordPolicy::ManualEntry)
    }

    /// Whether anything must be acknowledged before connecting.
    pub fn requires_agreement(&self) -> bool {
        !self.rules.is_empty() || self.prompt.is_some() || self.always_read_rules
    }

    /// Eligible for random auto-spawn.
    pub fn is_spawnable(&self) -> bool {
        self.is_connectable()
            && !self.is_locked()
            && !self.access.is_private
            && self.access.is_online
    }
}

/// `password` as it appears on the wire: a literal value or a manual-entry flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PasswordField {
    Manual(bool),
    Value(String),
}

/// `rulesTimeout` as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeoutField {
    Text(String),
    Minutes(f64),
}

/// A partial VM record as published by the catalog or the moderator overlay.
///
/// Every field is optional so two sources can be merged with [`VmRecord::overlay`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmRecord {
    pub code: Option<String>,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub categories: Option<Vec<String>>,
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub password: Option<PasswordField>,
    pub rules: Option<Vec<String>>,
    pub prompt: Option<String>,
    pub always_read_rules: Option<bool>,
    pub rules_timeout: Option<TimeoutField>,
    pub private: Option<bool>,
    pub online: Option<bool>,
    pub blacklisted: Option<bool>,
    pub blacklist_reason: Option<String>,
    pub admin_disabled: Option<bool>,
    pub hidden: Option<bool>,
    pub owner: Option<String>,
}

fn pick<T: Clone>(over: &Option<T>, base: &Option<T>) -> Option<T> {
    over.clone().or_else(|| base.clone())
}

impl VmRecord {
    /// Field-by-field merge: every field set on `over` wins. Neither input is modified.
    pub fn overlay(&self, over: &VmRecord) -> VmRecord {
        VmRecord {
            code: pick(&over.code, &self.code),
            name: pick(&over.name, &self.name),
            icon: pick(&over.icon, &self.icon),
            categories: pick(&over.categories, &self.categories),
            url: pick(&over.url, &self.url),
            host: pick(&over.host, &self.host),
            port: pick(&over.port, &self.port),
            path: pick(&over.path, &self.path),
            password: pick(&over.password, &self.password),
            rules: pick(&over.rules, &self.rules),
            prompt: pick(&over.prompt, &self.prompt),
            always_read_rules: pick(&over.always_read_rules, &self.always_read_rules),
            rules_timeout: pick(&over.rules_timeout, &self.rules_timeout),
            private: pick(&over.private, &self.private),
            online: pick(&over.online, &self.online),
            blacklisted: pick(&over.blacklisted, &self.blacklisted),
            blacklist_reason: pick(&over.blacklist_reason, &self.blacklist_reason),
            admin_disabled: pick(&over.admin_disabled, &self.admin_disabled),
            hidden: pick(&over.hidden, &self.hidden),
            owner: pick(&over.owner, &self.owner),
        }
    }

    /// The code this record is keyed by: explicit `code`, else the last path segment.
    pub fn resolve_code(&self, path: &str) -> Option<String> {
        if let Some(code) = self.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            return Some(code.to_string());
        }
        path.trim_end_matches('/')
            .rsplit('/')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Produce a normalized descriptor.
    pub fn normalize(&self, path: &str) -> Result<VmDescriptor> {
        let code = self
            .resolve_code(path)
            .ok_or_else(|| Error::CatalogInvalid(format!("entry {} has no code", path)))?;

        let connection = match (&self.url, &self.host) {
            (Some(url), _) if !url.trim().is_empty() => ConnectionKind::Embedded { url: url.clone() },
            (_, Some(host)) if !host.trim().is_empty() => ConnectionKind::RemoteDesktop {
                host: host.trim().to_string(),
                port: self.port.unwrap_or(DEFAULT_PORT),
                path: normalize_path(self.path.as_deref().unwrap_or("")),
            },
            _ => {
                return Err(Error::CatalogInvalid(format!(
                    "entry {} has neither url nor host",
                    code
                )))
            }
        };

        let password_policy = match &self.password {
            Some(PasswordField::Manual(true)) => PasswordPolicy::ManualEntry,
            Some(PasswordField::Value(v)) if !v.is_empty() => PasswordPolicy::Fixed(v.clone()),
            _ => PasswordPolicy::None,
        };

        let rules_timeout = match &self.rules_timeout {
            Some(TimeoutField::Text(s)) => parse_rules_timeout(s),
            Some(TimeoutField::Minutes(m)) => seconds_to_duration(m * 60.0),
            None => None,
        };

        Ok(VmDescriptor {
            name: self
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| code.clone()),
            icon: self.icon.clone(),
            categories: self.categories.clone().unwrap_or_default(),
            connection,
            password_policy,
            rules: self
                .rules
                .clone()
                .unwrap_or_default()
                .into_iter()
                .filter(|r| !r.trim().is_empty())
                .collect(),
            prompt: self.prompt.clone().filter(|p| !p.trim().is_empty()),
            always_read_rules: self.always_read_rules.unwrap_or(false),
            rules_timeout,
            access: AccessFlags {
                is_private: self.private.unwrap_or(false),
                is_online: self.online.unwrap_or(true),
                is_blacklisted: self.blacklisted.unwrap_or(false),
                blacklist_reason: self.blacklist_reason.clone(),
                is_admin_disabled: self.admin_disabled.unwrap_or(false),
                is_hidden: self.hidden.unwrap_or(false),
            },
            owner: self.owner.clone(),
            code,
        })
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    Banned,
    EmergencyMode,
}

impl Default for SessionPhase {
    fn default() -> Self {
        Self::Idle
    }
}

impl SessionPhase {
    /// Banned and EmergencyMode end the controller's life.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Banned | SessionPhase::EmergencyMode)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Connecting => write!(f, "connecting"),
            SessionPhase::Connected => write!(f, "connected"),
            SessionPhase::Disconnected => write!(f, "disconnected"),
            SessionPhase::Reconnecting => write!(f, "reconnecting"),
            SessionPhase::Banned => write!(f, "banned"),
            SessionPhase::EmergencyMode => write!(f, "emergency"),
        }
    }
}

/// Startup spawn preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnPreference {
    Random,
    Default,
}

impl Default for SpawnPreference {
    fn default() -> Self {
        Self::Random
    }
}

impl std::str::FromStr for SpawnPreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "random" => Ok(SpawnPreference::Random),
            "default" => Ok(SpawnPreference::Default),
            other => Err(Error::InvalidConfig(format!("unknown spawn preference: {}", other))),
        }
    }
}

impl std::fmt::Display for SpawnPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpawnPreference::Random => write!(f, "random"),
            SpawnPreference::Default => write!(f, "default"),
        }
    }
}
