//! Session configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HTTP API root; the catalog lives at `<api_root>/list` and the
    /// transport path is appended to its path component
    pub api_root: String,

    /// Origin reported to the transport endpoint
    pub origin: String,

    /// Username reported to the transport endpoint
    pub username: String,

    /// Local cache database path
    pub store_path: PathBuf,

    /// Timer configuration
    pub timing: TimingConfig,

    /// Who is looking at the catalog
    pub viewer: ViewerConfig,

    /// Start-up selection
    pub spawn: SpawnConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_root: "https://vms.example.net/api".to_string(),
            origin: "https://vms.example.net".to_string(),
            username: "anonymous".to_string(),
            store_path: vmdesk_common::default_db_path(),
            timing: TimingConfig::default(),
            viewer: ViewerConfig::default(),
            spawn: SpawnConfig::default(),
        }
    }
}

/// Timer configuration. All values are milliseconds on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(with = "millis")]
    pub refresh_interval: Duration,

    #[serde(with = "millis")]
    pub fetch_timeout: Duration,

    #[serde(with = "millis")]
    pub reconnect_delay: Duration,

    /// Pause between tearing down the old transport and opening the new one
    #[serde(with = "millis")]
    pub settle_delay: Duration,

    /// Retry delay while the catalog has not loaded yet
    #[serde(with = "millis")]
    pub surface_retry_delay: Duration,

    #[serde(with = "millis")]
    pub thumbnail_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(8),
            reconnect_delay: Duration::from_secs(3),
            settle_delay: Duration::from_millis(400),
            surface_retry_delay: Duration::from_millis(500),
            thumbnail_interval: Duration::from_secs(30),
        }
    }
}

impl TimingConfig {
    /// Periods and the fetch timeout must be non-zero.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("refresh_interval", self.refresh_interval),
            ("thumbnail_interval", self.thumbnail_interval),
            ("fetch_timeout", self.fetch_timeout),
        ] {
            if value.is_zero() {
                anyhow::bail!("timing.{} must be greater than zero", name);
            }
        }
        Ok(())
    }
}

/// Catalog visibility context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Moderators see hidden entries
    pub is_moderator: bool,

    /// Identity used to match self-hosted VM owners
    pub identity: Option<String>,

    /// Moderator overlay endpoint, fetched alongside the catalog
    pub overlay_url: Option<String>,
}

/// Start-up selection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Always start on this code when no deep link matches
    pub code: Option<String>,
}

impl SessionConfig {
    /// Load configuration from file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.timing.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Catalog endpoint
    pub fn list_url(&self) -> String {
        format!("{}/list", self.api_root.trim_end_matches('/'))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
