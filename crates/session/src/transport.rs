//! Remote-desktop transport seam
//!
//! The core never speaks the wire protocol. It hands a connection URL to a
//! [`TransportConnector`] and listens to the events the resulting handle
//! reports.

use tokio::sync::mpsc;
use url::Url;
use vmdesk_common::{Error, Result};

use crate::config::SessionConfig;

/// Events reported by a live transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    /// `clean` is false when the connection dropped rather than closed
    Disconnected { clean: bool },
    CredentialsRequired,
}

/// What a handle reports about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Connecting,
    Connected,
    Closed,
}

impl TransportStatus {
    pub fn is_live(&self) -> bool {
        !matches!(self, TransportStatus::Closed)
    }
}

/// Where a handle sends its events
pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

/// An open transport connection
pub trait TransportHandle: Send + Sync {
    fn status(&self) -> TransportStatus;

    /// Answer a credentials request
    fn send_credentials(&self, password: &str);

    /// Close the connection. Must not report further events.
    fn close(&self);
}

/// Opens transport handles
pub trait TransportConnector: Send + Sync {
    fn open(&self, url: &Url, events: EventSink) -> Result<Box<dyn TransportHandle>>;
}

/// Build `<ws|wss>://<host><api-root><path>?password=..&origin=..&username=..`.
///
/// Port 443 selects `wss` and is left implicit; any other port selects `ws`
/// and is written out.
pub fn connection_url(
    config: &SessionConfig,
    host: &str,
    port: u16,
    path: &str,
    password: &str,
) -> Result<Url> {
    let api_path = Url::parse(&config.api_root)
        .map(|u| u.path().trim_end_matches('/').to_string())
        .map_err(|e| Error::InvalidConfig(format!("api_root {}: {}", config.api_root, e)))?;

    let (scheme, authority) = if port == 443 {
        ("wss", host.to_string())
    } else {
        ("ws", format!("{}:{}", host, port))
    };

    let mut url = Url::parse(&format!("{}://{}{}{}", scheme, authority, api_path, path))
        .map_err(|e| Error::InvalidConfig(format!("bad connection url for {}: {}", host, e)))?;

    url.query_pairs_mut()
        .append_pair("password", password)
        .append_pair("origin", &config.origin)
        .append_pair("username", &config.username);

    Ok(url)
}
