//! vmdesk session core
//!
//! Catalog ingestion, access and rules gates, credential resolution, and the
//! connection lifecycle for remote-desktop VM sessions. Rendering and the wire
//! protocol stay outside; they plug in through [`ui`] and [`transport`].

pub mod access;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod consent;
pub mod controller;
pub mod credentials;
pub mod emergency;
pub mod events;
pub mod fetch;
pub mod refresh;
pub mod scheduler;
pub mod transport;
pub mod ui;
pub mod ws;

pub use catalog::{CatalogStore, SharedCatalog};
pub use config::SessionConfig;
pub use controller::{SessionController, SessionDeps, SwitchOutcome};
pub use emergency::EmergencyOutcome;
pub use events::SessionEvent;
pub use fetch::{CatalogFetcher, HttpCatalogFetcher};
pub use refresh::{ListRefreshScheduler, RefreshOutcome};
pub use transport::{TransportConnector, TransportEvent, TransportHandle, TransportStatus};
pub use ui::{ConsentChoice, PasswordPrompt, Prompts, Surface};
