//! URL Command

use anyhow::{bail, Result};
use clap::Parser;
use std::sync::Arc;
use vmdesk_common::{ConnectionKind, Error, KvStore};
use vmdesk_session::access::denial_message;
use vmdesk_session::credentials::CredentialVault;
use vmdesk_session::transport::connection_url;
use vmdesk_session::ws::redact;
use vmdesk_session::SessionConfig;

use crate::terminal::TerminalPrompts;

#[derive(Parser)]
pub struct UrlArgs {
    /// VM code
    pub code: String,

    /// Print the password instead of masking it
    #[arg(long)]
    pub show_password: bool,
}

pub async fn execute(args: UrlArgs, config: &SessionConfig) -> Result<()> {
    let catalog = super::fetch_catalog(config).await?;
    let vm = catalog
        .get(&args.code)
        .cloned()
        .ok_or_else(|| Error::NotFound {
            kind: "VM".to_string(),
            id: args.code.clone(),
        })?;

    if let Some(message) = denial_message(&vm) {
        bail!(message);
    }

    match &vm.connection {
        ConnectionKind::Embedded { url } => println!("{}", url),
        ConnectionKind::RemoteDesktop { host, port, path } => {
            let store = KvStore::open(&config.store_path)?;
            let vault = CredentialVault::new(store, Arc::new(TerminalPrompts));
            let password = vault.resolve(&vm).await?;

            let url = connection_url(config, host, *port, path, &password)?;
            if args.show_password {
                println!("{}", url);
            } else {
                println!("{}", redact(&url));
            }
        }
    }

    Ok(())
}
