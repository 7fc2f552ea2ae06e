//! List Command

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use vmdesk_common::{ConnectionKind, PasswordPolicy, VmDescriptor};
use vmdesk_session::access::denial_message;
use vmdesk_session::SessionConfig;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Parser)]
pub struct ListArgs {
    /// Only VMs in this category
    #[arg(short, long)]
    pub category: Option<String>,

    /// Include VMs that cannot be connected to
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct VmRow {
    pub code: String,
    pub name: String,
    pub kind: String,
    pub password: String,
    pub rules: bool,
    pub access: String,
}

impl From<&VmDescriptor> for VmRow {
    fn from(vm: &VmDescriptor) -> Self {
        let kind = match &vm.connection {
            ConnectionKind::Embedded { .. } => "embedded".to_string(),
            ConnectionKind::RemoteDesktop { host, port, .. } => format!("{}:{}", host, port),
        };
        let password = match &vm.password_policy {
            PasswordPolicy::Fixed(_) => "fixed",
            PasswordPolicy::ManualEntry => "manual",
            PasswordPolicy::None => "none",
        };
        Self {
            code: vm.code.clone(),
            name: vm.name.clone(),
            kind,
            password: password.to_string(),
            rules: vm.requires_agreement(),
            access: access_label(vm),
        }
    }
}

fn access_label(vm: &VmDescriptor) -> String {
    if denial_message(vm).is_some() {
        if vm.access.is_admin_disabled {
            return "disabled".to_string();
        }
        return "blacklisted".to_string();
    }
    if !vm.access.is_online {
        return "offline".to_string();
    }
    if vm.access.is_private {
        return "private".to_string();
    }
    "open".to_string()
}

impl TableDisplay for VmRow {
    fn headers() -> Vec<&'static str> {
        vec!["Code", "Name", "Connection", "Password", "Rules", "Access"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.code.clone(),
            self.name.clone(),
            self.kind.clone(),
            self.password.clone(),
            if self.rules { "yes" } else { "-" }.to_string(),
            self.access.clone(),
        ]
    }
}

pub async fn execute(args: ListArgs, config: &SessionConfig, format: OutputFormat) -> Result<()> {
    let catalog = super::fetch_catalog(config).await?;

    let rows: Vec<VmRow> = catalog
        .iter()
        .filter(|vm| args.all || vm.is_connectable())
        .filter(|vm| {
            args.category
                .as_ref()
                .map_or(true, |c| vm.categories.iter().any(|vc| vc.eq_ignore_ascii_case(c)))
        })
        .map(VmRow::from)
        .collect();

    print_list(&rows, format);
    Ok(())
}
