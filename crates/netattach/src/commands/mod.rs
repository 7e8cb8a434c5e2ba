mod attach;
mod detach;
mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Subcommand};
use netattach_operations::providers::LocalBackend;
use netattach_operations::types::{InterfaceRequest, PodRef};
use netattach_operations::{Config, NetworkServices};

use crate::error::{CliError, Result};

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Attach a pod's interfaces to a tenant network, creating the network if needed
    Attach(AttachArgs),
    /// Detach a pod from a tenant network, removing the network once unused
    Detach(DetachArgs),
    /// Show tenant networks and attached interfaces
    Status,
}

#[derive(Args)]
pub(crate) struct AttachArgs {
    /// Pod as NAMESPACE/NAME
    #[arg(long, value_parser = parse_pod)]
    pod: PodRef,

    /// Tenant network name
    #[arg(long)]
    network: String,

    /// Tenant owning the network
    #[arg(long)]
    tenant: String,

    /// Interface as NAME or NAME=MAC; repeat for several interfaces
    #[arg(long = "interface", short = 'i', required = true, value_parser = parse_interface)]
    interfaces: Vec<InterfaceRequest>,
}

#[derive(Args)]
pub(crate) struct DetachArgs {
    /// Pod as NAMESPACE/NAME
    #[arg(long, value_parser = parse_pod)]
    pod: PodRef,

    /// Tenant network name
    #[arg(long)]
    network: String,
}

impl Commands {
    pub(crate) fn execute(self, config: &Config) -> Result<()> {
        match self {
            Self::Attach(args) => attach::run(config, args),
            Self::Detach(args) => detach::run(config, args),
            Self::Status => status::run(config),
        }
    }
}

fn state_file(config: &Config) -> PathBuf {
    config
        .state_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(crate::DEFAULT_STATE_FILE))
}

fn open_backend(path: &Path) -> Result<Arc<LocalBackend>> {
    LocalBackend::open(path)
        .map(Arc::new)
        .map_err(|source| CliError::State {
            path: path.to_path_buf(),
            source,
        })
}

fn services(config: &Config) -> Result<NetworkServices> {
    let backend = open_backend(&state_file(config))?;
    Ok(NetworkServices::from_backend(backend, config.clone()))
}

fn parse_pod(value: &str) -> std::result::Result<PodRef, String> {
    match value.split_once('/') {
        Some((namespace, name))
            if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok(PodRef::new(namespace, name))
        }
        _ => Err(format!("expected NAMESPACE/NAME, got '{value}'")),
    }
}

fn parse_interface(value: &str) -> std::result::Result<InterfaceRequest, String> {
    let (name, mac) = match value.split_once('=') {
        Some((name, mac)) => (name, Some(mac)),
        None => (value, None),
    };
    if name.is_empty() {
        return Err(format!("interface name is empty in '{value}'"));
    }
    match mac {
        Some(mac) if !is_mac(mac) => Err(format!("'{mac}' is not a MAC address")),
        Some(mac) => Ok(InterfaceRequest::new(name).with_mac(mac.to_ascii_lowercase())),
        None => Ok(InterfaceRequest::new(name)),
    }
}

fn is_mac(value: &str) -> bool {
    let octets: Vec<&str> = value.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()))
}
