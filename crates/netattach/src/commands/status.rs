use netattach_operations::Config;
use netattach_operations::providers::ClusterState;

use super::{open_backend, state_file};
use crate::error::Result;

pub(crate) fn run(config: &Config) -> Result<()> {
    let backend = open_backend(&state_file(config))?;
    print_status(&backend.snapshot());
    Ok(())
}

fn print_status(state: &ClusterState) {
    if state.networks.is_empty() {
        println!("No tenant networks.");
        return;
    }

    println!("Tenant networks: {}", state.networks.len());
    for network in state.networks.values() {
        println!();
        println!(
            "{} (tenant {}, VLAN {}, {} user(s))",
            network.name,
            network.tenant,
            network.vlan,
            network.user_count()
        );
        for record in state.ports.values().filter(|r| r.network == network.name) {
            println!(
                "  {}/{} -> {} on {} ({})",
                record.pod, record.interface, record.bridge_port, record.bridge, record.mac
            );
        }
    }
}
