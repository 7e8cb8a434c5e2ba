use netattach_operations::{Config, attach};
use netattach_operations::types::AttachRequest;
use netattach_saga::Outcome;

use super::{AttachArgs, services};
use crate::error::{CliError, Result};

pub(crate) fn run(config: &Config, args: AttachArgs) -> Result<()> {
    let services = services(config)?;
    let pod = args.pod.to_string();
    let network = args.network.clone();
    let count = args.interfaces.len();

    let request = AttachRequest {
        pod: args.pod,
        network: args.network,
        tenant: args.tenant,
        interfaces: args.interfaces,
    };
    let outcome = attach(&services, request).map_err(|source| CliError::Attach {
        pod: pod.clone(),
        network: network.clone(),
        source,
    })?;

    match outcome {
        Outcome::Completed => println!("Attached {pod} to {network} ({count} interface(s))."),
        Outcome::Stopped => println!("Nothing to do: {pod} is already attached to {network}."),
        Outcome::Skipped => println!("Attach of {pod} to {network} was skipped."),
    }
    Ok(())
}
