use netattach_operations::types::DetachRequest;
use netattach_operations::{Config, detach};
use netattach_saga::Outcome;

use super::{DetachArgs, services};
use crate::error::{CliError, Result};

pub(crate) fn run(config: &Config, args: DetachArgs) -> Result<()> {
    let services = services(config)?;
    let pod = args.pod.to_string();
    let network = args.network.clone();

    let request = DetachRequest {
        pod: args.pod,
        network: args.network,
    };
    let outcome = detach(&services, request).map_err(|source| CliError::Detach {
        pod: pod.clone(),
        network: network.clone(),
        source,
    })?;

    match outcome {
        Outcome::Completed => println!("Detached {pod} from {network}."),
        Outcome::Stopped => println!("Nothing to do: {pod} has no interfaces on {network}."),
        Outcome::Skipped => println!("Detach of {pod} from {network} was skipped."),
    }
    Ok(())
}
