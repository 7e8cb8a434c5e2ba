#[cfg(any(test, feature = "testing"))]
mod faulty;
mod local;

#[cfg(any(test, feature = "testing"))]
pub use faulty::FaultyBackend;
pub use local::{BridgeState, ClusterState, ControllerNetwork, LocalBackend, load_state, save_state};
