mod bridge;
mod controller;
mod kv_store;

pub use bridge::BridgeProvider;
pub use controller::NetworkController;
pub use kv_store::KvStore;
