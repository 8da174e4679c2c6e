//! Domain models shared between the engine and its collaborators.
//!
//! Each model is a bundle of reactive [`Property`](crate::common::Property)
//! cells owned by the subsystem that produces the state (device inventory,
//! connection manager, settings store). The policy engine holds `Arc` handles
//! and reads the cells; the few cells it writes (default flags, device
//! attribution, the retry ledger) are called out on the fields themselves.

/// Active connection sessions.
pub mod active_connection;
/// Network devices.
pub mod device;
/// IP and DHCP configuration objects.
pub mod ip_config;
/// Persisted connection profiles.
pub mod settings_connection;

pub use active_connection::ActiveConnection;
pub use device::{Device, DeviceCommand, LinkFlags, LinkState};
pub use ip_config::{Dhcp4Config, Dhcp6Config, Ip4Config, Ip6Config};
pub use settings_connection::SettingsConnection;
