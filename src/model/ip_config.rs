use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use crate::common::{ObjectPath, Property};

/// IPv4 configuration of a device or VPN.
///
/// The engine only needs the address list (for the reverse-DNS hostname
/// fallback) and a stable identity (so the DNS manager can be told to drop a
/// configuration it was previously handed).
#[derive(Debug, Clone)]
pub struct Ip4Config {
    /// Exported path identifying this configuration.
    pub object_path: ObjectPath,
    /// Addresses in configuration order; the first one is the primary.
    pub addresses: Property<Vec<Ipv4Addr>>,
}

impl Ip4Config {
    /// Creates a configuration with the given identity and addresses.
    pub fn new(object_path: impl Into<ObjectPath>, addresses: Vec<Ipv4Addr>) -> Arc<Self> {
        Arc::new(Self {
            object_path: object_path.into(),
            addresses: Property::new(addresses),
        })
    }
}

impl PartialEq for Ip4Config {
    fn eq(&self, other: &Self) -> bool {
        self.object_path == other.object_path
    }
}

impl Eq for Ip4Config {}

/// IPv6 configuration of a device or VPN.
#[derive(Debug, Clone)]
pub struct Ip6Config {
    /// Exported path identifying this configuration.
    pub object_path: ObjectPath,
    /// Addresses in configuration order; the first one is the primary.
    pub addresses: Property<Vec<Ipv6Addr>>,
}

impl Ip6Config {
    /// Creates a configuration with the given identity and addresses.
    pub fn new(object_path: impl Into<ObjectPath>, addresses: Vec<Ipv6Addr>) -> Arc<Self> {
        Arc::new(Self {
            object_path: object_path.into(),
            addresses: Property::new(addresses),
        })
    }
}

impl PartialEq for Ip6Config {
    fn eq(&self, other: &Self) -> bool {
        self.object_path == other.object_path
    }
}

impl Eq for Ip6Config {}

/// Options returned by the DHCPv4 server, keyed by option name.
#[derive(Debug, Clone)]
pub struct Dhcp4Config {
    /// String-keyed option map ("host_name", "domain_name", ...).
    pub options: Property<HashMap<String, String>>,
}

impl Dhcp4Config {
    /// Creates a configuration carrying the given options.
    pub fn new(options: HashMap<String, String>) -> Arc<Self> {
        Arc::new(Self {
            options: Property::new(options),
        })
    }

    /// Looks up a single option by name.
    pub fn option(&self, name: &str) -> Option<String> {
        self.options.get().get(name).cloned()
    }
}

impl PartialEq for Dhcp4Config {
    fn eq(&self, other: &Self) -> bool {
        self.options.get() == other.options.get()
    }
}

impl Eq for Dhcp4Config {}

/// Options returned by the DHCPv6 server, keyed by option name.
#[derive(Debug, Clone)]
pub struct Dhcp6Config {
    /// String-keyed option map.
    pub options: Property<HashMap<String, String>>,
}

impl Dhcp6Config {
    /// Creates a configuration carrying the given options.
    pub fn new(options: HashMap<String, String>) -> Arc<Self> {
        Arc::new(Self {
            options: Property::new(options),
        })
    }

    /// Looks up a single option by name.
    pub fn option(&self, name: &str) -> Option<String> {
        self.options.get().get(name).cloned()
    }
}
