//! Default device selection, default-flag maintenance and the preferred-DNS
//! updates that go with them.

use std::sync::Arc;

use tracing::info;

use crate::model::{ActiveConnection, Device, Ip4Config, Ip6Config};
use crate::types::DnsIpConfigType;

use super::Policy;

impl Policy {
    pub(super) fn best_ip4_device(&self, fully_activated: bool) -> Option<Arc<Device>> {
        self.routes.best_ip4_device(
            &self.manager.devices(),
            fully_activated,
            self.default4.get().as_ref(),
        )
    }

    pub(super) fn best_ip6_device(&self, fully_activated: bool) -> Option<Arc<Device>> {
        self.routes.best_ip6_device(
            &self.manager.devices(),
            fully_activated,
            self.default6.get().as_ref(),
        )
    }

    /// Clears the family's default flag everywhere but `best`, then sets it
    /// on `best`. Clearing first guarantees no two sessions ever carry the
    /// flag simultaneously.
    fn update_default_ac(
        &self,
        best: Option<&Arc<ActiveConnection>>,
        flag: impl Fn(&ActiveConnection) -> &crate::common::Property<bool>,
    ) {
        for active in self.manager.active_connections() {
            if best.is_none_or(|b| active != *b) {
                flag(&active).set(false);
            }
        }
        if let Some(best) = best {
            flag(best).set(true);
        }
    }

    /// Re-adds the best IPv4 configuration to the DNS manager as preferred,
    /// typed VPN when a VPN supplies it.
    pub(super) fn update_ip4_dns(&self) {
        if let Some(best) = self.routes.best_ip4_config(true) {
            let config_type = if best.vpn.is_some() {
                DnsIpConfigType::Vpn
            } else {
                DnsIpConfigType::BestDevice
            };
            self.dns
                .add_ip4_config(&best.ip_iface, &best.config, config_type);
        }
    }

    /// Re-adds the best IPv6 configuration to the DNS manager as preferred.
    pub(super) fn update_ip6_dns(&self) {
        if let Some(best) = self.routes.best_ip6_config(true) {
            let config_type = if best.vpn.is_some() {
                DnsIpConfigType::Vpn
            } else {
                DnsIpConfigType::BestDevice
            };
            self.dns
                .add_ip6_config(&best.ip_iface, &best.config, config_type);
        }
    }

    /// Elects the IPv4 default device and keeps session default flags and
    /// VPN device attribution consistent with the election.
    pub(super) fn update_ip4_routing(&mut self, force_update: bool) {
        // An IPv4 VPN can be tunneled over an IPv6-only device, so the best
        // config may come with a VPN but no best device.
        let Some(best) = self.routes.best_ip4_config(false) else {
            self.default4.set(None);
            self.update_default_ac(None, |active| &active.default4);
            return;
        };

        if !force_update
            && let Some(device) = &best.device
            && self.default4.get().as_ref() == Some(device)
        {
            return;
        }

        if let Some(device) = &best.device {
            // A VPN session without device attribution tunnels over the best
            // device for its family; attribute it now.
            for active in self.manager.active_connections() {
                if active.vpn
                    && active.ip4_config.get().is_some()
                    && active.device.get().is_none()
                {
                    active.device.set(Some(device.clone()));
                }
            }
        }

        let default_device = match &best.vpn {
            Some(vpn) => vpn.device.get(),
            None => best.device.clone(),
        };

        self.update_default_ac(Some(&best.active), |active| &active.default4);

        if default_device == self.default4.get() {
            return;
        }

        self.default4.set(default_device);
        info!(
            target: "netpolicy::core",
            "set '{}' ({}) as default for IPv4 routing and DNS",
            best.active.id(),
            best.ip_iface
        );
    }

    /// Elects the IPv6 default device; mirror of the IPv4 path.
    pub(super) fn update_ip6_routing(&mut self, force_update: bool) {
        let Some(best) = self.routes.best_ip6_config(false) else {
            self.default6.set(None);
            self.update_default_ac(None, |active| &active.default6);
            return;
        };

        if !force_update
            && let Some(device) = &best.device
            && self.default6.get().as_ref() == Some(device)
        {
            return;
        }

        if let Some(device) = &best.device {
            for active in self.manager.active_connections() {
                if active.vpn
                    && active.ip6_config.get().is_some()
                    && active.device.get().is_none()
                {
                    active.device.set(Some(device.clone()));
                }
            }
        }

        let default_device = match &best.vpn {
            Some(vpn) => vpn.device.get(),
            None => best.device.clone(),
        };

        self.update_default_ac(Some(&best.active), |active| &active.default6);

        if default_device == self.default6.get() {
            return;
        }

        self.default6.set(default_device);
        info!(
            target: "netpolicy::core",
            "set '{}' ({}) as default for IPv6 routing and DNS",
            best.active.id(),
            best.ip_iface
        );
    }

    /// Runs the whole reconciliation inside one DNS bracket: preferred DNS,
    /// default election per family, then the hostname controller.
    pub(super) fn update_routing_and_dns(&mut self, force_update: bool) {
        self.dns.begin_updates("update_routing_and_dns");

        self.update_ip4_dns();
        self.update_ip6_dns();

        self.update_ip4_routing(force_update);
        self.update_ip6_routing(force_update);

        let best4 = self.default4.get();
        let best6 = self.default6.get();
        self.update_system_hostname(best4, best6);

        self.dns.end_updates("update_routing_and_dns");
    }

    /// Recomputes which devices are about to become default, so observers
    /// see imminent changes before they commit.
    pub(super) fn check_activating_devices(&mut self) {
        let best4 = self.best_ip4_device(false);
        let best6 = self.best_ip6_device(false);

        self.activating4.set(best4);
        self.activating6.set(best6);
    }

    /// Device-level IPv4 configuration replacement: stale entries leave DNS
    /// right away; adds are deferred while the device is still activating.
    pub(super) fn device_ip4_config_changed(
        &mut self,
        device: &Arc<Device>,
        new: Option<&Arc<Ip4Config>>,
        old: Option<&Arc<Ip4Config>>,
    ) {
        self.dns.begin_updates("device_ip4_config_changed");

        // While the device is activating every change is picked up wholesale
        // when it reaches ACTIVATED; reacting here would churn DNS for
        // nothing.
        if !device.is_activating() {
            if new != old {
                if let Some(old) = old {
                    self.dns.remove_ip4_config(old);
                }
                if let Some(new) = new {
                    self.dns
                        .add_ip4_config(&device.ip_iface(), new, DnsIpConfigType::Default);
                }
            }
            self.update_ip4_dns();
            self.update_ip4_routing(true);
            let best4 = self.default4.get();
            let best6 = self.default6.get();
            self.update_system_hostname(best4, best6);
        } else if let Some(old) = old {
            // Stale configs leave immediately either way.
            self.dns.remove_ip4_config(old);
        }

        self.dns.end_updates("device_ip4_config_changed");
    }

    /// Device-level IPv6 configuration replacement; mirror of the IPv4 path.
    pub(super) fn device_ip6_config_changed(
        &mut self,
        device: &Arc<Device>,
        new: Option<&Arc<Ip6Config>>,
        old: Option<&Arc<Ip6Config>>,
    ) {
        self.dns.begin_updates("device_ip6_config_changed");

        if !device.is_activating() {
            if new != old {
                if let Some(old) = old {
                    self.dns.remove_ip6_config(old);
                }
                if let Some(new) = new {
                    self.dns
                        .add_ip6_config(&device.ip_iface(), new, DnsIpConfigType::Default);
                }
            }
            self.update_ip6_dns();
            self.update_ip6_routing(true);
            let best4 = self.default4.get();
            let best6 = self.default6.get();
            self.update_system_hostname(best4, best6);
        } else if let Some(old) = old {
            self.dns.remove_ip6_config(old);
        }

        self.dns.end_updates("device_ip6_config_changed");
    }

}
