//! Auto-activation: candidacy checks, the coalesced pending queue and the
//! per-device decision.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::info;

use crate::manager::ActivationRequest;
use crate::model::{Device, SettingsConnection};
use crate::types::{ActivationType, AuthSubject};

use super::Policy;

pub(super) const PENDING_ACTION_AUTOACTIVATE: &str = "autoactivate";

/// A deferred "should this device auto-activate something?" decision.
/// Holds the device's `autoactivate` pending-action slot until it runs.
pub(super) struct ActivationCheck {
    pub(super) device: Arc<Device>,
}

/// Candidate order: autoconnect priority first, most recently connected
/// first within equal priority. The sort using this is stable, so equal
/// keys keep the settings store's ordering.
fn cmp_by_autoconnect_priority(
    a: &Arc<SettingsConnection>,
    b: &Arc<SettingsConnection>,
) -> Ordering {
    b.autoconnect_priority
        .get()
        .cmp(&a.autoconnect_priority.get())
        .then_with(|| b.last_connected.get().cmp(&a.last_connected.get()))
}

impl Policy {
    /// Queues an auto-activation check for `device` if it is a candidate:
    /// the manager is awake, the device is enabled and willing, nothing is
    /// active or queued for it yet.
    pub(super) fn schedule_activate_check(&mut self, device: &Arc<Device>) {
        if self.manager.sleeping() {
            return;
        }
        if !device.enabled.get() {
            return;
        }
        if !device.autoconnect_allowed() {
            return;
        }
        if self.find_pending_activation(device) {
            return;
        }
        if self
            .manager
            .active_connections()
            .iter()
            .any(|active| active.device.get().is_some_and(|d| d == *device))
        {
            return;
        }

        device.add_pending_action(PENDING_ACTION_AUTOACTIVATE);
        self.pending_activation_checks.push(ActivationCheck {
            device: device.clone(),
        });
    }

    /// Drops the queued check for `device`, releasing its pending-action
    /// slot.
    pub(super) fn clear_pending_activate_check(&mut self, device: &Arc<Device>) {
        if let Some(pos) = self
            .pending_activation_checks
            .iter()
            .position(|check| check.device == *device)
        {
            let check = self.pending_activation_checks.remove(pos);
            check
                .device
                .remove_pending_action(PENDING_ACTION_AUTOACTIVATE);
        }
    }

    fn find_pending_activation(&self, device: &Arc<Device>) -> bool {
        self.pending_activation_checks
            .iter()
            .any(|check| check.device == *device)
    }

    /// Requests a fresh candidacy check for every device. Coalesced: any
    /// number of requests before the next idle pass produce one scan, after
    /// the triggering burst of events has settled.
    pub(super) fn schedule_activate_all(&mut self) {
        self.activate_all_pending = true;
    }

    /// Drains the coalesced idle work: at most one activate-all scan, then
    /// every queued per-device activation check, in queue order.
    pub fn run_pending(&mut self) {
        if self.activate_all_pending {
            self.activate_all_pending = false;
            for device in self.manager.devices() {
                self.schedule_activate_check(&device);
            }
        }

        while !self.pending_activation_checks.is_empty() {
            let check = self.pending_activation_checks.remove(0);
            self.auto_activate_device(&check.device);
            check
                .device
                .remove_pending_action(PENDING_ACTION_AUTOACTIVATE);
        }
    }

    /// Picks at most one connection to bring up on `device` and asks the
    /// manager to activate it.
    fn auto_activate_device(&mut self, device: &Arc<Device>) {
        // FIXME: if a device is already activating (or activated) with a
        // connection but another connection now overrides the current one
        // for that device, deactivate the device and activate the new
        // connection instead of just bailing if the device is already active
        if device.act_request.get().is_some() {
            return;
        }

        let mut specific_object = None;
        let mut activation_type = ActivationType::Full;

        let best_connection = match self.find_connection_to_assume(device) {
            Some(connection) => {
                activation_type = ActivationType::Assume;
                Some(connection)
            }
            None => {
                let mut connections = self.manager.activatable_connections();
                if connections.is_empty() {
                    return;
                }

                connections.sort_by(cmp_by_autoconnect_priority);

                let mut best = None;
                for candidate in connections {
                    if !candidate.can_autoconnect() {
                        continue;
                    }
                    if let Some(hint) = device.can_auto_connect(&candidate) {
                        specific_object = hint;
                        best = Some(candidate);
                        break;
                    }
                }
                best
            }
        };

        let Some(connection) = best_connection else {
            return;
        };

        info!(
            target: "netpolicy::device",
            "auto-activating connection '{}'", connection.id
        );
        let id = connection.id.clone();
        let request = ActivationRequest {
            connection,
            device: Some(device.clone()),
            specific_object,
            subject: AuthSubject::Internal,
            activation_type,
        };
        if let Err(err) = self.manager.activate_connection(request) {
            info!(
                target: "netpolicy::device",
                "connection '{id}' auto-activation failed: {err}"
            );
        }
    }

    /// An already-configured link the device should adopt instead of being
    /// activated from scratch. Consuming the device's assume hint, the
    /// referenced connection qualifies only if it exists, is not active
    /// elsewhere, is available on the device, and the kernel link is still
    /// in the right shape for it.
    fn find_connection_to_assume(&mut self, device: &Arc<Device>) -> Option<Arc<SettingsConnection>> {
        let uuid = device.take_connection_uuid_to_assume()?;

        let connection = self.settings.connection_by_uuid(&uuid)?;

        if self.manager.device_for_connection(&connection).is_some() {
            // Already active on another device; it cannot be adopted here.
            return None;
        }

        if !device.available_for(&connection) {
            return None;
        }

        let link = device.link.get()?;

        if connection.slave_type.get().is_some() {
            // A slave. Is the link still enslaved?
            if link.master.is_none() {
                return None;
            }
        } else {
            // The link must be up and not enslaved.
            if link.master.is_some() || !link.flags.contains(crate::model::LinkFlags::UP) {
                return None;
            }
        }

        Some(connection)
    }
}
