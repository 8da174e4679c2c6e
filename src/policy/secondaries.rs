//! Secondary-connection orchestration: a device in SECONDARIES waits for
//! its dependent VPN sessions before it counts as activated.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::manager::ActivationRequest;
use crate::model::{ActiveConnection, Device, SettingsConnection};
use crate::types::{ActivationType, DeviceState, DeviceStateReason};

use super::Policy;

/// Sessions a device is still waiting for before it may leave SECONDARIES.
pub(super) struct SecondaryWait {
    pub(super) device: Arc<Device>,
    pub(super) secondaries: Vec<Arc<ActiveConnection>>,
}

impl Policy {
    /// Activates every secondary of `connection` on `device`. Each secondary
    /// must exist and must be a VPN; the first problem fails the whole set.
    /// On success the resulting sessions are recorded in a wait pinned to
    /// the device.
    pub(super) fn activate_secondary_connections(
        &mut self,
        connection: &Arc<SettingsConnection>,
        device: &Arc<Device>,
    ) -> bool {
        let Some(request) = device.act_request.get() else {
            debug_assert!(false, "device in SECONDARIES without an activation request");
            return false;
        };

        let mut secondary_sessions = Vec::new();
        let mut success = true;

        for sec_uuid in connection.secondaries.get() {
            let Some(settings_con) = self.settings.connection_by_uuid(&sec_uuid) else {
                warn!(
                    target: "netpolicy::device",
                    "secondary connection '{sec_uuid}' auto-activation failed: \
                     the connection doesn't exist"
                );
                success = false;
                break;
            };

            if !settings_con.is_vpn() {
                warn!(
                    target: "netpolicy::device",
                    "secondary connection '{} ({sec_uuid})' auto-activation failed: \
                     the connection is not a VPN",
                    settings_con.id
                );
                success = false;
                break;
            }

            debug!(
                target: "netpolicy::device",
                "activating secondary connection '{} ({sec_uuid})' for base connection '{} ({})'",
                settings_con.id, connection.id, connection.uuid
            );
            let id = settings_con.id.clone();
            let activation = ActivationRequest {
                connection: settings_con,
                device: Some(device.clone()),
                specific_object: Some(request.object_path.clone()),
                subject: request.subject.clone(),
                activation_type: ActivationType::Full,
            };
            match self.manager.activate_connection(activation) {
                Ok(active) => secondary_sessions.push(active),
                Err(err) => {
                    warn!(
                        target: "netpolicy::device",
                        "secondary connection '{id} ({sec_uuid})' auto-activation failed: {err}"
                    );
                    success = false;
                    break;
                }
            }
        }

        if success && !secondary_sessions.is_empty() {
            self.pending_secondaries.push(SecondaryWait {
                device: device.clone(),
                secondaries: secondary_sessions,
            });
        }

        success
    }

    /// A watched session settled. `connected` distinguishes reaching
    /// ACTIVATED from being torn down.
    pub(super) fn process_secondaries(&mut self, active: &Arc<ActiveConnection>, connected: bool) {
        let mut index = 0;
        while index < self.pending_secondaries.len() {
            let wait = &mut self.pending_secondaries[index];
            let Some(pos) = wait.secondaries.iter().position(|s| s == active) else {
                index += 1;
                continue;
            };
            let device = wait.device.clone();

            if connected {
                debug!(
                    target: "netpolicy::device",
                    "secondary connection '{}' succeeded; active path '{}'",
                    active.id(), active.object_path
                );

                wait.secondaries.remove(pos);
                if wait.secondaries.is_empty() {
                    // Nothing left to wait for; the base device may finish
                    // its activation.
                    self.pending_secondaries.remove(index);
                    if device.state.get() == DeviceState::Secondaries {
                        device.queue_state(DeviceState::Activated, DeviceStateReason::None);
                    }
                    continue;
                }
                index += 1;
            } else {
                debug!(
                    target: "netpolicy::device",
                    "secondary connection '{}' failed; active path '{}'",
                    active.id(), active.object_path
                );

                // One secondary failing fails the set; stop watching the
                // rest.
                self.pending_secondaries.remove(index);
                if matches!(
                    device.state.get(),
                    DeviceState::Secondaries | DeviceState::Activated
                ) {
                    device.queue_state(
                        DeviceState::Failed,
                        DeviceStateReason::SecondaryConnectionFailed,
                    );
                }
            }
        }
    }
}
