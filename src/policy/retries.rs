//! The retry ledger: re-enable triggers, user blocks and the reset timer
//! that un-suspends connections which ran out of attempts.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::model::{Device, SettingsConnection};
use crate::types::DeviceStateReason;

use super::Policy;

impl Policy {
    /// Restores the retry budget (and clears the block) for every
    /// connection, or only for those compatible with `device` when given.
    pub(super) fn reset_autoconnect_all(&mut self, device: Option<&Arc<Device>>) {
        match device {
            Some(device) => debug!(
                target: "netpolicy::device",
                "re-enabling autoconnect for all connections on {}", device.interface
            ),
            None => debug!(
                target: "netpolicy::device",
                "re-enabling autoconnect for all connections"
            ),
        }

        for connection in self.settings.connections_sorted() {
            if device.is_none_or(|device| device.compatible_with(&connection)) {
                connection.reset_autoconnect_retries();
                connection.set_autoconnect_blocked_reason(DeviceStateReason::None);
            }
        }
    }

    /// Re-enables only the connections suspended because secrets were
    /// missing; a freshly registered agent may be able to supply them now.
    pub(super) fn reset_autoconnect_for_failed_secrets(&mut self) {
        debug!(
            target: "netpolicy::device",
            "re-enabling autoconnect for all connections with failed secrets"
        );

        for connection in self.settings.connections_sorted() {
            if connection.autoconnect_blocked_reason() == DeviceStateReason::NoSecrets {
                connection.reset_autoconnect_retries();
                connection.set_autoconnect_blocked_reason(DeviceStateReason::None);
            }
        }
    }

    /// Blocks auto-activation of every connection compatible with `device`.
    ///
    /// Hardware devices keep their own suppressed flag, so the settings-level
    /// block is only needed for software devices, which may be destroyed and
    /// recreated while the user's disconnect should stick.
    pub(super) fn block_autoconnect_for_device(&mut self, device: &Arc<Device>) {
        debug!(
            target: "netpolicy::device",
            "blocking autoconnect for all connections on {}", device.interface
        );

        if !device.is_software() {
            return;
        }

        for connection in self.settings.connections_sorted() {
            if device.compatible_with(&connection) {
                connection.set_autoconnect_blocked_reason(DeviceStateReason::UserRequested);
            }
        }
    }

    /// A master device entered PREPARE: its slaves should get a fresh chance
    /// to come up with it. Skipped for internal activations, which are the
    /// engine's own doing and imply the slaves were considered already.
    pub(super) fn activate_slave_connections(&mut self, device: &Arc<Device>) {
        let master_iface = device.interface.as_str();

        let mut master_uuid_applied = None;
        let mut master_uuid_settings = None;
        let mut internal_activation = false;

        if let Some(request) = device.act_request.get() {
            master_uuid_applied = request.applied_uuid.get();
            let settings_uuid = request.settings_connection.uuid.clone();
            if master_uuid_applied.as_ref() != Some(&settings_uuid) {
                master_uuid_settings = Some(settings_uuid);
            }
            internal_activation = request.subject.is_internal();
        }

        if !internal_activation {
            for slave in self.settings.connections_sorted() {
                let Some(master) = slave.master.get() else {
                    continue;
                };

                if master == master_iface
                    || Some(&master) == master_uuid_applied.as_ref()
                    || Some(&master) == master_uuid_settings.as_ref()
                {
                    slave.reset_autoconnect_retries();
                }
            }
        }

        self.schedule_activate_all();
    }

    /// Arms the reset timer for `connection`'s deadline unless a timer is
    /// already pending.
    pub(super) fn arm_reset_retries_timer(&mut self, connection: &Arc<SettingsConnection>) {
        if self.reset_retries_at.is_some() {
            return;
        }

        let deadline = connection.autoconnect_retry_time();
        if deadline.is_none() {
            warn!(
                target: "netpolicy::device",
                "connection '{}' exhausted retries without a retry deadline", connection.id
            );
        }
        self.reset_retries_at = Some(deadline.unwrap_or_else(Instant::now));
    }

    /// Timer body: restores the retry budget of every connection whose
    /// deadline passed, re-arms for the earliest remaining deadline, and
    /// schedules a fresh activate-all scan if anything was re-enabled.
    pub fn reset_connections_retries(&mut self) {
        self.reset_retries_at = None;

        let now = Instant::now();
        let mut min_deadline: Option<Instant> = None;
        let mut changed = false;

        for connection in self.settings.connections_sorted() {
            let Some(deadline) = connection.autoconnect_retry_time() else {
                continue;
            };

            if deadline <= now {
                connection.reset_autoconnect_retries();
                changed = true;
            } else if min_deadline.is_none_or(|min| deadline < min) {
                min_deadline = Some(deadline);
            }
        }

        if let Some(min) = min_deadline {
            self.reset_retries_at = Some(min);
        }

        if changed {
            self.schedule_activate_all();
        }
    }
}
