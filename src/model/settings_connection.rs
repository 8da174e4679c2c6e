use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::common::{ObjectPath, Property, Uuid};
use crate::types::{ConnectionType, DeviceStateReason};

/// Retries granted to a connection before auto-activation is suspended.
pub const AUTOCONNECT_RETRIES_DEFAULT: u32 = 4;

/// How long a connection that exhausted its retries stays suspended before
/// the reset timer re-arms it.
pub const AUTOCONNECT_RESET_INTERVAL: Duration = Duration::from_secs(300);

/// A persisted connection profile from the settings store.
///
/// The settings store owns these cells. The policy engine reads them when
/// picking auto-activation candidates and writes the retry ledger cells
/// (`autoconnect_retries`, `autoconnect_blocked_reason`) through the setters
/// below.
#[derive(Debug)]
pub struct SettingsConnection {
    /// Profile UUID, the stable identity used in assume hints, secondary
    /// lists and master references.
    pub uuid: Uuid,
    /// Human-readable profile name, used in log messages.
    pub id: String,
    /// Exported path of the profile.
    pub object_path: ObjectPath,
    /// Profile type; decides device compatibility.
    pub connection_type: ConnectionType,
    /// Whether the profile opts into auto-activation at all.
    pub autoconnect: Property<bool>,
    /// Candidate ordering key; higher activates first.
    pub autoconnect_priority: Property<i32>,
    /// When the profile last reached the activated state. Breaks priority
    /// ties, most recent first.
    pub last_connected: Property<Option<DateTime<Utc>>>,
    /// Whether the profile is visible to the current sessions.
    pub visible: Property<bool>,
    /// UUIDs of profiles (VPNs) that must come up before a device using this
    /// profile counts as activated.
    pub secondaries: Property<Vec<Uuid>>,
    /// Master reference for slave profiles: an interface name or a UUID.
    pub master: Property<Option<String>>,
    /// Slave type ("bond", "bridge", ...) when this profile enslaves to a
    /// master.
    pub slave_type: Property<Option<String>>,

    retry_reset_interval: Duration,
    autoconnect_retries: Property<u32>,
    autoconnect_blocked_reason: Property<DeviceStateReason>,
    autoconnect_retry_time: Property<Option<Instant>>,
    secrets_loaded: Property<bool>,
}

impl SettingsConnection {
    /// Creates a profile with default autoconnect bookkeeping.
    pub fn new(
        uuid: impl Into<Uuid>,
        id: impl Into<String>,
        object_path: impl Into<ObjectPath>,
        connection_type: ConnectionType,
    ) -> Arc<Self> {
        Self::with_retry_reset_interval(
            uuid,
            id,
            object_path,
            connection_type,
            AUTOCONNECT_RESET_INTERVAL,
        )
    }

    /// Creates a profile whose exhausted-retries suspension lasts `interval`
    /// instead of the default five minutes.
    pub fn with_retry_reset_interval(
        uuid: impl Into<Uuid>,
        id: impl Into<String>,
        object_path: impl Into<ObjectPath>,
        connection_type: ConnectionType,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid: uuid.into(),
            id: id.into(),
            object_path: object_path.into(),
            connection_type,
            autoconnect: Property::new(true),
            autoconnect_priority: Property::new(0),
            last_connected: Property::new(None),
            visible: Property::new(true),
            secondaries: Property::new(Vec::new()),
            master: Property::new(None),
            slave_type: Property::new(None),
            retry_reset_interval: interval,
            autoconnect_retries: Property::new(AUTOCONNECT_RETRIES_DEFAULT),
            autoconnect_blocked_reason: Property::new(DeviceStateReason::None),
            autoconnect_retry_time: Property::new(None),
            secrets_loaded: Property::new(false),
        })
    }

    /// Whether this profile is a VPN.
    pub fn is_vpn(&self) -> bool {
        self.connection_type == ConnectionType::Vpn
    }

    /// Whether the profile may be auto-activated right now: it must be
    /// visible, opted into autoconnect, unblocked, and have retries left.
    pub fn can_autoconnect(&self) -> bool {
        self.visible.get()
            && self.autoconnect.get()
            && self.autoconnect_retries.get() != 0
            && self.autoconnect_blocked_reason.get() == DeviceStateReason::None
    }

    /// Remaining auto-activation attempts.
    pub fn autoconnect_retries(&self) -> u32 {
        self.autoconnect_retries.get()
    }

    /// Updates the retry counter. Hitting zero stamps the retry deadline so
    /// the reset timer knows when to re-arm this profile.
    pub fn set_autoconnect_retries(&self, retries: u32) {
        self.autoconnect_retries.set(retries);
        if retries == 0 {
            self.autoconnect_retry_time
                .set(Some(Instant::now() + self.retry_reset_interval));
        }
    }

    /// Restores the default retry budget and clears any pending deadline.
    pub fn reset_autoconnect_retries(&self) {
        self.autoconnect_retries.set(AUTOCONNECT_RETRIES_DEFAULT);
        self.autoconnect_retry_time.set(None);
    }

    /// Deadline after which the reset timer restores this profile's retries,
    /// if the retries are currently exhausted.
    pub fn autoconnect_retry_time(&self) -> Option<Instant> {
        self.autoconnect_retry_time.get()
    }

    /// Why auto-activation is suppressed for this profile, if it is.
    pub fn autoconnect_blocked_reason(&self) -> DeviceStateReason {
        self.autoconnect_blocked_reason.get()
    }

    /// Suppresses (or, with [`DeviceStateReason::None`], re-allows)
    /// auto-activation of this profile.
    pub fn set_autoconnect_blocked_reason(&self, reason: DeviceStateReason) {
        self.autoconnect_blocked_reason.set(reason);
    }

    /// Whether secrets for this profile are currently cached.
    pub fn secrets_loaded(&self) -> bool {
        self.secrets_loaded.get()
    }

    /// Marks secrets as cached; the agent subsystem calls this after a
    /// successful secrets request.
    pub fn set_secrets_loaded(&self) {
        self.secrets_loaded.set(true);
    }

    /// Drops cached secrets so the next activation prompts again.
    pub fn clear_secrets(&self) {
        self.secrets_loaded.set(false);
    }
}

impl PartialEq for SettingsConnection {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for SettingsConnection {}
