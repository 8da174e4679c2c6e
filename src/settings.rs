use std::sync::Arc;

use async_trait::async_trait;

use crate::common::Uuid;
use crate::model::SettingsConnection;

/// The settings store: persisted connection profiles plus the transient
/// hostname proxy.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Looks up a profile by UUID.
    fn connection_by_uuid(&self, uuid: &Uuid) -> Option<Arc<SettingsConnection>>;

    /// All profiles, most recently connected first.
    fn connections_sorted(&self) -> Vec<Arc<SettingsConnection>>;

    /// Applies `name` as the transient system hostname through the hostname
    /// service. Returns whether the service applied it; when it did not, the
    /// engine falls back to setting the kernel hostname directly.
    async fn set_transient_hostname(&self, name: &str) -> bool;
}
