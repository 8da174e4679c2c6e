/// Policy engine errors.
///
/// The engine never propagates errors to its caller; failures reported by
/// collaborators are logged by the handler that observes them and recovery is
/// driven by later events. This type exists so collaborator implementations
/// have a common vocabulary for refusals.
#[derive(thiserror::Error, Debug)]
pub enum PolicyError {
    /// The connection manager refused an activation request.
    #[error("failed to activate connection: {0}")]
    ActivationFailed(String),

    /// The connection manager refused a deactivation request.
    #[error("failed to deactivate connection: {0}")]
    DeactivationFailed(String),

    /// A connection referenced by UUID does not exist in the settings store.
    #[error("no connection with UUID {0}")]
    ConnectionNotFound(String),
}

/// Convenience alias for results carrying a [`PolicyError`].
pub type Result<T> = std::result::Result<T, PolicyError>;
