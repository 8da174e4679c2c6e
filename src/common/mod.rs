//! Common utilities shared by the engine and its collaborator models.

/// System hostname access and validation.
pub mod hostname;
/// Reactive property system for fine-grained state updates.
pub mod property;
/// Identifier aliases.
pub mod types;

pub use hostname::{KernelHostname, SystemHostname};
pub use property::Property;
pub use types::{ObjectPath, Uuid};
