/// D-Bus object path reference.
///
/// Represents an exported object as a string (e.g.
/// "/org/freedesktop/NetworkManager/ActiveConnection/3"). The engine never
/// dereferences these; they identify devices, active connections and IP
/// configurations and are handed back to collaborators opaquely.
pub type ObjectPath = String;

/// Connection profile UUID.
///
/// Settings connections are identified by their UUID everywhere the engine
/// needs a stable key (assume hints, secondary lists, master references).
pub type Uuid = String;
