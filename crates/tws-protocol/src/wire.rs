//! Reserved names on the wire.
//!
//! Every constant here is sent verbatim as a path segment, parameter key,
//! header or response body. Anything starting with `~` is reserved and can
//! never collide with a member name.

/// Reserved wire names, grouped by where they appear.
pub struct Wire;

impl Wire {
    // ── Parameters ──────────────────────────────────────────────────────
    /// Parameter key carrying the target instance id. Absent for root calls.
    pub const INSTANCE_PARAM: &str = "~i";
    /// Parameter key carrying the new value of a property write.
    pub const VALUE_PARAM: &str = "value";

    // ── Reserved leaves ─────────────────────────────────────────────────
    /// Liveness probe answered by the transport itself.
    pub const META: &str = "~meta";
    /// Returns the bound object's own address.
    pub const DETACH: &str = "~detach";
    /// Pins an instance so the sweep never evicts it.
    pub const KEEPALIVE: &str = "~keepalive";
    /// Evicts and disposes an instance immediately.
    pub const DISPOSE: &str = "~dispose";

    // ── Responses ───────────────────────────────────────────────────────
    /// Fixed body of a `~meta` reply.
    pub const META_REPLY: &str = "<meta/>";
    /// Header naming the [`ErrorKind`](crate::ErrorKind) of a failed call.
    pub const ERROR_HEADER: &str = "x-tws-error";

    // ── Addressing ──────────────────────────────────────────────────────
    pub const ADDRESS_SEPARATOR: char = '~';
    pub const PATH_SEPARATOR: char = '/';

    pub const DEFAULT_PORT: u16 = 14048;
}

/// True for names the runtime intercepts before any member lookup.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(Wire::ADDRESS_SEPARATOR)
}

/// True for leaves handled by the session rather than a dispatcher.
pub fn is_session_leaf(path: &str) -> bool {
    path == Wire::KEEPALIVE || path == Wire::DISPOSE
}
