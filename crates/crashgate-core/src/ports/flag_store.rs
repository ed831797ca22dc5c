//! Durable flag store port
//!
//! A tiny key/value store for boolean flags that must survive restarts.
//! Uses `anyhow::Result` because persistence is adapter-specific.

/// Set once the user chose "always send"
pub const ALWAYS_SEND_KEY: &str = "crashes.always_send";

/// Set while a disable sweep is in progress; a leftover value means the
/// sweep was interrupted and must be completed on the next start
pub const CLEANUP_PENDING_KEY: &str = "crashes.cleanup_pending";

/// Port trait for persisting boolean flags
pub trait IFlagStore: Send + Sync {
    /// Reads a flag, `false` when absent or unreadable
    fn get_bool(&self, key: &str) -> bool;

    /// Writes a flag durably
    fn put_bool(&self, key: &str, value: bool) -> anyhow::Result<()>;

    /// Removes a flag
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}
