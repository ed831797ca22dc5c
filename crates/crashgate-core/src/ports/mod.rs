//! Port definitions (hexagonal architecture interfaces)
//!
//! ## Ports Overview
//!
//! - [`IDeliveryChannel`] / [`IGroupListener`] - the consumed store-and-forward channel
//! - [`IFlagStore`] - durable boolean flags ("always send", interrupted cleanup)
//! - [`CrashesListener`] - optional application hooks, all defaulted

pub mod delivery_channel;
pub mod flag_store;
pub mod listener;

pub use delivery_channel::{DeliveryError, GroupSettings, IDeliveryChannel, IGroupListener};
pub use flag_store::{IFlagStore, ALWAYS_SEND_KEY, CLEANUP_PENDING_KEY};
pub use listener::{CrashesListener, DefaultCrashesListener};
