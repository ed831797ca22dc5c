//! crashgate storage - persisted error reports and minidump folders
//!
//! Provides:
//! - [`ErrorStorage`]: the report directory (`{id}.json`, `{id}.throwable`,
//!   `{id}.enqueued`) and the `minidump/new` / `minidump/pending` trees
//! - [`FileFlagStore`]: a JSON-file implementation of [`IFlagStore`]
//!
//! Files are the only channel between a crashing process and the next one,
//! so every write that another process may observe goes through a temporary
//! file followed by a rename.
//!
//! [`IFlagStore`]: crashgate_core::ports::IFlagStore

pub mod directory;
pub mod error;
pub mod flag_store;

pub use directory::{ErrorStorage, StoredReport};
pub use error::{Result, StorageError};
pub use flag_store::FileFlagStore;
