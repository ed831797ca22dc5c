//! Persistence flags attached to every enqueued log
//!
//! The low byte of the flags carries the persistence priority the delivery
//! channel uses when it has to drop logs under storage pressure.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Bit set passed to the delivery channel alongside a log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u32);

impl Flags {
    /// Normal persistence priority
    pub const PERSISTENCE_NORMAL: Flags = Flags(0x01);

    /// Critical persistence priority, kept over normal logs
    pub const PERSISTENCE_CRITICAL: Flags = Flags(0x02);

    /// Flags used when the caller has no preference
    pub const DEFAULTS: Flags = Self::PERSISTENCE_NORMAL;

    const PERSISTENCE_MASK: u32 = 0xFF;

    /// Wraps raw flag bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw flag bits
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Extracts the persistence priority from these flags
    ///
    /// No priority bits means normal. Bits outside the low byte are ignored.
    /// An unknown priority falls back to normal, logging a warning when
    /// `warn` is set.
    pub fn persistence_priority(&self, warn: bool) -> Flags {
        let priority = self.0 & Self::PERSISTENCE_MASK;
        if priority == 0 {
            return Self::PERSISTENCE_NORMAL;
        }
        if priority == Self::PERSISTENCE_NORMAL.0 || priority == Self::PERSISTENCE_CRITICAL.0 {
            return Flags(priority);
        }
        if warn {
            tracing::warn!(
                flags = priority,
                "Invalid persistence priority, falling back to normal"
            );
        }
        Self::PERSISTENCE_NORMAL
    }

    /// Returns true when the persistence priority is critical
    pub fn is_critical(&self) -> bool {
        self.persistence_priority(false) == Self::PERSISTENCE_CRITICAL
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::DEFAULTS
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Self) -> Self::Output {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}
