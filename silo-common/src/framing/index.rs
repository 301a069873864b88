//! Command correlation index

use std::fmt;

use serde::{Deserialize, Serialize};

/// Correlates a response with the master command that produced it
///
/// The master allocates indices; the slave only echoes them. Index `0` is
/// reserved for unsolicited messages (status pushes, remerge listings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandIndex(u64);

impl CommandIndex {
    /// Index carried by messages that answer no command
    pub const UNSOLICITED: CommandIndex = CommandIndex(0);

    /// Wrap a raw index
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw numeric value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this message answers no command
    #[must_use]
    pub const fn is_unsolicited(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CommandIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CommandIndex {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
