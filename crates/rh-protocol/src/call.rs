//! Call identifier type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one RPC call on a connection so its reply can be matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub u32);

impl CallId {
    /// Create a new call ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// The call ID following this one, wrapping at `u32::MAX`
    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

impl From<u32> for CallId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
