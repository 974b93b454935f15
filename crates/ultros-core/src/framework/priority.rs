use std::fmt;

use serde::{Deserialize, Serialize};

/// Handler priority. Lower values run first; equal values run in
/// registration order.
///
/// Any `i32` is valid; the named constants are conventions.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const LOWEST: Self = Self(-100);
    pub const LOW: Self = Self(-50);
    pub const NORMAL: Self = Self(0);
    pub const HIGH: Self = Self(50);
    pub const HIGHEST: Self = Self(100);

    pub fn value(self) -> i32 {
        self.0
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::LOWEST => f.write_str("lowest"),
            Self::LOW => f.write_str("low"),
            Self::NORMAL => f.write_str("normal"),
            Self::HIGH => f.write_str("high"),
            Self::HIGHEST => f.write_str("highest"),
            Self(other) => write!(f, "{other}"),
        }
    }
}
