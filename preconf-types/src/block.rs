use std::fmt;
use std::ops::{Add, Deref};

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Chain block height.
#[derive(
    Debug, Clone, Default, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlockNumber(u64);

impl BlockNumber {
    pub fn genesis() -> Self {
        Self(0)
    }

    /// Does this block number equal the given 256-bit target?
    pub fn matches(self, target: U256) -> bool {
        U256::from(self.0) == target
    }
}

impl Add<u64> for BlockNumber {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl From<u64> for BlockNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<BlockNumber> for u64 {
    fn from(value: BlockNumber) -> Self {
        value.0
    }
}

impl From<BlockNumber> for U256 {
    fn from(value: BlockNumber) -> Self {
        U256::from(value.0)
    }
}

impl Deref for BlockNumber {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
