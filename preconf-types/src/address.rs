use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use alloy_primitives::Address as EthAddress;
use serde::{Deserialize, Serialize};

/// A 20-byte bidder identity derived from a secp256k1 public key.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Address(EthAddress);

impl Address {
    pub const LEN: usize = 20;

    pub fn zero() -> Self {
        Self(EthAddress::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl From<EthAddress> for Address {
    fn from(value: EthAddress) -> Self {
        Self(value)
    }
}

impl From<Address> for EthAddress {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl From<[u8; 20]> for Address {
    fn from(value: [u8; 20]) -> Self {
        Self(EthAddress::from(value))
    }
}

impl Deref for Address {
    type Target = EthAddress;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for Address {
    type Err = <EthAddress as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EthAddress::from_str(s).map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
