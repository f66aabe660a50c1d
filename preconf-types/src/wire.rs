//! JSON wire format of a [`Bid`].
//!
//! ```json
//! {"amount":"1000","targetBlock":"42","bidder":"0x..","signature":"0x.."}
//! ```
//!
//! Integers are decimal text, bidder and signature are hex with an optional
//! `0x` prefix. Decoding is strict about every field.

use alloy_primitives::U256;
use alloy_primitives::hex::{self, FromHexError};
use serde::{Deserialize, Serialize};

use crate::{Address, Bid, Signature};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireBid {
    amount: String,
    target_block: String,
    bidder: String,
    signature: String,
}

impl Bid {
    /// Encode this bid in its JSON wire format.
    pub fn encode(&self) -> String {
        serde_json::to_string(&WireBid::from(self.clone()))
            .expect("a struct of strings always serializes")
    }

    /// Decode a bid from its JSON wire format.
    ///
    /// This only checks the encoding; the signature is not verified.
    pub fn decode(s: &str) -> Result<Self, DecodeError> {
        let w: WireBid = serde_json::from_str(s)?;
        Self::try_from(w)
    }
}

impl From<Bid> for WireBid {
    fn from(b: Bid) -> Self {
        Self {
            amount: b.amount().to_string(),
            target_block: b.target_block().to_string(),
            bidder: hex::encode_prefixed(b.bidder()),
            signature: hex::encode_prefixed(b.signature().as_bytes()),
        }
    }
}

impl TryFrom<WireBid> for Bid {
    type Error = DecodeError;

    fn try_from(w: WireBid) -> Result<Self, Self::Error> {
        let amount = decimal("amount", &w.amount)?;
        let block = decimal("targetBlock", &w.target_block)?;
        let bidder: [u8; Address::LEN] = fixed("bidder", &w.bidder)?;
        let signature: [u8; Signature::LEN] = fixed("signature", &w.signature)?;
        Ok(Bid::from_parts(
            amount,
            block,
            Address::from(bidder),
            Signature::from(signature),
        ))
    }
}

fn decimal(field: &'static str, s: &str) -> Result<U256, DecodeError> {
    let invalid = || DecodeError::Integer {
        field,
        value: s.to_string(),
    };
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    U256::from_str_radix(s, 10).map_err(|_| invalid())
}

fn fixed<const N: usize>(field: &'static str, s: &str) -> Result<[u8; N], DecodeError> {
    let bytes = hex::decode(s).map_err(|e| DecodeError::Hex(field, e))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| DecodeError::Length {
        field,
        expected: N,
        actual: len,
    })
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} is not a non-negative 256-bit decimal integer: {value:?}")]
    Integer { field: &'static str, value: String },

    #[error("{0} is not valid hex: {1}")]
    Hex(&'static str, #[source] FromHexError),

    #[error("{field} has {actual} bytes, expected {expected}")]
    Length {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}
