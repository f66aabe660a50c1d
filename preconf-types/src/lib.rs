mod address;
mod bid;
mod block;
mod wire;

pub use address::Address;
pub use bid::{Bid, Signature, Signer, SigningError, digest};
pub use block::BlockNumber;
pub use wire::DecodeError;

pub use alloy_primitives::{B256, U256};
