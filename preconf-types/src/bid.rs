use std::fmt;
use std::str::FromStr;

use alloy_primitives::{B256, U256, keccak256};
use alloy_signer::SignerSync;
use alloy_signer_local::{LocalSignerError, PrivateKeySigner};
use serde::{Deserialize, Serialize};

use crate::Address;
use crate::wire::WireBid;

const DOMAIN: &str = "PRECONF_BID";

/// Compute the digest a bid signature commits to.
///
/// Both values are encoded as fixed-width 32-byte big-endian integers after a
/// domain tag, so distinct `(amount, block)` pairs never share a pre-image.
pub fn digest(amount: U256, block: U256) -> B256 {
    let mut buf = Vec::with_capacity(DOMAIN.len() + 64);
    buf.extend_from_slice(DOMAIN.as_bytes());
    buf.extend_from_slice(&amount.to_be_bytes::<32>());
    buf.extend_from_slice(&block.to_be_bytes::<32>());
    keccak256(buf)
}

/// A signed offer of `amount` wei for the right associated with `block`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "WireBid", try_from = "WireBid")]
pub struct Bid {
    amount: U256,
    block: U256,
    bidder: Address,
    signature: Signature,
}

impl Bid {
    /// Sign a bid for `amount` on `block`.
    ///
    /// The bidder address is recovered from the fresh signature rather than
    /// taken from the signer, so a successful return always verifies.
    pub fn sign(amount: U256, block: U256, signer: &Signer) -> Result<Self, SigningError> {
        let hash = digest(amount, block);
        let signature = Signature::from(signer.0.sign_hash_sync(&hash)?);
        let bidder = signature.recover(&hash)?;
        Ok(Self {
            amount,
            block,
            bidder,
            signature,
        })
    }

    /// Assemble a bid from its parts without any validation.
    pub fn from_parts(amount: U256, block: U256, bidder: Address, signature: Signature) -> Self {
        Self {
            amount,
            block,
            bidder,
            signature,
        }
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    pub fn target_block(&self) -> U256 {
        self.block
    }

    pub fn bidder(&self) -> Address {
        self.bidder
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn digest(&self) -> B256 {
        digest(self.amount, self.block)
    }

    /// Recover the address that produced this bid's signature.
    pub fn recover(&self) -> Result<Address, SigningError> {
        self.signature.recover(&self.digest())
    }

    /// Check that the declared bidder produced the signature.
    ///
    /// Malformed signatures verify as `false`.
    pub fn verify(&self) -> bool {
        self.recover().is_ok_and(|a| a == self.bidder)
    }
}

/// A 65-byte recoverable secp256k1 signature (`r || s || v`).
///
/// The bytes are kept as received; they are only parsed on recovery.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature([u8; 65]);

impl Signature {
    pub const LEN: usize = 65;

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    fn recover(&self, hash: &B256) -> Result<Address, SigningError> {
        let sig = alloy_signer::Signature::try_from(&self.0[..])?;
        let addr = sig.recover_address_from_prehash(hash)?;
        Ok(addr.into())
    }
}

impl From<[u8; 65]> for Signature {
    fn from(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }
}

impl From<alloy_signer::Signature> for Signature {
    fn from(sig: alloy_signer::Signature) -> Self {
        Self(sig.as_bytes())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", alloy_primitives::hex::encode_prefixed(self.0))
    }
}

/// Bidder-side signing key.
#[derive(Clone)]
pub struct Signer(PrivateKeySigner);

impl Signer {
    pub fn random() -> Self {
        Self(PrivateKeySigner::random())
    }

    pub fn address(&self) -> Address {
        self.0.address().into()
    }
}

impl From<PrivateKeySigner> for Signer {
    fn from(signer: PrivateKeySigner) -> Self {
        Signer(signer)
    }
}

impl FromStr for Signer {
    type Err = SigningError;

    /// Parse a hex encoded private key, with or without `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PrivateKeySigner::from_str(s)?))
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signer").field(&self.address()).finish()
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SigningError {
    #[error("signer error: {0}")]
    Signer(#[from] alloy_signer::Error),

    #[error("invalid private key: {0}")]
    Key(#[from] LocalSignerError),

    #[error("invalid signature: {0}")]
    Signature(#[from] alloy_primitives::SignatureError),
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;
    use quickcheck::quickcheck;

    use super::{Bid, Signature, Signer, digest};

    fn u256(limbs: (u64, u64, u64, u64)) -> U256 {
        U256::from_limbs([limbs.0, limbs.1, limbs.2, limbs.3])
    }

    quickcheck! {
        fn signed_bids_verify(a: (u64, u64, u64, u64), b: u64) -> bool {
            let signer = Signer::random();
            let bid = Bid::sign(u256(a), U256::from(b), &signer).unwrap();
            bid.verify()
                && bid.bidder() == signer.address()
                && bid.recover().unwrap() == signer.address()
        }

        fn digest_is_injective(a1: u64, t1: u64, a2: u64, t2: u64) -> bool {
            let d1 = digest(U256::from(a1), U256::from(t1));
            let d2 = digest(U256::from(a2), U256::from(t2));
            (a1, t1) == (a2, t2) || d1 != d2
        }

        fn digest_separates_high_limbs(a: (u64, u64, u64, u64), t: (u64, u64, u64, u64)) -> bool {
            let (a, t) = (u256(a), u256(t));
            a == t || digest(a, t) != digest(t, a)
        }
    }

    #[test]
    fn concatenation_lookalikes_do_not_collide() {
        let d1 = digest(U256::from(1), U256::from(23));
        let d2 = digest(U256::from(12), U256::from(3));
        assert_ne!(d1, d2);
    }

    #[test]
    fn digest_is_deterministic() {
        let d1 = digest(U256::from(7), U256::from(100));
        let d2 = digest(U256::from(7), U256::from(100));
        assert_eq!(d1, d2);
    }

    #[test]
    fn foreign_bidder_fails_verification() {
        let honest = Signer::random();
        let other = Signer::random();
        let bid = Bid::sign(U256::from(10), U256::from(5), &honest).unwrap();
        let forged = Bid::from_parts(
            bid.amount(),
            bid.target_block(),
            other.address(),
            *bid.signature(),
        );
        assert!(!forged.verify());
    }

    #[test]
    fn tampered_amount_fails_verification() {
        let signer = Signer::random();
        let bid = Bid::sign(U256::from(10), U256::from(5), &signer).unwrap();
        let tampered = Bid::from_parts(
            U256::from(11),
            bid.target_block(),
            bid.bidder(),
            *bid.signature(),
        );
        assert!(!tampered.verify());
    }

    #[test]
    fn malformed_signature_verifies_false() {
        let signer = Signer::random();
        let bid = Bid::sign(U256::from(1), U256::from(1), &signer).unwrap();

        let mut bytes = *bid.signature().as_bytes();
        bytes[64] = 5;
        let bad_parity = Bid::from_parts(bid.amount(), bid.target_block(), bid.bidder(), bytes.into());
        assert!(!bad_parity.verify());
        assert!(bad_parity.recover().is_err());

        let zeros = Bid::from_parts(
            bid.amount(),
            bid.target_block(),
            bid.bidder(),
            Signature::from([0; 65]),
        );
        assert!(!zeros.verify());
    }

    #[test]
    fn signer_from_hex_key() {
        let key = "0x0101010101010101010101010101010101010101010101010101010101010101";
        let a: Signer = key.parse().unwrap();
        let b: Signer = key.trim_start_matches("0x").parse().unwrap();
        assert_eq!(a.address(), b.address());
        assert!("not a key".parse::<Signer>().is_err());
    }
}
