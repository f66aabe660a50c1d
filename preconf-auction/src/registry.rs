use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use preconf_types::Address;

/// Membership test for identities whose bids may be considered.
pub trait Registry: Send + Sync + 'static {
    fn is_eligible(&self, bidder: &Address) -> bool;
}

impl Registry for HashSet<Address> {
    fn is_eligible(&self, bidder: &Address) -> bool {
        self.contains(bidder)
    }
}

impl Registry for BTreeSet<Address> {
    fn is_eligible(&self, bidder: &Address) -> bool {
        self.contains(bidder)
    }
}

impl<R: Registry + ?Sized> Registry for Arc<R> {
    fn is_eligible(&self, bidder: &Address) -> bool {
        (**self).is_eligible(bidder)
    }
}

/// A fixed set of eligible bidders.
#[derive(Debug, Clone, Default)]
pub struct Whitelist(HashSet<Address>);

impl Whitelist {
    pub fn new<I>(it: I) -> Self
    where
        I: IntoIterator<Item = Address>,
    {
        Self(it.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Address> for Whitelist {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl Registry for Whitelist {
    fn is_eligible(&self, bidder: &Address) -> bool {
        self.0.contains(bidder)
    }
}
