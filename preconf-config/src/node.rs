use core::fmt;
use std::{path::Path, str::FromStr, time::Duration};

use preconf_auction::{AuctionConfig, InvalidConfig, Whitelist};
use preconf_types::Address;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use url::Url;

use crate::{ConfigError, read_toml};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub chain: ChainSection,
    #[serde(default)]
    pub auction: AuctionSection,
    pub registry: RegistrySection,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainSection {
    pub rpc_url: Url,
}

/// Auction timing, all durations in milliseconds.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AuctionSection {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub round_duration: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub watchdog_grace: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub block_time: Duration,
    pub queue_len: usize,
}

impl Default for AuctionSection {
    fn default() -> Self {
        let c = AuctionConfig::default();
        Self {
            poll_interval: c.poll_interval(),
            round_duration: c.round_duration(),
            watchdog_grace: c.watchdog_grace(),
            block_time: c.block_time(),
            queue_len: c.queue_len(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySection {
    pub bidders: Vec<Address>,
}

impl NodeConfig {
    pub async fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_toml(path).await
    }

    pub fn auction_config(&self) -> AuctionConfig {
        let a = &self.auction;
        AuctionConfig::builder()
            .poll_interval(a.poll_interval)
            .round_duration(a.round_duration)
            .watchdog_grace(a.watchdog_grace)
            .block_time(a.block_time)
            .queue_len(a.queue_len)
            .build()
    }

    pub fn whitelist(&self) -> Whitelist {
        self.registry.bidders.iter().copied().collect()
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        self.auction_config().validate()
    }
}

impl FromStr for NodeConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|e| ConfigError(Default::default(), Box::new(e)))
    }
}

impl fmt::Display for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = toml::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}
