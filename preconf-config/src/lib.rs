mod node;

use std::path::{Path, PathBuf};

pub use node::{AuctionSection, ChainSection, NodeConfig, RegistrySection};
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
#[error("config error {0}: {1}")]
pub struct ConfigError(PathBuf, #[source] Box<dyn std::error::Error + Send + Sync>);

impl ConfigError {
    /// The file the error refers to. Empty for configs parsed from a string.
    pub fn path(&self) -> &Path {
        &self.0
    }
}

pub(crate) async fn read_toml<T, P>(path: P) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let s = tokio::fs::read_to_string(path.as_ref())
        .await
        .map_err(|e| ConfigError(path.as_ref().into(), Box::new(e)))?;
    toml::from_str(&s).map_err(|e| ConfigError(path.as_ref().into(), Box::new(e)))
}
