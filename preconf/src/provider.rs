use alloy::{
    network::Ethereum,
    providers::{
        Provider, ProviderBuilder, RootProvider, fillers::FillProvider,
        utils::JoinedRecommendedFillers,
    },
};
use async_trait::async_trait;
use preconf_auction::{HeightSource, SourceError};
use url::Url;

/// Provider connected to blockchain URL with read only access
pub type HttpProvider = FillProvider<JoinedRecommendedFillers, RootProvider, Ethereum>;

/// Reads the chain height from a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcHeightSource {
    url: Url,
    provider: HttpProvider,
}

impl RpcHeightSource {
    pub fn new(rpc: &Url) -> Self {
        Self {
            url: rpc.clone(),
            provider: ProviderBuilder::new().connect_http(rpc.clone()),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl HeightSource for RpcHeightSource {
    async fn current_height(&self) -> Result<u64, SourceError> {
        Ok(self.provider.get_block_number().await?)
    }
}
