use crate::core::arn::Arn;
use crate::core::config::PriceSource;
use crate::core::metadata::AssetRegistry;
use crate::core::price::{PriceProvider, PriceQuote};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;

/// Sends each lookup to the provider configured for the asset's price source.
pub struct RoutingPriceProvider {
    registry: Arc<AssetRegistry>,
    fixed: Arc<dyn PriceProvider>,
    coingecko: Option<Arc<dyn PriceProvider>>,
}

impl RoutingPriceProvider {
    pub fn new(
        registry: Arc<AssetRegistry>,
        fixed: Arc<dyn PriceProvider>,
        coingecko: Option<Arc<dyn PriceProvider>>,
    ) -> Self {
        RoutingPriceProvider {
            registry,
            fixed,
            coingecko,
        }
    }
}

#[async_trait]
impl PriceProvider for RoutingPriceProvider {
    async fn fetch_price(&self, arn: &Arn) -> Result<PriceQuote> {
        let metadata = self
            .registry
            .get(arn)
            .ok_or_else(|| anyhow!("No metadata for asset {}", arn))?;
        match &metadata.price_source {
            PriceSource::Fixed(_) => self.fixed.fetch_price(arn).await,
            PriceSource::CoinGecko(_) => match &self.coingecko {
                Some(provider) => provider.fetch_price(arn).await,
                None => Err(anyhow!(
                    "No CoinGecko provider configured for {}",
                    metadata.symbol
                )),
            },
        }
    }
}
