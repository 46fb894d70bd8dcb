use crate::core::arn::Arn;
use crate::core::config::PriceSource;
use crate::core::metadata::AssetRegistry;
use crate::core::price::{PriceProvider, PriceQuote};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Pegged prices, e.g. for stablecoins.
pub struct FixedPriceProvider {
    prices: HashMap<Arn, Decimal>,
}

impl FixedPriceProvider {
    pub fn new(prices: HashMap<Arn, Decimal>) -> Self {
        FixedPriceProvider { prices }
    }

    pub fn from_registry(registry: &AssetRegistry) -> Self {
        let prices = registry
            .iter()
            .filter_map(|metadata| match &metadata.price_source {
                PriceSource::Fixed(price) => Some((metadata.arn, *price)),
                _ => None,
            })
            .collect();
        Self::new(prices)
    }
}

#[async_trait]
impl PriceProvider for FixedPriceProvider {
    async fn fetch_price(&self, arn: &Arn) -> Result<PriceQuote> {
        self.prices
            .get(arn)
            .map(|price| PriceQuote::new(*arn, *price))
            .ok_or_else(|| anyhow!("No fixed price for asset {}", arn))
    }
}
