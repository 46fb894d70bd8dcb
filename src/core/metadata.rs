//! Asset metadata known to the app, keyed by ARN.

use crate::core::arn::{Arn, AssetType};
use crate::core::config::{AssetConfig, PriceSource};
use anyhow::{Result, bail};
use std::collections::HashMap;
use tracing::debug;

/// Largest scale `rust_decimal` can represent.
pub const MAX_DECIMALS: u32 = 28;

#[derive(Debug, Clone)]
pub struct AssetMetadata {
    pub arn: Arn,
    pub asset: AssetType,
    pub symbol: String,
    pub name: Option<String>,
    pub decimals: u32,
    pub price_source: PriceSource,
}

#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    assets: HashMap<Arn, AssetMetadata>,
}

impl AssetRegistry {
    pub fn new(assets: impl IntoIterator<Item = AssetMetadata>) -> Result<Self> {
        let mut registry = AssetRegistry::default();
        for metadata in assets {
            if metadata.decimals > MAX_DECIMALS {
                bail!(
                    "Asset {} has {} decimals, at most {} are supported",
                    metadata.symbol,
                    metadata.decimals,
                    MAX_DECIMALS
                );
            }
            if let Some(existing) = registry.assets.get(&metadata.arn) {
                bail!(
                    "Assets {} and {} resolve to the same ARN {}",
                    existing.symbol,
                    metadata.symbol,
                    metadata.arn
                );
            }
            debug!("Registered asset {} as {}", metadata.symbol, metadata.arn);
            registry.assets.insert(metadata.arn, metadata);
        }
        Ok(registry)
    }

    pub fn from_config(assets: &[AssetConfig]) -> Result<Self> {
        Self::new(assets.iter().map(|asset| {
            let asset_type = asset.asset_type();
            AssetMetadata {
                arn: asset_type.arn(),
                asset: asset_type,
                symbol: asset.symbol.clone(),
                name: asset.name.clone(),
                decimals: asset.decimals,
                price_source: asset.price.clone(),
            }
        }))
    }

    pub fn get(&self, arn: &Arn) -> Option<&AssetMetadata> {
        self.assets.get(arn)
    }

    pub fn decimals(&self, arn: &Arn) -> Option<u32> {
        self.assets.get(arn).map(|m| m.decimals)
    }

    pub fn symbol(&self, arn: &Arn) -> Option<&str> {
        self.assets.get(arn).map(|m| m.symbol.as_str())
    }

    pub fn find_by_symbol(&self, symbol: &str) -> Option<&AssetMetadata> {
        self.assets
            .values()
            .find(|m| m.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetMetadata> {
        self.assets.values()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
