use crate::core::arn::{Address, AssetType, TokenStandard};
use crate::core::balance::deserialize_raw_balance;
use crate::core::context::{Context, ContextKind};
use anyhow::{Context as _, Result};
use directories::ProjectDirs;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

/// Contract addresses of one deployment. Passed explicitly to whatever needs them.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContractsConfig {
    pub ledger: Address,
    pub notary: Option<Address>,
    pub key_vault: Option<Address>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub contracts: ContractsConfig,
}

/// Where the USD price of an asset comes from.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    /// CoinGecko coin id, e.g. `ethereum`.
    CoinGecko(String),
    Fixed(Decimal),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AssetConfig {
    pub symbol: String,
    pub name: Option<String>,
    #[serde(default)]
    pub contract: Address,
    pub standard: TokenStandard,
    /// Token id, as a number or a decimal string for ids beyond 64 bits.
    #[serde(default, deserialize_with = "deserialize_raw_balance")]
    pub id: u128,
    pub decimals: u32,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub price: PriceSource,
}

impl AssetConfig {
    pub fn asset_type(&self) -> AssetType {
        AssetType {
            contract: self.contract,
            standard: self.standard,
            id: self.id,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SavedContext {
    pub name: String,
    pub kind: ContextKind,
    #[serde(default)]
    pub id: u64,
}

impl SavedContext {
    pub fn context(&self) -> Context {
        match self.kind {
            ContextKind::Ledger => Context::ledger(),
            kind => Context { kind, id: self.id },
        }
    }
}

/// A balance known ahead of time, used instead of querying the indexer.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Holding {
    pub context: Context,
    pub symbol: String,
    #[serde(deserialize_with = "deserialize_raw_balance")]
    pub balance: u128,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexerProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub indexer: Option<IndexerProviderConfig>,
    pub coingecko: Option<CoinGeckoProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            indexer: Some(IndexerProviderConfig {
                base_url: "http://localhost:8080".to_string(),
            }),
            coingecko: Some(CoinGeckoProviderConfig {
                base_url: "https://api.coingecko.com/api/v3".to_string(),
                api_key: None,
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub network: NetworkConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub contexts: Vec<SavedContext>,
    #[serde(default)]
    pub holdings: Vec<Holding>,
    pub price_ttl_secs: Option<u64>,
}

impl AppConfig {
    pub const DEFAULT_PRICE_TTL_SECS: u64 = 60;

    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "keyledger", "keyledger")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn price_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.price_ttl_secs
                .unwrap_or(Self::DEFAULT_PRICE_TTL_SECS),
        )
    }

    pub fn saved_context(&self, name: &str) -> Option<&SavedContext> {
        self.contexts
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}
