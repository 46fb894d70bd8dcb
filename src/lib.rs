pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::{
    Aggregator, Arn, AssetRegistry, BalanceSource, Context, PriceProvider, PriceQuote,
};
use crate::providers::coingecko::CoinGeckoProvider;
use crate::providers::fixed::FixedPriceProvider;
use crate::providers::indexer::IndexerBalanceSource;
use crate::providers::routing::RoutingPriceProvider;
use crate::providers::snapshot::SnapshotBalanceSource;
use crate::store::MemoryCache;
use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    /// Value one context, given as `key:<id>`, `trust:<id>`, `ledger` or a saved name.
    Balance {
        context: String,
        timeout: Option<Duration>,
    },
    /// Value every saved context.
    Contexts { timeout: Option<Duration> },
}

/// Wires the configured balance source and price providers into an aggregator.
pub fn build_aggregator(config: &AppConfig) -> Result<Aggregator> {
    let registry = Arc::new(AssetRegistry::from_config(&config.assets)?);
    debug!("Registered {} assets", registry.len());

    let balances: Arc<dyn BalanceSource> = if !config.holdings.is_empty() {
        info!("Using {} configured holdings", config.holdings.len());
        Arc::new(SnapshotBalanceSource::from_holdings(
            &config.holdings,
            &registry,
        )?)
    } else {
        let base_url = config
            .providers
            .indexer
            .as_ref()
            .map_or("http://localhost:8080", |p| &p.base_url);
        Arc::new(IndexerBalanceSource::new(base_url, &config.network)?)
    };

    let price_cache = Arc::new(MemoryCache::<Arn, PriceQuote>::new());
    let coingecko: Option<Arc<dyn PriceProvider>> = match &config.providers.coingecko {
        Some(provider) => Some(Arc::new(CoinGeckoProvider::new(
            &provider.base_url,
            provider.api_key.clone(),
            Arc::clone(&registry),
            price_cache,
            config.price_ttl(),
        )?)),
        None => None,
    };
    let fixed = Arc::new(FixedPriceProvider::from_registry(&registry));
    let prices = Arc::new(RoutingPriceProvider::new(
        Arc::clone(&registry),
        fixed,
        coingecko,
    ));

    Ok(Aggregator::new(balances, prices, registry))
}

fn resolve_context(config: &AppConfig, text: &str) -> Result<(Context, String)> {
    if let Some(saved) = config.saved_context(text) {
        return Ok((saved.context(), saved.name.clone()));
    }
    let context: Context = text
        .parse()
        .map_err(|e| anyhow!("'{}' is neither a saved context nor a context: {}", text, e))?;
    Ok((context, context.to_string()))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("keyledger starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let aggregator = build_aggregator(&config)?;

    match command {
        AppCommand::Balance { context, timeout } => {
            let (context, title) = resolve_context(&config, &context)?;
            cli::balance::run(&aggregator, context, &title, timeout).await
        }
        AppCommand::Contexts { timeout } => {
            cli::contexts::run(&aggregator, &config.contexts, timeout).await
        }
    }
}
