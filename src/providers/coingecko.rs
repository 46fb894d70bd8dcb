use crate::core::arn::Arn;
use crate::core::cache::Cache;
use crate::core::config::PriceSource;
use crate::core::metadata::AssetRegistry;
use crate::core::price::{PriceProvider, PriceQuote};
use crate::providers::util::{http_client, with_retry};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

// CoinGecko simple price endpoint: {"ethereum": {"usd": 2000.12}}
#[derive(Debug, Deserialize)]
struct SimplePriceResponse(HashMap<String, HashMap<String, Decimal>>);

pub struct CoinGeckoProvider {
    base_url: String,
    api_key: Option<String>,
    registry: Arc<AssetRegistry>,
    cache: Arc<dyn Cache<Arn, PriceQuote>>,
    ttl: Duration,
    client: reqwest::Client,
}

impl CoinGeckoProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        registry: Arc<AssetRegistry>,
        cache: Arc<dyn Cache<Arn, PriceQuote>>,
        ttl: Duration,
    ) -> Result<Self> {
        Ok(CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            registry,
            cache,
            ttl,
            client: http_client().context("Failed to build HTTP client")?,
        })
    }

    fn coin_id(&self, arn: &Arn) -> Result<&str> {
        let metadata = self
            .registry
            .get(arn)
            .ok_or_else(|| anyhow!("No metadata for asset {}", arn))?;
        match &metadata.price_source {
            PriceSource::CoinGecko(id) => Ok(id),
            other => Err(anyhow!(
                "Asset {} is not priced by CoinGecko ({:?})",
                metadata.symbol,
                other
            )),
        }
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    #[instrument(name = "CoinGeckoPriceFetch", skip(self), fields(arn = %arn))]
    async fn fetch_price(&self, arn: &Arn) -> Result<PriceQuote> {
        if let Some(cached) = self.cache.get(arn).await {
            return Ok(cached);
        }

        let coin_id = self.coin_id(arn)?;
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url, coin_id
        );
        debug!("Requesting price data from {}", url);

        let response = with_retry(
            || {
                let request = match &self.api_key {
                    Some(key) => self.client.get(&url).header("x-cg-demo-api-key", key),
                    None => self.client.get(&url),
                };
                request.send()
            },
            3,
            500,
        )
        .await
        .with_context(|| format!("Failed to send price request for {coin_id}"))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "CoinGecko returned {} for {}",
                response.status(),
                coin_id
            ));
        }

        let response_text = response
            .text()
            .await
            .with_context(|| format!("Failed to get response text for {coin_id}"))?;
        let SimplePriceResponse(prices) =
            serde_json::from_str(&response_text).with_context(|| {
                format!("Failed to parse CoinGecko response for {coin_id}. Response: '{response_text}'")
            })?;

        let price = prices
            .get(coin_id)
            .and_then(|quotes| quotes.get("usd"))
            .copied()
            .ok_or_else(|| anyhow!("No USD price in response for {}", coin_id))?;
        debug!("Successfully fetched price for {}: {}", coin_id, price);

        let quote = PriceQuote::new(*arn, price);
        self.cache.put(*arn, quote.clone(), Some(self.ttl)).await;
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregate::tests::{ether, usdc};
    use crate::store::memory::MemoryCache;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_coingecko_mock_server(
        coin_id: &str,
        body: &str,
        status_code: u16,
    ) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", coin_id))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(ResponseTemplate::new(status_code).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn provider(base_url: &str, api_key: Option<String>) -> CoinGeckoProvider {
        let mut eth = ether();
        eth.price_source = PriceSource::CoinGecko("ethereum".to_string());
        let registry = Arc::new(AssetRegistry::new([eth, usdc()]).unwrap());
        CoinGeckoProvider::new(
            base_url,
            api_key,
            registry,
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_successful_price_fetch() {
        let mock_server =
            create_coingecko_mock_server("ethereum", r#"{"ethereum": {"usd": 2000.5}}"#, 200)
                .await;

        let provider = provider(&mock_server.uri(), None);
        let quote = provider.fetch_price(&Arn::ether()).await.unwrap();

        assert_eq!(quote.arn, Arn::ether());
        assert_eq!(quote.price, Decimal::new(20005, 1));
    }

    #[tokio::test]
    async fn test_quotes_are_cached() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"ethereum": {"usd": 2000}}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = provider(&mock_server.uri(), None);
        let first = provider.fetch_price(&Arn::ether()).await.unwrap();
        let second = provider.fetch_price(&Arn::ether()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_api_key_header_is_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(header("x-cg-demo-api-key", "secret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"ethereum": {"usd": 1}}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = provider(&mock_server.uri(), Some("secret".to_string()));
        assert!(provider.fetch_price(&Arn::ether()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_usd_price() {
        let mock_server = create_coingecko_mock_server("ethereum", r#"{}"#, 200).await;

        let provider = provider(&mock_server.uri(), None);
        let result = provider.fetch_price(&Arn::ether()).await;
        assert!(result.unwrap_err().to_string().contains("No USD price"));
    }

    #[tokio::test]
    async fn test_api_error_response() {
        let mock_server = create_coingecko_mock_server("ethereum", "rate limited", 429).await;

        let provider = provider(&mock_server.uri(), None);
        assert!(provider.fetch_price(&Arn::ether()).await.is_err());
    }

    #[tokio::test]
    async fn test_asset_not_priced_by_coingecko() {
        let provider = provider("http://127.0.0.1:9", None);
        let result = provider.fetch_price(&usdc().arn).await;
        assert!(result.unwrap_err().to_string().contains("not priced by CoinGecko"));
    }
}
