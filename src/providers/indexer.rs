use crate::core::arn::Address;
use crate::core::balance::{BalanceEntry, BalanceSource};
use crate::core::config::NetworkConfig;
use crate::core::context::Context;
use crate::providers::util::{http_client, with_retry};
use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Reads context balances from a ledger indexer over HTTP.
pub struct IndexerBalanceSource {
    base_url: String,
    chain_id: u64,
    ledger: Address,
    client: reqwest::Client,
}

impl IndexerBalanceSource {
    pub fn new(base_url: &str, network: &NetworkConfig) -> Result<Self> {
        Ok(IndexerBalanceSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_id: network.chain_id,
            ledger: network.contracts.ledger,
            client: http_client().context("Failed to build HTTP client")?,
        })
    }

    fn balances_url(&self, context: &Context) -> String {
        format!(
            "{}/v1/{}/{}/contexts/{}/{}/balances",
            self.base_url, self.chain_id, self.ledger, context.kind, context.id
        )
    }
}

#[derive(Debug, Deserialize)]
struct IndexerResponse {
    balances: Vec<BalanceEntry>,
}

#[async_trait]
impl BalanceSource for IndexerBalanceSource {
    #[instrument(name = "IndexerBalances", skip(self), fields(context = %context))]
    async fn get_balances(&self, context: &Context) -> Result<Vec<BalanceEntry>> {
        let url = self.balances_url(context);
        debug!("Requesting balances from {}", url);

        let response = with_retry(|| self.client.get(&url).send(), 3, 500)
            .await
            .with_context(|| format!("Failed to send balance request for {context}"))?;

        // An unknown key or trust holds nothing.
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Indexer does not know {}, treating as empty", context);
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(anyhow!(
                "Indexer returned {} for {}",
                response.status(),
                context
            ));
        }

        let response_text = response
            .text()
            .await
            .with_context(|| format!("Failed to get response text for {context}"))?;
        let parsed: IndexerResponse = serde_json::from_str(&response_text).with_context(|| {
            format!("Failed to parse indexer response for {context}. Response: '{response_text}'")
        })?;

        debug!("Indexer returned {} entries for {}", parsed.balances.len(), context);
        Ok(parsed.balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arn::Arn;
    use crate::core::config::ContractsConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LEDGER: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

    fn network() -> NetworkConfig {
        NetworkConfig {
            name: "local".to_string(),
            chain_id: 31337,
            contracts: ContractsConfig {
                ledger: LEDGER.parse().unwrap(),
                notary: None,
                key_vault: None,
            },
        }
    }

    async fn create_indexer_mock_server(
        context_path: &str,
        body: &str,
        status_code: u16,
    ) -> MockServer {
        let mock_server = MockServer::start().await;
        let expected_path = format!("/v1/31337/{LEDGER}/contexts/{context_path}/balances");

        Mock::given(method("GET"))
            .and(path(&expected_path))
            .respond_with(ResponseTemplate::new(status_code).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_fetches_trust_balances() {
        let arn = Arn::ether();
        let body = format!(
            r#"{{"balances": [{{"arn": "{arn}", "balance": "2000000000000000000"}}]}}"#
        );
        let mock_server = create_indexer_mock_server("trust/1", &body, 200).await;

        let source = IndexerBalanceSource::new(&mock_server.uri(), &network()).unwrap();
        let balances = source.get_balances(&Context::trust(1)).await.unwrap();

        assert_eq!(
            balances,
            vec![BalanceEntry::new(arn, 2_000_000_000_000_000_000)]
        );
    }

    #[tokio::test]
    async fn test_numeric_balances_are_accepted() {
        let arn = Arn::ether();
        let body = format!(
            r#"{{"balances": [{{"arn": "{arn}", "balance": 5000000}}, {{"arn": "{arn}", "balance": "7"}}]}}"#
        );
        let mock_server = create_indexer_mock_server("key/3", &body, 200).await;

        let source = IndexerBalanceSource::new(&mock_server.uri(), &network()).unwrap();
        let balances = source.get_balances(&Context::key(3)).await.unwrap();

        assert_eq!(
            balances,
            vec![BalanceEntry::new(arn, 5_000_000), BalanceEntry::new(arn, 7)]
        );
    }

    #[tokio::test]
    async fn test_unknown_context_is_empty() {
        let mock_server = create_indexer_mock_server("key/42", "not found", 404).await;

        let source = IndexerBalanceSource::new(&mock_server.uri(), &network()).unwrap();
        let balances = source.get_balances(&Context::key(42)).await.unwrap();
        assert!(balances.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_response_is_an_error() {
        let mock_server =
            create_indexer_mock_server("ledger/0", r#"{"balances": [{"arn": "0x12"}]}"#, 200)
                .await;

        let source = IndexerBalanceSource::new(&mock_server.uri(), &network()).unwrap();
        let result = source.get_balances(&Context::ledger()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_client_error_is_an_error() {
        let mock_server = create_indexer_mock_server("key/1", "bad request", 400).await;

        let source = IndexerBalanceSource::new(&mock_server.uri(), &network()).unwrap();
        let result = source.get_balances(&Context::key(1)).await;
        assert!(result.unwrap_err().to_string().contains("400"));
    }
}
