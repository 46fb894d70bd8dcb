use anyhow::Error;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retries an async HTTP operation with a fixed delay between attempts
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// Server errors (5xx) count as failures and are retried, client errors are
/// returned as-is.
pub async fn with_retry<F, Fut>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<reqwest::Response, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        let err = match operation().await {
            Ok(response) if response.status().is_server_error() => {
                anyhow::anyhow!("Server error: {}", response.status())
            }
            Ok(response) => return Ok(response),
            Err(err) => Error::from(err),
        };
        if attempt > retries {
            return Err(err);
        }
        debug!(
            "Attempt {}/{} failed: {}. Retrying...",
            attempt, retries, err
        );
        attempt += 1;
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}

/// HTTP client shared by the providers.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("keyledger/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
}
