//! Pricing abstractions and core types

use crate::core::arn::Arn;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// USD unit price of one whole token of an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub arn: Arn,
    pub price: Decimal,
    pub fetched_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(arn: Arn, price: Decimal) -> Self {
        PriceQuote {
            arn,
            price,
            fetched_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_price(&self, arn: &Arn) -> Result<PriceQuote>;
}
