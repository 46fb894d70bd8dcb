//! Balance source abstractions

use crate::core::arn::Arn;
use crate::core::context::Context;
use anyhow::Result;
use async_trait::async_trait;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One asset held within a context, in the asset's smallest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub arn: Arn,
    #[serde(deserialize_with = "deserialize_raw_balance")]
    pub balance: u128,
}

impl BalanceEntry {
    pub fn new(arn: Arn, balance: u128) -> Self {
        BalanceEntry { arn, balance }
    }
}

/// Raw balances are uint256 on chain and usually arrive as decimal strings.
/// Plain integers are accepted too, as far as the format can represent them.
pub fn deserialize_raw_balance<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
    deserializer.deserialize_any(RawUintVisitor)
}

struct RawUintVisitor;

impl Visitor<'_> for RawUintVisitor {
    type Value = u128;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
        Ok(u128::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
        u128::try_from(v).map_err(|_| E::custom(format!("Negative raw value: {v}")))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<u128, E> {
        u128::try_from(v).map_err(|_| E::custom(format!("Negative raw value: {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
        v.trim()
            .parse::<u128>()
            .map_err(|e| E::custom(format!("Invalid raw value '{v}': {e}")))
    }
}

#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Either the complete list of entries for `context` or an error, never a partial list.
    async fn get_balances(&self, context: &Context) -> Result<Vec<BalanceEntry>>;
}
