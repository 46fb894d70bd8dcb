use crate::core::balance::{BalanceEntry, BalanceSource};
use crate::core::config::Holding;
use crate::core::context::Context;
use crate::core::metadata::AssetRegistry;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Balances fixed in the configuration file.
pub struct SnapshotBalanceSource {
    balances: HashMap<Context, Vec<BalanceEntry>>,
}

impl SnapshotBalanceSource {
    pub fn new(balances: HashMap<Context, Vec<BalanceEntry>>) -> Self {
        SnapshotBalanceSource { balances }
    }

    pub fn from_holdings(holdings: &[Holding], registry: &AssetRegistry) -> Result<Self> {
        let mut balances: HashMap<Context, Vec<BalanceEntry>> = HashMap::new();
        for holding in holdings {
            let asset = registry.find_by_symbol(&holding.symbol).ok_or_else(|| {
                anyhow!(
                    "Holding for {} refers to unknown asset {}",
                    holding.context,
                    holding.symbol
                )
            })?;
            balances
                .entry(holding.context)
                .or_default()
                .push(BalanceEntry::new(asset.arn, holding.balance));
        }
        Ok(Self::new(balances))
    }
}

#[async_trait]
impl BalanceSource for SnapshotBalanceSource {
    async fn get_balances(&self, context: &Context) -> Result<Vec<BalanceEntry>> {
        let entries = self.balances.get(context).cloned().unwrap_or_default();
        debug!("Snapshot has {} entries for {}", entries.len(), context);
        Ok(entries)
    }
}
