//! Folds the balances of a context and their USD quotes into a single total.
//!
//! Every balance entry owns one slot. A slot is filled once the quote for its
//! asset arrives, and the total only exists when every slot is filled. Until
//! then the aggregation is pending and no partial sum is exposed.
use crate::core::arn::Arn;
use crate::core::balance::BalanceEntry;
use crate::core::metadata::{AssetRegistry, MAX_DECIMALS};
use crate::core::price::PriceQuote;
use crate::core::usd::format_usd;
use anyhow::{Result, anyhow};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fmt::Display;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateState {
    Pending,
    Empty,
    Resolved(Decimal),
}

impl AggregateState {
    pub fn is_pending(&self) -> bool {
        matches!(self, AggregateState::Pending)
    }

    /// The final total; `Empty` is exactly zero.
    pub fn total(&self) -> Option<Decimal> {
        match self {
            AggregateState::Pending => None,
            AggregateState::Empty => Some(Decimal::ZERO),
            AggregateState::Resolved(total) => Some(*total),
        }
    }
}

impl Display for AggregateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateState::Pending => write!(f, "…"),
            AggregateState::Empty => write!(f, "{}", format_usd(Decimal::ZERO)),
            AggregateState::Resolved(total) => write!(f, "{}", format_usd(*total)),
        }
    }
}

/// USD value of `balance` smallest units at `price` per whole token.
///
/// Balances wider than the 96 bit decimal mantissa lose their lowest digits.
pub fn entry_value(balance: u128, decimals: u32, price: Decimal) -> Result<Decimal> {
    let units = token_units(balance, decimals)
        .ok_or_else(|| anyhow!("Balance {balance} with {decimals} decimals is out of range"))?;
    units
        .checked_mul(price)
        .ok_or_else(|| anyhow!("Value of {units} at {price} overflows"))
}

/// Whole-token amount of a raw balance, e.g. `2` for 2e18 wei.
pub fn token_units(balance: u128, decimals: u32) -> Option<Decimal> {
    let max_mantissa = Decimal::MAX.mantissa().unsigned_abs();
    let (mut raw, mut scale) = (balance, i64::from(decimals));
    while raw > max_mantissa || scale > i64::from(MAX_DECIMALS) {
        raw /= 10;
        scale -= 1;
    }
    let scale = u32::try_from(scale).ok()?;
    let raw = i128::try_from(raw).ok()?;
    Decimal::try_from_i128_with_scale(raw, scale)
        .ok()
        .map(|d| d.normalize())
}

/// Distinct ARNs in first-seen order.
pub fn unique_assets(entries: &[BalanceEntry]) -> Vec<Arn> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| seen.insert(e.arn))
        .map(|e| e.arn)
        .collect()
}

#[derive(Debug, Clone)]
struct Slot {
    entry: BalanceEntry,
    decimals: Option<u32>,
    price: Option<Decimal>,
    value: Option<Decimal>,
    error: Option<String>,
}

/// Per-entry view of an aggregation, for display.
#[derive(Debug, Clone)]
pub struct EntryValue {
    pub entry: BalanceEntry,
    pub decimals: Option<u32>,
    pub price: Option<Decimal>,
    pub value: Option<Decimal>,
    pub error: Option<String>,
}

/// Fixed-size set of slots, one per balance entry, filled as quotes arrive.
#[derive(Debug, Clone)]
pub struct Aggregation {
    slots: Vec<Slot>,
}

impl Aggregation {
    pub fn new(entries: &[BalanceEntry], registry: &AssetRegistry) -> Self {
        let slots = entries
            .iter()
            .map(|entry| {
                let decimals = registry.decimals(&entry.arn);
                Slot {
                    entry: *entry,
                    decimals,
                    price: None,
                    value: None,
                    error: decimals
                        .is_none()
                        .then(|| format!("No metadata for asset {}", entry.arn)),
                }
            })
            .collect();
        Aggregation { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fills every slot holding `quote.arn`. Returns the number of slots filled.
    pub fn record(&mut self, quote: &PriceQuote) -> usize {
        let mut filled = 0;
        for slot in self.slots.iter_mut().filter(|s| s.entry.arn == quote.arn) {
            slot.price = Some(quote.price);
            let Some(decimals) = slot.decimals else {
                continue;
            };
            match entry_value(slot.entry.balance, decimals, quote.price) {
                Ok(value) => {
                    slot.value = Some(value);
                    slot.error = None;
                    filled += 1;
                }
                Err(e) => {
                    debug!("Cannot value {}: {}", quote.arn, e);
                    slot.error = Some(e.to_string());
                }
            }
        }
        if filled > 0 && self.filled_sum().is_none() {
            debug!("Total overflows after valuing {}", quote.arn);
            for slot in self.slots.iter_mut().filter(|s| s.entry.arn == quote.arn) {
                slot.error = Some("Total exceeds the largest representable USD value".to_string());
            }
        }
        filled
    }

    /// Marks the slots of `arn` as failed. They stay unfilled.
    pub fn record_failure(&mut self, arn: &Arn, error: &str) {
        for slot in self.slots.iter_mut().filter(|s| s.entry.arn == *arn) {
            slot.error = Some(error.to_string());
        }
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    /// Sum of the filled slots, `None` if it does not fit in a `Decimal`.
    fn filled_sum(&self) -> Option<Decimal> {
        self.slots
            .iter()
            .filter_map(|s| s.value)
            .try_fold(Decimal::ZERO, |total, value| total.checked_add(value))
    }

    /// `Resolved` only when every slot is filled and the sum is representable.
    pub fn state(&self) -> AggregateState {
        if self.slots.is_empty() {
            return AggregateState::Empty;
        }
        if self.slots.iter().any(|s| s.value.is_none()) {
            return AggregateState::Pending;
        }
        match self.filled_sum() {
            Some(total) => AggregateState::Resolved(total),
            None => AggregateState::Pending,
        }
    }

    /// Snapshot of every slot in input order.
    pub fn entries(&self) -> Vec<EntryValue> {
        self.slots
            .iter()
            .map(|slot| EntryValue {
                entry: slot.entry,
                decimals: slot.decimals,
                price: slot.price,
                value: slot.value,
                error: slot.error.clone(),
            })
            .collect()
    }
}
