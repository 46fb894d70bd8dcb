//! Drives an [`Aggregation`] for one context at a time.
//!
//! Each call to [`Aggregator::watch`] starts a new generation: balances are
//! fetched, one price lookup per distinct asset is issued concurrently and the
//! state is republished after every completion. Starting a new generation
//! aborts the previous one, and completions tagged with an older generation
//! are dropped before they touch any state.
use crate::core::aggregate::{AggregateState, Aggregation, EntryValue, unique_assets};
use crate::core::balance::BalanceSource;
use crate::core::context::Context;
use crate::core::metadata::AssetRegistry;
use crate::core::price::PriceProvider;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Distinct assets whose quote arrived.
    pub resolved: usize,
    /// Distinct assets whose lookup failed.
    pub failed: usize,
    /// Distinct assets to look up; zero until balances are known.
    pub total: usize,
    /// No lookup is outstanding anymore.
    pub done: bool,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: AggregateState,
    pub progress: Progress,
    pub entries: Vec<EntryValue>,
}

impl Snapshot {
    fn pending() -> Self {
        Snapshot {
            state: AggregateState::Pending,
            progress: Progress::default(),
            entries: Vec::new(),
        }
    }

    fn is_settled(&self) -> bool {
        !self.state.is_pending() || self.progress.done
    }
}

pub struct Aggregator {
    balances: Arc<dyn BalanceSource>,
    prices: Arc<dyn PriceProvider>,
    registry: Arc<AssetRegistry>,
    generation: Arc<AtomicU64>,
    running: Mutex<Option<AbortHandle>>,
}

impl Aggregator {
    pub fn new(
        balances: Arc<dyn BalanceSource>,
        prices: Arc<dyn PriceProvider>,
        registry: Arc<AssetRegistry>,
    ) -> Self {
        Aggregator {
            balances,
            prices,
            registry,
            generation: Arc::new(AtomicU64::new(0)),
            running: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// Starts aggregating `context`, abandoning whatever was in flight.
    pub fn watch(&self, context: Context) -> AggregationHandle {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = watch::channel(Snapshot::pending());

        let run = Run {
            context,
            generation,
            current: Arc::clone(&self.generation),
            balances: Arc::clone(&self.balances),
            prices: Arc::clone(&self.prices),
            registry: Arc::clone(&self.registry),
            tx,
        };
        let task = tokio::spawn(run.execute()).abort_handle();

        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = running.replace(task.clone()) {
            debug!("Abandoning previous aggregation for new context {}", context);
            previous.abort();
        }

        AggregationHandle {
            context,
            generation,
            rx,
            task,
        }
    }

    /// Aggregates `context` and waits until every lookup has finished.
    pub async fn aggregate(&self, context: Context) -> AggregateState {
        self.watch(context).settled(None).await.state
    }

    /// Independent aggregations of several contexts, for overview screens.
    ///
    /// These do not take part in the generation counter, so they never
    /// cancel each other.
    pub fn detached(&self, context: Context) -> AggregationHandle {
        let (tx, rx) = watch::channel(Snapshot::pending());
        let generation = self.generation.load(Ordering::SeqCst);
        let run = Run {
            context,
            generation,
            current: Arc::new(AtomicU64::new(generation)),
            balances: Arc::clone(&self.balances),
            prices: Arc::clone(&self.prices),
            registry: Arc::clone(&self.registry),
            tx,
        };
        let task = tokio::spawn(run.execute()).abort_handle();
        AggregationHandle {
            context,
            generation,
            rx,
            task,
        }
    }
}

/// Caller side of a running aggregation.
pub struct AggregationHandle {
    context: Context,
    generation: u64,
    rx: watch::Receiver<Snapshot>,
    task: AbortHandle,
}

impl AggregationHandle {
    pub fn context(&self) -> Context {
        self.context
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> AggregateState {
        self.rx.borrow().state.clone()
    }

    pub fn progress(&self) -> Progress {
        self.rx.borrow().progress
    }

    pub fn snapshot(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// Waits for the next published snapshot. Returns false once nothing more will be published.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Waits until the total is final or every lookup has finished, at most `timeout`.
    ///
    /// A lookup that never completes keeps this waiting until the timeout, and
    /// the returned state is then still pending.
    pub async fn settled(&mut self, timeout: Option<Duration>) -> Snapshot {
        let wait = self.rx.wait_for(Snapshot::is_settled);
        let settled = match timeout {
            Some(limit) => matches!(tokio::time::timeout(limit, wait).await, Ok(Ok(_))),
            None => wait.await.is_ok(),
        };
        if !settled {
            debug!("Aggregation for {} did not settle", self.context);
        }
        self.rx.borrow().clone()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

struct Run {
    context: Context,
    generation: u64,
    current: Arc<AtomicU64>,
    balances: Arc<dyn BalanceSource>,
    prices: Arc<dyn PriceProvider>,
    registry: Arc<AssetRegistry>,
    tx: watch::Sender<Snapshot>,
}

impl Run {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    fn publish(&self, aggregation: &Aggregation, progress: Progress) {
        if !self.is_current() {
            debug!(
                "Dropping stale update for {} (generation {})",
                self.context, self.generation
            );
            return;
        }
        self.tx.send_replace(Snapshot {
            state: aggregation.state(),
            progress,
            entries: aggregation.entries(),
        });
    }

    #[instrument(name = "Aggregate", skip(self), fields(context = %self.context, generation = self.generation))]
    async fn execute(self) {
        let entries = match self.balances.get_balances(&self.context).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Balances unavailable for {}: {}", self.context, e);
                if self.is_current() {
                    self.tx.send_modify(|s| s.progress.done = true);
                }
                return;
            }
        };

        let mut aggregation = Aggregation::new(&entries, &self.registry);
        let assets = unique_assets(&entries);
        let mut progress = Progress {
            total: assets.len(),
            done: assets.is_empty(),
            ..Progress::default()
        };
        info!(
            "Valuing {} entries ({} assets) for {}",
            entries.len(),
            assets.len(),
            self.context
        );
        self.publish(&aggregation, progress);

        let mut lookups: FuturesUnordered<_> = assets
            .into_iter()
            .map(|arn| {
                let prices = Arc::clone(&self.prices);
                async move { (arn, prices.fetch_price(&arn).await) }
            })
            .collect();

        while let Some((arn, result)) = lookups.next().await {
            if !self.is_current() {
                debug!("Context {} was replaced, abandoning lookups", self.context);
                return;
            }
            match result {
                Ok(quote) => {
                    debug!("Quote for {}: {}", arn, quote.price);
                    aggregation.record(&quote);
                    progress.resolved += 1;
                }
                Err(e) => {
                    warn!("Price lookup failed for {}: {}", arn, e);
                    aggregation.record_failure(&arn, &e.to_string());
                    progress.failed += 1;
                }
            }
            progress.done = progress.resolved + progress.failed == progress.total;
            self.publish(&aggregation, progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregate::tests::{dai, ether, usdc};
    use crate::core::arn::Arn;
    use crate::core::balance::BalanceEntry;
    use crate::core::price::PriceQuote;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct MockBalances {
        balances: HashMap<Context, Vec<BalanceEntry>>,
    }

    #[async_trait]
    impl BalanceSource for MockBalances {
        async fn get_balances(&self, context: &Context) -> Result<Vec<BalanceEntry>> {
            self.balances
                .get(context)
                .cloned()
                .ok_or_else(|| anyhow!("Unknown context {}", context))
        }
    }

    /// Prices that resolve immediately, on `release`, never, or with an error.
    #[derive(Default)]
    struct MockPrices {
        prices: HashMap<Arn, Decimal>,
        gated: HashMap<Arn, Arc<Notify>>,
        stuck: Vec<Arn>,
        calls: AtomicUsize,
    }

    impl MockPrices {
        fn with_price(mut self, arn: Arn, price: &str) -> Self {
            self.prices.insert(arn, Decimal::from_str(price).unwrap());
            self
        }

        fn with_gate(mut self, arn: Arn, gate: Arc<Notify>) -> Self {
            self.gated.insert(arn, gate);
            self
        }

        fn with_stuck(mut self, arn: Arn) -> Self {
            self.stuck.push(arn);
            self
        }
    }

    #[async_trait]
    impl PriceProvider for MockPrices {
        async fn fetch_price(&self, arn: &Arn) -> Result<PriceQuote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stuck.contains(arn) {
                futures::future::pending::<()>().await;
            }
            if let Some(gate) = self.gated.get(arn) {
                gate.notified().await;
            }
            self.prices
                .get(arn)
                .map(|price| PriceQuote::new(*arn, *price))
                .ok_or_else(|| anyhow!("No price for {}", arn))
        }
    }

    fn registry() -> Arc<AssetRegistry> {
        Arc::new(AssetRegistry::new([ether(), usdc(), dai()]).unwrap())
    }

    fn balances(entries: Vec<(Context, Vec<BalanceEntry>)>) -> Arc<MockBalances> {
        Arc::new(MockBalances {
            balances: entries.into_iter().collect(),
        })
    }

    #[tokio::test]
    async fn test_ether_balance_resolves() {
        let context = Context::key(1);
        let source = balances(vec![(
            context,
            vec![BalanceEntry::new(Arn::ether(), 2_000_000_000_000_000_000)],
        )]);
        let prices = Arc::new(MockPrices::default().with_price(Arn::ether(), "2000.00"));
        let aggregator = Aggregator::new(source, prices.clone(), registry());

        let state = aggregator.aggregate(context).await;
        assert_eq!(state.to_string(), "$4,000.00");
        assert_eq!(prices.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_one_lookup_per_distinct_asset() {
        let (usdc, dai) = (usdc(), dai());
        let context = Context::trust(7);
        let source = balances(vec![(
            context,
            vec![
                BalanceEntry::new(usdc.arn, 5_000_000),
                BalanceEntry::new(dai.arn, 3_000_000_000_000_000_000),
                BalanceEntry::new(usdc.arn, 1_000_000),
            ],
        )]);
        let prices = Arc::new(
            MockPrices::default()
                .with_price(usdc.arn, "1.00")
                .with_price(dai.arn, "0.999"),
        );
        let aggregator = Aggregator::new(source, prices.clone(), registry());

        let mut handle = aggregator.watch(context);
        let snapshot = handle.settled(None).await;

        assert_eq!(
            snapshot.state,
            AggregateState::Resolved(Decimal::from_str("8.997").unwrap())
        );
        assert_eq!(snapshot.progress.total, 2);
        assert_eq!(snapshot.progress.resolved, 2);
        assert_eq!(snapshot.entries.len(), 3);
        assert_eq!(prices.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_context_issues_no_lookups() {
        let context = Context::ledger();
        let source = balances(vec![(context, vec![])]);
        let prices = Arc::new(MockPrices::default());
        let aggregator = Aggregator::new(source, prices.clone(), registry());

        let state = aggregator.aggregate(context).await;
        assert_eq!(state, AggregateState::Empty);
        assert_eq!(state.to_string(), "$0.00");
        assert_eq!(prices.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stuck_quote_never_emits_partial_total() {
        let (usdc, dai) = (usdc(), dai());
        let context = Context::trust(2);
        let source = balances(vec![(
            context,
            vec![
                BalanceEntry::new(usdc.arn, 5_000_000),
                BalanceEntry::new(dai.arn, 3_000_000_000_000_000_000),
            ],
        )]);
        let prices = Arc::new(
            MockPrices::default()
                .with_price(usdc.arn, "1.00")
                .with_price(dai.arn, "0.999")
                .with_stuck(dai.arn),
        );
        let aggregator = Aggregator::new(source, prices, registry());

        let mut handle = aggregator.watch(context);
        let mut seen = Vec::new();
        let observe = async {
            while handle.changed().await {
                seen.push(handle.state());
            }
        };
        let _ = tokio::time::timeout(Duration::from_millis(100), observe).await;

        assert!(seen.iter().all(AggregateState::is_pending));
        let snapshot = handle.settled(Some(Duration::from_millis(10))).await;
        assert!(snapshot.state.is_pending());
        assert_eq!(snapshot.progress.resolved, 1);
        assert!(!snapshot.progress.done);
    }

    #[tokio::test]
    async fn test_failed_quote_keeps_total_pending() {
        let (usdc, dai) = (usdc(), dai());
        let context = Context::key(4);
        let source = balances(vec![(
            context,
            vec![
                BalanceEntry::new(usdc.arn, 5_000_000),
                BalanceEntry::new(dai.arn, 3_000_000_000_000_000_000),
            ],
        )]);
        let prices = Arc::new(MockPrices::default().with_price(usdc.arn, "1.00"));
        let aggregator = Aggregator::new(source, prices.clone(), registry());

        let mut handle = aggregator.watch(context);
        let snapshot = handle.settled(None).await;

        assert!(snapshot.state.is_pending());
        assert!(snapshot.progress.done);
        assert_eq!(snapshot.progress.failed, 1);
        assert_eq!(prices.calls.load(Ordering::SeqCst), 2);
        assert!(snapshot.entries[1].error.is_some());
    }

    #[tokio::test]
    async fn test_balance_failure_is_pending() {
        let aggregator = Aggregator::new(
            balances(vec![]),
            Arc::new(MockPrices::default()),
            registry(),
        );

        let mut handle = aggregator.watch(Context::key(99));
        let snapshot = handle.settled(None).await;
        assert!(snapshot.state.is_pending());
        assert!(snapshot.progress.done);
    }

    #[tokio::test]
    async fn test_context_switch_discards_stale_quotes() {
        let usdc = usdc();
        let old_context = Context::key(1);
        let new_context = Context::key(2);
        let source = balances(vec![
            (
                old_context,
                vec![BalanceEntry::new(Arn::ether(), 1_000_000_000_000_000_000)],
            ),
            (new_context, vec![BalanceEntry::new(usdc.arn, 5_000_000)]),
        ]);
        let gate = Arc::new(Notify::new());
        let prices = Arc::new(
            MockPrices::default()
                .with_price(Arn::ether(), "2000")
                .with_gate(Arn::ether(), gate.clone())
                .with_price(usdc.arn, "1.00"),
        );
        let aggregator = Aggregator::new(source, prices, registry());

        let mut old = aggregator.watch(old_context);
        while old.progress().total == 0 {
            assert!(old.changed().await);
        }

        let mut new = aggregator.watch(new_context);
        gate.notify_waiters();

        let snapshot = new.settled(None).await;
        assert_eq!(
            snapshot.state,
            AggregateState::Resolved(Decimal::from_str("5").unwrap())
        );
        assert!(new.generation() > old.generation());

        // The old aggregation was abandoned before its quote could land.
        let stale = old.settled(Some(Duration::from_millis(50))).await;
        assert!(stale.state.is_pending());
        assert_eq!(stale.progress.resolved, 0);
    }

    #[tokio::test]
    async fn test_detached_aggregations_do_not_cancel_each_other() {
        let (usdc, dai) = (usdc(), dai());
        let source = balances(vec![
            (Context::trust(1), vec![BalanceEntry::new(usdc.arn, 5_000_000)]),
            (
                Context::trust(2),
                vec![BalanceEntry::new(dai.arn, 1_000_000_000_000_000_000)],
            ),
        ]);
        let prices = Arc::new(
            MockPrices::default()
                .with_price(usdc.arn, "1.00")
                .with_price(dai.arn, "1.00"),
        );
        let aggregator = Aggregator::new(source, prices, registry());

        let mut first = aggregator.detached(Context::trust(1));
        let mut second = aggregator.detached(Context::trust(2));

        assert_eq!(first.settled(None).await.state.total(), Some(Decimal::from(5)));
        assert_eq!(second.settled(None).await.state.total(), Some(Decimal::ONE));
    }
}
