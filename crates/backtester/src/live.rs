use crate::broker::{BacklogMonitor, BrokerApi, RunSummary};
use crate::error::BacktestError;
use crate::observer::Observer;
use crate::strategy::Strategy;
use async_trait::async_trait;
use core_types::{Currency, Quote, Time};
use executor::{BrokerSimulator, ExecutorError, LedgerSnapshot, Order, OrderId};
use price_graph::SeriesStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Something that happened on the market.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// A new price observation.
    Quote(Quote),
    /// The clock moved without a new price.
    Heartbeat(Time),
}

impl MarketEvent {
    pub fn time(&self) -> Time {
        match self {
            MarketEvent::Quote(quote) => quote.time,
            MarketEvent::Heartbeat(time) => *time,
        }
    }
}

/// A feed of market events, in time order.
#[async_trait]
pub trait MarketEventSource: Send {
    /// Waits for the next event. `Ok(None)` means the feed has ended.
    async fn next_event(&mut self) -> Result<Option<MarketEvent>, BacktestError>;
}

/// A `MarketEventSource` fed through a tokio channel.
pub struct ChannelSource {
    receiver: mpsc::Receiver<MarketEvent>,
}

impl ChannelSource {
    /// Creates the source together with the sender feeding it.
    pub fn new(capacity: usize) -> (mpsc::Sender<MarketEvent>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self { receiver })
    }
}

#[async_trait]
impl MarketEventSource for ChannelSource {
    async fn next_event(&mut self) -> Result<Option<MarketEvent>, BacktestError> {
        Ok(self.receiver.recv().await)
    }
}

/// The strategy's view of the simulator while a live step holds the lock.
pub struct LiveSession<'a> {
    simulator: &'a mut BrokerSimulator,
}

impl BrokerApi for LiveSession<'_> {
    fn simulator(&self) -> &BrokerSimulator {
        self.simulator
    }

    fn submit_order(&mut self, order: Order) -> Result<OrderId, ExecutorError> {
        self.simulator.submit_order(order)
    }

    fn cancel_order(&mut self, id: OrderId) -> Option<Order> {
        self.simulator.cancel_order(id)
    }
}

/// Cloneable access to a running `LiveBroker` from other tasks.
///
/// Every call takes the simulator lock, so it never interleaves with a step in progress.
#[derive(Clone)]
pub struct LiveHandle {
    simulator: Arc<Mutex<BrokerSimulator>>,
}

impl LiveHandle {
    pub async fn submit_order(&self, order: Order) -> Result<OrderId, ExecutorError> {
        self.simulator.lock().await.submit_order(order)
    }

    pub async fn cancel_order(&self, id: OrderId) -> Option<Order> {
        self.simulator.lock().await.cancel_order(id)
    }

    pub async fn balance(&self, currency: &Currency) -> Option<Decimal> {
        self.simulator.lock().await.balance(currency)
    }

    pub async fn nav(&self) -> Result<Decimal, ExecutorError> {
        self.simulator.lock().await.nav()
    }

    pub async fn now(&self) -> Time {
        self.simulator.lock().await.now()
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.simulator.lock().await.snapshot()
    }

    /// Runs `read` against the simulator under the lock.
    pub async fn with_simulator<R>(&self, read: impl FnOnce(&BrokerSimulator) -> R) -> R {
        let simulator = self.simulator.lock().await;
        read(&simulator)
    }
}

/// Drives a `BrokerSimulator` from a live market feed.
///
/// Events are grouped by timestamp. A timestamp is settled once an event with a later
/// time arrives, on a heartbeat for it, or when the feed ends: queued orders are applied
/// there with every quote stamped at or before it, then the observer and the strategy run.
/// Fed the same quotes in time order, this gives the same ledger as `Broker::run`.
pub struct LiveBroker<S> {
    simulator: Arc<Mutex<BrokerSimulator>>,
    source: S,
    backlog: BacklogMonitor,
}

impl<S: MarketEventSource> LiveBroker<S> {
    pub fn new(simulator: BrokerSimulator, source: S) -> Self {
        Self {
            simulator: Arc::new(Mutex::new(simulator)),
            source,
            backlog: BacklogMonitor::default(),
        }
    }

    pub fn handle(&self) -> LiveHandle {
        LiveHandle {
            simulator: Arc::clone(&self.simulator),
        }
    }

    /// Consumes events until the feed ends.
    ///
    /// Orders that cannot be priced yet stay queued and are retried at the next timestamp.
    pub async fn run(
        &mut self,
        strategy: &mut dyn Strategy,
        observer: &mut dyn Observer,
    ) -> Result<RunSummary, BacktestError> {
        let start = self.simulator.lock().await.now();
        let mut summary = RunSummary::new(start);
        tracing::info!(strategy = strategy.name(), %start, "Live session started");

        // The timestamp whose events are still being collected. The start time is open
        // until the first later event, so the strategy sees it like any other step.
        let mut open = Some(start);
        while let Some(event) = self.source.next_event().await? {
            let time = event.time();
            let mut simulator = self.simulator.lock().await;

            if let Some(pending) = open.filter(|pending| time > *pending) {
                Self::settle(
                    &mut self.backlog,
                    &mut simulator,
                    pending,
                    strategy,
                    observer,
                    &mut summary,
                )?;
                open = None;
            }

            match event {
                MarketEvent::Quote(quote) => {
                    if open.is_some_and(|pending| quote.time < pending) {
                        tracing::warn!(time = %quote.time, pair = %quote.pair, "Out of order quote ignored");
                        continue;
                    }
                    match simulator.record_quote(quote) {
                        Ok(()) => {}
                        Err(error @ ExecutorError::TimeOrderViolation { .. }) => {
                            tracing::warn!(%error, "Stale quote ignored");
                            continue;
                        }
                        Err(error) => return Err(error.into()),
                    }
                    if open.is_none() && time > simulator.now() {
                        open = Some(time);
                    }
                }
                MarketEvent::Heartbeat(_) => {
                    if open.is_none() && time > simulator.now() {
                        open = Some(time);
                    }
                    // Nothing more will arrive for this timestamp.
                    if open == Some(time) {
                        Self::settle(
                            &mut self.backlog,
                            &mut simulator,
                            time,
                            strategy,
                            observer,
                            &mut summary,
                        )?;
                        open = None;
                    }
                }
            }
        }

        let mut simulator = self.simulator.lock().await;
        if let Some(pending) = open {
            Self::settle(
                &mut self.backlog,
                &mut simulator,
                pending,
                strategy,
                observer,
                &mut summary,
            )?;
        }
        summary.end = simulator.now();
        summary.final_nav = simulator.nav().ok();
        tracing::info!(steps = summary.steps, executed = summary.executed, "Market feed ended");
        Ok(summary)
    }

    /// Applies queued orders at `time` if it is past the cursor, then observes and runs
    /// the strategy.
    fn settle(
        backlog: &mut BacklogMonitor,
        simulator: &mut BrokerSimulator,
        time: Time,
        strategy: &mut dyn Strategy,
        observer: &mut dyn Observer,
        summary: &mut RunSummary,
    ) -> Result<(), BacktestError> {
        if time > simulator.now() {
            match simulator.advance_time(time) {
                Ok(report) => summary.absorb(&report),
                Err(ExecutorError::Price(error)) => {
                    tracing::warn!(%time, %error, pending = simulator.pending_count(), "Orders postponed");
                    return Ok(());
                }
                Err(error) => return Err(error.into()),
            }
        }

        observer.observe(simulator);
        let mut session = LiveSession {
            simulator: &mut *simulator,
        };
        strategy.on_step(&mut session)?;
        backlog.check(simulator);
        Ok(())
    }
}

/// Every quote in `store` as a market event, in time order.
pub fn replay_events<T: SeriesStore + ?Sized>(store: &T) -> Vec<MarketEvent> {
    let mut quotes: Vec<Quote> = store
        .pairs()
        .iter()
        .filter_map(|pair| store.quotes(pair))
        .flatten()
        .cloned()
        .collect();
    quotes.sort_by_key(|quote| quote.time);
    quotes.into_iter().map(MarketEvent::Quote).collect()
}
