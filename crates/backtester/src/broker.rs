use crate::error::BacktestError;
use crate::observer::Observer;
use crate::strategy::Strategy;
use configuration::{QuoteSeriesSettings, Settings};
use core_types::{Currency, CurrencyPair, Time};
use executor::{BatchReport, BrokerSimulator, ExecutorError, Order, OrderId, SimulatorConfig};
use price_graph::{InMemorySeriesStore, Price, PriceGraph};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Pending-queue size above which the first backlog warning is logged.
const INITIAL_BACKLOG_THRESHOLD: usize = 8;

/// The order-submission interface strategies talk to.
///
/// Implemented by the backtesting `Broker` and by live sessions.
pub trait BrokerApi {
    fn simulator(&self) -> &BrokerSimulator;

    /// Queues `order` for the next step.
    fn submit_order(&mut self, order: Order) -> Result<OrderId, ExecutorError>;

    fn cancel_order(&mut self, id: OrderId) -> Option<Order>;

    fn now(&self) -> Time {
        self.simulator().now()
    }

    fn default_numeraire(&self) -> &Currency {
        self.simulator().default_numeraire()
    }

    fn balance(&self, currency: &Currency) -> Option<Decimal> {
        self.simulator().balance(currency)
    }

    /// Net asset value in the default numeraire.
    fn nav(&self) -> Result<Decimal, ExecutorError> {
        self.simulator().nav()
    }

    fn weights(&self) -> Result<BTreeMap<Currency, Option<Decimal>>, ExecutorError> {
        self.simulator().weights(self.now())
    }

    fn price(&self, from: &Currency, to: &Currency) -> Result<Price, ExecutorError> {
        Ok(self.simulator().graph().price(from, to, self.now())?)
    }
}

/// Logs a warning when orders pile up in the queue, doubling the threshold each time.
#[derive(Debug, Clone)]
pub(crate) struct BacklogMonitor {
    threshold: usize,
}

impl Default for BacklogMonitor {
    fn default() -> Self {
        Self {
            threshold: INITIAL_BACKLOG_THRESHOLD,
        }
    }
}

impl BacklogMonitor {
    pub(crate) fn check(&mut self, simulator: &BrokerSimulator) {
        let pending = simulator.pending_count();
        if pending <= self.threshold {
            return;
        }
        let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
        for (_, order) in simulator.pending_orders() {
            *kinds.entry(order.kind()).or_default() += 1;
        }
        let summary = kinds
            .iter()
            .map(|(kind, count)| format!("{}:{}", kind, count))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::warn!(pending, threshold = self.threshold, %summary, "Orders are piling up in the queue");
        self.threshold *= 2;
    }
}

/// Totals over a `run`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub start: Time,
    pub end: Time,
    pub steps: usize,
    pub executed: usize,
    pub rejected: usize,
    pub final_nav: Option<Decimal>,
}

impl RunSummary {
    pub(crate) fn new(start: Time) -> Self {
        Self {
            start,
            end: start,
            steps: 0,
            executed: 0,
            rejected: 0,
            final_nav: None,
        }
    }

    pub(crate) fn absorb(&mut self, report: &BatchReport) {
        self.steps += 1;
        self.executed += report.executed.len();
        self.rejected += report.rejected.len();
        self.end = report.time;
    }
}

/// The backtesting broker: a `BrokerSimulator` stepped through the quote timestamps.
#[derive(Debug, Clone)]
pub struct Broker {
    simulator: BrokerSimulator,
    backlog: BacklogMonitor,
}

impl Broker {
    pub fn new(simulator: BrokerSimulator) -> Self {
        Self {
            simulator,
            backlog: BacklogMonitor::default(),
        }
    }

    /// Builds the price graph, filters and initial accounts from the run settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, BacktestError> {
        let store = store_from_settings(&settings.quotes)?;
        let graph = PriceGraph::from_store(&store).map_err(ExecutorError::from)?;
        let simulator = simulator_from_settings(settings, graph, settings.broker.start_time)?;
        Ok(Self::new(simulator))
    }

    pub fn simulator(&self) -> &BrokerSimulator {
        &self.simulator
    }

    pub fn into_simulator(self) -> BrokerSimulator {
        self.simulator
    }

    /// Advances to the next quote timestamp. Returns `None` when the data is exhausted.
    pub fn step(&mut self) -> Result<Option<BatchReport>, BacktestError> {
        let Some(next) = self.simulator.graph().next_time_after(self.simulator.now()) else {
            return Ok(None);
        };
        self.advance_to(next).map(Some)
    }

    /// Advances to an arbitrary time, applying all queued orders there.
    pub fn advance_to(&mut self, time: Time) -> Result<BatchReport, BacktestError> {
        Ok(self.simulator.advance_time(time)?)
    }

    /// Runs `strategy` over the quote history.
    ///
    /// Skips forward to `start_time` if given, then repeats observe, strategy, step until
    /// the data is exhausted or `max_iterations` steps have been taken.
    pub fn run(
        &mut self,
        strategy: &mut dyn Strategy,
        observer: &mut dyn Observer,
        start_time: Option<Time>,
        max_iterations: usize,
    ) -> Result<RunSummary, BacktestError> {
        if let Some(start) = start_time {
            if start > self.simulator.now() {
                let report = self.advance_to(start)?;
                tracing::debug!(%start, executed = report.executed.len(), "Skipped to start time");
            }
        }
        if self.simulator.graph().max_time().is_none() {
            return Err(BacktestError::DataUnavailable);
        }

        let mut summary = RunSummary::new(self.simulator.now());
        tracing::info!(strategy = strategy.name(), start = %summary.start, max_iterations, "Starting run");
        let mut exhausted = false;
        for _ in 0..max_iterations {
            observer.observe(&self.simulator);
            strategy.on_step(self)?;
            self.backlog.check(&self.simulator);
            match self.step()? {
                Some(report) => summary.absorb(&report),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }
        if !exhausted {
            // Out of iterations: the last step has not been observed yet.
            observer.observe(&self.simulator);
        }

        summary.end = self.simulator.now();
        summary.final_nav = self.simulator.nav().ok();
        tracing::info!(
            steps = summary.steps,
            executed = summary.executed,
            rejected = summary.rejected,
            end = %summary.end,
            "Run complete"
        );
        Ok(summary)
    }
}

impl BrokerApi for Broker {
    fn simulator(&self) -> &BrokerSimulator {
        &self.simulator
    }

    fn submit_order(&mut self, order: Order) -> Result<OrderId, ExecutorError> {
        self.simulator.submit_order(order)
    }

    fn cancel_order(&mut self, id: OrderId) -> Option<Order> {
        self.simulator.cancel_order(id)
    }
}

/// Opens the configured accounts at `start_time` (or the first quote in `graph`) with the
/// configured filters.
pub fn simulator_from_settings(
    settings: &Settings,
    graph: PriceGraph,
    start_time: Option<Time>,
) -> Result<BrokerSimulator, BacktestError> {
    let mut config = SimulatorConfig::from_settings(&settings.broker, &settings.filters)?;
    config.start_time = start_time;
    let initial_orders = settings
        .accounts
        .iter()
        .map(Order::from_account_settings)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BrokerSimulator::new(config, graph, initial_orders)?)
}

/// Loads configured quote series into an in-memory store.
pub fn store_from_settings(
    quotes: &[QuoteSeriesSettings],
) -> Result<InMemorySeriesStore, BacktestError> {
    let mut store = InMemorySeriesStore::new();
    for series in quotes {
        let pair = CurrencyPair::new(series.base.clone(), series.quote.clone())
            .map_err(ExecutorError::from)?;
        store
            .insert_series(
                &pair,
                series.series.iter().map(|o| (o.time, o.bid, o.ask)),
            )
            .map_err(ExecutorError::from)?;
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NavRecorder;
    use chrono::{Duration, TimeZone, Utc};
    use core_types::Quote;
    use rust_decimal_macros::dec;

    fn cur(code: &str) -> Currency {
        Currency::new(code).unwrap()
    }

    fn t(day: i64) -> Time {
        Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn broker(days: i64) -> Broker {
        let pair = CurrencyPair::new(cur("EUR"), cur("USD")).unwrap();
        let mut graph = PriceGraph::new();
        for day in 0..days {
            graph.insert_quote(Quote::mid(pair.clone(), t(day), dec!(2)).unwrap()).unwrap();
        }
        let accounts = [
            Order::create_account(cur("EUR"), dec!(100)).unwrap(),
            Order::create_account(cur("USD"), dec!(0)).unwrap(),
        ];
        Broker::new(BrokerSimulator::new(SimulatorConfig::new(cur("EUR")), graph, accounts).unwrap())
    }

    #[test]
    fn step_walks_the_quote_grid() {
        let mut broker = broker(3);
        assert_eq!(broker.step().unwrap().unwrap().time, t(1));
        assert_eq!(broker.step().unwrap().unwrap().time, t(2));
        assert!(broker.step().unwrap().is_none());
    }

    #[test]
    fn submitted_orders_wait_for_the_next_step() {
        let mut broker = broker(2);
        let id = broker.submit_order(Order::sell(cur("EUR"), cur("USD"), dec!(10)).unwrap()).unwrap();
        assert_eq!(broker.balance(&cur("EUR")), Some(dec!(100)));
        let report = broker.step().unwrap().unwrap();
        assert_eq!(report.executed, vec![id]);
        assert_eq!(broker.balance(&cur("USD")), Some(dec!(20)));
    }

    #[test]
    fn backlog_threshold_doubles() {
        let mut broker = broker(1);
        for _ in 0..9 {
            broker.submit_order(Order::sell(cur("EUR"), cur("USD"), dec!(1)).unwrap()).unwrap();
        }
        broker.backlog.check(&broker.simulator);
        assert_eq!(broker.backlog.threshold, 16);
        broker.backlog.check(&broker.simulator);
        assert_eq!(broker.backlog.threshold, 16);
    }

    #[test]
    fn the_last_step_is_observed_when_iterations_run_out() {
        let mut broker = broker(4);
        let mut recorder = NavRecorder::new();
        let mut idle = |_: &mut dyn BrokerApi| -> Result<(), BacktestError> { Ok(()) };
        let summary = broker.run(&mut idle, &mut recorder, None, 2).unwrap();

        assert_eq!(summary.steps, 2);
        assert_eq!(summary.end, t(2));
        assert_eq!(recorder.points().len(), 3);
        let last = recorder.last().unwrap();
        assert_eq!(last.time, t(2));
        assert_eq!(last.nav, summary.final_nav);
    }

    #[test]
    fn exhausted_data_is_observed_once() {
        let mut broker = broker(3);
        let mut recorder = NavRecorder::new();
        let mut idle = |_: &mut dyn BrokerApi| -> Result<(), BacktestError> { Ok(()) };
        let summary = broker.run(&mut idle, &mut recorder, None, 100).unwrap();

        assert_eq!(summary.steps, 2);
        let times: Vec<_> = recorder.points().iter().map(|point| point.time).collect();
        assert_eq!(times, vec![t(0), t(1), t(2)]);
    }
}
