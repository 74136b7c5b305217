use crate::error::BacktestError;
use core_types::{Currency, Time};
use executor::BrokerSimulator;
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Read-only hook called once per step, before the strategy runs.
pub trait Observer {
    fn observe(&mut self, simulator: &BrokerSimulator);
}

impl Observer for () {
    fn observe(&mut self, _simulator: &BrokerSimulator) {}
}

/// One row of the NAV history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavPoint {
    pub time: Time,
    /// `None` when some account could not be priced at this step.
    pub nav: Option<Decimal>,
    /// Relative to the first defined NAV.
    pub total_return: Option<Decimal>,
    pub values: BTreeMap<Currency, Decimal>,
}

/// Records NAV, total return and per-account values in the default numeraire.
#[derive(Debug, Clone, Default)]
pub struct NavRecorder {
    points: Vec<NavPoint>,
    initial_nav: Option<Decimal>,
}

impl NavRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[NavPoint] {
        &self.points
    }

    pub fn last(&self) -> Option<&NavPoint> {
        self.points.last()
    }

    pub fn initial_nav(&self) -> Option<Decimal> {
        self.initial_nav
    }
}

impl Observer for NavRecorder {
    fn observe(&mut self, simulator: &BrokerSimulator) {
        let time = simulator.now();
        let (nav, values) =
            match simulator.values_all_accounts(simulator.default_numeraire(), time) {
                Ok(values) => {
                    let nav = values
                        .values()
                        .try_fold(Decimal::ZERO, |total, value| total.checked_add(*value));
                    (nav, values)
                }
                Err(error) => {
                    tracing::debug!(%time, %error, "NAV unavailable");
                    (None, BTreeMap::new())
                }
            };

        if self.initial_nav.is_none() {
            self.initial_nav = nav;
        }
        let total_return = match (nav, self.initial_nav) {
            (Some(nav), Some(initial)) if !initial.is_zero() => {
                nav.checked_div(initial).map(|ratio| ratio - Decimal::ONE)
            }
            _ => None,
        };
        self.points.push(NavPoint {
            time,
            nav,
            total_return,
            values,
        });
    }
}

/// Drives an `indicatif` progress bar while forwarding to another observer.
pub struct ProgressObserver<O> {
    bar: ProgressBar,
    inner: O,
}

impl<O: Observer> ProgressObserver<O> {
    pub fn new(total_steps: u64, inner: O) -> Result<Self, BacktestError> {
        let bar = ProgressBar::new(total_steps);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
                .progress_chars("=>-"),
        );
        Ok(Self { bar, inner })
    }

    /// A progress observer that draws nothing, for non-interactive runs.
    pub fn hidden(inner: O) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            inner,
        }
    }

    /// Closes the bar and hands back the wrapped observer.
    pub fn finish(self, message: &'static str) -> O {
        self.bar.finish_with_message(message);
        self.inner
    }
}

impl<O: Observer> Observer for ProgressObserver<O> {
    fn observe(&mut self, simulator: &BrokerSimulator) {
        self.inner.observe(simulator);
        self.bar.set_message(simulator.now().format("%Y-%m-%d %H:%M").to_string());
        self.bar.inc(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use core_types::{CurrencyPair, Quote};
    use executor::{Order, SimulatorConfig};
    use price_graph::PriceGraph;
    use rust_decimal_macros::dec;

    fn cur(code: &str) -> Currency {
        Currency::new(code).unwrap()
    }

    fn t(day: i64) -> Time {
        Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    #[test]
    fn nav_recorder_tracks_returns() {
        let pair = CurrencyPair::new(cur("USD"), cur("EUR")).unwrap();
        let mut graph = PriceGraph::new();
        graph.insert_quote(Quote::mid(pair.clone(), t(0), dec!(0.8)).unwrap()).unwrap();
        graph.insert_quote(Quote::mid(pair, t(1), dec!(1)).unwrap()).unwrap();
        let mut sim = BrokerSimulator::new(
            SimulatorConfig::new(cur("EUR")),
            graph,
            [Order::create_account(cur("USD"), dec!(100)).unwrap()],
        )
        .unwrap();

        let mut recorder = NavRecorder::new();
        recorder.observe(&sim);
        sim.advance_time(t(1)).unwrap();
        recorder.observe(&sim);

        assert_eq!(recorder.initial_nav(), Some(dec!(80)));
        let last = recorder.last().unwrap();
        assert_eq!(last.nav, Some(dec!(100)));
        assert_eq!(last.total_return, Some(dec!(0.25)));
        assert_eq!(last.values[&cur("USD")], dec!(100));
    }

    #[test]
    fn unpriceable_portfolios_record_no_nav() {
        let pair = CurrencyPair::new(cur("USD"), cur("EUR")).unwrap();
        let mut graph = PriceGraph::new();
        graph.insert_quote(Quote::mid(pair, t(0), dec!(0.8)).unwrap()).unwrap();
        let sim = BrokerSimulator::new(
            SimulatorConfig::new(cur("EUR")),
            graph,
            [Order::create_account(cur("CHF"), dec!(1)).unwrap()],
        )
        .unwrap();

        let mut recorder = NavRecorder::new();
        recorder.observe(&sim);
        assert_eq!(recorder.points()[0].nav, None);
        assert!(recorder.points()[0].values.is_empty());
    }
}
