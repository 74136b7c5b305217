use crate::error::PriceError;
use core_types::{Currency, CurrencyPair, Quote, Time};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/// Read access to a collection of quote series.
///
/// This is the boundary to whatever holds historical data. The simulator only needs
/// to enumerate the pairs and read each series in time order.
pub trait SeriesStore {
    /// The earliest quote timestamp across all series.
    fn get_min_time(&self) -> Option<Time>;

    /// All currencies appearing in any pair.
    fn vertices(&self) -> BTreeSet<Currency>;

    /// All stored pairs, in their stored orientation.
    fn pairs(&self) -> Vec<CurrencyPair>;

    /// The series for `pair`, sorted by time.
    fn quotes(&self, pair: &CurrencyPair) -> Option<&[Quote]>;
}

/// A `SeriesStore` backed by in-memory vectors.
#[derive(Debug, Clone, Default)]
pub struct InMemorySeriesStore {
    series: BTreeMap<CurrencyPair, Vec<Quote>>,
}

impl InMemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from an arbitrary collection of quotes.
    pub fn from_quotes(quotes: impl IntoIterator<Item = Quote>) -> Self {
        let mut store = Self::new();
        for quote in quotes {
            store.insert(quote);
        }
        store
    }

    /// Adds a whole series for `pair` given as `(time, bid, ask)` triples.
    pub fn insert_series(
        &mut self,
        pair: &CurrencyPair,
        observations: impl IntoIterator<Item = (Time, Decimal, Decimal)>,
    ) -> Result<(), PriceError> {
        for (time, bid, ask) in observations {
            self.insert(Quote::new(pair.clone(), time, bid, ask)?);
        }
        Ok(())
    }

    /// Inserts a quote keeping the series sorted. A quote at an existing timestamp replaces it.
    pub fn insert(&mut self, quote: Quote) {
        let series = self.series.entry(quote.pair.clone()).or_default();
        insert_sorted(series, quote);
    }

    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SeriesStore for InMemorySeriesStore {
    fn get_min_time(&self) -> Option<Time> {
        self.series.values().filter_map(|s| s.first()).map(|q| q.time).min()
    }

    fn vertices(&self) -> BTreeSet<Currency> {
        self.series
            .keys()
            .flat_map(|pair| [pair.base.clone(), pair.quote.clone()])
            .collect()
    }

    fn pairs(&self) -> Vec<CurrencyPair> {
        self.series.keys().cloned().collect()
    }

    fn quotes(&self, pair: &CurrencyPair) -> Option<&[Quote]> {
        self.series.get(pair).map(Vec::as_slice)
    }
}

pub(crate) fn insert_sorted(series: &mut Vec<Quote>, quote: Quote) {
    let idx = series.partition_point(|q| q.time < quote.time);
    if idx < series.len() && series[idx].time == quote.time {
        series[idx] = quote;
    } else {
        series.insert(idx, quote);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn cur(code: &str) -> Currency {
        Currency::new(code).unwrap()
    }

    #[test]
    fn series_are_sorted_and_deduplicated() {
        let pair = CurrencyPair::new(cur("EUR"), cur("USD")).unwrap();
        let t0 = Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap();
        let mut store = InMemorySeriesStore::new();
        store
            .insert_series(
                &pair,
                vec![
                    (t0 + Duration::days(2), dec!(1.3), dec!(1.3)),
                    (t0, dec!(1.1), dec!(1.1)),
                    (t0 + Duration::days(1), dec!(1.2), dec!(1.2)),
                    (t0, dec!(1.15), dec!(1.15)),
                ],
            )
            .unwrap();

        let quotes = store.quotes(&pair).unwrap();
        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes[0].bid, dec!(1.15));
        assert!(quotes.windows(2).all(|w| w[0].time < w[1].time));
        assert_eq!(store.get_min_time(), Some(t0));
    }

    #[test]
    fn vertices_cover_both_sides_of_every_pair() {
        let t0 = Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap();
        let store = InMemorySeriesStore::from_quotes(vec![
            Quote::mid(CurrencyPair::new(cur("EUR"), cur("USD")).unwrap(), t0, dec!(1.2)).unwrap(),
            Quote::mid(CurrencyPair::new(cur("XAU"), cur("USD")).unwrap(), t0, dec!(1800)).unwrap(),
        ]);
        let vertices: Vec<String> = store.vertices().into_iter().map(String::from).collect();
        assert_eq!(vertices, vec!["EUR", "USD", "XAU"]);
        assert_eq!(store.pairs().len(), 2);
    }

    #[test]
    fn invalid_observations_are_rejected() {
        let pair = CurrencyPair::new(cur("EUR"), cur("USD")).unwrap();
        let t0 = Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap();
        let mut store = InMemorySeriesStore::new();
        let result = store.insert_series(&pair, vec![(t0, dec!(1.2), dec!(1.1))]);
        assert!(matches!(result, Err(PriceError::InvalidQuote(_))));
    }
}
