use crate::error::PriceError;
use crate::store::{insert_sorted, SeriesStore};
use core_types::{Currency, CurrencyPair, Quote, Time};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops::Bound::{Excluded, Unbounded};

/// A conversion factor between two currencies.
///
/// For `price(from, to)`, `bid` is the amount of `to` received for selling one unit of
/// `from` and `ask` is the amount of `to` paid for buying one unit of `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Price {
    pub const UNIT: Price = Price {
        bid: Decimal::ONE,
        ask: Decimal::ONE,
    };

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// The factor for the opposite direction: selling the other side means paying its ask.
    fn inverse(&self) -> Result<Price, PriceError> {
        let bid = Decimal::ONE
            .checked_div(self.ask)
            .ok_or_else(|| PriceError::Overflow(format!("inverse of ask {}", self.ask)))?;
        let ask = Decimal::ONE
            .checked_div(self.bid)
            .ok_or_else(|| PriceError::Overflow(format!("inverse of bid {}", self.bid)))?;
        Ok(Price { bid, ask })
    }

    /// Chains two conversions. Bids multiply with bids and asks with asks, so spreads compound.
    fn compose(&self, next: &Price) -> Result<Price, PriceError> {
        let bid = self
            .bid
            .checked_mul(next.bid)
            .ok_or_else(|| PriceError::Overflow(format!("{} x {}", self.bid, next.bid)))?;
        let ask = self
            .ask
            .checked_mul(next.ask)
            .ok_or_else(|| PriceError::Overflow(format!("{} x {}", self.ask, next.ask)))?;
        Ok(Price { bid, ask })
    }
}

enum EdgeLookup {
    Missing,
    Unquoted(CurrencyPair),
    Quoted(Price),
}

/// Currencies connected by time-indexed bid/ask quote series.
///
/// Every stored pair can be traversed in both directions. Lookups never see quotes
/// stamped after the requested time.
#[derive(Debug, Clone, Default)]
pub struct PriceGraph {
    edges: BTreeMap<CurrencyPair, Vec<Quote>>,
    adjacency: BTreeMap<Currency, BTreeSet<Currency>>,
    time_grid: BTreeSet<Time>,
}

impl PriceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph holding every series of `store`.
    pub fn from_store<S: SeriesStore + ?Sized>(store: &S) -> Result<Self, PriceError> {
        let mut graph = Self::new();
        for pair in store.pairs() {
            for quote in store.quotes(&pair).unwrap_or_default() {
                graph.insert_quote(quote.clone())?;
            }
        }
        tracing::debug!(
            pairs = graph.edges.len(),
            vertices = graph.adjacency.len(),
            steps = graph.time_grid.len(),
            "Price graph loaded from series store"
        );
        Ok(graph)
    }

    /// Adds a quote. A quote at an existing timestamp for the same pair replaces it.
    pub fn insert_quote(&mut self, quote: Quote) -> Result<(), PriceError> {
        let quote = Quote::new(quote.pair, quote.time, quote.bid, quote.ask)?;
        let pair = quote.pair.clone();
        self.adjacency
            .entry(pair.base.clone())
            .or_default()
            .insert(pair.quote.clone());
        self.adjacency
            .entry(pair.quote.clone())
            .or_default()
            .insert(pair.base.clone());
        self.time_grid.insert(quote.time);
        insert_sorted(self.edges.entry(pair).or_default(), quote);
        Ok(())
    }

    pub fn contains(&self, currency: &Currency) -> bool {
        self.adjacency.contains_key(currency)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Currency> {
        self.adjacency.keys()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &CurrencyPair> {
        self.edges.keys()
    }

    pub fn min_time(&self) -> Option<Time> {
        self.time_grid.first().copied()
    }

    pub fn max_time(&self) -> Option<Time> {
        self.time_grid.last().copied()
    }

    /// All distinct quote timestamps in ascending order.
    pub fn times(&self) -> impl Iterator<Item = &Time> {
        self.time_grid.iter()
    }

    /// The first quote timestamp strictly after `time`.
    pub fn next_time_after(&self, time: Time) -> Option<Time> {
        self.time_grid.range((Excluded(time), Unbounded)).next().copied()
    }

    /// The most recent quote for `pair` (stored orientation) at or before `time`.
    pub fn quote_at(&self, pair: &CurrencyPair, time: Time) -> Option<&Quote> {
        self.edges.get(pair).and_then(|series| latest(series, time))
    }

    /// Conversion factor from `from` to `to` at `time`.
    pub fn price(&self, from: &Currency, to: &Currency, time: Time) -> Result<Price, PriceError> {
        if from == to {
            return Ok(Price::UNIT);
        }
        if !self.contains(from) || !self.contains(to) {
            return Err(no_path(from, to));
        }
        let requested = CurrencyPair {
            base: from.clone(),
            quote: to.clone(),
        };
        match self.min_time() {
            Some(min_time) if time >= min_time => {}
            _ => return Err(PriceError::NoQuote { pair: requested, time }),
        }

        match self.edge_price(from, to, time)? {
            EdgeLookup::Quoted(price) => return Ok(price),
            EdgeLookup::Unquoted(pair) => return Err(PriceError::NoQuote { pair, time }),
            EdgeLookup::Missing => {}
        }

        let path = self.path(from, to, time)?;
        let mut price = Price::UNIT;
        for hop in path.windows(2) {
            match self.edge_price(&hop[0], &hop[1], time)? {
                EdgeLookup::Quoted(step) => price = price.compose(&step)?,
                EdgeLookup::Unquoted(pair) => return Err(PriceError::NoQuote { pair, time }),
                EdgeLookup::Missing => return Err(no_path(from, to)),
            }
        }
        tracing::trace!(%from, %to, hops = path.len() - 1, bid = %price.bid, ask = %price.ask, "Composed path price");
        Ok(price)
    }

    /// The shortest path (by hop count) from `from` to `to` over edges quoted at `time`.
    ///
    /// Among equally short paths the one visiting lexicographically smaller currencies
    /// first wins.
    pub fn path(&self, from: &Currency, to: &Currency, time: Time) -> Result<Vec<Currency>, PriceError> {
        if from == to {
            return Ok(vec![from.clone()]);
        }
        let quoted = |a: &Currency, b: &Currency| {
            matches!(self.edge_price(a, b, time), Ok(EdgeLookup::Quoted(_)))
        };
        if let Some(path) = self.shortest_path(from, to, quoted) {
            return Ok(path);
        }
        match self.shortest_path(from, to, |_, _| true) {
            Some(path) => {
                let pair = path
                    .windows(2)
                    .find(|hop| !quoted(&hop[0], &hop[1]))
                    .map(|hop| CurrencyPair {
                        base: hop[0].clone(),
                        quote: hop[1].clone(),
                    })
                    .unwrap_or(CurrencyPair {
                        base: from.clone(),
                        quote: to.clone(),
                    });
                Err(PriceError::NoQuote { pair, time })
            }
            None => Err(no_path(from, to)),
        }
    }

    /// Whether every currency in `currencies` can be priced in `numeraire` at `time`.
    pub fn is_connected<'a>(
        &self,
        currencies: impl IntoIterator<Item = &'a Currency>,
        numeraire: &Currency,
        time: Time,
    ) -> bool {
        currencies
            .into_iter()
            .all(|c| self.price(c, numeraire, time).is_ok())
    }

    fn edge_price(&self, from: &Currency, to: &Currency, time: Time) -> Result<EdgeLookup, PriceError> {
        let forward = CurrencyPair {
            base: from.clone(),
            quote: to.clone(),
        };
        let backward = forward.inverse();
        let forward_series = self.edges.get(&forward);
        let backward_series = self.edges.get(&backward);

        if let Some(quote) = forward_series.and_then(|s| latest(s, time)) {
            return Ok(EdgeLookup::Quoted(Price {
                bid: quote.bid,
                ask: quote.ask,
            }));
        }
        if let Some(quote) = backward_series.and_then(|s| latest(s, time)) {
            let stored = Price {
                bid: quote.bid,
                ask: quote.ask,
            };
            return Ok(EdgeLookup::Quoted(stored.inverse()?));
        }
        Ok(match (forward_series, backward_series) {
            (Some(_), _) => EdgeLookup::Unquoted(forward),
            (None, Some(_)) => EdgeLookup::Unquoted(backward),
            (None, None) => EdgeLookup::Missing,
        })
    }

    fn shortest_path<'a>(
        &'a self,
        from: &'a Currency,
        to: &'a Currency,
        usable: impl Fn(&Currency, &Currency) -> bool,
    ) -> Option<Vec<Currency>> {
        let mut parents: BTreeMap<&'a Currency, &'a Currency> = BTreeMap::new();
        let mut visited: BTreeSet<&'a Currency> = BTreeSet::from([from]);
        let mut queue: VecDeque<&'a Currency> = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            let Some(neighbours) = self.adjacency.get(current) else {
                continue;
            };
            for next in neighbours {
                if visited.contains(next) || !usable(current, next) {
                    continue;
                }
                visited.insert(next);
                parents.insert(next, current);
                if next == to {
                    let mut path = vec![next.clone()];
                    let mut node = next;
                    while let Some(parent) = parents.get(node) {
                        path.push((*parent).clone());
                        node = *parent;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }
}

fn latest(series: &[Quote], time: Time) -> Option<&Quote> {
    let idx = series.partition_point(|q| q.time <= time);
    idx.checked_sub(1).map(|i| &series[i])
}

fn no_path(from: &Currency, to: &Currency) -> PriceError {
    PriceError::NoPath {
        from: from.clone(),
        to: to.clone(),
    }
}
