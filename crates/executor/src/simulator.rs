use crate::error::ExecutorError;
use crate::filters::{CostCharge, ExecutionContext, TransactionCostFilter};
use crate::ledger::{Account, Ledger, LedgerDelta};
use crate::orders::{Order, OrderId};
use configuration::{BrokerSettings, FilterSettings};
use core_types::{
    checked_time, negligible_amount, Amount, ConvertDirection, Currency, OrderStatus, Quote, Time,
};
use price_graph::{Price, PriceError, PriceGraph};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Executed orders kept in the history before the oldest are dropped.
pub const MAX_EXECUTED_ORDERS: usize = 100_000;
/// Rejected orders kept in the history before the oldest are dropped.
pub const MAX_REJECTED_ORDERS: usize = 5_000;

/// Portfolio values below this are treated as zero when computing weights.
fn negligible_nav() -> Decimal {
    Decimal::new(1, 8)
}

/// Construction-time parameters of a `BrokerSimulator`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub default_numeraire: Currency,
    /// Time of the initial orders. Defaults to the earliest quote in the graph.
    pub start_time: Option<Time>,
    /// Applied in this order after every trade.
    pub filters: Vec<TransactionCostFilter>,
}

impl SimulatorConfig {
    pub fn new(default_numeraire: Currency) -> Self {
        Self {
            default_numeraire,
            start_time: None,
            filters: Vec::new(),
        }
    }

    pub fn with_start_time(mut self, start_time: Time) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_filter(mut self, filter: TransactionCostFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn from_settings(
        broker: &BrokerSettings,
        filters: &[FilterSettings],
    ) -> Result<Self, ExecutorError> {
        let filters = filters
            .iter()
            .map(TransactionCostFilter::from_settings)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            default_numeraire: broker.default_numeraire.clone(),
            start_time: broker.start_time,
            filters,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimulatorState {
    Idle,
    Processing,
}

/// A cost booked against an account as part of a trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedCost {
    pub filter: String,
    pub charge: CostCharge,
    /// What actually left the paying account, in that account's currency.
    pub paid: Amount,
}

/// Receipt of an executed trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    pub order_id: OrderId,
    pub time: Time,
    pub debited: Amount,
    pub credited: Amount,
    pub price: Price,
    pub costs: Vec<AppliedCost>,
}

/// Final state of an order that left the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub order: Order,
    pub status: OrderStatus,
    pub time: Time,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub id: OrderId,
    pub order: Order,
    pub error: ExecutorError,
}

/// Outcome of one `advance_time` call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub time: Time,
    pub executed: Vec<OrderId>,
    pub rejected: Vec<Rejection>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Serializable view of the simulator at its current time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerSnapshot {
    pub time: Time,
    pub default_numeraire: Currency,
    pub accounts: Vec<Account>,
    pub pending_orders: usize,
    pub executed_orders: usize,
    pub rejected_orders: usize,
    pub costs_by_filter: BTreeMap<String, BTreeMap<Currency, Decimal>>,
}

/// The single owner of the ledger.
///
/// Orders are queued by `submit_order` and only take effect when `advance_time` moves the
/// cursor forward. Every conversion is priced through the graph at the batch time and then
/// run through the cost filters; trade and costs are booked as one delta.
#[derive(Debug, Clone)]
pub struct BrokerSimulator {
    default_numeraire: Currency,
    filters: Vec<TransactionCostFilter>,
    graph: PriceGraph,
    ledger: Ledger,
    now: Time,
    state: SimulatorState,
    next_order_id: u64,
    pending: VecDeque<(OrderId, Order)>,
    executed: VecDeque<OrderRecord>,
    rejected: VecDeque<OrderRecord>,
    executions: VecDeque<Execution>,
    costs_by_filter: BTreeMap<String, BTreeMap<Currency, Decimal>>,
}

impl BrokerSimulator {
    /// Creates the simulator and applies `initial_orders` at the start time.
    pub fn new(
        config: SimulatorConfig,
        graph: PriceGraph,
        initial_orders: impl IntoIterator<Item = Order>,
    ) -> Result<Self, ExecutorError> {
        let start = config.start_time.or_else(|| graph.min_time()).ok_or_else(|| {
            ExecutorError::Configuration(
                "no start time configured and the price graph holds no quotes".to_string(),
            )
        })?;
        let start = checked_time(start)?;

        let mut names = BTreeSet::new();
        for filter in &config.filters {
            if !names.insert(filter.name()) {
                return Err(ExecutorError::Configuration(format!(
                    "filter {} is configured more than once",
                    filter.name()
                )));
            }
        }

        let mut simulator = Self {
            default_numeraire: config.default_numeraire,
            filters: config.filters,
            graph,
            ledger: Ledger::new(),
            now: start,
            state: SimulatorState::Idle,
            next_order_id: 0,
            pending: VecDeque::new(),
            executed: VecDeque::new(),
            rejected: VecDeque::new(),
            executions: VecDeque::new(),
            costs_by_filter: BTreeMap::new(),
        };
        for order in initial_orders {
            simulator.submit_order(order)?;
        }
        let report = simulator.process_batch(start)?;
        tracing::info!(
            start = %start,
            numeraire = %simulator.default_numeraire,
            accounts = simulator.ledger.len(),
            rejected = report.rejected.len(),
            "Broker simulator initialised"
        );
        Ok(simulator)
    }

    // --- Orders ---

    /// Validates and queues `order` for the next `advance_time`. The ledger is not touched.
    pub fn submit_order(&mut self, order: Order) -> Result<OrderId, ExecutorError> {
        order.validate()?;
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        tracing::debug!(order_id = %id, %order, "Order queued");
        self.pending.push_back((id, order));
        Ok(id)
    }

    /// Removes a queued order. Returns `None` if it is not pending anymore.
    pub fn cancel_order(&mut self, id: OrderId) -> Option<Order> {
        let index = self.pending.iter().position(|(pending, _)| *pending == id)?;
        let (_, order) = self.pending.remove(index)?;
        tracing::debug!(order_id = %id, %order, "Order cancelled");
        Some(order)
    }

    /// Applies every queued order at `target` and moves the cursor there.
    ///
    /// Order-scoped failures reject the order and the batch carries on. A pricing failure
    /// aborts the call: ledger, queue and cursor are left as they were.
    pub fn advance_time(&mut self, target: Time) -> Result<BatchReport, ExecutorError> {
        if target <= self.now {
            return Err(ExecutorError::TimeOrderViolation {
                current: self.now,
                requested: target,
            });
        }
        checked_time(target)?;
        let report = self.process_batch(target)?;
        self.now = target;
        Ok(report)
    }

    /// Adds a live quote to the price graph. It may not predate the cursor.
    pub fn record_quote(&mut self, quote: Quote) -> Result<(), ExecutorError> {
        if quote.time < self.now {
            return Err(ExecutorError::TimeOrderViolation {
                current: self.now,
                requested: quote.time,
            });
        }
        tracing::trace!(pair = %quote.pair, time = %quote.time, bid = %quote.bid, ask = %quote.ask, "Quote recorded");
        self.graph.insert_quote(quote)?;
        Ok(())
    }

    fn process_batch(&mut self, time: Time) -> Result<BatchReport, ExecutorError> {
        self.state = SimulatorState::Processing;
        let ledger_before = self.ledger.clone();
        let costs_before = self.costs_by_filter.clone();
        let batch: Vec<(OrderId, Order)> = self.pending.drain(..).collect();

        let mut report = BatchReport {
            time,
            executed: Vec::new(),
            rejected: Vec::new(),
        };
        let mut outcomes = Vec::with_capacity(batch.len());
        let mut executions = Vec::new();

        for index in 0..batch.len() {
            let id = batch[index].0;
            match self.apply_order(id, &batch[index].1, time) {
                Ok(execution) => {
                    report.executed.push(id);
                    outcomes.push((OrderStatus::Executed, None));
                    executions.extend(execution);
                }
                Err(error) if error.is_order_scoped() => {
                    tracing::warn!(order_id = %id, order = %batch[index].1, %error, "Order rejected");
                    outcomes.push((OrderStatus::Rejected, Some(error.to_string())));
                    report.rejected.push(Rejection {
                        id,
                        order: batch[index].1.clone(),
                        error,
                    });
                }
                Err(error) => {
                    self.ledger = ledger_before;
                    self.costs_by_filter = costs_before;
                    self.pending = batch.into_iter().collect();
                    self.state = SimulatorState::Idle;
                    tracing::error!(order_id = %id, %time, %error, "Batch aborted, ledger restored");
                    return Err(error);
                }
            }
        }

        for ((id, order), (status, reason)) in batch.into_iter().zip(outcomes) {
            let record = OrderRecord {
                id,
                order,
                status,
                time,
                reason,
            };
            match status {
                OrderStatus::Rejected => push_bounded(&mut self.rejected, record, MAX_REJECTED_ORDERS),
                _ => push_bounded(&mut self.executed, record, MAX_EXECUTED_ORDERS),
            }
        }
        for execution in executions {
            push_bounded(&mut self.executions, execution, MAX_EXECUTED_ORDERS);
        }

        self.state = SimulatorState::Idle;
        if !report.executed.is_empty() || !report.rejected.is_empty() {
            tracing::info!(
                %time,
                executed = report.executed.len(),
                rejected = report.rejected.len(),
                "Batch processed"
            );
        }
        Ok(report)
    }

    fn apply_order(
        &mut self,
        id: OrderId,
        order: &Order,
        time: Time,
    ) -> Result<Option<Execution>, ExecutorError> {
        match order {
            Order::CreateAccount {
                currency,
                initial_amount,
            } => {
                self.ledger.open(currency.clone(), *initial_amount)?;
                Ok(None)
            }
            Order::Deposit { amount } => {
                let mut delta = LedgerDelta::new();
                delta.credit(&amount.currency, amount.value)?;
                self.ledger.apply(&delta)?;
                Ok(None)
            }
            Order::Withdraw { amount } => {
                let mut delta = LedgerDelta::new();
                delta.debit(&amount.currency, amount.value)?;
                self.ledger.apply(&delta)?;
                Ok(None)
            }
            Order::Convert {
                from,
                to,
                amount,
                direction,
            } => self
                .execute_trade(id, order, from, to, amount, *direction, time)
                .map(Some),
            Order::TransferAll { from, to } => {
                self.require_accounts(from, to)?;
                let balance = self.ledger.balance(from).unwrap_or(Decimal::ZERO);
                if balance <= Decimal::ZERO {
                    tracing::debug!(order_id = %id, %from, "Nothing to transfer");
                    return Ok(None);
                }
                let amount = Amount {
                    value: balance,
                    currency: from.clone(),
                };
                self.execute_trade(id, order, from, to, &amount, ConvertDirection::Sell, time)
                    .map(Some)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_trade(
        &mut self,
        id: OrderId,
        order: &Order,
        from: &Currency,
        to: &Currency,
        amount: &Amount,
        direction: ConvertDirection,
        time: Time,
    ) -> Result<Execution, ExecutorError> {
        self.require_accounts(from, to)?;
        let price = self.price(from, to, time)?;

        let (debited, credited) = match direction {
            ConvertDirection::Sell => {
                let source_units = self.units_of(amount, from, time)?;
                (source_units, mul(source_units, price.bid)?)
            }
            ConvertDirection::Buy => {
                let target_units = self.units_of(amount, to, time)?;
                (div(target_units, price.bid)?, target_units)
            }
        };

        let mut delta = LedgerDelta::new();
        delta.debit(from, debited)?;
        delta.credit(to, credited)?;

        let context = ExecutionContext {
            time,
            from,
            to,
            debited,
            credited,
            price,
        };
        let mut costs = Vec::new();
        for filter in &self.filters {
            let Some(charge) = filter.apply(order, &context) else {
                continue;
            };
            // A transfer empties the source, so its costs come out of the proceeds.
            let payer = match order {
                Order::TransferAll { .. } => to,
                _ if &charge.currency == to => to,
                _ => from,
            };
            let paid = if &charge.currency == payer {
                charge.amount
            } else {
                let conversion = self.price(payer, &charge.currency, time)?;
                div(charge.amount, conversion.bid)?
            };
            delta.debit(payer, paid)?;
            costs.push(AppliedCost {
                filter: filter.name().to_string(),
                charge,
                paid: Amount {
                    value: paid,
                    currency: payer.clone(),
                },
            });
        }

        let totals = costs
            .iter()
            .map(|cost| {
                self.cost_total(&cost.filter, &cost.paid.currency)
                    .checked_add(cost.paid.value)
                    .ok_or_else(|| ExecutorError::Overflow(format!("costs of filter {}", cost.filter)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.ledger.apply(&delta)?;
        for (cost, total) in costs.iter().zip(totals) {
            self.costs_by_filter
                .entry(cost.filter.clone())
                .or_default()
                .insert(cost.paid.currency.clone(), total);
        }
        tracing::debug!(
            order_id = %id,
            %from,
            %to,
            %debited,
            %credited,
            costs = costs.len(),
            "Trade executed"
        );
        Ok(Execution {
            order_id: id,
            time,
            debited: Amount {
                value: debited,
                currency: from.clone(),
            },
            credited: Amount {
                value: credited,
                currency: to.clone(),
            },
            price,
            costs,
        })
    }

    fn cost_total(&self, filter: &str, currency: &Currency) -> Decimal {
        self.costs_by_filter
            .get(filter)
            .and_then(|totals| totals.get(currency))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn require_accounts(&self, from: &Currency, to: &Currency) -> Result<(), ExecutorError> {
        for currency in [from, to] {
            if !self.ledger.contains(currency) {
                return Err(ExecutorError::AccountNotFound(currency.clone()));
            }
        }
        Ok(())
    }

    /// Number of `unit` units worth `amount` when sold at bid.
    fn units_of(&self, amount: &Amount, unit: &Currency, time: Time) -> Result<Decimal, ExecutorError> {
        if &amount.currency == unit {
            return Ok(amount.value);
        }
        let price = self.price(unit, &amount.currency, time)?;
        div(amount.value, price.bid)
    }

    fn price(&self, from: &Currency, to: &Currency, time: Time) -> Result<Price, ExecutorError> {
        self.graph.price(from, to, time).map_err(|e| match e {
            PriceError::Overflow(what) => ExecutorError::Overflow(what),
            other => ExecutorError::Price(other),
        })
    }

    // --- Valuation ---

    /// Value of one account in `numeraire`. Long balances are valued at bid, short at ask.
    pub fn account_value(
        &self,
        currency: &Currency,
        numeraire: &Currency,
        time: Time,
    ) -> Result<Decimal, ExecutorError> {
        let balance = self
            .ledger
            .balance(currency)
            .ok_or_else(|| ExecutorError::AccountNotFound(currency.clone()))?;
        self.value_of(currency, balance, numeraire, time)
    }

    fn value_of(
        &self,
        currency: &Currency,
        balance: Decimal,
        numeraire: &Currency,
        time: Time,
    ) -> Result<Decimal, ExecutorError> {
        if balance.abs() < negligible_amount() {
            return Ok(Decimal::ZERO);
        }
        let price = self.price(currency, numeraire, time)?;
        let factor = if balance > Decimal::ZERO {
            price.bid
        } else {
            price.ask
        };
        mul(balance, factor)
    }

    pub fn values_all_accounts(
        &self,
        numeraire: &Currency,
        time: Time,
    ) -> Result<BTreeMap<Currency, Decimal>, ExecutorError> {
        self.ledger
            .accounts()
            .map(|account| {
                let value = self.value_of(account.currency(), account.balance(), numeraire, time)?;
                Ok((account.currency().clone(), value))
            })
            .collect()
    }

    /// Net asset value in `numeraire`. Fails if any non-empty account cannot be priced.
    pub fn total_value(&self, numeraire: &Currency, time: Time) -> Result<Decimal, ExecutorError> {
        self.values_all_accounts(numeraire, time)?
            .values()
            .try_fold(Decimal::ZERO, |total, value| {
                total
                    .checked_add(*value)
                    .ok_or_else(|| ExecutorError::Overflow("total portfolio value".to_string()))
            })
    }

    /// Net asset value in the default numeraire at the current time.
    pub fn nav(&self) -> Result<Decimal, ExecutorError> {
        self.total_value(&self.default_numeraire, self.now)
    }

    /// Share of each account in the NAV, in the default numeraire.
    ///
    /// Weights are `None` when the NAV is negligible.
    pub fn weights(&self, time: Time) -> Result<BTreeMap<Currency, Option<Decimal>>, ExecutorError> {
        let values = self.values_all_accounts(&self.default_numeraire, time)?;
        let mut nav = Decimal::ZERO;
        for value in values.values() {
            nav = nav
                .checked_add(*value)
                .ok_or_else(|| ExecutorError::Overflow("total portfolio value".to_string()))?;
        }
        let defined = nav.abs() >= negligible_nav();
        Ok(values
            .into_iter()
            .map(|(currency, value)| {
                let weight = if defined { value.checked_div(nav) } else { None };
                (currency, weight)
            })
            .collect())
    }

    // --- Queries ---

    pub fn now(&self) -> Time {
        self.now
    }

    pub fn state(&self) -> SimulatorState {
        self.state
    }

    pub fn default_numeraire(&self) -> &Currency {
        &self.default_numeraire
    }

    pub fn graph(&self) -> &PriceGraph {
        &self.graph
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn filters(&self) -> &[TransactionCostFilter] {
        &self.filters
    }

    pub fn balance(&self, currency: &Currency) -> Option<Decimal> {
        self.ledger.balance(currency)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.ledger.accounts()
    }

    /// Queued orders in submission order.
    pub fn pending_orders(&self) -> impl Iterator<Item = (OrderId, &Order)> {
        self.pending.iter().map(|(id, order)| (*id, order))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn executed_orders(&self) -> impl Iterator<Item = &OrderRecord> {
        self.executed.iter()
    }

    pub fn rejected_orders(&self) -> impl Iterator<Item = &OrderRecord> {
        self.rejected.iter()
    }

    pub fn executions(&self) -> impl Iterator<Item = &Execution> {
        self.executions.iter()
    }

    /// Costs paid per filter, keyed by the currency of the paying account.
    pub fn costs_by_filter(&self) -> &BTreeMap<String, BTreeMap<Currency, Decimal>> {
        &self.costs_by_filter
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            time: self.now,
            default_numeraire: self.default_numeraire.clone(),
            accounts: self.ledger.accounts().cloned().collect(),
            pending_orders: self.pending.len(),
            executed_orders: self.executed.len(),
            rejected_orders: self.rejected.len(),
            costs_by_filter: self.costs_by_filter.clone(),
        }
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, item: T, limit: usize) {
    if history.len() == limit {
        history.pop_front();
    }
    history.push_back(item);
}

fn mul(a: Decimal, b: Decimal) -> Result<Decimal, ExecutorError> {
    a.checked_mul(b)
        .ok_or_else(|| ExecutorError::Overflow(format!("{} x {}", a, b)))
}

fn div(a: Decimal, b: Decimal) -> Result<Decimal, ExecutorError> {
    a.checked_div(b)
        .ok_or_else(|| ExecutorError::Overflow(format!("{} / {}", a, b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use core_types::CurrencyPair;
    use rust_decimal_macros::dec;

    fn cur(code: &str) -> Currency {
        Currency::new(code).unwrap()
    }

    fn t(day: i64) -> Time {
        Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn quote(base: &str, quote: &str, day: i64, bid: Decimal, ask: Decimal) -> Quote {
        Quote::new(CurrencyPair::new(cur(base), cur(quote)).unwrap(), t(day), bid, ask).unwrap()
    }

    fn simulator(quotes: Vec<Quote>, accounts: &[(&str, Decimal)]) -> BrokerSimulator {
        let mut graph = PriceGraph::new();
        for q in quotes {
            graph.insert_quote(q).unwrap();
        }
        let orders = accounts
            .iter()
            .map(|(code, amount)| Order::create_account(cur(code), *amount).unwrap());
        BrokerSimulator::new(SimulatorConfig::new(cur("EUR")), graph, orders).unwrap()
    }

    #[test]
    fn initial_orders_apply_at_the_earliest_quote() {
        let sim = simulator(
            vec![quote("EUR", "USD", 0, dec!(1.1), dec!(1.2))],
            &[("EUR", dec!(100)), ("USD", dec!(0))],
        );
        assert_eq!(sim.now(), t(0));
        assert_eq!(sim.balance(&cur("EUR")), Some(dec!(100)));
        assert_eq!(sim.executed_orders().count(), 2);
        assert_eq!(sim.state(), SimulatorState::Idle);
    }

    #[test]
    fn an_empty_graph_needs_an_explicit_start() {
        let err = BrokerSimulator::new(SimulatorConfig::new(cur("EUR")), PriceGraph::new(), Vec::new())
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Configuration(_)));

        let config = SimulatorConfig::new(cur("EUR")).with_start_time(t(0));
        assert!(BrokerSimulator::new(config, PriceGraph::new(), Vec::new()).is_ok());
    }

    #[test]
    fn duplicate_accounts_are_rejected_per_order() {
        let mut sim = simulator(vec![quote("EUR", "USD", 0, dec!(1), dec!(1))], &[("EUR", dec!(5))]);
        sim.graph.insert_quote(quote("EUR", "USD", 1, dec!(1), dec!(1))).unwrap();
        let dup = sim.submit_order(Order::create_account(cur("EUR"), dec!(1)).unwrap()).unwrap();
        let usd = sim.submit_order(Order::create_account(cur("USD"), dec!(1)).unwrap()).unwrap();

        let report = sim.advance_time(t(1)).unwrap();
        assert_eq!(report.executed, vec![usd]);
        assert_eq!(report.rejected[0].id, dup);
        assert_eq!(report.rejected[0].error, ExecutorError::AccountExists(cur("EUR")));
        assert_eq!(sim.balance(&cur("EUR")), Some(dec!(5)));
    }

    #[test]
    fn buy_orders_debit_at_bid() {
        let mut sim = simulator(
            vec![
                quote("EUR", "USD", 0, dec!(1.25), dec!(1.3)),
                quote("EUR", "USD", 1, dec!(1.25), dec!(1.3)),
            ],
            &[("EUR", dec!(1000)), ("USD", dec!(0))],
        );
        sim.submit_order(Order::buy(cur("EUR"), cur("USD"), dec!(500)).unwrap()).unwrap();
        sim.advance_time(t(1)).unwrap();
        assert_eq!(sim.balance(&cur("USD")), Some(dec!(500)));
        assert_eq!(sim.balance(&cur("EUR")), Some(dec!(600)));
    }

    #[test]
    fn amounts_in_a_third_currency_are_converted_first() {
        let mut sim = simulator(
            vec![
                quote("EUR", "USD", 0, dec!(2), dec!(2)),
                quote("EUR", "JPY", 0, dec!(100), dec!(100)),
            ],
            &[("EUR", dec!(1000)), ("USD", dec!(0))],
        );
        sim.graph.insert_quote(quote("EUR", "USD", 1, dec!(2), dec!(2))).unwrap();
        // Sell EUR worth 5000 JPY.
        let amount = Amount::new(dec!(5000), cur("JPY")).unwrap();
        let order = Order::convert(cur("EUR"), cur("USD"), amount, ConvertDirection::Sell).unwrap();
        sim.submit_order(order).unwrap();
        sim.advance_time(t(1)).unwrap();
        assert_eq!(sim.balance(&cur("EUR")), Some(dec!(950)));
        assert_eq!(sim.balance(&cur("USD")), Some(dec!(100)));
    }

    #[test]
    fn transfer_all_empties_the_source() {
        let mut sim = simulator(
            vec![
                quote("EUR", "USD", 0, dec!(1.5), dec!(1.5)),
                quote("EUR", "USD", 1, dec!(1.5), dec!(1.5)),
            ],
            &[("EUR", dec!(10)), ("USD", dec!(0))],
        );
        sim.submit_order(Order::transfer_all(cur("EUR"), cur("USD")).unwrap()).unwrap();
        sim.advance_time(t(1)).unwrap();
        assert_eq!(sim.balance(&cur("EUR")), Some(dec!(0)));
        assert_eq!(sim.balance(&cur("USD")), Some(dec!(15)));

        // A second transfer of an empty account is a no-op, not a rejection.
        sim.record_quote(quote("EUR", "USD", 2, dec!(1.5), dec!(1.5))).unwrap();
        sim.submit_order(Order::transfer_all(cur("EUR"), cur("USD")).unwrap()).unwrap();
        let report = sim.advance_time(t(2)).unwrap();
        assert_eq!(report.executed.len(), 1);
        assert_eq!(sim.executions().count(), 1);
    }

    #[test]
    fn transfer_all_pays_source_costs_from_the_proceeds() {
        let mut graph = PriceGraph::new();
        graph.insert_quote(quote("EUR", "USD", 0, dec!(1.25), dec!(1.25))).unwrap();
        graph.insert_quote(quote("EUR", "USD", 1, dec!(1.25), dec!(1.25))).unwrap();
        let commission = TransactionCostFilter::proportional("commission", dec!(0.01), None).unwrap();
        let config = SimulatorConfig::new(cur("EUR")).with_filter(commission);
        let orders = vec![
            Order::create_account(cur("EUR"), dec!(0)).unwrap(),
            Order::create_account(cur("USD"), dec!(100)).unwrap(),
        ];
        let mut sim = BrokerSimulator::new(config, graph, orders).unwrap();

        sim.submit_order(Order::transfer_all(cur("USD"), cur("EUR")).unwrap()).unwrap();
        let report = sim.advance_time(t(1)).unwrap();

        // 100 USD at 0.8 is 80 EUR; the 1 USD commission costs 0.8 EUR.
        assert!(report.is_clean());
        assert_eq!(sim.balance(&cur("USD")), Some(dec!(0)));
        assert_eq!(sim.balance(&cur("EUR")), Some(dec!(79.2)));
        let execution = sim.executions().next().unwrap();
        assert_eq!(execution.costs[0].charge.amount, dec!(1));
        assert_eq!(execution.costs[0].paid, Amount::new(dec!(0.8), cur("EUR")).unwrap());
        assert_eq!(sim.costs_by_filter()["commission"][&cur("EUR")], dec!(0.8));
    }

    #[test]
    fn transfer_all_with_a_fixed_fee_in_the_source_currency() {
        let mut graph = PriceGraph::new();
        graph.insert_quote(quote("EUR", "USD", 0, dec!(2), dec!(2))).unwrap();
        graph.insert_quote(quote("EUR", "USD", 1, dec!(2), dec!(2))).unwrap();
        let fee = TransactionCostFilter::fixed("ticket", Amount::new(dec!(1), cur("EUR")).unwrap()).unwrap();
        let config = SimulatorConfig::new(cur("EUR")).with_filter(fee);
        let orders = vec![
            Order::create_account(cur("EUR"), dec!(10)).unwrap(),
            Order::create_account(cur("USD"), dec!(0)).unwrap(),
        ];
        let mut sim = BrokerSimulator::new(config, graph, orders).unwrap();

        sim.submit_order(Order::transfer_all(cur("EUR"), cur("USD")).unwrap()).unwrap();
        assert!(sim.advance_time(t(1)).unwrap().is_clean());
        assert_eq!(sim.balance(&cur("EUR")), Some(dec!(0)));
        assert_eq!(sim.balance(&cur("USD")), Some(dec!(18)));
        assert_eq!(sim.costs_by_filter()["ticket"][&cur("USD")], dec!(2));
    }

    #[test]
    fn cost_totals_that_would_overflow_reject_the_trade() {
        let mut graph = PriceGraph::new();
        graph.insert_quote(quote("EUR", "USD", 0, dec!(1), dec!(1))).unwrap();
        graph.insert_quote(quote("EUR", "USD", 1, dec!(1), dec!(1))).unwrap();
        let fee = TransactionCostFilter::fixed("ticket", Amount::new(dec!(1), cur("EUR")).unwrap()).unwrap();
        let config = SimulatorConfig::new(cur("EUR")).with_filter(fee);
        let orders = vec![
            Order::create_account(cur("EUR"), dec!(100)).unwrap(),
            Order::create_account(cur("USD"), dec!(0)).unwrap(),
        ];
        let mut sim = BrokerSimulator::new(config, graph, orders).unwrap();
        sim.costs_by_filter
            .entry("ticket".to_string())
            .or_default()
            .insert(cur("EUR"), Decimal::MAX);

        sim.submit_order(Order::sell(cur("EUR"), cur("USD"), dec!(10)).unwrap()).unwrap();
        let report = sim.advance_time(t(1)).unwrap();

        assert!(matches!(report.rejected[0].error, ExecutorError::Overflow(_)));
        assert_eq!(sim.balance(&cur("EUR")), Some(dec!(100)));
        assert_eq!(sim.balance(&cur("USD")), Some(dec!(0)));
        assert_eq!(sim.costs_by_filter()["ticket"][&cur("EUR")], Decimal::MAX);
    }

    #[test]
    fn costs_in_a_third_currency_are_paid_by_the_source() {
        let graph_quotes = vec![
            quote("EUR", "USD", 0, dec!(1), dec!(1)),
            quote("EUR", "GBP", 0, dec!(0.5), dec!(0.5)),
        ];
        let mut graph = PriceGraph::new();
        for q in graph_quotes {
            graph.insert_quote(q).unwrap();
        }
        let fee = TransactionCostFilter::fixed("ticket", Amount::new(dec!(2), cur("GBP")).unwrap()).unwrap();
        let config = SimulatorConfig::new(cur("EUR")).with_filter(fee);
        let orders = vec![
            Order::create_account(cur("EUR"), dec!(100)).unwrap(),
            Order::create_account(cur("USD"), dec!(0)).unwrap(),
        ];
        let mut sim = BrokerSimulator::new(config, graph, orders).unwrap();
        sim.record_quote(quote("EUR", "USD", 1, dec!(1), dec!(1))).unwrap();
        sim.submit_order(Order::sell(cur("EUR"), cur("USD"), dec!(10)).unwrap()).unwrap();
        sim.advance_time(t(1)).unwrap();

        // 2 GBP at 0.5 GBP per EUR costs 4 EUR.
        assert_eq!(sim.balance(&cur("EUR")), Some(dec!(86)));
        assert_eq!(sim.balance(&cur("USD")), Some(dec!(10)));
        assert_eq!(sim.costs_by_filter()["ticket"][&cur("EUR")], dec!(4));
    }

    #[test]
    fn quotes_may_not_predate_the_cursor() {
        let mut sim = simulator(
            vec![quote("EUR", "USD", 1, dec!(1), dec!(1))],
            &[("EUR", dec!(1))],
        );
        let err = sim.record_quote(quote("EUR", "USD", 0, dec!(1), dec!(1))).unwrap_err();
        assert!(matches!(err, ExecutorError::TimeOrderViolation { .. }));
    }

    #[test]
    fn weights_are_undefined_for_an_empty_portfolio() {
        let sim = simulator(
            vec![quote("EUR", "USD", 0, dec!(2), dec!(2))],
            &[("EUR", dec!(0)), ("USD", dec!(0))],
        );
        let weights = sim.weights(t(0)).unwrap();
        assert_eq!(weights.len(), 2);
        assert!(weights.values().all(Option::is_none));
    }

    #[test]
    fn weights_sum_to_one() {
        let sim = simulator(
            vec![quote("EUR", "USD", 0, dec!(2), dec!(2))],
            &[("EUR", dec!(30)), ("USD", dec!(140))],
        );
        let weights = sim.weights(t(0)).unwrap();
        assert_eq!(weights[&cur("EUR")], Some(dec!(0.3)));
        assert_eq!(weights[&cur("USD")], Some(dec!(0.7)));
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let sim = simulator(vec![quote("EUR", "USD", 0, dec!(2), dec!(2))], &[("EUR", dec!(30))]);
        let json = serde_json::to_value(sim.snapshot()).unwrap();
        assert_eq!(json["default_numeraire"], "EUR");
        assert_eq!(json["accounts"][0]["currency"], "EUR");
        assert_eq!(json["pending_orders"], 0);
    }
}
