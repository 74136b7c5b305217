use crate::broker::BrokerApi;
use crate::error::BacktestError;
use configuration::ScheduledOrderSettings;
use core_types::Time;
use executor::Order;

/// The core trait that trading strategies implement.
///
/// `on_step` is called once per simulation step, after the latest batch has been
/// applied. Orders submitted here take effect at the next step. The broker may be a
/// backtest or a live session; the strategy cannot tell them apart.
pub trait Strategy {
    fn on_step(&mut self, broker: &mut dyn BrokerApi) -> Result<(), BacktestError>;

    fn name(&self) -> &str {
        "strategy"
    }
}

impl<F> Strategy for F
where
    F: FnMut(&mut dyn BrokerApi) -> Result<(), BacktestError>,
{
    fn on_step(&mut self, broker: &mut dyn BrokerApi) -> Result<(), BacktestError> {
        self(broker)
    }
}

/// Submits a fixed list of orders, each at the first step at or after its time.
#[derive(Debug, Clone, Default)]
pub struct ScheduledOrders {
    // Sorted by time, submission order preserved among equal times.
    schedule: Vec<(Time, Order)>,
    next: usize,
}

impl ScheduledOrders {
    pub fn new(orders: impl IntoIterator<Item = (Time, Order)>) -> Self {
        let mut schedule: Vec<_> = orders.into_iter().collect();
        schedule.sort_by_key(|(time, _)| *time);
        Self { schedule, next: 0 }
    }

    pub fn from_settings(settings: &[ScheduledOrderSettings]) -> Result<Self, BacktestError> {
        let orders = settings
            .iter()
            .map(|scheduled| Ok((scheduled.time, Order::from_settings(&scheduled.order)?)))
            .collect::<Result<Vec<_>, BacktestError>>()?;
        Ok(Self::new(orders))
    }

    /// Orders not submitted yet.
    pub fn remaining(&self) -> usize {
        self.schedule.len() - self.next
    }
}

impl Strategy for ScheduledOrders {
    fn on_step(&mut self, broker: &mut dyn BrokerApi) -> Result<(), BacktestError> {
        let now = broker.now();
        while let Some((time, order)) = self.schedule.get(self.next) {
            if *time > now {
                break;
            }
            let id = broker.submit_order(order.clone())?;
            tracing::debug!(order_id = %id, scheduled = %time, %order, "Scheduled order submitted");
            self.next += 1;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scheduled-orders"
    }
}
