use serde::{Deserialize, Serialize};

/// Which side of a conversion the order amount is measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertDirection {
    /// The amount is what leaves the source account.
    Sell,
    /// The amount is what arrives in the target account.
    Buy,
}

/// Lifecycle of an order inside the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Executed,
    Rejected,
}
