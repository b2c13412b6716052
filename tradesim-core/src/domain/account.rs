use serde::{Deserialize, Serialize};

/// Read-only account snapshot. The broker is the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub free_margin: f64,
    /// `equity / margin * 100`, 0 when no margin is used.
    pub margin_level: f64,
    /// Sum of live position profit.
    pub profit: f64,
    pub leverage: u32,
    pub open_positions: usize,
    pub pending_orders: usize,
}
