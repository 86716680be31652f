//! Take-profit leg model.

use chrono::{DateTime, Utc};
use dca_core::{OrderId, Price, Size};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegStatus {
    Pending,
    Filled,
}

/// One limit sell of the take-profit ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeProfitLeg {
    /// 1-based level; level N has the highest target.
    pub level: u32,
    pub target_price: Price,
    pub quantity: Size,
    pub order_id: OrderId,
    pub status: LegStatus,
    pub placed_at: DateTime<Utc>,
}

impl TakeProfitLeg {
    pub fn pending(level: u32, target_price: Price, quantity: Size, order_id: OrderId) -> Self {
        Self {
            level,
            target_price,
            quantity,
            order_id,
            status: LegStatus::Pending,
            placed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn into_filled(mut self) -> Self {
        self.status = LegStatus::Filled;
        self
    }
}
