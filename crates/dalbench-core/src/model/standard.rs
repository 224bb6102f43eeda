//! Two-level aggregate: invoice with ordered items.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Aggregate;

/// Invoice keyed by its number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub number: String,
    pub total: Decimal,
    pub due_date: NaiveDate,
    pub paid: Option<DateTime<Utc>>,
    pub reference: Option<String>,
    pub tax: Decimal,
    pub version: i64,
    pub canceled: bool,
    pub items: Vec<Item>,
}

/// Invoice line item. Its position is the index in [`Invoice::items`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub product: String,
    pub cost: Decimal,
    pub quantity: i32,
    pub tax_group: Decimal,
    pub discount: Decimal,
}

impl Aggregate for Invoice {
    type Key = String;
    type Order = i64;

    const NAME: &'static str = "Standard";

    fn key(&self) -> String {
        self.number.clone()
    }

    fn order(&self) -> i64 {
        self.version
    }
}
