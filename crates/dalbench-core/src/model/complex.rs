//! Three-level aggregate: bank scrape, accounts, transactions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Aggregate;

/// Scraped bank data keyed by an integer id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankScrape {
    pub id: i32,
    pub website: String,
    pub at: DateTime<Utc>,
    pub info: BTreeMap<String, String>,
    pub external_id: Option<String>,
    pub ranking: i32,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub accounts: Vec<Account>,
}

/// Account owned by a scrape; positioned per scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: Decimal,
    pub number: String,
    pub name: String,
    pub notes: String,
    pub transactions: Vec<Transaction>,
}

/// Transaction owned by an account; positioned per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    pub currency: Currency,
    pub amount: Decimal,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    EUR,
    USD,
    Other,
}

impl Currency {
    /// Map an ordinal onto the enumerants, wrapping around.
    pub fn from_ordinal(n: usize) -> Self {
        match n % 3 {
            0 => Currency::EUR,
            1 => Currency::USD,
            _ => Currency::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::EUR => "EUR",
            Currency::USD => "USD",
            Currency::Other => "Other",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EUR" => Ok(Currency::EUR),
            "USD" => Ok(Currency::USD),
            "Other" => Ok(Currency::Other),
            other => Err(format!("unknown currency: {other}")),
        }
    }
}

impl Aggregate for BankScrape {
    type Key = i32;
    type Order = DateTime<Utc>;

    const NAME: &'static str = "Complex";

    fn key(&self) -> i32 {
        self.id
    }

    fn order(&self) -> DateTime<Utc> {
        self.created_at
    }
}
