//! Flat entity shape.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Aggregate;

/// A post: identifier, title and creation date. No children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub created: NaiveDate,
}

impl Aggregate for Post {
    type Key = Uuid;
    type Order = NaiveDate;

    const NAME: &'static str = "Simple";

    fn key(&self) -> Uuid {
        self.id
    }

    fn order(&self) -> NaiveDate {
        self.created
    }
}
