//! In-process document store.
//!
//! The "objects" persistence strategy: each aggregate is stored whole as one
//! JSON document keyed by its natural key, next to a copy of its ordering
//! field so range reads decode only the documents they return.

use std::collections::BTreeMap;

use dalbench_core::report::{ReportKeys, Slot, LAST_TEN, TOP_FIVE};
use dalbench_core::{Aggregate, Bench, Query, QuerySource, Report, ReportRequest, Window};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{BackendError, Result};

struct Document<O> {
    order: O,
    body: String,
}

/// Document store for one aggregate shape.
pub struct MemoryBackend<T: Aggregate> {
    documents: BTreeMap<T::Key, Document<T::Order>>,
}

impl<T> Default for MemoryBackend<T>
where
    T: Aggregate + Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryBackend<T>
where
    T: Aggregate + Serialize + DeserializeOwned,
{
    /// Create an empty store.
    pub fn new() -> Self {
        info!(shape = T::NAME, "opened memory document store");
        Self {
            documents: BTreeMap::new(),
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn encode(value: &T) -> Result<Document<T::Order>> {
        Ok(Document {
            order: value.order(),
            body: serde_json::to_string(value)?,
        })
    }

    fn decode(document: &Document<T::Order>) -> Result<T> {
        Ok(serde_json::from_str(&document.body)?)
    }

    fn collect(&self, window: Option<&Window<T::Order>>) -> Result<Vec<T>> {
        self.documents
            .values()
            .filter(|doc| window.map_or(true, |w| w.contains(&doc.order)))
            .map(Self::decode)
            .collect()
    }

    fn lookup(&self, keys: &[T::Key]) -> Result<Vec<T>> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();
        keys.iter()
            .filter_map(|key| self.documents.get(key))
            .map(Self::decode)
            .collect()
    }

    /// Encode a batch up front so a failing value leaves the store untouched.
    fn encode_all(values: &[T]) -> Result<Vec<(T::Key, Document<T::Order>)>> {
        values
            .iter()
            .map(|value| Ok((value.key(), Self::encode(value)?)))
            .collect()
    }

    fn report_keys(&self, request: &ReportRequest<T>) -> ReportKeys<T::Key> {
        let window = &request.window;
        let mut keys = ReportKeys::new();

        if self.documents.contains_key(&request.find_one) {
            keys.push(Slot::FindOne, request.find_one.clone());
        }
        let mut many: Vec<&T::Key> = request
            .find_many
            .iter()
            .filter(|key| self.documents.contains_key(*key))
            .collect();
        many.sort();
        many.dedup();
        for key in many {
            keys.push(Slot::FindMany, key.clone());
        }

        // Keys are visited in ascending order, so a stable sort breaks ties by key.
        let mut ascending: Vec<(&T::Key, &T::Order)> = self
            .documents
            .iter()
            .map(|(key, doc)| (key, &doc.order))
            .collect();
        ascending.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));

        if let Some((key, _)) = ascending.iter().find(|(_, order)| **order >= window.from) {
            keys.push(Slot::FindFirst, (*key).clone());
        }
        if let Some((key, _)) = ascending.iter().rev().find(|(_, order)| **order <= window.until) {
            keys.push(Slot::FindLast, (*key).clone());
        }
        for (key, _) in ascending
            .iter()
            .filter(|(_, order)| window.contains(order))
            .take(TOP_FIVE)
        {
            keys.push(Slot::TopFive, (*key).clone());
        }
        for (key, _) in ascending
            .iter()
            .rev()
            .filter(|(_, order)| window.contains(order))
            .take(LAST_TEN)
        {
            keys.push(Slot::LastTen, (*key).clone());
        }
        keys
    }
}

impl<T> Bench<T> for MemoryBackend<T>
where
    T: Aggregate + Serialize + DeserializeOwned,
{
    fn clean(&mut self) -> dalbench_core::Result<()> {
        self.documents.clear();
        Ok(())
    }

    fn analyze(&mut self) -> dalbench_core::Result<()> {
        Ok(())
    }

    fn search_all(&mut self) -> dalbench_core::Result<Vec<T>> {
        Ok(self.collect(None)?)
    }

    fn search_subset(&mut self, window: &Window<T::Order>) -> dalbench_core::Result<Vec<T>> {
        Ok(self.collect(Some(window))?)
    }

    fn query(&mut self) -> Option<Query<'_, T>> {
        Some(Query::new(self))
    }

    fn find_single(&mut self, key: &T::Key) -> dalbench_core::Result<Option<T>> {
        Ok(self.documents.get(key).map(Self::decode).transpose()?)
    }

    fn find_many(&mut self, keys: &[T::Key]) -> dalbench_core::Result<Vec<T>> {
        Ok(self.lookup(keys)?)
    }

    fn insert_all(&mut self, values: &[T]) -> dalbench_core::Result<()> {
        let encoded = Self::encode_all(values)?;
        let mut seen = std::collections::BTreeSet::new();
        for (key, _) in &encoded {
            if self.documents.contains_key(key) || !seen.insert(key) {
                return Err(BackendError::Duplicate(format!("{} {key}", T::NAME)).into());
            }
        }
        self.documents.extend(encoded);
        debug!(shape = T::NAME, count = values.len(), "inserted documents");
        Ok(())
    }

    fn update_all(&mut self, values: &[T]) -> dalbench_core::Result<()> {
        let encoded = Self::encode_all(values)?;
        if let Some((key, _)) = encoded
            .iter()
            .find(|(key, _)| !self.documents.contains_key(key))
        {
            return Err(BackendError::NotFound(format!("{} {key}", T::NAME)).into());
        }
        self.documents.extend(encoded);
        debug!(shape = T::NAME, count = values.len(), "replaced documents");
        Ok(())
    }

    fn report(&mut self, request: &ReportRequest<T>) -> dalbench_core::Result<Report<T>> {
        let keys = self.report_keys(request);
        let hydrated = self.lookup(&keys.distinct())?;
        keys.resolve(hydrated)
    }
}

impl<T> QuerySource<T> for MemoryBackend<T>
where
    T: Aggregate + Serialize + DeserializeOwned,
{
    fn fetch(&mut self, window: Option<&Window<T::Order>>) -> dalbench_core::Result<Vec<T>> {
        Ok(self.collect(window)?)
    }
}
