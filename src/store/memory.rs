use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::Utc;

use super::{Trace, TraceFilter, TraceId, TrackingStore};
use crate::error::StoreError;

/// In-memory tracking store
///
/// Records live in a `BTreeMap` keyed by id behind an `RwLock`, so searches
/// come back in id order. Used by the test suites and by hosts that keep
/// their tracking records elsewhere and only need correlation in-process.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrackingStore {
    traces: Arc<RwLock<BTreeMap<TraceId, Trace>>>,
}

impl MemoryTrackingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a record.
    ///
    /// # Errors
    /// If the lock is poisoned
    pub fn insert(&self, trace: Trace) -> Result<(), StoreError> {
        self.traces.write()?.insert(trace.id, trace);
        Ok(())
    }

    /// # Errors
    /// If the lock is poisoned
    pub fn get(&self, id: TraceId) -> Result<Trace, StoreError> {
        self.traces
            .read()?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.traces
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<F>(&self, filter: &TraceFilter, mut apply: F) -> Result<usize, StoreError>
    where
        F: FnMut(&mut Trace),
    {
        let mut traces = self.traces.write()?;
        let mut touched = 0;

        for trace in traces.values_mut().filter(|trace| filter.matches(trace)) {
            apply(trace);
            touched += 1;
        }

        Ok(touched)
    }
}

#[async_trait]
impl TrackingStore for MemoryTrackingStore {
    async fn search(&self, filter: &TraceFilter) -> Result<Vec<Trace>, StoreError> {
        Ok(self
            .traces
            .read()?
            .values()
            .filter(|trace| filter.matches(trace))
            .cloned()
            .collect())
    }

    async fn set_relay_message_id(
        &self,
        id: TraceId,
        relay_message_id: &str,
    ) -> Result<(), StoreError> {
        let mut traces = self.traces.write()?;
        let trace = traces.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        trace.relay_message_id = Some(relay_message_id.to_string());
        Ok(())
    }

    async fn set_opened(&self, filter: &TraceFilter) -> Result<usize, StoreError> {
        let now = Utc::now();
        self.update(filter, |trace| {
            trace.opened_at.get_or_insert(now);
        })
    }

    async fn set_replied(&self, filter: &TraceFilter) -> Result<usize, StoreError> {
        let now = Utc::now();
        self.update(filter, |trace| {
            trace.replied_at.get_or_insert(now);
        })
    }

    async fn set_bounced(&self, filter: &TraceFilter, reason: &str) -> Result<usize, StoreError> {
        let now = Utc::now();
        self.update(filter, |trace| {
            if trace.bounced_at.is_none() {
                trace.bounced_at = Some(now);
                trace.bounce_reason = Some(reason.to_string());
            }
        })
    }
}
