//! In-process stores. Every operation runs under one lock, which gives the
//! same per-record atomicity as the durable backends.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::{CounterStore, OrderMode, PatchResult, WorkPatch, WorkQuery, WorkStore};
use crate::error::Result;
use crate::model::*;

/// Work records held in a map.
#[derive(Default)]
pub struct MemoryWorkStore {
    works: RwLock<HashMap<WorkId, Work>>,
}

impl MemoryWorkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.works.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.works.read().await.is_empty()
    }
}

#[async_trait]
impl WorkStore for MemoryWorkStore {
    async fn insert(&self, work: &Work) -> Result<()> {
        let mut works = self.works.write().await;
        if works.contains_key(&work.id) {
            return Err(crate::error::Error::Other(format!(
                "duplicate work id: {}",
                work.id
            )));
        }
        works.insert(work.id.clone(), work.clone());
        Ok(())
    }

    async fn get(&self, id: &WorkId) -> Result<Option<Work>> {
        Ok(self.works.read().await.get(id).cloned())
    }

    async fn paginate(&self, query: &WorkQuery) -> Result<Vec<Work>> {
        let works = self.works.read().await;
        let mut page: Vec<Work> = works
            .values()
            .filter(|w| query.filter.matches(w))
            .filter(|w| query.order_by.sort_value(w).is_some())
            .filter(|w| query.is_past_cursor(w))
            .cloned()
            .collect();

        page.sort_by(|a, b| {
            let ka = (query.order_by.sort_value(a), &a.id);
            let kb = (query.order_by.sort_value(b), &b.id);
            match query.order {
                OrderMode::Asc => ka.cmp(&kb),
                OrderMode::Desc => kb.cmp(&ka),
            }
        });
        page.truncate(query.first);
        Ok(page)
    }

    async fn apply(&self, id: &WorkId, patch: &WorkPatch) -> Result<Option<PatchResult>> {
        let mut works = self.works.write().await;
        Ok(works.get_mut(id).map(|work| {
            let previous_status = patch.apply_to(work);
            PatchResult {
                work: work.clone(),
                previous_status,
            }
        }))
    }

    async fn delete(&self, ids: &[WorkId]) -> Result<u64> {
        let mut works = self.works.write().await;
        Ok(ids.iter().filter(|id| works.remove(*id).is_some()).count() as u64)
    }
}

/// Counters held in a map.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<WorkId, CounterFigures>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.counters.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.counters.lock().await.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn create(&self, id: &WorkId, expected: i64, processed: i64) -> Result<()> {
        self.counters
            .lock()
            .await
            .insert(id.clone(), CounterFigures { expected, processed });
        Ok(())
    }

    async fn increment_and_compare(&self, id: &WorkId) -> Result<Option<CounterTick>> {
        let mut counters = self.counters.lock().await;
        Ok(counters.get_mut(id).map(|figures| {
            figures.processed += 1;
            CounterTick {
                is_complete: figures.is_complete(),
                total: figures.processed,
            }
        }))
    }

    async fn get(&self, id: &WorkId) -> Result<Option<CounterFigures>> {
        Ok(self.counters.lock().await.get(id).copied())
    }

    async fn add_expected(&self, id: &WorkId, n: u32) -> Result<Option<i64>> {
        let mut counters = self.counters.lock().await;
        Ok(counters.get_mut(id).map(|figures| {
            figures.expected += i64::from(n);
            figures.expected
        }))
    }

    async fn delete(&self, ids: &[WorkId]) -> Result<()> {
        let mut counters = self.counters.lock().await;
        for id in ids {
            counters.remove(id);
        }
        Ok(())
    }
}
