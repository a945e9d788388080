//! In-memory [`ExploitStore`] for tests.
//!
//! Applies the same dedup-key rule as the unique index in Postgres, and
//! records call counts and the peak number of overlapping `create_many`
//! calls so tests can assert on pipeline behaviour.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use hackwatch_core::{DedupKey, Exploit, NewExploit};

use crate::error::PersistenceError;
use crate::store::ExploitStore;

#[derive(Default)]
struct Inner {
    rows: Vec<Exploit>,
    keys: HashSet<DedupKey>,
    next_id: i64,
}

#[derive(Default)]
pub struct InMemoryExploitStore {
    inner: Mutex<Inner>,
    write_delay: Option<Duration>,
    fail_writes: Mutex<Option<String>>,
    count_calls: AtomicUsize,
    create_calls: AtomicUsize,
    active_writes: AtomicUsize,
    max_concurrent_writes: AtomicUsize,
}

impl InMemoryExploitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `create_many` sleeps for `delay` before writing.
    pub fn with_write_delay(delay: Duration) -> Self {
        Self {
            write_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make subsequent writes fail with `message` until cleared with `None`.
    pub fn set_fail_writes(&self, message: Option<&str>) {
        *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) = message.map(String::from);
    }

    /// Insert records directly, bypassing call accounting.
    pub fn preload(&self, records: &[NewExploit]) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            insert_row(&mut inner, record);
        }
    }

    pub fn rows(&self) -> Vec<Exploit> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).rows.clone()
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Highest number of `create_many` calls observed in flight at once.
    pub fn max_concurrent_writes(&self) -> usize {
        self.max_concurrent_writes.load(Ordering::SeqCst)
    }
}

fn insert_row(inner: &mut Inner, record: &NewExploit) -> bool {
    if !inner.keys.insert(record.dedup_key()) {
        return false;
    }
    inner.next_id += 1;
    let now = Utc::now();
    inner.rows.push(Exploit {
        id: inner.next_id,
        protocol: record.protocol.clone(),
        hack_date: record.hack_date,
        amount_stolen: record.amount_stolen,
        exploit_type: record.exploit_type.clone(),
        technique: record.technique.clone(),
        related_entity: record.related_entity.clone(),
        recovered: record.recovered,
        resolution: record.resolution.clone(),
        audited_by: record.audited_by.clone(),
        notes: record.notes.clone(),
        created_at: now,
        updated_at: now,
    });
    true
}

#[async_trait]
impl ExploitStore for InMemoryExploitStore {
    async fn count(&self) -> Result<u64, PersistenceError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.lock().unwrap_or_else(PoisonError::into_inner).rows.len() as u64)
    }

    async fn create_many(
        &self,
        records: &[NewExploit],
        skip_duplicates: bool,
    ) -> Result<u64, PersistenceError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active_writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_writes.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.write(records, skip_duplicates);
        self.active_writes.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl InMemoryExploitStore {
    fn write(&self, records: &[NewExploit], skip_duplicates: bool) -> Result<u64, PersistenceError> {
        if let Some(message) = self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            return Err(PersistenceError::Other(message));
        }

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !skip_duplicates {
            let mut seen = HashSet::new();
            for record in records {
                let key = record.dedup_key();
                if inner.keys.contains(&key) || !seen.insert(key) {
                    return Err(PersistenceError::Duplicate(format!(
                        "{} at {}",
                        record.protocol, record.hack_date
                    )));
                }
            }
        }

        let inserted = records
            .iter()
            .filter(|record| insert_row(&mut inner, record))
            .count();
        Ok(inserted as u64)
    }
}
