//! In-process [`PlayerStore`] with call instrumentation and failure injection.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use futures::future::BoxFuture;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::{sync::Mutex, time::sleep};

use crate::dao::{
    models::{HonorSampleEntity, ProfileEntity, SubResourceRow, SubResourceTable},
    player_store::PlayerStore,
    storage::{StorageError, StorageResult},
};

const HONOR_HISTORY_TABLE: &str = "honor_history";

/// Failures produced on purpose by [`MemoryPlayerStore`].
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    /// Failure requested through one of the `fail_next_*` knobs.
    #[error("injected transient failure on `{0}`")]
    Injected(&'static str),
    /// The profile could not be turned into a JSON document.
    #[error("profile document could not be encoded")]
    Encode(#[source] serde_json::Error),
}

/// Store operation observed by [`MemoryPlayerStore`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `load_profile` for a player.
    LoadProfile {
        /// Player the call was made for.
        auth_id: String,
    },
    /// `save_profile` for a player.
    SaveProfile {
        /// Player the call was made for.
        auth_id: String,
    },
    /// `read_rows` against a table.
    ReadRows {
        /// Table the call targeted.
        table: SubResourceTable,
        /// Player the call was made for.
        auth_id: String,
    },
    /// `replace_rows` against a table.
    ReplaceRows {
        /// Table the call targeted.
        table: SubResourceTable,
        /// Player the call was made for.
        auth_id: String,
    },
    /// `recent_honor_average` for a player.
    RecentHonor {
        /// Player the call was made for.
        auth_id: String,
    },
    /// `record_honor_sample` for a player.
    RecordHonor {
        /// Player the call was made for.
        auth_id: String,
    },
}

/// Memory-backed store. Cloning shares the same underlying data.
#[derive(Clone, Default)]
pub struct MemoryPlayerStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    profiles: HashMap<String, Value>,
    tables: HashMap<(SubResourceTable, String), BTreeMap<String, Value>>,
    honor: HashMap<String, Vec<HonorSampleEntity>>,
    missing_tables: HashSet<SubResourceTable>,
    honor_history_missing: bool,
    transient_failures: HashMap<SubResourceTable, u32>,
    profile_write_failures: u32,
    write_latency: Option<Duration>,
    calls: Vec<StoreCall>,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
}

impl MemoryState {
    fn begin_write(&mut self, auth_id: &str) -> Option<Duration> {
        let active = self.in_flight.entry(auth_id.to_owned()).or_insert(0);
        *active += 1;
        let current = *active;
        let peak = self.max_in_flight.entry(auth_id.to_owned()).or_insert(0);
        *peak = (*peak).max(current);
        self.write_latency
    }

    fn end_write(&mut self, auth_id: &str) {
        if let Some(active) = self.in_flight.get_mut(auth_id) {
            *active = active.saturating_sub(1);
        }
    }

    fn check_table(&mut self, table: SubResourceTable) -> StorageResult<()> {
        if self.missing_tables.contains(&table) {
            return Err(StorageError::schema_missing(table.name()));
        }
        if let Some(remaining) = self.transient_failures.get_mut(&table) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::unavailable(
                    format!("write to `{}` failed", table.name()),
                    MemoryStoreError::Injected(table.name()),
                ));
            }
        }
        Ok(())
    }
}

impl MemoryPlayerStore {
    /// Empty store with every table deployed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw aggregate profile document, in whatever field naming it was written with.
    pub async fn insert_profile(&self, auth_id: &str, document: Value) {
        let mut state = self.inner.lock().await;
        state.profiles.insert(auth_id.to_owned(), document);
    }

    /// Seed raw rows of a sub-resource table.
    pub async fn insert_rows(&self, table: SubResourceTable, auth_id: &str, rows: Vec<(String, Value)>) {
        let mut state = self.inner.lock().await;
        let stored = state.tables.entry((table, auth_id.to_owned())).or_default();
        for (key, data) in rows {
            stored.insert(key, data);
        }
    }

    /// Stored aggregate document of a player.
    pub async fn profile(&self, auth_id: &str) -> Option<Value> {
        self.inner.lock().await.profiles.get(auth_id).cloned()
    }

    /// Stored rows of a player, ordered by key.
    pub async fn rows(&self, table: SubResourceTable, auth_id: &str) -> Vec<Value> {
        let state = self.inner.lock().await;
        state
            .tables
            .get(&(table, auth_id.to_owned()))
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Pretend the table is (or is no longer) missing from the deployed schema.
    pub async fn set_table_missing(&self, table: SubResourceTable, missing: bool) {
        let mut state = self.inner.lock().await;
        if missing {
            state.missing_tables.insert(table);
        } else {
            state.missing_tables.remove(&table);
        }
    }

    /// Pretend the honor history collection is (or is no longer) missing.
    pub async fn set_honor_history_missing(&self, missing: bool) {
        self.inner.lock().await.honor_history_missing = missing;
    }

    /// Make the next `count` reads or writes against `table` fail with a transient error.
    pub async fn fail_next_table_calls(&self, table: SubResourceTable, count: u32) {
        self.inner.lock().await.transient_failures.insert(table, count);
    }

    /// Make the next `count` aggregate profile writes fail.
    pub async fn fail_next_profile_writes(&self, count: u32) {
        self.inner.lock().await.profile_write_failures = count;
    }

    /// Delay every write by `latency`, widening the window in which saves overlap.
    pub async fn set_write_latency(&self, latency: Option<Duration>) {
        self.inner.lock().await.write_latency = latency;
    }

    /// Every call observed so far.
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Number of aggregate writes attempted for a player.
    pub async fn profile_writes(&self, auth_id: &str) -> usize {
        self.count_calls(|call| matches!(call, StoreCall::SaveProfile { auth_id: id } if id == auth_id))
            .await
    }

    /// Number of write calls that reached `table`, whether or not they succeeded.
    pub async fn row_writes(&self, table: SubResourceTable) -> usize {
        self.count_calls(|call| matches!(call, StoreCall::ReplaceRows { table: t, .. } if *t == table))
            .await
    }

    /// Number of read or write calls that reached `table`.
    pub async fn table_calls(&self, table: SubResourceTable) -> usize {
        self.count_calls(|call| {
            matches!(
                call,
                StoreCall::ReplaceRows { table: t, .. } | StoreCall::ReadRows { table: t, .. } if *t == table
            )
        })
        .await
    }

    /// Highest number of writes observed running at the same time for one player.
    pub async fn max_in_flight(&self, auth_id: &str) -> usize {
        let state = self.inner.lock().await;
        state.max_in_flight.get(auth_id).copied().unwrap_or(0)
    }

    async fn count_calls(&self, predicate: impl Fn(&StoreCall) -> bool) -> usize {
        let state = self.inner.lock().await;
        state.calls.iter().filter(|call| predicate(call)).count()
    }

    async fn save_profile_inner(&self, profile: ProfileEntity) -> StorageResult<()> {
        let auth_id = profile.auth_id.clone();
        let latency = {
            let mut state = self.inner.lock().await;
            state.calls.push(StoreCall::SaveProfile {
                auth_id: auth_id.clone(),
            });
            state.begin_write(&auth_id)
        };
        if let Some(latency) = latency {
            sleep(latency).await;
        }

        let mut state = self.inner.lock().await;
        state.end_write(&auth_id);
        if state.profile_write_failures > 0 {
            state.profile_write_failures -= 1;
            return Err(StorageError::unavailable(
                format!("failed to save profile `{auth_id}`"),
                MemoryStoreError::Injected("player_profiles"),
            ));
        }

        let document = serde_json::to_value(&profile).map_err(|source| {
            StorageError::unavailable(
                format!("failed to encode profile `{auth_id}`"),
                MemoryStoreError::Encode(source),
            )
        })?;
        state.profiles.insert(auth_id, document);
        Ok(())
    }

    async fn replace_rows_inner(
        &self,
        table: SubResourceTable,
        auth_id: String,
        rows: Vec<SubResourceRow>,
    ) -> StorageResult<()> {
        let latency = {
            let mut state = self.inner.lock().await;
            state.calls.push(StoreCall::ReplaceRows {
                table,
                auth_id: auth_id.clone(),
            });
            state.begin_write(&auth_id)
        };
        if let Some(latency) = latency {
            sleep(latency).await;
        }

        let mut state = self.inner.lock().await;
        state.end_write(&auth_id);
        state.check_table(table)?;

        let stored = state.tables.entry((table, auth_id.clone())).or_default();
        let keys = rows.iter().map(|row| row.key.clone()).collect::<HashSet<_>>();
        for row in rows {
            let mut data = row.data;
            if let Value::Object(ref mut columns) = data {
                columns.insert("auth_id".into(), json!(auth_id));
                columns.insert("key".into(), json!(row.key));
            }
            stored.insert(row.key, data);
        }
        if table.prunes_stale_rows() {
            stored.retain(|key, _| keys.contains(key));
        }
        Ok(())
    }
}

impl PlayerStore for MemoryPlayerStore {
    fn load_profile(&self, auth_id: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        let auth_id = auth_id.to_owned();
        Box::pin(async move {
            let mut state = store.inner.lock().await;
            state.calls.push(StoreCall::LoadProfile {
                auth_id: auth_id.clone(),
            });
            Ok(state.profiles.get(&auth_id).cloned())
        })
    }

    fn save_profile(&self, profile: ProfileEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_profile_inner(profile).await })
    }

    fn read_rows(
        &self,
        table: SubResourceTable,
        auth_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<Value>>> {
        let store = self.clone();
        let auth_id = auth_id.to_owned();
        Box::pin(async move {
            let mut state = store.inner.lock().await;
            state.calls.push(StoreCall::ReadRows {
                table,
                auth_id: auth_id.clone(),
            });
            state.check_table(table)?;
            Ok(state
                .tables
                .get(&(table, auth_id))
                .map(|rows| rows.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn replace_rows(
        &self,
        table: SubResourceTable,
        auth_id: &str,
        rows: Vec<SubResourceRow>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let auth_id = auth_id.to_owned();
        Box::pin(async move { store.replace_rows_inner(table, auth_id, rows).await })
    }

    fn recent_honor_average(
        &self,
        auth_id: &str,
        window: usize,
    ) -> BoxFuture<'static, StorageResult<Option<i64>>> {
        let store = self.clone();
        let auth_id = auth_id.to_owned();
        Box::pin(async move {
            let mut state = store.inner.lock().await;
            state.calls.push(StoreCall::RecentHonor {
                auth_id: auth_id.clone(),
            });
            if state.honor_history_missing {
                return Err(StorageError::schema_missing(HONOR_HISTORY_TABLE));
            }

            let Some(samples) = state.honor.get(&auth_id).filter(|s| !s.is_empty()) else {
                return Ok(None);
            };
            let recent = samples.iter().rev().take(window.max(1)).collect::<Vec<_>>();
            let total: i64 = recent.iter().map(|sample| sample.honor).sum();
            Ok(Some(total / recent.len() as i64))
        })
    }

    fn record_honor_sample(&self, sample: HonorSampleEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut state = store.inner.lock().await;
            state.calls.push(StoreCall::RecordHonor {
                auth_id: sample.auth_id.clone(),
            });
            if state.honor_history_missing {
                return Err(StorageError::schema_missing(HONOR_HISTORY_TABLE));
            }
            state.honor.entry(sample.auth_id.clone()).or_default().push(sample);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
