//! Load and save orchestration for player state.
//!
//! Loading fans out one aggregate read and the auxiliary sub-resource reads concurrently.
//! Saving is coalescing: every save request replaces the player's pending snapshot, and a single
//! flush loop per player (serialized through the [`SaveCoordinator`]) writes whatever snapshot
//! is the latest when it gets to it. Sub-resources are written only when their [`Signature`]
//! moved since the last successful write, and only through their [`AvailabilityBreaker`].

use std::{collections::HashMap, sync::Arc, time::Duration};

use dashmap::{DashMap, DashSet};
use rand::Rng;
use serde_json::Value;
use tokio::{sync::watch, time::Instant};
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::{
    dao::{
        models::{
            HonorSampleEntity, ProfileEntity, SubResourceRow, SubResourceTable, ammo_rows,
            item_rows, now_millis, pet_rows, quest_rows, resource_rows, ship_skin_rows,
        },
        player_store::PlayerStore,
        storage::StorageResult,
    },
    dto::validation::validate_auth_id,
    error::PersistError,
    services::{
        availability::{AvailabilityBreaker, BreakerState, DEFAULT_COOLDOWN},
        normalize::{
            canonical_ammo, canonical_items, canonical_pet, canonical_quests, canonical_resources,
            canonical_ship_skins, normalize_ammo, normalize_pet, normalize_profile,
            normalize_resources, normalize_ship_skins,
        },
        save_coordinator::SaveCoordinator,
        signature::{Signature, sub_resource_signature},
    },
    state::player::PlayerRecord,
};

const HONOR_HISTORY: &str = "honor_history";
/// How long a released player refuses saves that were issued before the release.
const RELEASE_TOMBSTONE_TTL: Duration = Duration::from_secs(600);
/// Upper bound of randomly assigned numeric player ids.
const MAX_PLAYER_ID: i64 = i32::MAX as i64;

/// Tunables of the persistence pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ManagerSettings {
    /// Time a breaker stays open before admitting a probe.
    pub breaker_cooldown: Duration,
    /// Number of honor samples averaged into `recent_honor`.
    pub honor_average_window: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            breaker_cooldown: DEFAULT_COOLDOWN,
            honor_average_window: 10,
        }
    }
}

/// Outcome of one flush cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// The aggregate profile was written. `false` when the ledger was never hydrated.
    pub profile_written: bool,
    /// Written because the signature differed from the baseline.
    pub written: Vec<SubResourceTable>,
    /// Skipped because the signature matched the last persisted one.
    pub unchanged: Vec<SubResourceTable>,
    /// Skipped because the backing table is unavailable.
    pub unavailable: Vec<SubResourceTable>,
    /// Write failed; the signature is kept so the next cycle retries.
    pub failed: Vec<SubResourceTable>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopStatus {
    Idle,
    Running,
    Failed(String),
}

struct SaveSlot {
    pending: Option<PlayerRecord>,
    status: watch::Sender<LoopStatus>,
}

impl SaveSlot {
    fn new() -> Self {
        Self {
            pending: None,
            status: watch::channel(LoopStatus::Idle).0,
        }
    }

    fn is_running(&self) -> bool {
        *self.status.borrow() == LoopStatus::Running
    }
}

/// Signature of the last successful write, tagged with the breaker generation it was taken in.
#[derive(Debug, Clone)]
struct Baseline {
    signature: Signature,
    generation: u64,
}

/// Owns the persistence pipeline of every connected player.
pub struct PlayerDataManager {
    store: Arc<dyn PlayerStore>,
    coordinator: SaveCoordinator,
    breakers: HashMap<SubResourceTable, AvailabilityBreaker>,
    honor_breaker: AvailabilityBreaker,
    honor_window: usize,
    slots: DashMap<String, SaveSlot>,
    baselines: DashMap<String, HashMap<SubResourceTable, Baseline>>,
    audited: DashSet<String>,
    released: DashMap<String, Instant>,
}

impl PlayerDataManager {
    /// Manager with one breaker per sub-resource table plus one for honor history.
    pub fn new(store: Arc<dyn PlayerStore>, settings: ManagerSettings) -> Arc<Self> {
        let breakers = SubResourceTable::ALL
            .into_iter()
            .map(|table| {
                (
                    table,
                    AvailabilityBreaker::new(table.name(), settings.breaker_cooldown),
                )
            })
            .collect();

        Arc::new(Self {
            store,
            coordinator: SaveCoordinator::new(),
            breakers,
            honor_breaker: AvailabilityBreaker::new(HONOR_HISTORY, settings.breaker_cooldown),
            honor_window: settings.honor_average_window.max(1),
            slots: DashMap::new(),
            baselines: DashMap::new(),
            audited: DashSet::new(),
            released: DashMap::new(),
        })
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<dyn PlayerStore> {
        &self.store
    }

    /// Breaker guarding a sub-resource table.
    pub fn breaker(&self, table: SubResourceTable) -> &AvailabilityBreaker {
        &self.breakers[&table]
    }

    /// Breaker guarding the honor history.
    pub fn honor_breaker(&self) -> &AvailabilityBreaker {
        &self.honor_breaker
    }

    /// Minimal valid record for a player without any stored state.
    pub fn default_player_data() -> PlayerRecord {
        PlayerRecord::new(String::new(), 1)
    }

    /// Load everything known about a player and record it as the persisted baseline.
    pub async fn load_player_data(self: &Arc<Self>, auth_id: &str) -> Result<PlayerRecord, PersistError> {
        let (profile, honor, ship_skins, resources, pet, ammo) = tokio::join!(
            self.store.load_profile(auth_id),
            self.honor_breaker
                .run(|| self.store.recent_honor_average(auth_id, self.honor_window)),
            self.read_sub_resource(SubResourceTable::ShipSkins, auth_id),
            self.read_sub_resource(SubResourceTable::WorldResources, auth_id),
            self.read_sub_resource(SubResourceTable::Pets, auth_id),
            self.read_sub_resource(SubResourceTable::Ammo, auth_id),
        );

        let Some(document) = profile? else {
            return Err(PersistError::ProfileNotFound {
                auth_id: auth_id.to_owned(),
            });
        };
        self.released.remove(auth_id);

        let mut record = normalize_profile(auth_id, &document);
        record.ship_skins = normalize_ship_skins(&ship_skins?);
        record.resources = normalize_resources(&resources?);
        record.pet = normalize_pet(&pet?);
        record.ammo = normalize_ammo(&ammo?);
        record.recent_honor = match honor {
            Ok(average) => average.flatten(),
            Err(err) => {
                debug!(auth_id, error = %err, "recent honor unavailable");
                None
            }
        };

        // Values read through an open breaker are placeholders, not what the table holds.
        for table in SubResourceTable::ALL.into_iter().filter(|table| table.read_on_load()) {
            if self.breaker(table).state().await == BreakerState::Available {
                self.record_baseline(auth_id, table, sub_resource_signature(table, &record));
            }
        }
        self.spawn_honor_sample(&record);

        info!(auth_id, player_id = record.player_id, "player data loaded");
        Ok(record)
    }

    /// Rows of a table as one loose value; `Null` when the table is unavailable or empty.
    async fn read_sub_resource(&self, table: SubResourceTable, auth_id: &str) -> StorageResult<Value> {
        let rows = self
            .breaker(table)
            .run(|| self.store.read_rows(table, auth_id))
            .await?;
        Ok(match rows {
            Some(rows) if !rows.is_empty() => Value::Array(rows),
            _ => Value::Null,
        })
    }

    fn spawn_honor_sample(self: &Arc<Self>, record: &PlayerRecord) {
        let Some(ledger) = record.inventory.as_ref() else {
            return;
        };
        let sample = HonorSampleEntity {
            auth_id: record.auth_id.clone(),
            honor: ledger.honor,
            recorded_at: now_millis(),
        };
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let auth_id = sample.auth_id.clone();
            let result = manager
                .honor_breaker
                .run(|| manager.store.record_honor_sample(sample))
                .await;
            if let Err(err) = result {
                debug!(auth_id, error = %err, "honor sample not recorded");
            }
        });
    }

    /// Create and persist the starting records of a new account.
    pub async fn create_initial_player_records(
        self: &Arc<Self>,
        auth_id: &str,
    ) -> Result<PlayerRecord, PersistError> {
        if let Err(err) = validate_auth_id(auth_id) {
            let mut errors = validator::ValidationErrors::new();
            errors.add("auth_id", err);
            return Err(errors.into());
        }

        self.coordinator
            .run_exclusive(auth_id, "create", || async {
                if self.store.load_profile(auth_id).await?.is_some() {
                    return Err(PersistError::ProfileExists {
                        auth_id: auth_id.to_owned(),
                    });
                }

                self.released.remove(auth_id);
                let player_id = rand::rng().random_range(1..=MAX_PLAYER_ID);
                let record = PlayerRecord::new(auth_id, player_id);
                let report = self.flush_cycle(&record).await?;
                info!(
                    auth_id,
                    player_id,
                    written = report.written.len(),
                    "initial player records created"
                );
                Ok::<_, PersistError>(record)
            })
            .await?
    }

    /// Queue `record` as the player's latest snapshot and make sure it gets flushed.
    ///
    /// The caller that starts the flush loop receives the report of its last cycle. Callers whose
    /// snapshot was picked up by an already running loop wait for that loop and receive `None`.
    /// Snapshots of a released player are dropped until it is loaded or created again.
    pub async fn save_player_data(
        self: &Arc<Self>,
        record: PlayerRecord,
    ) -> Result<Option<FlushReport>, PersistError> {
        let auth_id = record.auth_id.clone();
        if self.released.contains_key(&auth_id) {
            debug!(auth_id, "save for released player dropped");
            return Ok(None);
        }
        let (start_loop, mut status) = {
            let mut slot = self.slots.entry(auth_id.clone()).or_insert_with(SaveSlot::new);
            slot.pending = Some(record);
            let start_loop = !slot.is_running();
            if start_loop {
                slot.status.send_replace(LoopStatus::Running);
            }
            (start_loop, slot.status.subscribe())
        };

        if start_loop {
            let manager = Arc::clone(self);
            let key = auth_id.clone();
            let outcome = tokio::spawn(async move { manager.flush_loop(&key).await }).await;
            return match outcome {
                Ok(result) => result.map(Some),
                Err(join) => {
                    self.finish_loop(&auth_id, LoopStatus::Failed(join.to_string()));
                    Err(join.into())
                }
            };
        }

        debug!(auth_id, "save coalesced into running flush loop");
        let settled = match status.wait_for(|status| *status != LoopStatus::Running).await {
            Ok(status) => status.clone(),
            Err(_) => LoopStatus::Idle,
        };
        match settled {
            LoopStatus::Failed(message) => Err(PersistError::FlushAborted { auth_id, message }),
            LoopStatus::Idle | LoopStatus::Running => Ok(None),
        }
    }

    async fn flush_loop(&self, auth_id: &str) -> Result<FlushReport, PersistError> {
        let outcome = self
            .coordinator
            .run_exclusive(auth_id, "flush", || self.drain(auth_id))
            .await
            .map_err(PersistError::from)
            .and_then(|drained| drained);

        if let Err(err) = &outcome {
            self.finish_loop(auth_id, LoopStatus::Failed(err.to_string()));
        }
        if self.released.contains_key(auth_id) {
            self.forget(auth_id);
        }
        outcome
    }

    /// Flush pending snapshots until none is left.
    async fn drain(&self, auth_id: &str) -> Result<FlushReport, PersistError> {
        let mut report = FlushReport::default();
        loop {
            let snapshot = {
                let Some(mut slot) = self.slots.get_mut(auth_id) else {
                    return Ok(report);
                };
                match slot.pending.take() {
                    Some(snapshot) => snapshot,
                    None => {
                        slot.status.send_replace(LoopStatus::Idle);
                        return Ok(report);
                    }
                }
            };

            report = self.flush_cycle(&snapshot).await.inspect_err(|err| {
                error!(auth_id, error = %err, "aggregate write failed; flush cycle aborted");
            })?;
        }
    }

    fn finish_loop(&self, auth_id: &str, status: LoopStatus) {
        if let Some(slot) = self.slots.get(auth_id) {
            slot.status.send_replace(status);
        }
    }

    /// Write one snapshot: the aggregate profile, then every changed sub-resource.
    async fn flush_cycle(&self, record: &PlayerRecord) -> Result<FlushReport, PersistError> {
        let auth_id = record.auth_id.as_str();
        self.audit_identity(record);

        let Some(ledger) = record.inventory.as_ref() else {
            debug!(auth_id, "currency ledger not hydrated; skipping flush");
            return Ok(FlushReport::default());
        };

        let aggregate = PlayerRecord {
            quests: canonical_quests(&record.quests),
            items: canonical_items(&record.items),
            ..record.clone()
        };
        self.store
            .save_profile(ProfileEntity::from_record(&aggregate, ledger))
            .await?;
        let mut report = FlushReport {
            profile_written: true,
            ..FlushReport::default()
        };

        for table in SubResourceTable::ALL {
            let breaker = self.breaker(table);
            let signature = sub_resource_signature(table, record);
            if self.baseline_matches(auth_id, table, &signature, breaker.generation()) {
                debug!(auth_id, sub_resource = table.name(), "unchanged; skipping write");
                report.unchanged.push(table);
                continue;
            }

            let rows = sub_resource_rows(table, record);
            match breaker
                .run(|| self.store.replace_rows(table, auth_id, rows))
                .await
            {
                Ok(Some(())) => {
                    self.record_baseline(auth_id, table, signature);
                    report.written.push(table);
                }
                Ok(None) => report.unavailable.push(table),
                Err(err) => {
                    warn!(
                        auth_id,
                        sub_resource = table.name(),
                        error = %err,
                        "sub-resource write failed; retrying on next flush"
                    );
                    report.failed.push(table);
                }
            }
        }

        Ok(report)
    }

    fn audit_identity(&self, record: &PlayerRecord) {
        if !self.audited.insert(record.auth_id.clone()) {
            return;
        }
        if let Err(errors) = record.validate() {
            warn!(
                auth_id = %record.auth_id,
                player_id = record.player_id,
                errors = %errors,
                "player identity inconsistent; saving anyway"
            );
        }
    }

    fn baseline_matches(
        &self,
        auth_id: &str,
        table: SubResourceTable,
        signature: &Signature,
        generation: u64,
    ) -> bool {
        self.baselines
            .get(auth_id)
            .and_then(|baselines| {
                baselines
                    .get(&table)
                    .map(|baseline| baseline.generation == generation && &baseline.signature == signature)
            })
            .unwrap_or(false)
    }

    fn record_baseline(&self, auth_id: &str, table: SubResourceTable, signature: Signature) {
        let generation = self.breaker(table).generation();
        self.baselines
            .entry(auth_id.to_owned())
            .or_default()
            .insert(table, Baseline { signature, generation });
    }

    /// Drop every per-player entry once the player is gone.
    ///
    /// A flush loop that is still running keeps its slot and evicts it when it finishes. Later
    /// saves for the player are dropped until it is loaded or created again.
    pub fn release_player(&self, auth_id: &str) {
        self.released
            .retain(|_, released_at| released_at.elapsed() < RELEASE_TOMBSTONE_TTL);
        self.released.insert(auth_id.to_owned(), Instant::now());
        self.forget(auth_id);
        debug!(auth_id, "player released from persistence tracking");
    }

    fn forget(&self, auth_id: &str) {
        self.baselines.remove(auth_id);
        self.audited.remove(auth_id);
        self.slots
            .remove_if(auth_id, |_, slot| !slot.is_running() && slot.pending.is_none());
    }

    /// Number of players with persistence bookkeeping.
    pub fn tracked_players(&self) -> usize {
        self.baselines.len().max(self.slots.len())
    }
}

/// Canonical rows of one sub-resource, as written to its table.
fn sub_resource_rows(table: SubResourceTable, record: &PlayerRecord) -> Vec<SubResourceRow> {
    match table {
        SubResourceTable::Ammo => ammo_rows(&canonical_ammo(&record.ammo)),
        SubResourceTable::WorldResources => resource_rows(&canonical_resources(&record.resources)),
        SubResourceTable::Pets => pet_rows(&canonical_pet(&record.pet)),
        SubResourceTable::ShipSkins => ship_skin_rows(&canonical_ship_skins(&record.ship_skins)),
        SubResourceTable::QuestObjectives => quest_rows(&canonical_quests(&record.quests)),
        SubResourceTable::InventoryItems => item_rows(&canonical_items(&record.items)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dao::player_store::memory::MemoryPlayerStore;

    const AUTH_ID: &str = "5b0e8f4c-1d2a-4c6b-9e7f-3a2b1c0d9e8f";

    fn manager(store: &MemoryPlayerStore) -> Arc<PlayerDataManager> {
        PlayerDataManager::new(Arc::new(store.clone()), ManagerSettings::default())
    }

    #[tokio::test]
    async fn second_save_without_changes_only_writes_the_profile() {
        let store = MemoryPlayerStore::new();
        let manager = manager(&store);
        let record = PlayerRecord::new(AUTH_ID, 42);

        let first = manager.save_player_data(record.clone()).await.unwrap().unwrap();
        assert!(first.profile_written);
        assert_eq!(first.written, SubResourceTable::ALL.to_vec());

        let second = manager.save_player_data(record).await.unwrap().unwrap();
        assert!(second.written.is_empty());
        assert_eq!(second.unchanged, SubResourceTable::ALL.to_vec());
        assert_eq!(store.profile_writes(AUTH_ID).await, 2);
    }

    #[tokio::test]
    async fn missing_ledger_skips_the_cycle() {
        let store = MemoryPlayerStore::new();
        let manager = manager(&store);
        let mut record = PlayerRecord::new(AUTH_ID, 42);
        record.inventory = None;

        let report = manager.save_player_data(record).await.unwrap().unwrap();
        assert_eq!(report, FlushReport::default());
        assert!(store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn transient_sub_resource_failure_is_retried_next_cycle() {
        let store = MemoryPlayerStore::new();
        let manager = manager(&store);
        let record = PlayerRecord::new(AUTH_ID, 42);
        store.fail_next_table_calls(SubResourceTable::Pets, 1).await;

        let first = manager.save_player_data(record.clone()).await.unwrap().unwrap();
        assert_eq!(first.failed, vec![SubResourceTable::Pets]);

        let second = manager.save_player_data(record).await.unwrap().unwrap();
        assert_eq!(second.written, vec![SubResourceTable::Pets]);
    }

    #[tokio::test]
    async fn aggregate_failure_surfaces_and_releases_the_loop() {
        let store = MemoryPlayerStore::new();
        let manager = manager(&store);
        store.fail_next_profile_writes(1).await;

        let failed = manager.save_player_data(PlayerRecord::new(AUTH_ID, 42)).await;
        assert!(matches!(failed, Err(PersistError::Storage(_))));
        assert_eq!(store.row_writes(SubResourceTable::Ammo).await, 0);

        let retried = manager.save_player_data(PlayerRecord::new(AUTH_ID, 42)).await;
        assert!(retried.unwrap().unwrap().profile_written);
    }

    #[tokio::test]
    async fn loaded_state_is_the_baseline() {
        let store = MemoryPlayerStore::new();
        let manager = manager(&store);
        store
            .insert_profile(AUTH_ID, json!({ "auth_id": AUTH_ID, "player_id": 7, "currencies": {} }))
            .await;
        store
            .insert_rows(
                SubResourceTable::WorldResources,
                AUTH_ID,
                vec![("ore".into(), json!({ "resource_type": "ore", "quantity": 3 }))],
            )
            .await;

        let record = manager.load_player_data(AUTH_ID).await.unwrap();
        assert_eq!(record.resources.quantity("ore"), 3);

        let report = manager.save_player_data(record).await.unwrap().unwrap();
        assert_eq!(
            report.written,
            vec![SubResourceTable::QuestObjectives, SubResourceTable::InventoryItems]
        );
        assert_eq!(report.unchanged.len(), 4);
    }

    #[tokio::test]
    async fn creating_twice_conflicts() {
        let store = MemoryPlayerStore::new();
        let manager = manager(&store);

        let created = manager.create_initial_player_records(AUTH_ID).await.unwrap();
        assert!(created.player_id >= 1);
        assert!(store.profile(AUTH_ID).await.is_some());

        let again = manager.create_initial_player_records(AUTH_ID).await;
        assert!(matches!(again, Err(PersistError::ProfileExists { .. })));
        assert!(matches!(
            manager.create_initial_player_records("not-a-uuid").await,
            Err(PersistError::InvalidIdentity(_))
        ));
    }

    #[tokio::test]
    async fn release_forgets_baselines() {
        let store = MemoryPlayerStore::new();
        let manager = manager(&store);
        let record = PlayerRecord::new(AUTH_ID, 42);
        manager.save_player_data(record.clone()).await.unwrap();
        assert_eq!(manager.tracked_players(), 1);

        manager.release_player(AUTH_ID);
        assert_eq!(manager.tracked_players(), 0);

        let loaded = manager.load_player_data(AUTH_ID).await.unwrap();
        let report = manager.save_player_data(loaded).await.unwrap().unwrap();
        assert!(report.profile_written);
        assert_eq!(manager.tracked_players(), 1);
    }

    #[tokio::test]
    async fn saves_arriving_after_release_are_dropped() {
        let store = MemoryPlayerStore::new();
        let manager = manager(&store);
        let mut stale = PlayerRecord::new(AUTH_ID, 42);
        stale.nickname = "before".into();
        manager.save_player_data(stale.clone()).await.unwrap();

        let mut last = stale.clone();
        last.nickname = "final".into();
        manager.save_player_data(last).await.unwrap();
        manager.release_player(AUTH_ID);
        let writes = store.calls().await.len();

        assert_eq!(manager.save_player_data(stale).await.unwrap(), None);
        assert_eq!(manager.tracked_players(), 0);
        assert_eq!(store.calls().await.len(), writes);
        assert_eq!(store.profile(AUTH_ID).await.unwrap()["nickname"], "final");
    }

    #[tokio::test]
    async fn loop_running_across_release_evicts_when_done() {
        let store = MemoryPlayerStore::new();
        store.set_write_latency(Some(Duration::from_millis(5))).await;
        let manager = manager(&store);

        let saving = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.save_player_data(PlayerRecord::new(AUTH_ID, 42)).await }
        });
        while manager.tracked_players() == 0 {
            tokio::task::yield_now().await;
        }
        manager.release_player(AUTH_ID);
        assert_eq!(manager.tracked_players(), 1);

        saving.await.unwrap().unwrap();
        assert_eq!(manager.tracked_players(), 0);
    }
}
