use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection,
    bson::{Document, doc},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::dao::{
    models::{HonorSampleEntity, ProfileEntity, SubResourceRow, SubResourceTable},
    player_store::PlayerStore,
    storage::StorageResult,
};

use super::{MongoDaoError, MongoManager, error::Result};

const PROFILE_COLLECTION_NAME: &str = "player_profiles";
const HONOR_COLLECTION_NAME: &str = "honor_history";

/// Aggregate profile as stored, keyed by the account id.
#[derive(Serialize)]
struct MongoProfileDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(flatten)]
    profile: ProfileEntity,
}

/// MongoDB-backed [`PlayerStore`] implementation.
///
/// Row collections are treated as optional schema objects: they are only read or written once
/// deployed, and an undeployed collection surfaces as a schema-missing error.
#[derive(Clone)]
pub struct MongoPlayerStore {
    mongo: MongoManager,
}

impl MongoPlayerStore {
    /// Store over an established connection.
    pub fn new(mongo: MongoManager) -> Self {
        Self { mongo }
    }

    /// Create the `(auth_id, key)` indexes of every deployed row collection.
    pub async fn ensure_indexes(&self) -> Result<()> {
        for table in SubResourceTable::ALL {
            self.mongo.ensure_row_index(table.name()).await?;
        }
        Ok(())
    }

    async fn profile_collection<T: Send + Sync>(&self) -> Collection<T> {
        self.mongo.database().await.collection::<T>(PROFILE_COLLECTION_NAME)
    }

    /// Row collection of a deployed table.
    async fn deployed<T: Send + Sync>(&self, collection: &'static str) -> Result<Collection<T>> {
        if !self.mongo.collection_exists(collection).await? {
            return Err(MongoDaoError::CollectionMissing { collection });
        }
        Ok(self.mongo.database().await.collection::<T>(collection))
    }

    async fn load_profile(&self, auth_id: String) -> Result<Option<Value>> {
        self.profile_collection::<Value>()
            .await
            .find_one(doc! { "_id": auth_id.as_str() })
            .await
            .map_err(|source| MongoDaoError::LoadProfile { auth_id, source })
    }

    async fn save_profile(&self, profile: ProfileEntity) -> Result<()> {
        let auth_id = profile.auth_id.clone();
        let document = MongoProfileDocument {
            id: auth_id.clone(),
            profile,
        };

        self.profile_collection::<MongoProfileDocument>()
            .await
            .replace_one(doc! { "_id": auth_id.as_str() }, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveProfile { auth_id, source })?;
        Ok(())
    }

    async fn read_rows(&self, table: SubResourceTable, auth_id: String) -> Result<Vec<Value>> {
        let collection = table.name();
        let rows = self.deployed::<Value>(collection).await?;

        let cursor = rows
            .find(doc! { "auth_id": auth_id.as_str() })
            .sort(doc! { "key": 1 })
            .await
            .map_err(|source| MongoDaoError::ReadRows {
                collection,
                auth_id: auth_id.clone(),
                source,
            })?;

        cursor
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ReadRows {
                collection,
                auth_id,
                source,
            })
    }

    async fn replace_rows(
        &self,
        table: SubResourceTable,
        auth_id: String,
        rows: Vec<SubResourceRow>,
    ) -> Result<()> {
        let collection = table.name();
        let target = self.deployed::<Value>(collection).await?;
        let write_error = |source| MongoDaoError::WriteRows {
            collection,
            auth_id: auth_id.clone(),
            source,
        };

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let mut document = row.data;
            if let Value::Object(ref mut columns) = document {
                columns.insert("auth_id".into(), json!(auth_id));
                columns.insert("key".into(), json!(row.key));
            }

            target
                .replace_one(
                    doc! { "auth_id": auth_id.as_str(), "key": row.key.as_str() },
                    &document,
                )
                .upsert(true)
                .await
                .map_err(write_error)?;
            keys.push(row.key);
        }

        if table.prunes_stale_rows() {
            let stale: Document = doc! { "auth_id": auth_id.as_str(), "key": { "$nin": keys } };
            target.delete_many(stale).await.map_err(write_error)?;
        }

        Ok(())
    }

    async fn recent_honor_average(&self, auth_id: String, window: usize) -> Result<Option<i64>> {
        let history = self.deployed::<HonorSampleEntity>(HONOR_COLLECTION_NAME).await?;
        let history_error = |source| MongoDaoError::HonorHistory {
            auth_id: auth_id.clone(),
            source,
        };

        let samples: Vec<HonorSampleEntity> = history
            .find(doc! { "auth_id": auth_id.as_str() })
            .sort(doc! { "recorded_at": -1 })
            .limit(window.max(1) as i64)
            .await
            .map_err(history_error)?
            .try_collect()
            .await
            .map_err(history_error)?;

        if samples.is_empty() {
            return Ok(None);
        }
        let total: i64 = samples.iter().map(|sample| sample.honor).sum();
        Ok(Some(total / samples.len() as i64))
    }

    async fn record_honor_sample(&self, sample: HonorSampleEntity) -> Result<()> {
        let history = self.deployed::<HonorSampleEntity>(HONOR_COLLECTION_NAME).await?;
        history
            .insert_one(&sample)
            .await
            .map_err(|source| MongoDaoError::HonorHistory {
                auth_id: sample.auth_id.clone(),
                source,
            })?;
        Ok(())
    }
}

impl PlayerStore for MongoPlayerStore {
    fn load_profile(&self, auth_id: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        let auth_id = auth_id.to_owned();
        Box::pin(async move { store.load_profile(auth_id).await.map_err(Into::into) })
    }

    fn save_profile(&self, profile: ProfileEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_profile(profile).await.map_err(Into::into) })
    }

    fn read_rows(
        &self,
        table: SubResourceTable,
        auth_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<Value>>> {
        let store = self.clone();
        let auth_id = auth_id.to_owned();
        Box::pin(async move { store.read_rows(table, auth_id).await.map_err(Into::into) })
    }

    fn replace_rows(
        &self,
        table: SubResourceTable,
        auth_id: &str,
        rows: Vec<SubResourceRow>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let auth_id = auth_id.to_owned();
        Box::pin(async move {
            store
                .replace_rows(table, auth_id, rows)
                .await
                .map_err(Into::into)
        })
    }

    fn recent_honor_average(
        &self,
        auth_id: &str,
        window: usize,
    ) -> BoxFuture<'static, StorageResult<Option<i64>>> {
        let store = self.clone();
        let auth_id = auth_id.to_owned();
        Box::pin(async move {
            store
                .recent_honor_average(auth_id, window)
                .await
                .map_err(Into::into)
        })
    }

    fn record_honor_sample(&self, sample: HonorSampleEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.record_honor_sample(sample).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.mongo.ping().await.map_err(Into::into) })
    }
}
