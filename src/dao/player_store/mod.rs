pub mod memory;
#[cfg(feature = "mongo-store")]
/// MongoDB-backed store.
pub mod mongodb;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::dao::models::{HonorSampleEntity, ProfileEntity, SubResourceRow, SubResourceTable};
use crate::dao::storage::StorageResult;

/// Abstraction over the durable store holding player profiles and their sub-resources.
///
/// Reads hand back loosely-typed documents: rows may predate the current column naming and
/// are normalized by the caller. Writes take the canonical persisted shapes.
pub trait PlayerStore: Send + Sync {
    /// Fetch the aggregate profile document, `None` when the player has no profile.
    fn load_profile(&self, auth_id: &str) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    /// Upsert the aggregate profile document in one operation.
    fn save_profile(&self, profile: ProfileEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch every row a player owns in a sub-resource table.
    fn read_rows(
        &self,
        table: SubResourceTable,
        auth_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<Value>>>;
    /// Upsert `rows` by `(auth_id, key)`; set-like tables also delete the player's rows whose
    /// key is not part of `rows`.
    fn replace_rows(
        &self,
        table: SubResourceTable,
        auth_id: &str,
        rows: Vec<SubResourceRow>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Average honor over the `window` most recent samples, `None` without history.
    fn recent_honor_average(
        &self,
        auth_id: &str,
        window: usize,
    ) -> BoxFuture<'static, StorageResult<Option<i64>>>;
    /// Append one honor sample.
    fn record_honor_sample(&self, sample: HonorSampleEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
