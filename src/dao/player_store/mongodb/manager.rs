use std::{sync::Arc, time::Duration};

use mongodb::{
    Client, Database, IndexModel,
    bson::{Document, doc},
    options::{ClientOptions, IndexOptions},
};
use tokio::{
    sync::RwLock,
    time::{MissedTickBehavior, interval, sleep},
};
use tracing::{info, warn};

use super::error::{MongoDaoError, Result};

const DEFAULT_DB: &str = "starport";
const MAX_CONNECT_ATTEMPTS: u32 = 10;
const FIRST_RETRY_DELAY: Duration = Duration::from_millis(250);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);
const WATCH_PERIOD: Duration = Duration::from_secs(30);

/// Cloneable MongoDB handle; a background watcher swaps in a fresh database after failed pings.
#[derive(Clone)]
pub struct MongoManager {
    shared: Arc<Shared>,
}

struct Shared {
    database: RwLock<Database>,
    options: ClientOptions,
    database_name: String,
}

/// Parse `uri`, wait for the server to answer, and start the connection watcher.
pub async fn connect(uri: &str, db_name: Option<&str>) -> Result<MongoManager> {
    let options = ClientOptions::parse(uri)
        .await
        .map_err(|source| MongoDaoError::InvalidUri {
            uri: uri.to_owned(),
            source,
        })?;
    let database_name = db_name.unwrap_or(DEFAULT_DB).to_owned();

    let database = open_database(&options, &database_name).await?;
    let shared = Arc::new(Shared {
        database: RwLock::new(database),
        options,
        database_name,
    });
    spawn_watcher(Arc::downgrade(&shared));

    Ok(MongoManager { shared })
}

impl MongoManager {
    /// Current database handle.
    pub async fn database(&self) -> Database {
        self.shared.database.read().await.clone()
    }

    /// Round-trip a `ping` command.
    pub async fn ping(&self) -> Result<()> {
        ping(&self.database().await)
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })
    }

    /// Whether `name` is a deployed collection.
    pub async fn collection_exists(&self, name: &'static str) -> Result<bool> {
        let names = self
            .database()
            .await
            .list_collection_names()
            .filter(doc! { "name": name })
            .await
            .map_err(|source| MongoDaoError::ListCollections { source })?;
        Ok(names.iter().any(|existing| existing == name))
    }

    /// Unique `(auth_id, key)` index on a row collection, if the collection is deployed.
    ///
    /// Undeployed collections are skipped; whoever deploys them owns their indexes.
    pub async fn ensure_row_index(&self, collection: &'static str) -> Result<()> {
        if !self.collection_exists(collection).await? {
            info!(collection, "collection not deployed yet; skipping index");
            return Ok(());
        }

        let options = IndexOptions::builder()
            .name(Some(format!("{collection}_owner_key_idx")))
            .unique(Some(true))
            .build();
        let model = IndexModel::builder()
            .keys(doc! { "auth_id": 1, "key": 1 })
            .options(options)
            .build();

        self.database()
            .await
            .collection::<Document>(collection)
            .create_index(model)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection,
                index: "auth_id,key",
                source,
            })?;
        Ok(())
    }
}

fn spawn_watcher(shared: std::sync::Weak<Shared>) {
    tokio::spawn(async move {
        let mut ticker = interval(WATCH_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };

            let database = shared.database.read().await.clone();
            if let Err(err) = ping(&database).await {
                warn!(error = %err, "MongoDB ping failed; reconnecting");
                let fresh = reopen(&shared.options, &shared.database_name).await;
                *shared.database.write().await = fresh;
                info!("MongoDB connection re-established");
            }
        }
    });
}

/// Keep opening the database until a ping succeeds.
async fn reopen(options: &ClientOptions, database_name: &str) -> Database {
    let mut delay = FIRST_RETRY_DELAY;
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match open_database(options, database_name).await {
            Ok(database) => return database,
            Err(err) => {
                warn!(error = %err, attempts, "MongoDB reconnect failed; retrying");
                sleep(delay).await;
                delay = backoff(delay);
            }
        }
    }
}

/// Build a client and ping until it answers or `MAX_CONNECT_ATTEMPTS` is reached.
async fn open_database(options: &ClientOptions, database_name: &str) -> Result<Database> {
    let database = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?
        .database(database_name);

    let mut delay = FIRST_RETRY_DELAY;
    let mut attempts = 0;
    loop {
        attempts += 1;
        match ping(&database).await {
            Ok(()) => return Ok(database),
            Err(source) if attempts >= MAX_CONNECT_ATTEMPTS => {
                return Err(MongoDaoError::InitialPing { attempts, source });
            }
            Err(_) => {
                sleep(delay).await;
                delay = backoff(delay);
            }
        }
    }
}

async fn ping(database: &Database) -> std::result::Result<(), mongodb::error::Error> {
    database.run_command(doc! { "ping": 1 }).await.map(|_| ())
}

fn backoff(delay: Duration) -> Duration {
    (delay * 2).min(MAX_RETRY_DELAY)
}
