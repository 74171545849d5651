mod error;
mod manager;
mod store;

pub use error::MongoDaoError;
pub use manager::{MongoManager, connect};
pub use store::MongoPlayerStore;
