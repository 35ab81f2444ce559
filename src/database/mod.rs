pub mod manager;

pub use manager::{Database, DatabaseConnector, DatabaseError, MongoConnector};
