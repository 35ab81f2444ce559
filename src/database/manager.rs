use async_trait::async_trait;
use mongodb::{bson::doc, options::ClientOptions, Client};
use thiserror::Error;
use tracing::info;

/// Database name used when the connection URI does not name one.
pub const DEFAULT_DATABASE_NAME: &str = "test";

/// Errors from the database connector
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid MongoDB connection string: {0}")]
    InvalidUri(String),

    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
}

/// Handle to the single document-store connection shared by the whole process.
///
/// Cloning is cheap; all clones share the driver's internal connection state.
#[derive(Clone, Debug)]
pub struct Database {
    client: Client,
    name: String,
}

impl Database {
    /// Build a client from the URI without contacting the server.
    pub async fn lazy(uri: &str) -> Result<Self, DatabaseError> {
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|e| DatabaseError::InvalidUri(e.to_string()))?;
        let name = options
            .default_database
            .clone()
            .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string());
        let client = Client::with_options(options)?;
        Ok(Self { client, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Round-trips a `ping` command to verify the server is reachable
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    /// Close the client, waiting for in-flight operations to finish
    pub async fn close(self) {
        self.client.shutdown().await;
        info!("Closed database connection: {}", self.name);
    }
}

/// Opens the database connection during startup.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Database, DatabaseError>;
}

/// Connects to MongoDB and pings it once. The first failure is returned as-is; there is no retry.
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoConnector;

#[async_trait]
impl DatabaseConnector for MongoConnector {
    async fn connect(&self, uri: &str) -> Result<Database, DatabaseError> {
        let database = Database::lazy(uri).await?;
        database.ping().await?;
        Ok(database)
    }
}
