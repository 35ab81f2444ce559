#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::HeaderMap;
use tokio::net::TcpListener;
use tracing_subscriber::fmt::MakeWriter;

use mobile_api_rust::auth::{AuthError, Identity, IdentityResolver};
use mobile_api_rust::config::AppConfig;
use mobile_api_rust::database::{Database, DatabaseConnector, DatabaseError, MongoConnector};
use mobile_api_rust::server::{AppState, ListenerBinder, TcpBinder};

/// Nothing listens on port 1; the short timeouts keep failing connects fast.
pub const UNREACHABLE_MONGO_URI: &str =
    "mongodb://127.0.0.1:1/app?serverSelectionTimeoutMS=300&connectTimeoutMS=300";

pub fn base_env() -> HashMap<&'static str, String> {
    HashMap::from([
        ("MONGO_URI", UNREACHABLE_MONGO_URI.to_string()),
        ("CLERK_SECRET_KEY", "sk_test_abc".to_string()),
        ("CLOUDINARY_CLOUD_NAME", "demo".to_string()),
        ("CLOUDINARY_API_KEY", "123456".to_string()),
        ("CLOUDINARY_API_SECRET", "cloud-secret".to_string()),
        ("ARCJET_KEY", "ajkey_xyz".to_string()),
    ])
}

pub fn config_with(vars: HashMap<&'static str, String>) -> Arc<AppConfig> {
    Arc::new(AppConfig::from_lookup(|key| vars.get(key).cloned()).expect("test config"))
}

pub fn test_config() -> Arc<AppConfig> {
    config_with(base_env())
}

/// Resolver returning the same outcome for every request
pub struct FixedResolver(pub Result<Option<Identity>, AuthError>);

#[async_trait]
impl IdentityResolver for FixedResolver {
    async fn resolve(&self, _headers: &HeaderMap) -> Result<Option<Identity>, AuthError> {
        self.0.clone()
    }
}

pub fn signed_in(user_id: &str) -> Arc<dyn IdentityResolver> {
    Arc::new(FixedResolver(Ok(Some(Identity::new(user_id)))))
}

pub fn signed_out() -> Arc<dyn IdentityResolver> {
    Arc::new(FixedResolver(Ok(None)))
}

pub fn broken_resolver() -> Arc<dyn IdentityResolver> {
    Arc::new(FixedResolver(Err(AuthError::Resolver("provider offline".to_string()))))
}

pub async fn app_state(resolver: Arc<dyn IdentityResolver>) -> AppState {
    AppState {
        config: test_config(),
        db: Database::lazy(UNREACHABLE_MONGO_URI).await.expect("lazy client"),
        resolver,
    }
}

/// Hands back a client without pinging, standing in for a reachable server
pub struct LazyConnector;

#[async_trait]
impl DatabaseConnector for LazyConnector {
    async fn connect(&self, uri: &str) -> Result<Database, DatabaseError> {
        Database::lazy(uri).await
    }
}

/// Counts connect attempts before delegating to the real connector
#[derive(Default)]
pub struct CountingConnector {
    pub calls: AtomicUsize,
}

#[async_trait]
impl DatabaseConnector for CountingConnector {
    async fn connect(&self, uri: &str) -> Result<Database, DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        MongoConnector.connect(uri).await
    }
}

/// Records bind attempts; binds for real unless told to fail
#[derive(Default)]
pub struct SpyBinder {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl SpyBinder {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListenerBinder for SpyBinder {
    async fn bind(&self, addr: SocketAddr) -> io::Result<TcpListener> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "address already in use"));
        }
        TcpBinder.bind(addr).await
    }
}

/// In-memory log sink for asserting on emitted tracing output
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().expect("log buffer");
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
