//! Process-wide shared state, built once at startup and handed to every
//! connection task as an explicit dependency (Section 9 of the design:
//! "global state as explicit dependencies", never ambient statics).

use std::path::Path;
use std::sync::Arc;

use wow_keystore::file::FileKeyStore;
use wow_keystore::sqlite::SqliteKeyStore;
use wow_keystore::KeyStore;
use wow_tracker::{BehaviorTracker, InMemoryBehaviorStore};
use wow_validate::Pipeline;

use crate::config::{KeyStoreBackend, ServerConfig};
use crate::log_sink::LogSink;
use crate::quotes::QuoteSource;

pub struct ServerState {
    pub config: ServerConfig,
    pub key_store: Arc<dyn KeyStore>,
    pub tracker: Arc<BehaviorTracker>,
    pub pipeline: Arc<Pipeline>,
    pub quote_source: Arc<dyn QuoteSource>,
    pub log_sink: Arc<dyn LogSink>,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        quote_source: Arc<dyn QuoteSource>,
        log_sink: Arc<dyn LogSink>,
    ) -> anyhow::Result<Self> {
        let key_store: Arc<dyn KeyStore> = match &config.key_store_backend {
            KeyStoreBackend::Sqlite { path } => {
                Arc::new(SqliteKeyStore::open(Path::new(path), &config.master_secret)?)
            }
            KeyStoreBackend::File { path } => {
                Arc::new(FileKeyStore::open(Path::new(path), &config.master_secret)?)
            }
        };

        let tracker = Arc::new(BehaviorTracker::new(
            Arc::new(InMemoryBehaviorStore::new()),
            config.initial_difficulty,
        ));
        let pipeline = Arc::new(Pipeline::new(
            key_store.clone(),
            config.rate_limit_key,
            config.replay_protection,
        ));

        Ok(Self {
            config,
            key_store,
            tracker,
            pipeline,
            quote_source,
            log_sink,
        })
    }
}
