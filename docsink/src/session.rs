use std::time::Duration;

use docsink_config::shared::{ResetPolicy, SinkConfig, ValidationError};
use tracing::{debug, info, warn};

use crate::bail;
use crate::error::{ErrorKind, SinkResult};
use crate::sink_error;
use crate::store::{
    ConflictPolicy, ConnectOptions, DocumentStore, StoreConnector, StoreError, StoreErrorCode,
    WriteAck,
};
use crate::types::{Document, PrimaryKey};

/// Maximum number of idle connections kept in the pool of a session.
pub const MAX_IDLE_CONNECTIONS: usize = 10;

/// Time after which an idle pooled connection is closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameters of [`Session::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// `host:port` of the store.
    pub address: String,
    pub database: String,
    pub collection: String,
    /// Emits connection, reset and acknowledgment diagnostics at `info` level instead of `debug`.
    pub debug: bool,
    pub reset_policy: ResetPolicy,
}

impl SessionOptions {
    pub fn new(
        address: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            database: database.into(),
            collection: collection.into(),
            debug: false,
            reset_policy: ResetPolicy::default(),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_reset_policy(mut self, reset_policy: ResetPolicy) -> Self {
        self.reset_policy = reset_policy;
        self
    }

    /// Builds the options from a sink configuration, resolving its uri into an address and its
    /// namespace into a database and a collection.
    pub fn from_config(config: &SinkConfig) -> Result<Self, ValidationError> {
        let address = config.address()?;
        let (database, collection) = config.split_namespace()?;

        Ok(Self::new(address, database, collection)
            .with_debug(config.debug)
            .with_reset_policy(config.reset_policy))
    }
}

/// Failures swallowed while resetting the collection under [`ResetPolicy::BestEffort`].
///
/// A drop failing because the collection does not exist is expected on a first run and is not
/// recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub drop_error: Option<StoreError>,
    pub create_error: Option<StoreError>,
}

impl ResetReport {
    /// Returns `true` when the collection is known to be empty.
    pub fn is_clean(&self) -> bool {
        self.drop_error.is_none() && self.create_error.is_none()
    }
}

/// An open connection to the store, bound to a database and a collection.
///
/// A session is owned by exactly one worker and applies one mutation at a time. Dropping a
/// session releases the client without the orderly shutdown done by [`Session::close`].
#[derive(Debug)]
pub struct Session<C> {
    client: C,
    database: String,
    collection: String,
    debug: bool,
    reset_report: ResetReport,
}

impl<C> Session<C>
where
    C: DocumentStore,
{
    /// Connects to the store and prepares the target collection for a fresh write stream.
    ///
    /// Opening a session is destructive: the collection is dropped and recreated empty, so this
    /// must never be used to resume writing into an existing collection. Drop and create
    /// failures are handled as dictated by [`SessionOptions::reset_policy`].
    pub async fn open<K>(connector: &K, options: SessionOptions) -> SinkResult<Self>
    where
        K: StoreConnector<Client = C>,
    {
        if options.database.is_empty() || options.collection.is_empty() {
            bail!(
                ErrorKind::ValidationError,
                "Session target is invalid",
                format!(
                    "Database and collection must be non-empty, got `{}.{}`",
                    options.database, options.collection
                )
            );
        }

        let connect_options = ConnectOptions {
            address: options.address.clone(),
            max_idle_connections: MAX_IDLE_CONNECTIONS,
            idle_timeout: IDLE_TIMEOUT,
        };

        if options.debug {
            info!(address = %options.address, store = C::name(), "connecting to document store");
        }

        let mut client = connector.connect(&connect_options).await.map_err(|err| {
            sink_error!(
                ErrorKind::DestinationConnectionFailed,
                "Failed to connect to the document store",
                detail = format!("{}: {err}", options.address),
                source: err
            )
        })?;

        let reset_report = reset_collection(&client, &options).await?;

        client.use_database(&options.database);

        info!(
            address = %options.address,
            database = %options.database,
            collection = %options.collection,
            "document store session opened"
        );

        Ok(Self {
            client,
            database: options.database,
            collection: options.collection,
            debug: options.debug,
            reset_report,
        })
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Returns the reset failures that were tolerated while opening the session.
    pub fn reset_report(&self) -> &ResetReport {
        &self.reset_report
    }

    /// Inserts a document into the session's collection.
    pub async fn insert(
        &self,
        document: &Document,
        conflict: ConflictPolicy,
    ) -> Result<WriteAck, StoreError> {
        self.client
            .insert(&self.collection, document, conflict)
            .await
    }

    /// Deletes a document of the session's collection by primary key.
    pub async fn delete(&self, id: &PrimaryKey) -> Result<WriteAck, StoreError> {
        self.client.delete(&self.collection, id).await
    }

    /// Releases the session's connections.
    pub async fn close(self) -> SinkResult<()> {
        self.client.close().await?;

        info!(
            database = %self.database,
            collection = %self.collection,
            "document store session closed"
        );

        Ok(())
    }
}

/// Drops and recreates the target collection.
async fn reset_collection<C>(client: &C, options: &SessionOptions) -> SinkResult<ResetReport>
where
    C: DocumentStore,
{
    let database = options.database.as_str();
    let collection = options.collection.as_str();
    let mut report = ResetReport::default();

    match client.table_drop(database, collection).await {
        Ok(ack) => {
            if options.debug {
                info!(database, collection, ?ack, "dropped collection");
            }
        }
        Err(err) if err.code() == Some(StoreErrorCode::TableMissing) => {
            debug!(database, collection, "collection did not exist, nothing to drop");
        }
        Err(err) => {
            if options.reset_policy == ResetPolicy::FailFast {
                bail!(
                    ErrorKind::DestinationResetFailed,
                    "Failed to drop the target collection",
                    detail = format!("{database}.{collection}: {err}"),
                    source: err
                );
            }

            warn!(database, collection, error = %err, "failed to drop collection, continuing");
            report.drop_error = Some(err);
        }
    }

    match client.table_create(database, collection).await {
        Ok(ack) => {
            if options.debug {
                info!(database, collection, ?ack, "created collection");
            }
        }
        Err(err) => {
            if options.reset_policy == ResetPolicy::FailFast {
                bail!(
                    ErrorKind::DestinationResetFailed,
                    "Failed to create the target collection",
                    detail = format!("{database}.{collection}: {err}"),
                    source: err
                );
            }

            warn!(database, collection, error = %err, "failed to create collection, continuing");
            report.create_error = Some(err);
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::memory::MemoryStore;

    fn options() -> SessionOptions {
        SessionOptions::new("localhost:28015", "db", "docs")
    }

    #[tokio::test]
    async fn open_empties_existing_collection() {
        let store = MemoryStore::new();
        let document = json!({"id": "1"}).as_object().cloned().unwrap();
        store.seed("db", "docs", vec![document]).await;

        let session = Session::open(&store, options()).await.unwrap();

        assert_eq!(store.documents("db", "docs").await, Some(vec![]));
        assert!(session.reset_report().is_clean());
        assert_eq!(session.client().database(), "db");
    }

    #[tokio::test]
    async fn open_creates_missing_collection() {
        let store = MemoryStore::new();

        let session = Session::open(&store, options()).await.unwrap();

        assert!(store.table_exists("db", "docs").await);
        assert_eq!(session.collection(), "docs");
        assert_eq!(session.database(), "db");
    }

    #[tokio::test]
    async fn empty_names_are_rejected() {
        let store = MemoryStore::new();

        let err = Session::open(&store, SessionOptions::new("localhost:1", "", "docs"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(!store.table_exists("", "docs").await);
    }

    #[test]
    fn options_are_resolved_from_config() {
        let mut config = SinkConfig::new("memory://localhost", "app.users.archive");
        config.debug = true;
        config.reset_policy = ResetPolicy::FailFast;

        let options = SessionOptions::from_config(&config).unwrap();

        assert_eq!(
            options,
            SessionOptions::new("localhost:28015", "app", "users.archive")
                .with_debug(true)
                .with_reset_policy(ResetPolicy::FailFast)
        );
    }
}
