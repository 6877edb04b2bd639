use std::sync::Arc;

use tokio::sync::Mutex;

use crate::store::memory::{MemoryClient, MemoryStore};
use crate::store::{
    ConflictPolicy, ConnectOptions, DocumentStore, StoreConnector, StoreError, WriteAck,
};
use crate::types::{Document, PrimaryKey};

/// Store call observed by a [`CountingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Connect {
        address: String,
        max_idle_connections: usize,
    },
    TableDrop {
        database: String,
        collection: String,
    },
    TableCreate {
        database: String,
        collection: String,
    },
    Insert {
        collection: String,
        conflict: ConflictPolicy,
    },
    Delete {
        collection: String,
        id: PrimaryKey,
    },
    Close,
}

impl StoreCall {
    /// Returns `true` for calls that write documents.
    pub fn is_mutation(&self) -> bool {
        matches!(self, StoreCall::Insert { .. } | StoreCall::Delete { .. })
    }
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<StoreCall>,
    connect_failure: Option<StoreError>,
    table_drop_failure: Option<StoreError>,
    table_create_failure: Option<StoreError>,
    write_failure: Option<StoreError>,
}

/// Test wrapper around a [`MemoryStore`] that records every store call.
///
/// Failures can be injected per operation. An injected failure is returned instead of delegating
/// to the wrapped store, but the call is still recorded.
#[derive(Debug, Clone)]
pub struct CountingStore {
    store: MemoryStore,
    inner: Arc<Mutex<Inner>>,
}

impl CountingStore {
    pub fn wrap(store: MemoryStore) -> Self {
        Self {
            store,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Returns the number of document writes issued.
    pub async fn mutation_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .count()
    }

    pub async fn clear_calls(&self) {
        self.inner.lock().await.calls.clear();
    }

    pub async fn fail_connect_with(&self, error: StoreError) {
        self.inner.lock().await.connect_failure = Some(error);
    }

    pub async fn fail_table_drop_with(&self, error: StoreError) {
        self.inner.lock().await.table_drop_failure = Some(error);
    }

    pub async fn fail_table_create_with(&self, error: StoreError) {
        self.inner.lock().await.table_create_failure = Some(error);
    }

    /// Fails every insert and delete with `error`, as a transport failure would.
    pub async fn fail_writes_with(&self, error: StoreError) {
        self.inner.lock().await.write_failure = Some(error);
    }

    async fn record<F>(&self, call: StoreCall, failure: F) -> Result<(), StoreError>
    where
        F: FnOnce(&Inner) -> Option<StoreError>,
    {
        let mut inner = self.inner.lock().await;
        inner.calls.push(call);

        match failure(&inner) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl StoreConnector for CountingStore {
    type Client = CountingClient;

    async fn connect(&self, options: &ConnectOptions) -> Result<Self::Client, StoreError> {
        let call = StoreCall::Connect {
            address: options.address.clone(),
            max_idle_connections: options.max_idle_connections,
        };
        self.record(call, |inner| inner.connect_failure.clone())
            .await?;

        let client = self.store.connect(options).await?;

        Ok(CountingClient {
            client,
            counting: self.clone(),
        })
    }
}

/// Client handed out by [`CountingStore`].
#[derive(Debug, Clone)]
pub struct CountingClient {
    client: MemoryClient,
    counting: CountingStore,
}

impl DocumentStore for CountingClient {
    fn name() -> &'static str {
        MemoryClient::name()
    }

    fn use_database(&mut self, database: &str) {
        self.client.use_database(database);
    }

    async fn table_drop(&self, database: &str, collection: &str) -> Result<WriteAck, StoreError> {
        let call = StoreCall::TableDrop {
            database: database.to_owned(),
            collection: collection.to_owned(),
        };
        self.counting
            .record(call, |inner| inner.table_drop_failure.clone())
            .await?;

        self.client.table_drop(database, collection).await
    }

    async fn table_create(&self, database: &str, collection: &str) -> Result<WriteAck, StoreError> {
        let call = StoreCall::TableCreate {
            database: database.to_owned(),
            collection: collection.to_owned(),
        };
        self.counting
            .record(call, |inner| inner.table_create_failure.clone())
            .await?;

        self.client.table_create(database, collection).await
    }

    async fn insert(
        &self,
        collection: &str,
        document: &Document,
        conflict: ConflictPolicy,
    ) -> Result<WriteAck, StoreError> {
        let call = StoreCall::Insert {
            collection: collection.to_owned(),
            conflict,
        };
        self.counting
            .record(call, |inner| inner.write_failure.clone())
            .await?;

        self.client.insert(collection, document, conflict).await
    }

    async fn delete(&self, collection: &str, id: &PrimaryKey) -> Result<WriteAck, StoreError> {
        let call = StoreCall::Delete {
            collection: collection.to_owned(),
            id: id.clone(),
        };
        self.counting
            .record(call, |inner| inner.write_failure.clone())
            .await?;

        self.client.delete(collection, id).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.counting.record(StoreCall::Close, |_| None).await
    }
}
