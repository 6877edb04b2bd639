use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::{
    ConflictPolicy, ConnectOptions, DocumentStore, StoreConnector, StoreError, StoreErrorCode,
    WriteAck,
};
use crate::types::{Document, ID_FIELD, PrimaryKey};

/// Database addressed by a freshly connected client until [`DocumentStore::use_database`] is
/// called.
pub const DEFAULT_DATABASE: &str = "test";

type TableKey = (String, String);

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableKey, BTreeMap<PrimaryKey, Document>>,
}

/// In-memory document store for testing and development purposes.
///
/// [`MemoryStore`] keeps collections keyed by `(database, collection)` and documents keyed by
/// their primary key. Clones share the same state, so a test can hand one clone to the sink and
/// inspect the other afterwards.
///
/// Acknowledgments follow the semantics of a real document store: conflicting inserts are
/// rejected with a [`StoreErrorCode::DuplicatePrimaryKey`] error, documents without an `id` get
/// a generated key, and writes to a missing collection fail the call.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Creates an empty store without any collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the documents of a collection, ordered by primary key, or [`None`] if
    /// the collection does not exist.
    pub async fn documents(&self, database: &str, collection: &str) -> Option<Vec<Document>> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(&table_key(database, collection))
            .map(|table| table.values().cloned().collect())
    }

    /// Returns a copy of the document whose `id` is `id`.
    pub async fn document(&self, database: &str, collection: &str, id: &Value) -> Option<Document> {
        let key = PrimaryKey::from_value(id)?;
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(&table_key(database, collection))
            .and_then(|table| table.get(&key))
            .cloned()
    }

    pub async fn table_exists(&self, database: &str, collection: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.tables.contains_key(&table_key(database, collection))
    }

    /// Creates the collection if needed and stores the given documents in it, replacing
    /// documents with the same primary key.
    ///
    /// Documents without a string or number `id` are ignored.
    pub async fn seed(&self, database: &str, collection: &str, documents: Vec<Document>) {
        let mut inner = self.inner.lock().await;
        let table = inner
            .tables
            .entry(table_key(database, collection))
            .or_default();

        for document in documents {
            if let Some(id) = document.get(ID_FIELD).and_then(PrimaryKey::from_value) {
                table.insert(id, document);
            }
        }
    }

    /// Removes every collection.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.tables.clear();
    }
}

impl StoreConnector for MemoryStore {
    type Client = MemoryClient;

    async fn connect(&self, options: &ConnectOptions) -> Result<Self::Client, StoreError> {
        info!(address = %options.address, "connected to in-memory document store");

        Ok(MemoryClient {
            store: self.clone(),
            database: DEFAULT_DATABASE.to_owned(),
        })
    }
}

/// Client of a [`MemoryStore`], bound to an active database.
#[derive(Debug, Clone)]
pub struct MemoryClient {
    store: MemoryStore,
    database: String,
}

impl MemoryClient {
    pub fn database(&self) -> &str {
        &self.database
    }
}

impl DocumentStore for MemoryClient {
    fn name() -> &'static str {
        "memory"
    }

    fn use_database(&mut self, database: &str) {
        self.database = database.to_owned();
    }

    async fn table_drop(&self, database: &str, collection: &str) -> Result<WriteAck, StoreError> {
        let mut inner = self.store.inner.lock().await;

        match inner.tables.remove(&table_key(database, collection)) {
            Some(table) => {
                debug!(database, collection, documents = table.len(), "dropped table");
                Ok(WriteAck::default())
            }
            None => Err(table_missing(database, collection)),
        }
    }

    async fn table_create(&self, database: &str, collection: &str) -> Result<WriteAck, StoreError> {
        let mut inner = self.store.inner.lock().await;

        let key = table_key(database, collection);
        if inner.tables.contains_key(&key) {
            return Err(StoreError::new(
                StoreErrorCode::TableAlreadyExists,
                format!("Table `{database}.{collection}` already exists."),
            ));
        }

        inner.tables.insert(key, BTreeMap::new());

        Ok(WriteAck::default())
    }

    async fn insert(
        &self,
        collection: &str,
        document: &Document,
        conflict: ConflictPolicy,
    ) -> Result<WriteAck, StoreError> {
        let mut inner = self.store.inner.lock().await;

        let Some(table) = inner
            .tables
            .get_mut(&table_key(&self.database, collection))
        else {
            return Err(table_missing(&self.database, collection));
        };

        let mut document = document.clone();
        let mut generated_keys = Vec::new();

        let id = match document.get(ID_FIELD) {
            None => {
                let generated = Uuid::new_v4().to_string();
                document.insert(ID_FIELD.to_owned(), Value::String(generated.clone()));
                let id = PrimaryKey::from_string(&generated);
                generated_keys.push(generated);
                id
            }
            Some(value) => match PrimaryKey::from_value(value) {
                Some(id) => id,
                None => {
                    return Ok(WriteAck::rejected(StoreError::new(
                        StoreErrorCode::InvalidPrimaryKey,
                        format!("Primary keys must be either a number or a string: {value}"),
                    )));
                }
            },
        };

        let ack = match (table.get(&id), conflict) {
            (None, _) => {
                table.insert(id, document);
                WriteAck {
                    inserted: 1,
                    ..Default::default()
                }
            }
            (Some(existing), ConflictPolicy::Error) => WriteAck::rejected(StoreError::new(
                StoreErrorCode::DuplicatePrimaryKey,
                format!(
                    "Duplicate primary key `{ID_FIELD}`:\n{}\n{}",
                    Value::Object(existing.clone()),
                    Value::Object(document)
                ),
            )),
            (Some(existing), ConflictPolicy::Replace) if *existing == document => WriteAck {
                unchanged: 1,
                ..Default::default()
            },
            (Some(_), ConflictPolicy::Replace) => {
                table.insert(id, document);
                WriteAck {
                    replaced: 1,
                    ..Default::default()
                }
            }
        };

        Ok(WriteAck {
            generated_keys,
            ..ack
        })
    }

    async fn delete(&self, collection: &str, id: &PrimaryKey) -> Result<WriteAck, StoreError> {
        let mut inner = self.store.inner.lock().await;

        let Some(table) = inner
            .tables
            .get_mut(&table_key(&self.database, collection))
        else {
            return Err(table_missing(&self.database, collection));
        };

        let ack = match table.remove(id) {
            Some(_) => WriteAck {
                deleted: 1,
                ..Default::default()
            },
            None => WriteAck {
                skipped: 1,
                ..Default::default()
            },
        };

        Ok(ack)
    }
}

fn table_key(database: &str, collection: &str) -> TableKey {
    (database.to_owned(), collection.to_owned())
}

fn table_missing(database: &str, collection: &str) -> StoreError {
    StoreError::new(
        StoreErrorCode::TableMissing,
        format!("Table `{database}.{collection}` does not exist."),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(document) => document,
            other => panic!("not a document: {other}"),
        }
    }

    fn key(id: Value) -> PrimaryKey {
        PrimaryKey::from_value(&id).unwrap()
    }

    async fn connected(store: &MemoryStore) -> MemoryClient {
        let options = ConnectOptions {
            address: "localhost:28015".to_owned(),
            max_idle_connections: 1,
            idle_timeout: Duration::from_secs(1),
        };
        let mut client = store.connect(&options).await.unwrap();
        client.use_database("db");
        client.table_create("db", "docs").await.unwrap();
        client
    }

    #[tokio::test]
    async fn conflicting_insert_is_rejected_and_keeps_existing_document() {
        let store = MemoryStore::new();
        let client = connected(&store).await;

        let first = client
            .insert("docs", &doc(json!({"id": "1", "x": 1})), ConflictPolicy::Error)
            .await
            .unwrap();
        let second = client
            .insert("docs", &doc(json!({"id": "1", "x": 2})), ConflictPolicy::Error)
            .await
            .unwrap();

        assert_eq!(first.inserted, 1);
        assert_eq!(second.errors, 1);
        let error = second.first_error.unwrap();
        assert_eq!(error.code(), Some(StoreErrorCode::DuplicatePrimaryKey));
        assert!(error.text().starts_with("Duplicate primary key `id`"));
        assert_eq!(
            store.document("db", "docs", &json!("1")).await,
            Some(doc(json!({"id": "1", "x": 1})))
        );
    }

    #[tokio::test]
    async fn replace_reports_replaced_then_unchanged() {
        let store = MemoryStore::new();
        let client = connected(&store).await;
        store
            .seed("db", "docs", vec![doc(json!({"id": 7, "x": 1}))])
            .await;

        let replaced = client
            .insert("docs", &doc(json!({"id": 7, "y": 2})), ConflictPolicy::Replace)
            .await
            .unwrap();
        let unchanged = client
            .insert("docs", &doc(json!({"id": 7, "y": 2})), ConflictPolicy::Replace)
            .await
            .unwrap();

        assert_eq!(replaced.replaced, 1);
        assert_eq!(unchanged.unchanged, 1);
        assert_eq!(
            store.documents("db", "docs").await.unwrap(),
            vec![doc(json!({"id": 7, "y": 2}))]
        );
    }

    #[tokio::test]
    async fn numeric_and_string_ids_are_distinct_keys() {
        let store = MemoryStore::new();
        let client = connected(&store).await;

        let numeric = client
            .insert("docs", &doc(json!({"id": 7, "x": 1})), ConflictPolicy::Error)
            .await
            .unwrap();
        let string = client
            .insert("docs", &doc(json!({"id": "7", "x": 2})), ConflictPolicy::Error)
            .await
            .unwrap();

        assert_eq!(numeric.inserted, 1);
        assert_eq!(string.inserted, 1);
        assert!(!string.has_errors());
        assert_eq!(store.documents("db", "docs").await.unwrap().len(), 2);

        let deleted = client.delete("docs", &key(json!("7"))).await.unwrap();

        assert_eq!(deleted.deleted, 1);
        assert_eq!(
            store.documents("db", "docs").await.unwrap(),
            vec![doc(json!({"id": 7, "x": 1}))]
        );
    }

    #[tokio::test]
    async fn documents_without_id_get_a_generated_key() {
        let store = MemoryStore::new();
        let client = connected(&store).await;

        let ack = client
            .insert("docs", &doc(json!({"x": 1})), ConflictPolicy::Error)
            .await
            .unwrap();

        assert_eq!(ack.generated_keys.len(), 1);
        let stored = store
            .document("db", "docs", &json!(ack.generated_keys[0]))
            .await
            .unwrap();
        assert_eq!(stored["x"], json!(1));
    }

    #[tokio::test]
    async fn invalid_primary_key_is_rejected_in_ack() {
        let store = MemoryStore::new();
        let client = connected(&store).await;

        let ack = client
            .insert("docs", &doc(json!({"id": [1]})), ConflictPolicy::Error)
            .await
            .unwrap();

        assert_eq!(
            ack.first_error.map(|error| error.code()),
            Some(Some(StoreErrorCode::InvalidPrimaryKey))
        );
        assert_eq!(store.documents("db", "docs").await, Some(vec![]));
    }

    #[tokio::test]
    async fn table_management_reports_structured_errors() {
        let store = MemoryStore::new();
        let client = connected(&store).await;

        let exists = client.table_create("db", "docs").await.unwrap_err();
        assert_eq!(exists.code(), Some(StoreErrorCode::TableAlreadyExists));

        client.table_drop("db", "docs").await.unwrap();
        let missing = client.table_drop("db", "docs").await.unwrap_err();
        assert_eq!(missing.code(), Some(StoreErrorCode::TableMissing));
        assert_eq!(missing.text(), "Table `db.docs` does not exist.");

        let write = client.delete("docs", &key(json!("1"))).await.unwrap_err();
        assert_eq!(write.code(), Some(StoreErrorCode::TableMissing));
    }

    #[tokio::test]
    async fn deleting_absent_document_is_skipped() {
        let store = MemoryStore::new();
        let client = connected(&store).await;

        let ack = client.delete("docs", &key(json!("missing"))).await.unwrap();

        assert_eq!(ack.skipped, 1);
        assert!(!ack.has_errors());
    }

    #[tokio::test]
    async fn writes_address_the_active_database() {
        let store = MemoryStore::new();
        let mut client = connected(&store).await;
        client.table_create("other", "docs").await.unwrap();
        client.use_database("other");

        client
            .insert("docs", &doc(json!({"id": "1"})), ConflictPolicy::Error)
            .await
            .unwrap();

        assert_eq!(client.database(), "other");
        assert_eq!(store.documents("db", "docs").await, Some(vec![]));
        assert_eq!(store.documents("other", "docs").await.unwrap().len(), 1);
    }
}
