//! Redis backend of the document sink.
//!
//! Documents are stored as JSON strings, one key per document (see [`RedisKey`]). Redis has no
//! notion of collections, so the existence of a collection is tracked with a marker key and
//! writes to a collection without marker fail with [`StoreErrorCode::TableMissing`].
//!
//! Database and collection names must not contain the key separator `::::`, otherwise keys of
//! different collections could collide. Dropping a collection scans its keys, which does not
//! work with Redis cluster.

mod client;
mod key;

use std::fmt;

use docsink::store::{
    ConflictPolicy, ConnectOptions, DocumentStore, StoreConnector, StoreError, StoreErrorCode,
    WriteAck,
};
use docsink::types::{Document, ID_FIELD, PrimaryKey};
use fred::prelude::{ClientLike, KeysInterface, Pool};
use fred::types::{Key, SetOptions};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::redis::client::{Credentials, connect_pool, map_result};

pub use crate::redis::key::{KEY_SEPARATOR, RedisKey};

/// Number of keys requested per `SCAN` page when dropping a collection.
const SCAN_PAGE_SIZE: u32 = 100;

/// Value of collection marker keys.
const COLLECTION_MARKER_VALUE: &str = "collection";

/// Connector creating [`RedisStore`] clients.
#[derive(Debug, Clone, Default)]
pub struct RedisConnector {
    username: Option<String>,
    password: Option<SecretString>,
}

impl RedisConnector {
    pub fn new(username: Option<String>, password: Option<SecretString>) -> Self {
        Self { username, password }
    }
}

impl StoreConnector for RedisConnector {
    type Client = RedisStore;

    async fn connect(&self, options: &ConnectOptions) -> Result<Self::Client, StoreError> {
        let credentials = Credentials {
            username: self.username.clone(),
            password: self
                .password
                .as_ref()
                .map(|password| password.expose_secret().to_owned()),
        };

        let pool = connect_pool(options, credentials).await?;

        info!(
            address = %options.address,
            pool_size = options.max_idle_connections,
            "connected to redis"
        );

        Ok(RedisStore {
            pool,
            database: String::new(),
        })
    }
}

/// Redis client implementing [`DocumentStore`].
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    database: String,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    async fn collection_exists(&self, database: &str, collection: &str) -> Result<bool, StoreError> {
        check_names(database, collection)?;

        let marker = RedisKey::collection_marker(database, collection);
        let count: i64 = map_result(self.pool.exists(marker).await)?;

        Ok(count > 0)
    }

    async fn ensure_collection(&self, collection: &str) -> Result<(), StoreError> {
        if self.collection_exists(&self.database, collection).await? {
            return Ok(());
        }

        Err(table_missing(&self.database, collection))
    }
}

impl DocumentStore for RedisStore {
    fn name() -> &'static str {
        "redis"
    }

    fn use_database(&mut self, database: &str) {
        self.database = database.to_owned();
    }

    async fn table_drop(&self, database: &str, collection: &str) -> Result<WriteAck, StoreError> {
        if !self.collection_exists(database, collection).await? {
            return Err(table_missing(database, collection));
        }

        let pattern = RedisKey::collection_pattern(database, collection);
        let mut cursor = "0".to_string();
        let mut deleted = 0u64;

        loop {
            let (next_cursor, keys): (String, Vec<Key>) = map_result(
                self.pool
                    .scan_page(cursor, pattern.clone(), Some(SCAN_PAGE_SIZE), None)
                    .await,
            )?;

            if !keys.is_empty() {
                let unlinked: i64 = map_result(self.pool.unlink(keys).await)?;
                deleted += unlinked as u64;
            }

            cursor = next_cursor;
            if cursor == "0" {
                break;
            }
        }

        map_result(
            self.pool
                .del::<i64, _>(RedisKey::collection_marker(database, collection))
                .await,
        )?;

        debug!(database, collection, deleted, "dropped redis collection");

        Ok(WriteAck {
            deleted,
            ..Default::default()
        })
    }

    async fn table_create(&self, database: &str, collection: &str) -> Result<WriteAck, StoreError> {
        check_names(database, collection)?;

        let created: Option<String> = map_result(
            self.pool
                .set(
                    RedisKey::collection_marker(database, collection),
                    COLLECTION_MARKER_VALUE,
                    None,
                    Some(SetOptions::NX),
                    false,
                )
                .await,
        )?;

        if created.is_none() {
            return Err(StoreError::new(
                StoreErrorCode::TableAlreadyExists,
                format!("Table `{database}.{collection}` already exists."),
            ));
        }

        Ok(WriteAck::default())
    }

    async fn insert(
        &self,
        collection: &str,
        document: &Document,
        conflict: ConflictPolicy,
    ) -> Result<WriteAck, StoreError> {
        self.ensure_collection(collection).await?;

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

        let key = RedisKey::document(&self.database, collection, id.as_str());
        // Older Redis versions have no JSON support, documents are stored as strings.
        let serialized = Value::Object(document).to_string();

        let ack = match conflict {
            ConflictPolicy::Error => {
                let written: Option<String> = map_result(
                    self.pool
                        .set(key.clone(), serialized, None, Some(SetOptions::NX), false)
                        .await,
                )?;

                match written {
                    Some(_) => WriteAck {
                        inserted: 1,
                        ..Default::default()
                    },
                    None => WriteAck::rejected(StoreError::new(
                        StoreErrorCode::DuplicatePrimaryKey,
                        format!("Duplicate primary key `{ID_FIELD}`: {}", key.as_str()),
                    )),
                }
            }
            ConflictPolicy::Replace => {
                let previous: Option<String> = map_result(
                    self.pool
                        .set(key, serialized.clone(), None, None, true)
                        .await,
                )?;

                match previous {
                    None => WriteAck {
                        inserted: 1,
                        ..Default::default()
                    },
                    Some(previous) if previous == serialized => WriteAck {
                        unchanged: 1,
                        ..Default::default()
                    },
                    Some(_) => WriteAck {
                        replaced: 1,
                        ..Default::default()
                    },
                }
            }
        };

        Ok(WriteAck {
            generated_keys,
            ..ack
        })
    }

    async fn delete(&self, collection: &str, id: &PrimaryKey) -> Result<WriteAck, StoreError> {
        self.ensure_collection(collection).await?;

        let key = RedisKey::document(&self.database, collection, id.as_str());
        let deleted: i64 = map_result(self.pool.del(key).await)?;

        let ack = if deleted > 0 {
            WriteAck {
                deleted: 1,
                ..Default::default()
            }
        } else {
            WriteAck {
                skipped: 1,
                ..Default::default()
            }
        };

        Ok(ack)
    }

    async fn close(&self) -> Result<(), StoreError> {
        map_result(self.pool.quit().await)
    }
}

/// Rejects names that would make keys of different collections collide.
fn check_names(database: &str, collection: &str) -> Result<(), StoreError> {
    if database.contains(KEY_SEPARATOR) || collection.contains(KEY_SEPARATOR) {
        return Err(StoreError::message(format!(
            "Names must not contain `{KEY_SEPARATOR}`, got `{database}.{collection}`"
        )));
    }

    Ok(())
}

fn table_missing(database: &str, collection: &str) -> StoreError {
    StoreError::new(
        StoreErrorCode::TableMissing,
        format!("Table `{database}.{collection}` does not exist."),
    )
}
