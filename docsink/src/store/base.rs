use std::future::Future;

use crate::store::{ConflictPolicy, ConnectOptions, StoreError, WriteAck};
use crate::types::{Document, PrimaryKey};

/// Factory of connected [`DocumentStore`] clients.
///
/// A connector holds whatever static configuration a driver needs (credentials, TLS, shared
/// in-memory state) and produces a fresh client for every session.
pub trait StoreConnector {
    /// Client produced by a successful connection.
    type Client: DocumentStore + Send + Sync + 'static;

    /// Connects to the store at `options.address` with a pool bounded by `options`.
    fn connect(
        &self,
        options: &ConnectOptions,
    ) -> impl Future<Output = Result<Self::Client, StoreError>> + Send;
}

/// Connected client of a document store.
///
/// [`DocumentStore`] exposes the handful of operations the sink needs: collection management
/// during session setup, and per-event writes. Writes address collections of the active
/// database selected with [`DocumentStore::use_database`].
///
/// An `Err` from a write means the call itself failed (network failure, timeout, missing
/// collection) and no acknowledgment is available. Writes that reached the store return a
/// [`WriteAck`] even when the store rejected the document.
pub trait DocumentStore {
    /// Returns the name of the store, used as prefix of reported error messages.
    fn name() -> &'static str;

    /// Selects the database that subsequent writes address.
    fn use_database(&mut self, database: &str);

    /// Drops a collection. Fails with [`crate::store::StoreErrorCode::TableMissing`] when it
    /// does not exist.
    fn table_drop(
        &self,
        database: &str,
        collection: &str,
    ) -> impl Future<Output = Result<WriteAck, StoreError>> + Send;

    /// Creates an empty collection. Fails with
    /// [`crate::store::StoreErrorCode::TableAlreadyExists`] when it exists.
    fn table_create(
        &self,
        database: &str,
        collection: &str,
    ) -> impl Future<Output = Result<WriteAck, StoreError>> + Send;

    /// Inserts a document into a collection of the active database.
    ///
    /// With [`ConflictPolicy::Error`], a document whose primary key already exists is rejected
    /// in the acknowledgment. With [`ConflictPolicy::Replace`], the stored document is fully
    /// replaced.
    fn insert(
        &self,
        collection: &str,
        document: &Document,
        conflict: ConflictPolicy,
    ) -> impl Future<Output = Result<WriteAck, StoreError>> + Send;

    /// Deletes the document with the given primary key. Deleting an absent document is
    /// acknowledged as skipped, not as an error.
    fn delete(
        &self,
        collection: &str,
        id: &PrimaryKey,
    ) -> impl Future<Output = Result<WriteAck, StoreError>> + Send;

    /// Releases the client's connections.
    ///
    /// The default implementation is a no-op.
    fn close(&self) -> impl Future<Output = Result<(), StoreError>> + Send {
        async { Ok(()) }
    }
}
