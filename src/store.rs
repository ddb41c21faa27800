//! Contains the storage collaborator contract required by the save protocol,
//! and the [`std::collections::HashMap`]'s based [InMemory] implementation.

use std::collections::HashMap;
use std::convert::Infallible;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::record::{Row, Value};
use crate::version::Check;

/// Storage abstraction required by the save protocol.
///
/// Any relational (or relational-enough) store qualifies, provided it can
/// execute an atomic single-statement conditional update and report the
/// affected-row count, plus a point lookup by primary key.
///
/// Transaction management stays with the caller: the protocol issues one
/// conditional statement per logical save and never opens or commits
/// transactions itself, so a save issued inside a caller's transaction is
/// rolled back with it.
#[async_trait]
pub trait Store<Id>: Send + Sync
where
    Id: Send + Sync,
{
    /// The error type returned by the concrete implementation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Point lookup of a stored row by primary key.
    async fn find(&self, table: &str, id: &Id) -> Result<Option<Row>, Self::Error>;

    /// Persists a brand-new row, unconditionally.
    async fn insert(&self, table: &str, id: Id, row: Row) -> Result<(), Self::Error>;

    /// Executes one atomic conditional update, the equivalent of
    /// `UPDATE <table> SET <values> WHERE pk = <id> AND <check>`,
    /// returning the number of rows affected.
    ///
    /// The check and the write must not be separable: executing them as a
    /// single statement is what closes the race window between reading a
    /// version and writing against it.
    async fn update(
        &self,
        table: &str,
        id: &Id,
        check: Check,
        values: Row,
    ) -> Result<u64, Self::Error>;
}

#[derive(Debug)]
struct InMemoryBackend<Id> {
    tables: HashMap<String, HashMap<Id, Row>>,
}

impl<Id> Default for InMemoryBackend<Id> {
    fn default() -> Self {
        Self {
            tables: HashMap::default(),
        }
    }
}

/// In-memory implementation of the [Store] trait, backed by a thread-safe
/// [`std::collections::HashMap`].
///
/// Holding the write lock for the whole [`Store::update`] call makes each
/// conditional update atomic, the same guarantee a relational store
/// provides per statement.
#[derive(Debug, Clone)]
pub struct InMemory<Id> {
    backend: Arc<RwLock<InMemoryBackend<Id>>>,
}

impl<Id> Default for InMemory<Id> {
    fn default() -> Self {
        Self {
            backend: Arc::default(),
        }
    }
}

impl<Id> InMemory<Id>
where
    Id: Clone + Eq + Hash + Send + Sync,
{
    /// Removes a stored row, returning whether it existed.
    ///
    /// Deleting a row invalidates every in-memory record loaded from it:
    /// their next save reports a conflict.
    ///
    /// # Panics
    ///
    /// When the lock on the backend has been poisoned by a panicking thread.
    pub fn delete(&self, table: &str, id: &Id) -> bool {
        let mut backend = self
            .backend
            .write()
            .expect("acquire write lock on store backend");

        backend
            .tables
            .get_mut(table)
            .and_then(|rows| rows.remove(id))
            .is_some()
    }
}

#[async_trait]
impl<Id> Store<Id> for InMemory<Id>
where
    Id: Clone + Eq + Hash + Send + Sync,
{
    type Error = Infallible;

    async fn find(&self, table: &str, id: &Id) -> Result<Option<Row>, Self::Error> {
        let backend = self
            .backend
            .read()
            .expect("acquire read lock on store backend");

        Ok(backend
            .tables
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    async fn insert(&self, table: &str, id: Id, row: Row) -> Result<(), Self::Error> {
        let mut backend = self
            .backend
            .write()
            .expect("acquire write lock on store backend");

        backend
            .tables
            .entry(table.to_owned())
            .or_default()
            .insert(id, row);

        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        id: &Id,
        check: Check,
        values: Row,
    ) -> Result<u64, Self::Error> {
        let mut backend = self
            .backend
            .write()
            .expect("acquire write lock on store backend");

        let Some(row) = backend.tables.get_mut(table).and_then(|rows| rows.get_mut(id)) else {
            return Ok(0);
        };

        if let Check::MustBe { attribute, version } = check {
            let stored = row.get(attribute).and_then(Value::as_u64);

            if stored != Some(version) {
                return Ok(0);
            }
        }

        row.extend(values);

        Ok(1)
    }
}
