//! Module containing the repository interfaces used to load and save
//! [Record]s, and [Versioned], the conditional-update implementation of
//! those interfaces that enforces the optimistic locking protocol.

use std::collections::HashSet;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::record::{ConfigurationError, FieldSelect, Record, Row, Value};
use crate::store::Store;
use crate::version::{self, Check, ConcurrentUpdate};

/// All possible error types returned by [`Getter::get`].
#[derive(Debug, thiserror::Error)]
pub enum GetError {
    /// No stored row exists for the requested primary key.
    #[error("record was not found")]
    NotFound,

    /// Error returned when the storage collaborator has encountered an error.
    #[error("failed to get record, an error occurred: {0}")]
    Internal(#[from] anyhow::Error),
}

/// All possible error types returned by [`Saver::save`].
///
/// Every variant propagates synchronously out of the save call: nothing
/// is logged, recovered or retried inside the crate.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// The record type is not correctly registered for optimistic locking.
    /// Surfaced at the first save attempt, never retried.
    #[error("record type is misconfigured: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The version attribute of the record being saved is deferred.
    ///
    /// With the version not loaded, no sensible concurrency check can be
    /// made, so the save is rejected before any storage round-trip. The
    /// alternative of treating a deferred version like an excluded field
    /// would make deferral a way to bypass checking altogether.
    #[error("cannot save a record with a deferred version attribute")]
    DeferredVersion,

    /// A concurrent writer updated or deleted the row between this record's
    /// load and this save. Recoverable by the caller via reload-and-retry.
    #[error("failed to save record: {0}")]
    Conflict(#[from] ConcurrentUpdate),

    /// Error returned when the storage collaborator has encountered an error.
    #[error("failed to save record, an error occurred: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Interface used to load [Record] instances from a data store.
#[async_trait]
pub trait Getter<T>: Send + Sync
where
    T: Record,
{
    /// Loads a record instance from the data store, referenced by its
    /// unique identifier.
    async fn get(&self, id: &T::Id) -> Result<T, GetError>;
}

/// Interface used to save a new version of a [Record] instance
/// to a data store.
#[async_trait]
pub trait Saver<T>: Send + Sync
where
    T: Record,
{
    /// Saves every attribute of the record, enforcing the version check.
    ///
    /// On success, the in-memory version of the record is advanced to match
    /// storage, as a side effect, so that a second save on the same instance
    /// does not conflict with this one.
    async fn save(&self, record: &mut T) -> Result<(), SaveError>;
}

/// A Repository is an object that allows to load and save a [Record]
/// from and to a persistent data store.
pub trait Repository<T>: Getter<T> + Saver<T> + Send + Sync
where
    T: Record,
{
}

impl<T, R> Repository<T> for R
where
    T: Record,
    R: Getter<T> + Saver<T> + Send + Sync,
{
}

/// Conditional-update implementation of the [Repository] interface,
/// working over any [Store] backend.
///
/// Every update is issued as one atomic statement scoped to
/// `primary_key = <id> AND version = <old version>`, and the affected-row
/// count decides between success and [SaveError::Conflict]. No lock is held
/// between a load and a save: among N concurrent saves of the same row
/// starting from the same observed version, the storage layer's write
/// serialization admits exactly one, and the others report a conflict.
#[derive(Debug, Clone)]
pub struct Versioned<T, S>
where
    T: Record,
    S: Store<T::Id>,
{
    store: S,
    record: PhantomData<T>,
}

impl<T, S> From<S> for Versioned<T, S>
where
    T: Record,
    S: Store<T::Id>,
{
    fn from(store: S) -> Self {
        Self {
            store,
            record: PhantomData,
        }
    }
}

impl<T, S> Versioned<T, S>
where
    T: Record,
    S: Store<T::Id>,
{
    /// Loads a record while deliberately leaving the named attributes
    /// out of memory.
    ///
    /// Deferral is a lazy-loading optimization; a record loaded this way
    /// behaves like any other, except that saving it with the version
    /// attribute deferred fails with [SaveError::DeferredVersion].
    ///
    /// # Errors
    ///
    /// [`GetError::NotFound`] when no row exists for the primary key,
    /// [`GetError::Internal`] when the storage collaborator fails.
    pub async fn get_deferring(&self, id: &T::Id, defer: &[&str]) -> Result<T, GetError> {
        let table = T::schema().table;

        let mut row = self
            .store
            .find(table, id)
            .await
            .map_err(anyhow::Error::new)?
            .ok_or(GetError::NotFound)?;

        let deferred: HashSet<String> = defer.iter().map(|name| (*name).to_owned()).collect();
        row.retain(|name, _| !deferred.contains(name));

        Ok(T::hydrate(id.clone(), row, deferred))
    }

    /// Saves only the named attributes of the record.
    ///
    /// Version checking still happens: excluding the version attribute from
    /// the list is not a way to bypass conflict detection, it only skips the
    /// version increment. Including the version attribute's name makes the
    /// save check and increment, like a full save would. An empty list is
    /// the sentinel for "all attributes".
    ///
    /// Names unknown to the record, or whose value is not currently loaded,
    /// are not written.
    ///
    /// # Errors
    ///
    /// Same contract as [`Saver::save`].
    pub async fn save_only(&self, record: &mut T, fields: &[&'static str]) -> Result<(), SaveError> {
        self.save_with(record, FieldSelect::Only(fields)).await
    }

    async fn save_with(&self, record: &mut T, select: FieldSelect<'_>) -> Result<(), SaveError> {
        let schema = T::schema();
        let version_attribute = schema.version_attribute()?;

        if record.is_deferred(version_attribute.name) {
            return Err(SaveError::DeferredVersion);
        }

        if !record.is_persisted() {
            return self.insert(record, version_attribute.name).await;
        }

        let select = match select {
            FieldSelect::Only(fields) if fields.is_empty() => FieldSelect::All,
            other => other,
        };

        // The version as observed before this save: the conditional update
        // is scoped to it, whether or not this write advances it.
        let old_version = record.version();
        let mut values = Row::new();
        let mut advance = false;

        match select {
            FieldSelect::All => {
                advance = true;

                for attribute in schema.attributes() {
                    if attribute.name == version_attribute.name
                        || record.is_deferred(attribute.name)
                    {
                        continue;
                    }

                    if let Some(value) = record.attribute(attribute.name) {
                        values.insert(attribute.name.to_owned(), value);
                    }
                }
            }

            FieldSelect::Only(fields) => {
                for name in fields {
                    if *name == version_attribute.name {
                        advance = true;
                        continue;
                    }

                    if let Some(value) = record.attribute(name) {
                        values.insert((*name).to_owned(), value);
                    }
                }
            }
        }

        let new_version = version::next(old_version);

        if advance {
            values.insert(version_attribute.name.to_owned(), Value::from(new_version));
        }

        let affected = self
            .store
            .update(
                schema.table,
                record.id(),
                Check::MustBe {
                    attribute: version_attribute.name,
                    version: old_version,
                },
                values,
            )
            .await
            .map_err(anyhow::Error::new)?;

        match affected {
            1 => {
                if advance {
                    record.set_version(new_version);
                }

                Ok(())
            }

            // Zero affected rows is ambiguous: the row was either updated
            // concurrently or deleted concurrently. The point lookup below
            // only distinguishes the two in the reported error; the outcome
            // is a conflict either way, so it is best-effort: it need not be
            // atomic with the update statement, and its own failure leaves
            // the actual version unknown without masking the conflict.
            0 => {
                let actual = self
                    .store
                    .find(schema.table, record.id())
                    .await
                    .ok()
                    .flatten()
                    .and_then(|row| row.get(version_attribute.name).and_then(Value::as_u64));

                Err(SaveError::Conflict(ConcurrentUpdate {
                    expected: old_version,
                    actual,
                }))
            }

            affected => panic!(
                "conditional update affected {affected} rows for record type '{}', \
                 primary keys must be unique in storage",
                schema.name,
            ),
        }
    }

    async fn insert(
        &self,
        record: &mut T,
        version_attribute: &'static str,
    ) -> Result<(), SaveError> {
        let schema = T::schema();
        let mut row = Row::new();

        for attribute in schema.attributes() {
            if attribute.name == version_attribute || record.is_deferred(attribute.name) {
                continue;
            }

            if let Some(value) = record.attribute(attribute.name) {
                row.insert(attribute.name.to_owned(), value);
            }
        }

        row.insert(version_attribute.to_owned(), Value::from(version::INITIAL));

        self.store
            .insert(schema.table, record.id().clone(), row)
            .await
            .map_err(anyhow::Error::new)?;

        record.set_version(version::INITIAL);
        record.mark_persisted();

        Ok(())
    }
}

#[async_trait]
impl<T, S> Getter<T> for Versioned<T, S>
where
    T: Record,
    S: Store<T::Id>,
{
    async fn get(&self, id: &T::Id) -> Result<T, GetError> {
        self.get_deferring(id, &[]).await
    }
}

#[async_trait]
impl<T, S> Saver<T> for Versioned<T, S>
where
    T: Record,
    S: Store<T::Id>,
{
    async fn save(&self, record: &mut T) -> Result<(), SaveError> {
        self.save_with(record, FieldSelect::All).await
    }
}
