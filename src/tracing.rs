//! Module containing some extension traits to support code instrumentation
//! using the `tracing` crate.

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::instrument;

use crate::record::{Record, Row};
use crate::repository::{self, GetError, SaveError};
use crate::store;
use crate::version::Check;

/// [`repository::Repository`] type wrapper that provides instrumentation
/// features through the `tracing` crate.
#[derive(Debug, Clone)]
pub struct InstrumentedRepository<T, Inner>
where
    T: Record + Debug,
    T::Id: Debug,
    Inner: repository::Repository<T>,
{
    inner: Inner,
    record: PhantomData<T>,
}

#[async_trait]
impl<T, Inner> repository::Getter<T> for InstrumentedRepository<T, Inner>
where
    T: Record + Debug,
    T::Id: Debug,
    Inner: repository::Repository<T>,
{
    #[instrument(name = "repository::Getter.get", ret, err, skip(self))]
    async fn get(&self, id: &T::Id) -> Result<T, GetError> {
        self.inner.get(id).await
    }
}

#[async_trait]
impl<T, Inner> repository::Saver<T> for InstrumentedRepository<T, Inner>
where
    T: Record + Debug,
    T::Id: Debug,
    Inner: repository::Repository<T>,
{
    #[instrument(name = "repository::Saver.save", ret, err, skip(self))]
    async fn save(&self, record: &mut T) -> Result<(), SaveError> {
        self.inner.save(record).await
    }
}

/// Extension trait for any [`repository::Repository`] type to provide
/// instrumentation features through the `tracing` crate.
pub trait RepositoryExt<T>: repository::Repository<T> + Sized
where
    T: Record + Debug,
    T::Id: Debug,
{
    /// Returns an instrumented version of the [`repository::Repository`]
    /// instance.
    fn with_tracing(self) -> InstrumentedRepository<T, Self> {
        InstrumentedRepository {
            inner: self,
            record: PhantomData,
        }
    }
}

impl<R, T> RepositoryExt<T> for R
where
    R: repository::Repository<T>,
    T: Record + Debug,
    T::Id: Debug,
{
}

/// [`store::Store`] type wrapper that provides instrumentation features
/// through the `tracing` crate.
#[derive(Debug, Clone)]
pub struct InstrumentedStore<S, Id>
where
    S: store::Store<Id>,
    Id: Debug + Send + Sync,
{
    store: S,
    id: PhantomData<Id>,
}

#[async_trait]
impl<S, Id> store::Store<Id> for InstrumentedStore<S, Id>
where
    S: store::Store<Id>,
    Id: Debug + Send + Sync,
{
    type Error = S::Error;

    #[instrument(name = "Store.find", ret, err, skip(self))]
    async fn find(&self, table: &str, id: &Id) -> Result<Option<Row>, Self::Error> {
        self.store.find(table, id).await
    }

    #[instrument(name = "Store.insert", ret, err, skip(self))]
    async fn insert(&self, table: &str, id: Id, row: Row) -> Result<(), Self::Error> {
        self.store.insert(table, id, row).await
    }

    #[instrument(name = "Store.update", ret, err, skip(self))]
    async fn update(
        &self,
        table: &str,
        id: &Id,
        check: Check,
        values: Row,
    ) -> Result<u64, Self::Error> {
        self.store.update(table, id, check, values).await
    }
}

/// Extension trait for any [`store::Store`] type to provide instrumentation
/// features through the `tracing` crate.
pub trait StoreExt<Id>: store::Store<Id> + Sized
where
    Id: Debug + Send + Sync,
{
    /// Returns an instrumented version of the [`store::Store`] instance.
    fn with_tracing(self) -> InstrumentedStore<Self, Id> {
        InstrumentedStore {
            store: self,
            id: PhantomData,
        }
    }
}

impl<S, Id> StoreExt<Id> for S
where
    S: store::Store<Id>,
    Id: Debug + Send + Sync,
{
}
