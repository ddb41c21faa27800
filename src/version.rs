//! Contains the types necessary for Optimistic Locking through versioning.

use serde::{Deserialize, Serialize};

/// A version used for Optimistic Locking.
///
/// Carried by every [Record][crate::record::Record] and compared in storage
/// on each save to detect concurrent writers.
pub type Version = u64;

/// The version assigned to a record that has never been persisted.
pub const INITIAL: Version = 0;

/// Derives the version a record moves to on a successful version-bearing save.
///
/// Pure derivation, no side effects: the stored version of a row strictly
/// increases by exactly 1 on every successful update that writes it,
/// and never wraps or resets.
#[must_use]
pub fn next(current: Version) -> Version {
    current + 1
}

/// Used to set a specific expectation on the stored version of a row
/// when executing a conditional update through a [Store][crate::store::Store].
///
/// It allows for optimistic locking, avoiding data races when two actors
/// modify the same row at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Disables the optimistic locking check: the update applies no matter
    /// the stored version.
    ///
    /// Used for row segments that share a primary key with a versioned
    /// record but do not carry the version attribute themselves.
    Any,

    /// Expects the row's version attribute to hold the specified value
    /// for the update to take effect.
    MustBe {
        /// Name of the version attribute to compare in storage.
        attribute: &'static str,
        /// The version value the update is conditioned on.
        version: Version,
    },
}

/// This error is returned by a save when a concurrent writer has been
/// detected on the same row.
///
/// Recoverable by the caller only: reload the record, reapply the changes
/// and save again, or abandon the save altogether. The crate itself
/// never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error(
    "concurrent update detected, expected stored version was: {expected}, found: {}",
    .actual.map_or_else(|| "row deleted".to_owned(), |version| version.to_string())
)]
pub struct ConcurrentUpdate {
    /// The version value the failed save was conditioned on.
    pub expected: Version,

    /// The version value found in storage after the failed save,
    /// or `None` if the row had been deleted concurrently.
    pub actual: Option<Version>,
}
