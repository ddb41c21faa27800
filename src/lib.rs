//! `verlock` is a minimalistic crate implementing offline optimistic locking
//! for row-level updates.
//!
//! Offline optimistic locking detects when two actors read the same record
//! and then both attempt to write it, without holding any lock for the
//! duration of the "think time" in between (e.g. a user editing a web form).
//! Each record carries a [Version][version::Version] attribute; every save
//! is issued as a single atomic conditional update scoped to
//! `primary_key = <id> AND version = <old version>`, and the affected-row
//! count decides between success and a [ConcurrentUpdate][version::ConcurrentUpdate]
//! reported back to the caller.
//!
//! The crate is split along its two seams:
//!
//! - [record] describes the data-model side: the static [Schema][record::Schema]
//!   registration of a record type's persisted attributes, and the
//!   [Record][record::Record] trait implemented by entities that participate
//!   in version checking.
//! - [repository] implements the save protocol: the [Getter][repository::Getter]
//!   and [Saver][repository::Saver] interfaces, and the conditional-update
//!   executor [Versioned][repository::Versioned] working over any
//!   [Store][store::Store] backend.
//!
//! Conflict recovery is entirely caller-side: catch
//! [SaveError::Conflict][repository::SaveError::Conflict], reload the record,
//! reapply the changes and save again (or abandon). The crate never retries,
//! never opens transactions, and holds no in-process locks -- correctness
//! derives from the storage layer executing the conditional update atomically.

#![deny(unsafe_code, unused_qualifications, trivial_casts)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod record;
pub mod repository;
pub mod store;
#[cfg(feature = "tracing")]
pub mod tracing;
pub mod version;
