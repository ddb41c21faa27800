//! Module `record` contains the data-model side of the locking protocol:
//! the static [Schema] describing a record type's persisted attributes,
//! and the [Record] trait implemented by any entity that participates
//! in optimistic version checking.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::version::Version;

/// An attribute value, as handed to the storage collaborator.
///
/// The semantics of each value are owned by the caller and its schema;
/// the locking protocol only moves values around, except for the version
/// attribute which it reads and increments as an unsigned integer.
pub type Value = serde_json::Value;

/// The plain key-value payload of a stored row, keyed by attribute name.
pub type Row = HashMap<String, Value>;

/// The role an [Attribute] plays in the locking protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// A regular persisted attribute, opaque to the protocol.
    Plain,

    /// The version attribute: checked on every update and incremented
    /// by one on every successful version-bearing save.
    Version,
}

/// Static descriptor of a single persisted attribute of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    /// The attribute name, as it appears in the stored row.
    pub name: &'static str,

    /// The role of the attribute in the locking protocol.
    pub kind: AttributeKind,
}

impl Attribute {
    /// Descriptor for a regular persisted attribute.
    #[must_use]
    pub const fn plain(name: &'static str) -> Self {
        Self {
            name,
            kind: AttributeKind::Plain,
        }
    }

    /// Descriptor for the version attribute of a record type.
    #[must_use]
    pub const fn version(name: &'static str) -> Self {
        Self {
            name,
            kind: AttributeKind::Version,
        }
    }
}

/// Error detected while resolving the version attribute of a [Schema].
///
/// These are programming errors in the record type registration: they are
/// surfaced to the caller at the first save attempt and never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// The record type declares no version attribute, at any level
    /// of its hierarchy.
    #[error("record type '{type_name}' declares no version attribute")]
    NoVersionAttribute {
        /// Name of the misconfigured record type.
        type_name: &'static str,
    },

    /// The record type declares more than one version attribute across
    /// its hierarchy, which leaves the conditional update predicate
    /// undefined.
    #[error("record type '{type_name}' declares more than one version attribute")]
    MultipleVersionAttributes {
        /// Name of the misconfigured record type.
        type_name: &'static str,
    },
}

/// Static, reflection-free registration of a record type's persisted
/// attributes.
///
/// A `Schema` is built once per concrete type, usually as a `static`,
/// and reached through [Record::schema]. Supertypes are modeled with the
/// [parent][Schema::parent] link: attribute enumeration walks the whole
/// chain, so a subtype sees the attributes declared at every level,
/// each counted once per concrete type. A proxy or alias type simply
/// reuses its parent's `Schema` value.
#[derive(Debug)]
pub struct Schema {
    /// Name of the record type, used in error reporting.
    pub name: &'static str,

    /// Name of the stored table (or collection) holding rows of this type.
    pub table: &'static str,

    /// Attributes declared at this level of the hierarchy.
    pub attributes: &'static [Attribute],

    /// The supertype schema this type extends, if any.
    pub parent: Option<&'static Schema>,
}

impl Schema {
    /// Enumerates every declared attribute of the record type,
    /// own and inherited.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> + '_ {
        let mut level = Some(self);

        std::iter::from_fn(move || {
            let schema = level?;
            level = schema.parent;
            Some(schema.attributes.iter())
        })
        .flatten()
    }

    /// Resolves the single designated version attribute for this record type.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError`] when the type declares zero version attributes,
    /// or more than one.
    pub fn version_attribute(&self) -> Result<&Attribute, ConfigurationError> {
        let mut found = None;

        for attribute in self.attributes() {
            if attribute.kind != AttributeKind::Version {
                continue;
            }

            if found.is_some() {
                return Err(ConfigurationError::MultipleVersionAttributes {
                    type_name: self.name,
                });
            }

            found = Some(attribute);
        }

        found.ok_or(ConfigurationError::NoVersionAttribute {
            type_name: self.name,
        })
    }
}

/// A persisted entity that participates in optimistic locking.
///
/// The trait is the contract the save protocol requires from the
/// schema/record collaborator: enumeration of the declared attributes
/// (through [Record::schema]), get/set of attribute values by name, and
/// knowledge of which attributes are currently deferred (not loaded).
///
/// The in-memory instance is assumed single-writer: it is not safe to
/// mutate the same instance from two threads without external
/// synchronization. The stored row is the shared resource instead, and the
/// conditional update issued on save is the sole mutual-exclusion mechanism.
pub trait Record: Send + Sync + Sized {
    /// The type used to uniquely identify the record in storage.
    /// Assigned at creation, immutable thereafter.
    type Id: Clone + Eq + Hash + Send + Sync;

    /// The static [Schema] registered for this record type.
    fn schema() -> &'static Schema;

    /// Returns the primary key of this record instance.
    fn id(&self) -> &Self::Id;

    /// The version of this record as currently known in memory.
    ///
    /// On a freshly loaded record this equals the value durably stored
    /// for its primary key.
    fn version(&self) -> Version;

    /// Synchronizes the in-memory version with storage.
    ///
    /// Called by the repository on a successful version-bearing save, so
    /// that a second save on the same instance checks against the value
    /// the first save wrote, not against a stale one.
    fn set_version(&mut self, version: Version);

    /// Reads the current in-memory value of the named attribute.
    ///
    /// `None` when the attribute is unset, not loaded, or unknown
    /// to this record type.
    fn attribute(&self, name: &str) -> Option<Value>;

    /// Writes the in-memory value of the named attribute.
    fn set_attribute(&mut self, name: &str, value: Value);

    /// Whether the named attribute is deferred, i.e. intentionally left
    /// out of memory as a lazy-loading optimization.
    ///
    /// Deferring the version attribute makes any save of this instance
    /// fail with [SaveError::DeferredVersion][crate::repository::SaveError::DeferredVersion].
    fn is_deferred(&self, name: &str) -> bool {
        let _ = name;
        false
    }

    /// Whether this record is known to be backed by a storage row already.
    ///
    /// Saving a non-persisted record takes the unconditional insert path;
    /// saving a persisted one takes the conditional update path.
    fn is_persisted(&self) -> bool;

    /// Marks the record as backed by a storage row.
    ///
    /// Called by the repository after a successful insert.
    fn mark_persisted(&mut self);

    /// Builds a persisted instance from a stored row.
    ///
    /// `deferred` lists attribute names that were intentionally left out
    /// of `row` and must be reported by [Record::is_deferred].
    fn hydrate(id: Self::Id, row: Row, deferred: HashSet<String>) -> Self;
}

/// Specifies the attribute set a save call writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelect<'a> {
    /// Write every non-deferred attribute, the version attribute included.
    All,

    /// Write only the named attributes.
    ///
    /// An empty list is the sentinel for [FieldSelect::All]. Excluding the
    /// version attribute from the list does not bypass conflict detection:
    /// the save still executes the conditional check against the stored
    /// version, it only skips the increment.
    Only(&'a [&'static str]),
}
