//! Relation descriptor cache and enum-value cache shared by both decoders.
//!
//! Each source connection (one MySQL binlog stream, one Postgres
//! `pgoutput` stream) owns its own `RelationCache` instance — relation ids
//! are per-connection namespaces and must never be compared across
//! sources.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};

use lru::LruCache;

/// A single column as announced by the source (TABLE_MAP for MySQL, a
/// Relation message for Postgres).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Source-specific wire type tag (MySQL column type byte, Postgres
    /// attribute type oid).
    pub wire_type: u32,
    /// Source-specific type metadata (MySQL's two-byte metadata value,
    /// Postgres's atttypmod).
    pub type_meta: i32,
    pub flags: ColumnFlags,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnFlags {
    pub nullable: bool,
    pub unsigned: bool,
    pub is_key: bool,
}

/// Per-table schema snapshot, cached in memory and refreshed whenever the
/// source re-announces the same relation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub relation_id: u64,
    pub schema_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Declared primary key column names; empty if the source reports none
    /// and the capture policy does not override it.
    pub primary_key_columns: Vec<String>,
}

impl RelationDescriptor {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Whether `other` represents a structural change from `self` — a
    /// differing column count or a differing wire-type array invalidates
    /// the relation's enum cache and (for MySQL) its cached column names.
    pub fn differs_structurally(&self, other: &RelationDescriptor) -> bool {
        if self.columns.len() != other.columns.len() {
            return true;
        }
        self.columns
            .iter()
            .zip(other.columns.iter())
            .any(|(a, b)| a.wire_type != b.wire_type)
    }
}

const DEFAULT_CAPACITY: usize = 4096;

/// Thread-safe `relation_id -> RelationDescriptor` cache, one per source
/// connection.
#[derive(Clone)]
pub struct RelationCache {
    inner: Arc<RwLock<LruCache<u64, RelationDescriptor>>>,
    enum_cache: Arc<RwLock<HashMap<(String, String, String), Vec<String>>>>,
}

/// Outcome of registering a freshly-parsed relation descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationUpdate {
    /// First time this relation id has been seen.
    New,
    /// Seen before with an identical column layout.
    Unchanged,
    /// Seen before, but the column count or wire types changed: the
    /// caller must invalidate the enum cache for this table and, for
    /// MySQL, refetch column names via the side channel.
    Invalidated,
}

impl RelationCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        RelationCache {
            inner: Arc::new(RwLock::new(LruCache::new(cap))),
            enum_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers (or refreshes) a relation descriptor, returning whether
    /// this was new, unchanged, or a structural change that invalidates
    /// dependent caches.
    pub fn update(&self, descriptor: RelationDescriptor) -> RelationUpdate {
        let mut cache = self.inner.write().unwrap();
        let outcome = match cache.get(&descriptor.relation_id) {
            None => RelationUpdate::New,
            Some(prev) if !prev.differs_structurally(&descriptor) => RelationUpdate::Unchanged,
            Some(_) => RelationUpdate::Invalidated,
        };

        if outcome == RelationUpdate::Invalidated {
            let key_prefix = (descriptor.schema_name.clone(), descriptor.table_name.clone());
            self.enum_cache
                .write()
                .unwrap()
                .retain(|(schema, table, _col), _| (schema.clone(), table.clone()) != key_prefix);
        }

        cache.put(descriptor.relation_id, descriptor);
        outcome
    }

    pub fn get(&self, relation_id: u64) -> Option<RelationDescriptor> {
        self.inner.write().unwrap().get(&relation_id).cloned()
    }

    pub fn remove(&self, relation_id: u64) -> Option<RelationDescriptor> {
        self.inner.write().unwrap().pop(&relation_id)
    }

    /// Looks up cached enum labels for a `(schema, table, column)` triple.
    pub fn enum_labels(&self, schema: &str, table: &str, column: &str) -> Option<Vec<String>> {
        self.enum_cache
            .read()
            .unwrap()
            .get(&(schema.to_string(), table.to_string(), column.to_string()))
            .cloned()
    }

    /// Caches enum labels fetched (lazily, via the source-specific catalog
    /// query) for a `(schema, table, column)` triple.
    pub fn cache_enum_labels(&self, schema: &str, table: &str, column: &str, labels: Vec<String>) {
        self.enum_cache
            .write()
            .unwrap()
            .insert((schema.to_string(), table.to_string(), column.to_string()), labels);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RelationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(relation_id: u64, column_types: &[u32]) -> RelationDescriptor {
        RelationDescriptor {
            relation_id,
            schema_name: "testdb".into(),
            table_name: "users".into(),
            columns: column_types
                .iter()
                .enumerate()
                .map(|(i, t)| ColumnDescriptor {
                    name: format!("col{i}"),
                    wire_type: *t,
                    type_meta: 0,
                    flags: ColumnFlags::default(),
                })
                .collect(),
            primary_key_columns: vec!["col0".into()],
        }
    }

    #[test]
    fn first_registration_is_new() {
        let cache = RelationCache::new();
        assert_eq!(cache.update(descriptor(1, &[1, 2])), RelationUpdate::New);
    }

    #[test]
    fn identical_redefinition_is_unchanged() {
        let cache = RelationCache::new();
        cache.update(descriptor(1, &[1, 2]));
        assert_eq!(cache.update(descriptor(1, &[1, 2])), RelationUpdate::Unchanged);
    }

    #[test]
    fn column_count_change_invalidates() {
        let cache = RelationCache::new();
        cache.update(descriptor(1, &[1, 2]));
        cache.cache_enum_labels("testdb", "users", "status", vec!["a".into()]);

        assert_eq!(
            cache.update(descriptor(1, &[1, 2, 3])),
            RelationUpdate::Invalidated
        );
        assert!(cache.enum_labels("testdb", "users", "status").is_none());
    }

    #[test]
    fn column_type_change_invalidates() {
        let cache = RelationCache::new();
        cache.update(descriptor(1, &[1, 2]));
        assert_eq!(
            cache.update(descriptor(1, &[1, 99])),
            RelationUpdate::Invalidated
        );
    }

    #[test]
    fn enum_cache_roundtrip() {
        let cache = RelationCache::new();
        assert!(cache.enum_labels("db", "t", "c").is_none());
        cache.cache_enum_labels("db", "t", "c", vec!["red".into(), "blue".into()]);
        assert_eq!(
            cache.enum_labels("db", "t", "c"),
            Some(vec!["red".into(), "blue".into()])
        );
    }
}
