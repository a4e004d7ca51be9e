//! Column projection: resolves a table's capture policy against its
//! current relation descriptor, once per descriptor refresh (§4.5). The
//! decoders consult the resulting index set to skip non-projected column
//! bytes without materializing them.

use cdc_schema::RelationDescriptor;

use crate::policy::TablePolicy;

/// Which column indices (into `RelationDescriptor::columns`) are
/// materialized, and the primary key column names to report.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    pub included_indices: Vec<usize>,
    pub primary_key_columns: Vec<String>,
}

impl Projection {
    pub fn build(descriptor: &RelationDescriptor, policy: &TablePolicy) -> Projection {
        let included_indices = descriptor
            .columns
            .iter()
            .enumerate()
            .filter(|(_, col)| policy.columns.includes(&col.name))
            .map(|(i, _)| i)
            .collect();

        let primary_key_columns = if !policy.primary_key_override.is_empty() {
            policy.primary_key_override.clone()
        } else {
            descriptor.primary_key_columns.clone()
        };

        Projection { included_indices, primary_key_columns }
    }

    pub fn includes(&self, column_index: usize) -> bool {
        self.included_indices.contains(&column_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ColumnSelector;
    use cdc_schema::{ColumnDescriptor, ColumnFlags};

    fn descriptor() -> RelationDescriptor {
        RelationDescriptor {
            relation_id: 1,
            schema_name: "testdb".into(),
            table_name: "users".into(),
            columns: vec![
                ColumnDescriptor { name: "id".into(), wire_type: 3, type_meta: 0, flags: ColumnFlags::default() },
                ColumnDescriptor { name: "ssn".into(), wire_type: 15, type_meta: 0, flags: ColumnFlags::default() },
                ColumnDescriptor { name: "name".into(), wire_type: 15, type_meta: 0, flags: ColumnFlags::default() },
            ],
            primary_key_columns: vec!["id".into()],
        }
    }

    #[test]
    fn explicit_allow_list_excludes_other_columns() {
        let policy = TablePolicy {
            capture_dml: true,
            capture_ddl: false,
            columns: ColumnSelector::Explicit(["id".to_string(), "name".to_string()].into_iter().collect()),
            primary_key_override: vec![],
        };
        let projection = Projection::build(&descriptor(), &policy);
        assert!(projection.includes(0));
        assert!(!projection.includes(1));
        assert!(projection.includes(2));
        assert_eq!(projection.primary_key_columns, vec!["id".to_string()]);
    }

    #[test]
    fn wildcard_includes_all_and_override_wins_over_descriptor_pk() {
        let policy = TablePolicy {
            capture_dml: true,
            capture_ddl: false,
            columns: ColumnSelector::All,
            primary_key_override: vec!["name".to_string()],
        };
        let projection = Projection::build(&descriptor(), &policy);
        assert_eq!(projection.included_indices, vec![0, 1, 2]);
        assert_eq!(projection.primary_key_columns, vec!["name".to_string()]);
    }
}
