//! Operation consolidation.
//!
//! Most dialects allow, and prefer for transactionality, declaring primary
//! key and unique constraints inline with `CREATE TABLE` rather than as a
//! follow-up `ALTER TABLE`. The consolidator folds a PK or unique
//! constraint creation into a co-occurring `create_table` for the same
//! table, producing `create_table_with_constraints`. Foreign keys are
//! never folded: their targets may be created or altered later in the same
//! plan and must be sequenced after all referenced tables exist.

use crate::ops::Operation;
use crate::schema::{PrimaryKeyConstraint, UniqueConstraint};
use std::collections::{BTreeMap, BTreeSet};

/// Fold PK/unique constraint creations into their owning `create_table`.
///
/// All other operations, including constraints against pre-existing
/// tables, pass through unchanged and in their original relative order.
pub fn consolidate(operations: Vec<Operation>) -> Vec<Operation> {
    let created_tables: BTreeSet<String> = operations
        .iter()
        .filter_map(|op| match op {
            Operation::CreateTable { table } => Some(table.name.clone()),
            _ => None,
        })
        .collect();

    let mut primary_keys: BTreeMap<String, PrimaryKeyConstraint> = BTreeMap::new();
    let mut unique_constraints: BTreeMap<String, Vec<UniqueConstraint>> = BTreeMap::new();

    // First pass: pull out constraints that will be embedded. A constraint
    // creation may appear before or after its create_table in the input.
    let mut remaining = Vec::with_capacity(operations.len());
    for op in operations {
        match op {
            Operation::CreatePrimaryKeyConstraint { constraint }
                if created_tables.contains(&constraint.table)
                    && !primary_keys.contains_key(&constraint.table) =>
            {
                primary_keys.insert(constraint.table.clone(), constraint);
            }
            Operation::CreateUniqueConstraint { constraint }
                if created_tables.contains(&constraint.table) =>
            {
                unique_constraints
                    .entry(constraint.table.clone())
                    .or_default()
                    .push(constraint);
            }
            other => remaining.push(other),
        }
    }

    // Second pass: rewrite each create_table that gained constraints.
    remaining
        .into_iter()
        .map(|op| match op {
            Operation::CreateTable { table } => {
                let primary_key = primary_keys.remove(&table.name);
                let uniques = unique_constraints.remove(&table.name).unwrap_or_default();
                if primary_key.is_none() && uniques.is_empty() {
                    Operation::CreateTable { table }
                } else {
                    Operation::CreateTableWithConstraints {
                        table,
                        primary_key,
                        unique_constraints: uniques,
                    }
                }
            }
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ForeignKeyConstraint, TableSnapshot};
    use std::collections::BTreeMap;

    fn users_table() -> TableSnapshot {
        let mut columns = BTreeMap::new();
        columns.insert(
            "id".to_string(),
            ColumnDef {
                type_name: "uuid".to_string(),
                not_null: true,
                primary_key: false,
                unique: false,
                default_sql: None,
            },
        );
        TableSnapshot {
            name: "users".to_string(),
            columns,
        }
    }

    fn pk(table: &str) -> PrimaryKeyConstraint {
        PrimaryKeyConstraint {
            table: table.to_string(),
            name: format!("pk_{}_id", table),
            columns: vec!["id".to_string()],
        }
    }

    #[test]
    fn test_pk_folds_into_new_table() {
        let ops = vec![
            Operation::CreateTable {
                table: users_table(),
            },
            Operation::CreatePrimaryKeyConstraint {
                constraint: pk("users"),
            },
        ];

        let consolidated = consolidate(ops);
        assert_eq!(consolidated.len(), 1);
        match &consolidated[0] {
            Operation::CreateTableWithConstraints {
                table,
                primary_key,
                unique_constraints,
            } => {
                assert_eq!(table.name, "users");
                assert_eq!(primary_key.as_ref().unwrap().name, "pk_users_id");
                assert!(unique_constraints.is_empty());
            }
            other => panic!("expected create_table_with_constraints, got {}", other),
        }
    }

    #[test]
    fn test_constraint_before_create_table_still_folds() {
        let ops = vec![
            Operation::CreatePrimaryKeyConstraint {
                constraint: pk("users"),
            },
            Operation::CreateTable {
                table: users_table(),
            },
        ];

        let consolidated = consolidate(ops);
        assert_eq!(consolidated.len(), 1);
        assert!(matches!(
            &consolidated[0],
            Operation::CreateTableWithConstraints { .. }
        ));
    }

    #[test]
    fn test_constraint_on_existing_table_passes_through() {
        let ops = vec![Operation::CreatePrimaryKeyConstraint {
            constraint: pk("accounts"),
        }];

        let consolidated = consolidate(ops.clone());
        assert_eq!(consolidated, ops);
    }

    #[test]
    fn test_foreign_keys_are_never_folded() {
        let ops = vec![
            Operation::CreateTable {
                table: users_table(),
            },
            Operation::CreateForeignKeyConstraint {
                constraint: ForeignKeyConstraint {
                    table: "users".to_string(),
                    name: "fk_users_org_id".to_string(),
                    columns: vec!["org_id".to_string()],
                    referenced_table: "orgs".to_string(),
                    referenced_columns: vec!["id".to_string()],
                    on_delete: None,
                    on_update: None,
                },
            },
        ];

        let consolidated = consolidate(ops);
        assert_eq!(consolidated.len(), 2);
        assert!(matches!(&consolidated[0], Operation::CreateTable { .. }));
        assert!(matches!(
            &consolidated[1],
            Operation::CreateForeignKeyConstraint { .. }
        ));
    }

    #[test]
    fn test_unique_constraints_fold_alongside_pk() {
        let ops = vec![
            Operation::CreateTable {
                table: users_table(),
            },
            Operation::CreateUniqueConstraint {
                constraint: UniqueConstraint {
                    table: "users".to_string(),
                    name: "uq_users_email".to_string(),
                    columns: vec!["email".to_string()],
                },
            },
            Operation::CreatePrimaryKeyConstraint {
                constraint: pk("users"),
            },
        ];

        let consolidated = consolidate(ops);
        assert_eq!(consolidated.len(), 1);
        match &consolidated[0] {
            Operation::CreateTableWithConstraints {
                primary_key,
                unique_constraints,
                ..
            } => {
                assert!(primary_key.is_some());
                assert_eq!(unique_constraints.len(), 1);
            }
            other => panic!("unexpected operation: {}", other),
        }
    }

    #[test]
    fn test_unrelated_operations_keep_relative_order() {
        let drop_op = Operation::DropTable {
            table: "legacy".to_string(),
        };
        let ops = vec![
            drop_op.clone(),
            Operation::CreateTable {
                table: users_table(),
            },
            Operation::CreatePrimaryKeyConstraint {
                constraint: pk("users"),
            },
        ];

        let consolidated = consolidate(ops);
        assert_eq!(consolidated[0], drop_op);
    }
}
