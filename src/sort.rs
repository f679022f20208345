//! Dependency-aware operation ordering.
//!
//! A stable sort over a fixed integer priority per operation kind, not a
//! general topological sort. Drops come first (constraints and indexes
//! before columns before tables), creations after (tables before columns
//! before indexes before constraints), and foreign keys sort last since
//! they may reference any table in the plan. The sorter never reorders
//! across priority buckets even when an alternative ordering would also
//! be valid; determinism wins over cleverness.

use crate::ops::Operation;

/// Lower priority sorts first.
fn priority(op: &Operation) -> u8 {
    match op {
        Operation::DropUniqueConstraint { .. } => 0,
        Operation::DropPrimaryKeyConstraint { .. } => 1,
        Operation::DropForeignKeyConstraint { .. } => 2,
        Operation::DropIndex { .. } => 3,
        Operation::DropColumn { .. } => 4,
        Operation::DropTable { .. } => 5,
        Operation::CreateTable { .. } | Operation::CreateTableWithConstraints { .. } => 6,
        Operation::AddColumn { .. } => 7,
        Operation::AlterColumn { .. } => 8,
        Operation::CreateIndex { .. } => 9,
        Operation::CreatePrimaryKeyConstraint { .. } => 10,
        Operation::CreateUniqueConstraint { .. } => 11,
        Operation::CreateForeignKeyConstraint { .. } => 12,
    }
}

/// Impose a deterministic, safe execution order.
///
/// Ties within a priority break by ascending table name, then by the
/// operation's secondary identity key, so any permutation of the same
/// operation multiset sorts to the same output.
pub fn sort_operations_by_dependency(mut operations: Vec<Operation>) -> Vec<Operation> {
    operations.sort_by(|a, b| {
        priority(a)
            .cmp(&priority(b))
            .then_with(|| a.table_name().cmp(b.table_name()))
            .then_with(|| a.secondary_key().cmp(b.secondary_key()))
    });
    operations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{IndexDef, PrimaryKeyConstraint, TableSnapshot, UniqueConstraint};
    use std::collections::BTreeMap;

    fn create_table(name: &str) -> Operation {
        Operation::CreateTable {
            table: TableSnapshot {
                name: name.to_string(),
                columns: BTreeMap::new(),
            },
        }
    }

    fn index(table: &str, name: &str, unique: bool) -> IndexDef {
        IndexDef {
            table: table.to_string(),
            name: name.to_string(),
            columns: vec!["x".to_string()],
            unique,
        }
    }

    #[test]
    fn test_drops_precede_creates() {
        let ops = vec![
            create_table("users"),
            Operation::DropTable {
                table: "legacy".to_string(),
            },
            Operation::DropIndex {
                index: index("legacy", "idx_legacy", false),
            },
        ];

        let sorted = sort_operations_by_dependency(ops);
        assert!(matches!(&sorted[0], Operation::DropIndex { .. }));
        assert!(matches!(&sorted[1], Operation::DropTable { .. }));
        assert!(matches!(&sorted[2], Operation::CreateTable { .. }));
    }

    #[test]
    fn test_drop_index_precedes_create_index_for_same_name() {
        let ops = vec![
            Operation::CreateIndex {
                index: index("users", "idx_name_age", false),
            },
            Operation::DropIndex {
                index: index("users", "idx_name_age", true),
            },
        ];

        let sorted = sort_operations_by_dependency(ops);
        assert!(matches!(&sorted[0], Operation::DropIndex { .. }));
        assert!(matches!(&sorted[1], Operation::CreateIndex { .. }));
    }

    #[test]
    fn test_foreign_keys_sort_last() {
        let ops = vec![
            Operation::CreateForeignKeyConstraint {
                constraint: crate::schema::ForeignKeyConstraint {
                    table: "posts".to_string(),
                    name: "fk_posts_user_id".to_string(),
                    columns: vec!["user_id".to_string()],
                    referenced_table: "users".to_string(),
                    referenced_columns: vec!["id".to_string()],
                    on_delete: None,
                    on_update: None,
                },
            },
            Operation::CreatePrimaryKeyConstraint {
                constraint: PrimaryKeyConstraint {
                    table: "users".to_string(),
                    name: "pk_users_id".to_string(),
                    columns: vec!["id".to_string()],
                },
            },
            create_table("users"),
            create_table("posts"),
        ];

        let sorted = sort_operations_by_dependency(ops);
        assert!(matches!(
            sorted.last().unwrap(),
            Operation::CreateForeignKeyConstraint { .. }
        ));
    }

    #[test]
    fn test_ties_break_by_table_name() {
        let ops = vec![create_table("zebra_table"), create_table("alpha_table")];
        let sorted = sort_operations_by_dependency(ops);
        assert_eq!(sorted[0].table_name(), "alpha_table");
        assert_eq!(sorted[1].table_name(), "zebra_table");
    }

    #[test]
    fn test_ties_break_by_secondary_key() {
        let uc = |name: &str| Operation::DropUniqueConstraint {
            constraint: UniqueConstraint {
                table: "users".to_string(),
                name: name.to_string(),
                columns: vec!["x".to_string()],
            },
        };
        let ops = vec![uc("uq_b"), uc("uq_a")];
        let sorted = sort_operations_by_dependency(ops);
        assert_eq!(sorted[0].secondary_key(), "uq_a");
    }

    #[test]
    fn test_any_permutation_sorts_identically() {
        let base = vec![
            create_table("b"),
            create_table("a"),
            Operation::DropTable {
                table: "c".to_string(),
            },
            Operation::AddColumn {
                table: "a".to_string(),
                column: "x".to_string(),
                definition: crate::schema::ColumnDef {
                    type_name: "text".to_string(),
                    not_null: false,
                    primary_key: false,
                    unique: false,
                    default_sql: None,
                },
            },
            Operation::CreateIndex {
                index: index("a", "idx_a_x", false),
            },
        ];

        let reference = sort_operations_by_dependency(base.clone());

        // Exercise a handful of rotations of the input.
        for rotation in 1..base.len() {
            let mut permuted = base.clone();
            permuted.rotate_left(rotation);
            assert_eq!(sort_operations_by_dependency(permuted), reference);
        }
    }
}
