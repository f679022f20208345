//! The schema diff engine.
//!
//! `diff_schema` computes the structural delta between two snapshots as a
//! flat operation list. It is pure and deterministic regardless of input
//! ordering: both snapshots are normalized (bookkeeping tables filtered,
//! collections sorted by identity) before any comparison. The output is
//! unconsolidated and unsorted; callers feed it through
//! [`crate::consolidate::consolidate`] and
//! [`crate::sort::sort_operations_by_dependency`].

use crate::ops::Operation;
use crate::schema::{
    ForeignKeyConstraint, IndexDef, PrimaryKeyConstraint, SchemaSnapshot, UniqueConstraint,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Compute the operations transforming `current` into `ideal`.
///
/// Category by category (tables, columns, indexes, primary keys, unique
/// constraints, foreign keys), concatenated. There is no rename
/// detection: a renamed table or column comes out as a drop plus a
/// create.
pub fn diff_schema(current: &SchemaSnapshot, ideal: &SchemaSnapshot) -> Vec<Operation> {
    let current = current.clone().normalized();
    let ideal = ideal.clone().normalized();

    let mut operations = Vec::new();
    diff_tables(&current, &ideal, &mut operations);
    diff_indexes(&current, &ideal, &mut operations);
    diff_primary_keys(&current, &ideal, &mut operations);
    diff_unique_constraints(&current, &ideal, &mut operations);
    diff_foreign_keys(&current, &ideal, &mut operations);

    debug!(count = operations.len(), "schema diff computed");
    operations
}

fn diff_tables(current: &SchemaSnapshot, ideal: &SchemaSnapshot, out: &mut Vec<Operation>) {
    for table in &ideal.tables {
        match current.table(&table.name) {
            None => out.push(Operation::CreateTable {
                table: table.clone(),
            }),
            Some(existing) => diff_columns(existing, table, out),
        }
    }

    for table in &current.tables {
        if ideal.table(&table.name).is_none() {
            out.push(Operation::DropTable {
                table: table.name.clone(),
            });
        }
    }
}

fn diff_columns(
    current: &crate::schema::TableSnapshot,
    ideal: &crate::schema::TableSnapshot,
    out: &mut Vec<Operation>,
) {
    for (name, definition) in &ideal.columns {
        match current.columns.get(name) {
            None => out.push(Operation::AddColumn {
                table: ideal.name.clone(),
                column: name.clone(),
                definition: definition.clone(),
            }),
            Some(existing) if !existing.diff_eq(definition) => out.push(Operation::AlterColumn {
                table: ideal.name.clone(),
                column: name.clone(),
                before: existing.clone(),
                after: definition.clone(),
            }),
            // Attribute differences outside the comparison set (e.g. a
            // default-value change) are a deliberate non-diff.
            Some(_) => {}
        }
    }

    for (name, definition) in &current.columns {
        if !ideal.columns.contains_key(name) {
            out.push(Operation::DropColumn {
                table: ideal.name.clone(),
                column: name.clone(),
                definition: definition.clone(),
            });
        }
    }
}

fn diff_indexes(current: &SchemaSnapshot, ideal: &SchemaSnapshot, out: &mut Vec<Operation>) {
    let current_by_key: BTreeMap<(&str, &str), &IndexDef> = current
        .indexes
        .iter()
        .map(|i| ((i.table.as_str(), i.name.as_str()), i))
        .collect();
    let ideal_by_key: BTreeMap<(&str, &str), &IndexDef> = ideal
        .indexes
        .iter()
        .map(|i| ((i.table.as_str(), i.name.as_str()), i))
        .collect();

    for (key, index) in &ideal_by_key {
        match current_by_key.get(key) {
            None => out.push(Operation::CreateIndex {
                index: (*index).clone(),
            }),
            Some(existing) => {
                // Column order and the unique flag are both significant. An
                // in-place change is not portably expressible, so any
                // difference becomes a drop-then-create of the index.
                if existing.columns != index.columns || existing.unique != index.unique {
                    out.push(Operation::DropIndex {
                        index: (*existing).clone(),
                    });
                    out.push(Operation::CreateIndex {
                        index: (*index).clone(),
                    });
                }
            }
        }
    }

    for (key, index) in &current_by_key {
        if !ideal_by_key.contains_key(key) {
            out.push(Operation::DropIndex {
                index: (*index).clone(),
            });
        }
    }
}

fn diff_primary_keys(current: &SchemaSnapshot, ideal: &SchemaSnapshot, out: &mut Vec<Operation>) {
    let current_by_key: BTreeMap<(&str, &str), &PrimaryKeyConstraint> = current
        .primary_key_constraints
        .iter()
        .map(|c| ((c.table.as_str(), c.name.as_str()), c))
        .collect();
    let ideal_by_key: BTreeMap<(&str, &str), &PrimaryKeyConstraint> = ideal
        .primary_key_constraints
        .iter()
        .map(|c| ((c.table.as_str(), c.name.as_str()), c))
        .collect();

    for (key, constraint) in &ideal_by_key {
        match current_by_key.get(key) {
            None => out.push(Operation::CreatePrimaryKeyConstraint {
                constraint: (*constraint).clone(),
            }),
            Some(existing) => {
                if existing.columns != constraint.columns {
                    out.push(Operation::DropPrimaryKeyConstraint {
                        constraint: (*existing).clone(),
                    });
                    out.push(Operation::CreatePrimaryKeyConstraint {
                        constraint: (*constraint).clone(),
                    });
                }
            }
        }
    }

    for (key, constraint) in &current_by_key {
        if !ideal_by_key.contains_key(key) {
            out.push(Operation::DropPrimaryKeyConstraint {
                constraint: (*constraint).clone(),
            });
        }
    }
}

fn diff_unique_constraints(
    current: &SchemaSnapshot,
    ideal: &SchemaSnapshot,
    out: &mut Vec<Operation>,
) {
    let current_by_key: BTreeMap<(&str, &str), &UniqueConstraint> = current
        .unique_constraints
        .iter()
        .map(|c| ((c.table.as_str(), c.name.as_str()), c))
        .collect();
    let ideal_by_key: BTreeMap<(&str, &str), &UniqueConstraint> = ideal
        .unique_constraints
        .iter()
        .map(|c| ((c.table.as_str(), c.name.as_str()), c))
        .collect();

    for (key, constraint) in &ideal_by_key {
        match current_by_key.get(key) {
            None => out.push(Operation::CreateUniqueConstraint {
                constraint: (*constraint).clone(),
            }),
            Some(existing) => {
                if existing.columns != constraint.columns {
                    out.push(Operation::DropUniqueConstraint {
                        constraint: (*existing).clone(),
                    });
                    out.push(Operation::CreateUniqueConstraint {
                        constraint: (*constraint).clone(),
                    });
                }
            }
        }
    }

    for (key, constraint) in &current_by_key {
        if !ideal_by_key.contains_key(key) {
            out.push(Operation::DropUniqueConstraint {
                constraint: (*constraint).clone(),
            });
        }
    }
}

fn diff_foreign_keys(current: &SchemaSnapshot, ideal: &SchemaSnapshot, out: &mut Vec<Operation>) {
    let current_by_key: BTreeMap<(&str, &str), &ForeignKeyConstraint> = current
        .foreign_key_constraints
        .iter()
        .map(|c| ((c.table.as_str(), c.name.as_str()), c))
        .collect();
    let ideal_by_key: BTreeMap<(&str, &str), &ForeignKeyConstraint> = ideal
        .foreign_key_constraints
        .iter()
        .map(|c| ((c.table.as_str(), c.name.as_str()), c))
        .collect();

    for (key, constraint) in &ideal_by_key {
        match current_by_key.get(key) {
            None => out.push(Operation::CreateForeignKeyConstraint {
                constraint: (*constraint).clone(),
            }),
            Some(existing) => {
                if existing != constraint {
                    out.push(Operation::DropForeignKeyConstraint {
                        constraint: (*existing).clone(),
                    });
                    out.push(Operation::CreateForeignKeyConstraint {
                        constraint: (*constraint).clone(),
                    });
                }
            }
        }
    }

    for (key, constraint) in &current_by_key {
        if !ideal_by_key.contains_key(key) {
            out.push(Operation::DropForeignKeyConstraint {
                constraint: (*constraint).clone(),
            });
        }
    }
}
