//! The closed set of atomic schema-change operations.
//!
//! Operations are what the diff engine produces and the execution boundary
//! consumes. Each variant carries exactly the data needed to apply (and,
//! for drops, describe) the change, with no back-reference to the
//! snapshots that produced it. The serde representation is stable so a
//! sorted plan can be persisted as a migration file.

use crate::error::{MorphError, Result};
use crate::schema::{
    ColumnDef, Dialect, ForeignKeyConstraint, IndexDef, PrimaryKeyConstraint, TableSnapshot,
    UniqueConstraint,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateTable {
        table: TableSnapshot,
    },
    DropTable {
        table: String,
    },
    AddColumn {
        table: String,
        column: String,
        definition: ColumnDef,
    },
    DropColumn {
        table: String,
        column: String,
        /// The dropped column's attributes, carried so the plan output can
        /// describe what is being removed.
        definition: ColumnDef,
    },
    AlterColumn {
        table: String,
        column: String,
        before: ColumnDef,
        after: ColumnDef,
    },
    CreateIndex {
        index: IndexDef,
    },
    DropIndex {
        index: IndexDef,
    },
    CreatePrimaryKeyConstraint {
        constraint: PrimaryKeyConstraint,
    },
    DropPrimaryKeyConstraint {
        constraint: PrimaryKeyConstraint,
    },
    CreateUniqueConstraint {
        constraint: UniqueConstraint,
    },
    DropUniqueConstraint {
        constraint: UniqueConstraint,
    },
    CreateForeignKeyConstraint {
        constraint: ForeignKeyConstraint,
    },
    DropForeignKeyConstraint {
        constraint: ForeignKeyConstraint,
    },
    /// Produced only by the consolidator: a table creation with its
    /// primary-key and unique constraints declared inline.
    CreateTableWithConstraints {
        table: TableSnapshot,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        primary_key: Option<PrimaryKeyConstraint>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        unique_constraints: Vec<UniqueConstraint>,
    },
}

impl Operation {
    /// The table this operation touches.
    pub fn table_name(&self) -> &str {
        match self {
            Operation::CreateTable { table } => &table.name,
            Operation::DropTable { table } => table,
            Operation::AddColumn { table, .. } => table,
            Operation::DropColumn { table, .. } => table,
            Operation::AlterColumn { table, .. } => table,
            Operation::CreateIndex { index } => &index.table,
            Operation::DropIndex { index } => &index.table,
            Operation::CreatePrimaryKeyConstraint { constraint } => &constraint.table,
            Operation::DropPrimaryKeyConstraint { constraint } => &constraint.table,
            Operation::CreateUniqueConstraint { constraint } => &constraint.table,
            Operation::DropUniqueConstraint { constraint } => &constraint.table,
            Operation::CreateForeignKeyConstraint { constraint } => &constraint.table,
            Operation::DropForeignKeyConstraint { constraint } => &constraint.table,
            Operation::CreateTableWithConstraints { table, .. } => &table.name,
        }
    }

    /// Secondary identity within a table: the column, index or constraint
    /// name. Used as the final sort tiebreak so plan ordering is fully
    /// reproducible.
    pub fn secondary_key(&self) -> &str {
        match self {
            Operation::CreateTable { .. }
            | Operation::DropTable { .. }
            | Operation::CreateTableWithConstraints { .. } => "",
            Operation::AddColumn { column, .. }
            | Operation::DropColumn { column, .. }
            | Operation::AlterColumn { column, .. } => column,
            Operation::CreateIndex { index } | Operation::DropIndex { index } => &index.name,
            Operation::CreatePrimaryKeyConstraint { constraint }
            | Operation::DropPrimaryKeyConstraint { constraint } => &constraint.name,
            Operation::CreateUniqueConstraint { constraint }
            | Operation::DropUniqueConstraint { constraint } => &constraint.name,
            Operation::CreateForeignKeyConstraint { constraint }
            | Operation::DropForeignKeyConstraint { constraint } => &constraint.name,
        }
    }

    /// Check structural invariants: names non-empty, index/constraint
    /// column lists non-empty.
    pub fn validate(&self) -> Result<()> {
        fn non_empty(what: &str, name: &str) -> Result<()> {
            if name.trim().is_empty() {
                return Err(MorphError::InvalidOperation(format!(
                    "{} name must not be empty",
                    what
                )));
            }
            Ok(())
        }

        fn non_empty_columns(what: &str, name: &str, columns: &[String]) -> Result<()> {
            if columns.is_empty() {
                return Err(MorphError::InvalidOperation(format!(
                    "{} {} must list at least one column",
                    what, name
                )));
            }
            for column in columns {
                non_empty("column", column)?;
            }
            Ok(())
        }

        non_empty("table", self.table_name())?;

        match self {
            Operation::AddColumn { column, .. }
            | Operation::DropColumn { column, .. }
            | Operation::AlterColumn { column, .. } => non_empty("column", column),
            Operation::CreateIndex { index } | Operation::DropIndex { index } => {
                non_empty("index", &index.name)?;
                non_empty_columns("index", &index.name, &index.columns)
            }
            Operation::CreatePrimaryKeyConstraint { constraint }
            | Operation::DropPrimaryKeyConstraint { constraint } => {
                non_empty("constraint", &constraint.name)?;
                non_empty_columns("primary key constraint", &constraint.name, &constraint.columns)
            }
            Operation::CreateUniqueConstraint { constraint }
            | Operation::DropUniqueConstraint { constraint } => {
                non_empty("constraint", &constraint.name)?;
                non_empty_columns("unique constraint", &constraint.name, &constraint.columns)
            }
            Operation::CreateForeignKeyConstraint { constraint }
            | Operation::DropForeignKeyConstraint { constraint } => {
                non_empty("constraint", &constraint.name)?;
                non_empty("referenced table", &constraint.referenced_table)?;
                non_empty_columns("foreign key constraint", &constraint.name, &constraint.columns)?;
                non_empty_columns(
                    "foreign key constraint (referenced columns)",
                    &constraint.name,
                    &constraint.referenced_columns,
                )?;
                if constraint.columns.len() != constraint.referenced_columns.len() {
                    return Err(MorphError::InvalidOperation(format!(
                        "foreign key constraint {} has {} columns but {} referenced columns",
                        constraint.name,
                        constraint.columns.len(),
                        constraint.referenced_columns.len()
                    )));
                }
                Ok(())
            }
            Operation::CreateTableWithConstraints {
                table,
                primary_key,
                unique_constraints,
            } => {
                if let Some(pk) = primary_key {
                    non_empty("constraint", &pk.name)?;
                    non_empty_columns("primary key constraint", &pk.name, &pk.columns)?;
                    if pk.table != table.name {
                        return Err(MorphError::InvalidOperation(format!(
                            "embedded primary key {} targets table {} but is declared on {}",
                            pk.name, pk.table, table.name
                        )));
                    }
                }
                for uc in unique_constraints {
                    non_empty("constraint", &uc.name)?;
                    non_empty_columns("unique constraint", &uc.name, &uc.columns)?;
                    if uc.table != table.name {
                        return Err(MorphError::InvalidOperation(format!(
                            "embedded unique constraint {} targets table {} but is declared on {}",
                            uc.name, uc.table, table.name
                        )));
                    }
                }
                Ok(())
            }
            Operation::CreateTable { .. } | Operation::DropTable { .. } => Ok(()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateTable { table } => write!(f, "create_table {}", table.name),
            Operation::DropTable { table } => write!(f, "drop_table {}", table),
            Operation::AddColumn { table, column, definition } => {
                write!(f, "add_column {}.{} {}", table, column, definition.type_name)
            }
            Operation::DropColumn { table, column, .. } => {
                write!(f, "drop_column {}.{}", table, column)
            }
            Operation::AlterColumn { table, column, before, after } => write!(
                f,
                "alter_column {}.{} ({} -> {})",
                table, column, before.type_name, after.type_name
            ),
            Operation::CreateIndex { index } => write!(
                f,
                "create_index {} on {} ({})",
                index.name,
                index.table,
                index.columns.join(", ")
            ),
            Operation::DropIndex { index } => {
                write!(f, "drop_index {} on {}", index.name, index.table)
            }
            Operation::CreatePrimaryKeyConstraint { constraint } => write!(
                f,
                "create_primary_key_constraint {} on {}",
                constraint.name, constraint.table
            ),
            Operation::DropPrimaryKeyConstraint { constraint } => write!(
                f,
                "drop_primary_key_constraint {} on {}",
                constraint.name, constraint.table
            ),
            Operation::CreateUniqueConstraint { constraint } => write!(
                f,
                "create_unique_constraint {} on {}",
                constraint.name, constraint.table
            ),
            Operation::DropUniqueConstraint { constraint } => write!(
                f,
                "drop_unique_constraint {} on {}",
                constraint.name, constraint.table
            ),
            Operation::CreateForeignKeyConstraint { constraint } => write!(
                f,
                "create_foreign_key_constraint {} on {} -> {}",
                constraint.name, constraint.table, constraint.referenced_table
            ),
            Operation::DropForeignKeyConstraint { constraint } => write!(
                f,
                "drop_foreign_key_constraint {} on {}",
                constraint.name, constraint.table
            ),
            Operation::CreateTableWithConstraints { table, .. } => {
                write!(f, "create_table_with_constraints {}", table.name)
            }
        }
    }
}

/// The ordered operation sequence a plan run produces, in its serializable
/// form. Filename and versioning of the persisted plan are the caller's
/// concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub dialect: Dialect,
    pub generated_at: DateTime<Utc>,
    /// sha256 over the rendered SQL statements, for change detection.
    pub checksum: String,
    pub operations: Vec<Operation>,
}
