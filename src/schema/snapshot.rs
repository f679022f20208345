use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tables carrying this prefix belong to sqlmorph's own bookkeeping and are
/// filtered out of every snapshot before diffing.
pub const RESERVED_TABLE_PREFIX: &str = "morph_";

/// A single column as both introspection and configuration describe it.
///
/// Equality for diffing purposes covers exactly `type_name`, `not_null`,
/// `primary_key` and `unique`; `default_sql` is carried for DDL generation
/// but deliberately excluded from comparison (see [`ColumnDef::diff_eq`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sql: Option<String>,
}

impl ColumnDef {
    /// The comparison the diff engine uses.
    ///
    /// A change to `default_sql` alone is a deliberate non-diff.
    pub fn diff_eq(&self, other: &ColumnDef) -> bool {
        self.type_name == other.type_name
            && self.not_null == other.not_null
            && self.primary_key == other.primary_key
            && self.unique == other.unique
    }
}

/// A table and its columns. Column names are unique per table by
/// construction (the map key is the column name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: BTreeMap<String, ColumnDef>,
}

/// An index. Identity is `(table, name)`; column order is significant and
/// affects both equality and generated DDL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// A primary key constraint. At most one per table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyConstraint {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}

/// A unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}

/// Referential action for foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyConstraint {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ForeignKeyAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ForeignKeyAction>,
}

/// A canonical, dialect-neutral description of a schema's structure.
///
/// Represents either the introspected "current" state or the configured
/// "ideal" state. Built fresh per invocation, immutable once built, never
/// persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSnapshot>,
    pub indexes: Vec<IndexDef>,
    pub primary_key_constraints: Vec<PrimaryKeyConstraint>,
    pub unique_constraints: Vec<UniqueConstraint>,
    pub foreign_key_constraints: Vec<ForeignKeyConstraint>,
}

impl SchemaSnapshot {
    /// Normalize the snapshot into its canonical form: bookkeeping tables
    /// removed, every collection sorted by its identity key. The diff
    /// engine relies on this so its output does not depend on the order
    /// the catalog (or the configuration file) happened to report things.
    pub fn normalized(mut self) -> Self {
        self.tables
            .retain(|t| !t.name.starts_with(RESERVED_TABLE_PREFIX));
        self.indexes
            .retain(|i| !i.table.starts_with(RESERVED_TABLE_PREFIX));
        self.primary_key_constraints
            .retain(|c| !c.table.starts_with(RESERVED_TABLE_PREFIX));
        self.unique_constraints
            .retain(|c| !c.table.starts_with(RESERVED_TABLE_PREFIX));
        self.foreign_key_constraints
            .retain(|c| !c.table.starts_with(RESERVED_TABLE_PREFIX));

        self.tables.sort_by(|a, b| a.name.cmp(&b.name));
        self.indexes
            .sort_by(|a, b| (&a.table, &a.name).cmp(&(&b.table, &b.name)));
        self.primary_key_constraints
            .sort_by(|a, b| (&a.table, &a.name).cmp(&(&b.table, &b.name)));
        self.unique_constraints
            .sort_by(|a, b| (&a.table, &a.name).cmp(&(&b.table, &b.name)));
        self.foreign_key_constraints
            .sort_by(|a, b| (&a.table, &a.name).cmp(&(&b.table, &b.name)));
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(type_name: &str) -> ColumnDef {
        ColumnDef {
            type_name: type_name.to_string(),
            not_null: false,
            primary_key: false,
            unique: false,
            default_sql: None,
        }
    }

    #[test]
    fn test_diff_eq_ignores_default_sql() {
        let a = ColumnDef {
            default_sql: Some("now()".to_string()),
            ..column("timestamptz")
        };
        let b = column("timestamptz");

        assert!(a.diff_eq(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_diff_eq_detects_not_null_change() {
        let a = column("text");
        let b = ColumnDef {
            not_null: true,
            ..column("text")
        };
        assert!(!a.diff_eq(&b));
    }

    #[test]
    fn test_normalized_filters_reserved_tables() {
        let snapshot = SchemaSnapshot {
            tables: vec![
                TableSnapshot {
                    name: "morph_lock".to_string(),
                    columns: BTreeMap::new(),
                },
                TableSnapshot {
                    name: "users".to_string(),
                    columns: BTreeMap::new(),
                },
            ],
            indexes: vec![IndexDef {
                table: "morph_lock".to_string(),
                name: "idx_morph_lock".to_string(),
                columns: vec!["id".to_string()],
                unique: false,
            }],
            ..Default::default()
        };

        let normalized = snapshot.normalized();
        assert_eq!(normalized.tables.len(), 1);
        assert_eq!(normalized.tables[0].name, "users");
        assert!(normalized.indexes.is_empty());
    }

    #[test]
    fn test_normalized_sorts_by_identity() {
        let snapshot = SchemaSnapshot {
            tables: vec![
                TableSnapshot {
                    name: "zebra".to_string(),
                    columns: BTreeMap::new(),
                },
                TableSnapshot {
                    name: "alpha".to_string(),
                    columns: BTreeMap::new(),
                },
            ],
            indexes: vec![
                IndexDef {
                    table: "zebra".to_string(),
                    name: "idx_b".to_string(),
                    columns: vec!["x".to_string()],
                    unique: false,
                },
                IndexDef {
                    table: "alpha".to_string(),
                    name: "idx_a".to_string(),
                    columns: vec!["x".to_string()],
                    unique: false,
                },
            ],
            ..Default::default()
        };

        let normalized = snapshot.normalized();
        assert_eq!(normalized.tables[0].name, "alpha");
        assert_eq!(normalized.indexes[0].table, "alpha");
    }
}
