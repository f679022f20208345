//! Dialect-normalizing introspection.
//!
//! Each dialect has its own catalog layout and its own set of
//! auto-generated artifacts, so introspection is abstracted behind one
//! trait with one implementing type per dialect. Every implementation
//! maps live catalog metadata into the dialect-neutral
//! [`SchemaSnapshot`]; downstream logic never branches on dialect.
//!
//! The catalog queries themselves run through a [`CatalogClient`]
//! capability. The crate ships a `tokio-postgres` implementation (used by
//! the postgres and cockroachdb introspectors); driver adapters for the
//! remaining dialects implement the same trait outside the core.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::error::{MorphError, Result};
use crate::schema::{
    ForeignKeyAction, ForeignKeyConstraint, IndexDef, PrimaryKeyConstraint, SchemaSnapshot,
    TableSnapshot, UniqueConstraint,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

pub use mysql::MySqlIntrospector;
pub use postgres::PostgresIntrospector;
pub use sqlite::SqliteIntrospector;

/// One row of catalog metadata, reduced to named text values.
///
/// The dialect introspectors cast everything to text in their catalog
/// SQL, so a single row shape serves every driver.
#[derive(Debug, Clone, Default)]
pub struct CatalogRow {
    values: BTreeMap<String, Option<String>>,
}

impl CatalogRow {
    pub fn new(values: impl IntoIterator<Item = (String, Option<String>)>) -> Self {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
        }
    }

    /// Fetch a column that may legitimately be NULL.
    pub fn opt(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }

    /// Fetch a column that must be present and non-NULL.
    pub fn get(&self, column: &str) -> Result<&str> {
        self.opt(column).ok_or_else(|| MorphError::Introspection {
            category: "catalog row".to_string(),
            message: format!("expected column {} to be present and non-null", column),
            source: None,
        })
    }

    /// Fetch a boolean rendered in any of the spellings the dialects use.
    pub fn get_bool(&self, column: &str) -> Result<bool> {
        match self.get(column)? {
            "t" | "true" | "TRUE" | "1" | "YES" | "yes" => Ok(true),
            "f" | "false" | "FALSE" | "0" | "NO" | "no" => Ok(false),
            other => Err(MorphError::Introspection {
                category: "catalog row".to_string(),
                message: format!("cannot interpret {:?} in column {} as boolean", other, column),
                source: None,
            }),
        }
    }
}

/// Capability to run a read-only catalog query and get text rows back.
pub trait CatalogClient {
    fn query_rows(
        &self,
        sql: &str,
    ) -> impl std::future::Future<Output = Result<Vec<CatalogRow>>> + Send;
}

impl CatalogClient for tokio_postgres::Client {
    async fn query_rows(&self, sql: &str) -> Result<Vec<CatalogRow>> {
        let rows = self
            .query(sql, &[])
            .await
            .map_err(|e| MorphError::Introspection {
                category: "catalog query".to_string(),
                message: e.to_string(),
                source: Some(Box::new(e)),
            })?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(row.len());
            for (idx, column) in row.columns().iter().enumerate() {
                let value: Option<String> =
                    row.try_get(idx).map_err(|e| MorphError::Introspection {
                        category: "catalog query".to_string(),
                        message: format!("column {} is not text: {}", column.name(), e),
                        source: Some(Box::new(e)),
                    })?;
                values.push((column.name().to_string(), value));
            }
            out.push(CatalogRow::new(values));
        }
        Ok(out)
    }
}

/// The constraints a single introspection pass discovers.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    pub primary_keys: Vec<PrimaryKeyConstraint>,
    pub unique_constraints: Vec<UniqueConstraint>,
    pub foreign_keys: Vec<ForeignKeyConstraint>,
}

/// Per-dialect mapping from live catalog metadata to snapshot pieces.
///
/// Polymorphism over a capability set: the generic plan/apply pipeline
/// takes any implementation, and tests substitute canned ones.
pub trait SchemaIntrospector {
    fn dialect(&self) -> crate::schema::Dialect;

    /// Map a dialect-reported type name onto its canonical spelling.
    fn convert_type_name(&self, raw: &str) -> Result<String> {
        crate::schema::normalize_type_name(self.dialect(), raw)
    }

    fn introspect_tables(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<TableSnapshot>>> + Send;

    fn introspect_indexes(&self)
        -> impl std::future::Future<Output = Result<Vec<IndexDef>>> + Send;

    fn introspect_constraints(
        &self,
    ) -> impl std::future::Future<Output = Result<ConstraintSet>> + Send;
}

/// Assemble the "current" snapshot.
///
/// The three catalog reads are independent and issued concurrently, but
/// diffing never runs on partial results: if any read fails the whole
/// introspection fails.
#[instrument(skip(introspector), fields(dialect = %introspector.dialect()))]
pub async fn introspect_snapshot<I: SchemaIntrospector>(introspector: &I) -> Result<SchemaSnapshot> {
    let (tables, indexes, constraints) = futures_util::try_join!(
        introspector.introspect_tables(),
        introspector.introspect_indexes(),
        introspector.introspect_constraints(),
    )?;

    debug!(
        tables = tables.len(),
        indexes = indexes.len(),
        primary_keys = constraints.primary_keys.len(),
        unique_constraints = constraints.unique_constraints.len(),
        foreign_keys = constraints.foreign_keys.len(),
        "introspection complete"
    );

    Ok(SchemaSnapshot {
        tables,
        indexes,
        primary_key_constraints: constraints.primary_keys,
        unique_constraints: constraints.unique_constraints,
        foreign_key_constraints: constraints.foreign_keys,
    }
    .normalized())
}

/// Remove dialect shadow artifacts from an introspected snapshot.
///
/// Several dialects implicitly create a unique index for every unique
/// constraint (or the reverse), and no catalog field flags
/// "system-generated" consistently across dialects. Instead, partition
/// the introspected unique indexes and unique constraints into "adopted"
/// (their `(table, name)` also appears in the desired configuration) and
/// "unconfigured". An unconfigured unique index sharing `(table, name)`
/// with an adopted unique constraint is inferred to be the dialect's
/// shadow of that constraint and removed, and symmetrically for
/// unconfigured unique constraints shadowing adopted unique indexes.
/// Without this, every run would produce create/drop churn caused purely
/// by dialect bookkeeping.
pub fn reconcile_system_artifacts(
    mut current: SchemaSnapshot,
    ideal: &SchemaSnapshot,
) -> SchemaSnapshot {
    let configured_indexes: BTreeSet<(&str, &str)> = ideal
        .indexes
        .iter()
        .map(|i| (i.table.as_str(), i.name.as_str()))
        .collect();
    let configured_constraints: BTreeSet<(&str, &str)> = ideal
        .unique_constraints
        .iter()
        .map(|c| (c.table.as_str(), c.name.as_str()))
        .collect();

    let adopted_constraints: BTreeSet<(String, String)> = current
        .unique_constraints
        .iter()
        .filter(|c| configured_constraints.contains(&(c.table.as_str(), c.name.as_str())))
        .map(|c| (c.table.clone(), c.name.clone()))
        .collect();
    let adopted_indexes: BTreeSet<(String, String)> = current
        .indexes
        .iter()
        .filter(|i| i.unique && configured_indexes.contains(&(i.table.as_str(), i.name.as_str())))
        .map(|i| (i.table.clone(), i.name.clone()))
        .collect();

    current.indexes.retain(|index| {
        if !index.unique {
            return true;
        }
        let key = (index.table.clone(), index.name.clone());
        let configured = configured_indexes.contains(&(index.table.as_str(), index.name.as_str()));
        if !configured && adopted_constraints.contains(&key) {
            debug!(
                table = %index.table,
                index = %index.name,
                "dropping shadow unique index of adopted constraint"
            );
            return false;
        }
        true
    });

    current.unique_constraints.retain(|constraint| {
        let key = (constraint.table.clone(), constraint.name.clone());
        let configured =
            configured_constraints.contains(&(constraint.table.as_str(), constraint.name.as_str()));
        if !configured && adopted_indexes.contains(&key) {
            debug!(
                table = %constraint.table,
                constraint = %constraint.name,
                "dropping shadow unique constraint of adopted index"
            );
            return false;
        }
        true
    });

    current
}

pub(crate) fn parse_fk_action(rule: &str) -> Option<ForeignKeyAction> {
    match rule.to_uppercase().as_str() {
        "NO ACTION" => Some(ForeignKeyAction::NoAction),
        "RESTRICT" => Some(ForeignKeyAction::Restrict),
        "CASCADE" => Some(ForeignKeyAction::Cascade),
        "SET NULL" => Some(ForeignKeyAction::SetNull),
        "SET DEFAULT" => Some(ForeignKeyAction::SetDefault),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexDef;

    fn unique_index(table: &str, name: &str) -> IndexDef {
        IndexDef {
            table: table.to_string(),
            name: name.to_string(),
            columns: vec!["email".to_string()],
            unique: true,
        }
    }

    fn unique_constraint(table: &str, name: &str) -> UniqueConstraint {
        UniqueConstraint {
            table: table.to_string(),
            name: name.to_string(),
            columns: vec!["email".to_string()],
        }
    }

    #[test]
    fn test_shadow_index_of_adopted_constraint_is_removed() {
        let current = SchemaSnapshot {
            indexes: vec![unique_index("users", "uq_users_email")],
            unique_constraints: vec![unique_constraint("users", "uq_users_email")],
            ..Default::default()
        };
        // The configuration declares the constraint, not the index.
        let ideal = SchemaSnapshot {
            unique_constraints: vec![unique_constraint("users", "uq_users_email")],
            ..Default::default()
        };

        let reconciled = reconcile_system_artifacts(current, &ideal);
        assert!(reconciled.indexes.is_empty());
        assert_eq!(reconciled.unique_constraints.len(), 1);
    }

    #[test]
    fn test_shadow_constraint_of_adopted_index_is_removed() {
        let current = SchemaSnapshot {
            indexes: vec![unique_index("users", "idx_users_email")],
            unique_constraints: vec![unique_constraint("users", "idx_users_email")],
            ..Default::default()
        };
        let ideal = SchemaSnapshot {
            indexes: vec![unique_index("users", "idx_users_email")],
            ..Default::default()
        };

        let reconciled = reconcile_system_artifacts(current, &ideal);
        assert_eq!(reconciled.indexes.len(), 1);
        assert!(reconciled.unique_constraints.is_empty());
    }

    #[test]
    fn test_both_configured_keeps_both() {
        let current = SchemaSnapshot {
            indexes: vec![unique_index("users", "uq_users_email")],
            unique_constraints: vec![unique_constraint("users", "uq_users_email")],
            ..Default::default()
        };
        let ideal = current.clone();

        let reconciled = reconcile_system_artifacts(current, &ideal);
        assert_eq!(reconciled.indexes.len(), 1);
        assert_eq!(reconciled.unique_constraints.len(), 1);
    }

    #[test]
    fn test_unconfigured_pair_is_untouched() {
        // Neither side is in the configuration: both survive so the diff
        // engine can emit the drops the user actually asked for.
        let current = SchemaSnapshot {
            indexes: vec![unique_index("users", "uq_users_email")],
            unique_constraints: vec![unique_constraint("users", "uq_users_email")],
            ..Default::default()
        };
        let ideal = SchemaSnapshot::default();

        let reconciled = reconcile_system_artifacts(current, &ideal);
        assert_eq!(reconciled.indexes.len(), 1);
        assert_eq!(reconciled.unique_constraints.len(), 1);
    }

    #[test]
    fn test_non_unique_indexes_are_never_reconciled() {
        let mut index = unique_index("users", "uq_users_email");
        index.unique = false;
        let current = SchemaSnapshot {
            indexes: vec![index],
            unique_constraints: vec![unique_constraint("users", "uq_users_email")],
            ..Default::default()
        };
        let ideal = SchemaSnapshot {
            unique_constraints: vec![unique_constraint("users", "uq_users_email")],
            ..Default::default()
        };

        let reconciled = reconcile_system_artifacts(current, &ideal);
        assert_eq!(reconciled.indexes.len(), 1);
    }

    #[test]
    fn test_catalog_row_bool_spellings() {
        let row = CatalogRow::new(vec![
            ("pg".to_string(), Some("t".to_string())),
            ("mysql".to_string(), Some("YES".to_string())),
            ("sqlite".to_string(), Some("1".to_string())),
        ]);
        assert!(row.get_bool("pg").unwrap());
        assert!(row.get_bool("mysql").unwrap());
        assert!(row.get_bool("sqlite").unwrap());
    }

    #[test]
    fn test_catalog_row_missing_column_errors() {
        let row = CatalogRow::default();
        assert!(row.get("table_name").is_err());
    }
}
