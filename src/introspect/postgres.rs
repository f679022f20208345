//! Introspection for postgres and cockroachdb.
//!
//! CockroachDB exposes a postgres-compatible `information_schema` and
//! `pg_catalog`, so one implementing type serves both dialects; only the
//! type-name synonym table differs (selected through the dialect).

use super::{parse_fk_action, CatalogClient, CatalogRow, ConstraintSet, SchemaIntrospector};
use crate::error::Result;
use crate::schema::{
    ColumnDef, Dialect, ForeignKeyConstraint, IndexDef, PrimaryKeyConstraint, TableSnapshot,
    UniqueConstraint,
};
use std::collections::BTreeMap;

const TABLES_SQL: &str = r#"
SELECT
    c.table_name::text  AS table_name,
    c.column_name::text AS column_name,
    c.udt_name::text    AS type_name,
    c.is_nullable::text AS is_nullable,
    c.column_default::text AS column_default
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema AND t.table_name = c.table_name
WHERE c.table_schema = 'public'
  AND t.table_type = 'BASE TABLE'
ORDER BY c.table_name, c.ordinal_position
"#;

// Primary-key indexes are excluded: the primary key surfaces through the
// constraint introspection, not as an index.
const INDEXES_SQL: &str = r#"
SELECT
    t.relname::text        AS table_name,
    i.relname::text        AS index_name,
    ix.indisunique::text   AS is_unique,
    a.attname::text        AS column_name,
    k.ordinality::text     AS ordinal
FROM pg_index ix
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_class t ON t.oid = ix.indrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ordinality) ON true
JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
WHERE n.nspname = 'public'
  AND t.relkind = 'r'
  AND NOT ix.indisprimary
ORDER BY t.relname, i.relname, k.ordinality
"#;

// All constrained columns come from key_column_usage, one row per column
// in ordinal order. A foreign key's referenced columns are resolved
// positionally: kcu.position_in_unique_constraint indexes into the
// referenced constraint's own key_column_usage. constraint_column_usage
// carries no position and would cross-product composite keys.
const CONSTRAINTS_SQL: &str = r#"
SELECT
    tc.table_name::text       AS table_name,
    tc.constraint_name::text  AS constraint_name,
    tc.constraint_type::text  AS constraint_type,
    kcu.column_name::text     AS column_name,
    kcu.ordinal_position::text AS ordinal,
    rk.table_name::text       AS referenced_table,
    rk.column_name::text      AS referenced_column,
    rc.delete_rule::text      AS delete_rule,
    rc.update_rule::text      AS update_rule
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_schema = tc.constraint_schema
 AND kcu.constraint_name = tc.constraint_name
 AND kcu.table_name = tc.table_name
LEFT JOIN information_schema.referential_constraints rc
  ON rc.constraint_schema = tc.constraint_schema
 AND rc.constraint_name = tc.constraint_name
LEFT JOIN information_schema.key_column_usage rk
  ON rk.constraint_schema = rc.unique_constraint_schema
 AND rk.constraint_name = rc.unique_constraint_name
 AND rk.ordinal_position = kcu.position_in_unique_constraint
WHERE tc.table_schema = 'public'
  AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE', 'FOREIGN KEY')
ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position
"#;

pub struct PostgresIntrospector<'a, C: CatalogClient> {
    client: &'a C,
    dialect: Dialect,
}

impl<'a, C: CatalogClient + Sync> PostgresIntrospector<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            dialect: Dialect::Postgres,
        }
    }

    /// Same catalog layout, cockroachdb type synonyms.
    pub fn cockroachdb(client: &'a C) -> Self {
        Self {
            client,
            dialect: Dialect::CockroachDb,
        }
    }

    fn build_tables(&self, rows: &[CatalogRow]) -> Result<Vec<TableSnapshot>> {
        let mut tables: BTreeMap<String, TableSnapshot> = BTreeMap::new();
        for row in rows {
            let table_name = row.get("table_name")?;
            let column_name = row.get("column_name")?;
            let type_name = self.convert_type_name(row.get("type_name")?)?;

            let table = tables
                .entry(table_name.to_string())
                .or_insert_with(|| TableSnapshot {
                    name: table_name.to_string(),
                    columns: BTreeMap::new(),
                });
            table.columns.insert(
                column_name.to_string(),
                ColumnDef {
                    type_name,
                    not_null: !row.get_bool("is_nullable")?,
                    primary_key: false,
                    unique: false,
                    default_sql: row.opt("column_default").map(|s| s.to_string()),
                },
            );
        }
        Ok(tables.into_values().collect())
    }
}

fn build_indexes(rows: &[CatalogRow]) -> Result<Vec<IndexDef>> {
    // Rows arrive ordered by (table, index, ordinal); group consecutively
    // so the column order the catalog reports is preserved.
    let mut indexes: Vec<IndexDef> = Vec::new();
    for row in rows {
        let table = row.get("table_name")?;
        let name = row.get("index_name")?;
        let column = row.get("column_name")?;
        let unique = row.get_bool("is_unique")?;

        match indexes.last_mut() {
            Some(last) if last.table == table && last.name == name => {
                last.columns.push(column.to_string());
            }
            _ => indexes.push(IndexDef {
                table: table.to_string(),
                name: name.to_string(),
                columns: vec![column.to_string()],
                unique,
            }),
        }
    }
    Ok(indexes)
}

fn build_constraints(rows: &[CatalogRow]) -> Result<ConstraintSet> {
    let mut set = ConstraintSet::default();

    for row in rows {
        let table = row.get("table_name")?.to_string();
        let name = row.get("constraint_name")?.to_string();
        let column = row.get("column_name")?.to_string();

        match row.get("constraint_type")? {
            "PRIMARY KEY" => {
                match set
                    .primary_keys
                    .iter_mut()
                    .find(|c| c.table == table && c.name == name)
                {
                    Some(existing) => existing.columns.push(column),
                    None => set.primary_keys.push(PrimaryKeyConstraint {
                        table,
                        name,
                        columns: vec![column],
                    }),
                }
            }
            "UNIQUE" => {
                match set
                    .unique_constraints
                    .iter_mut()
                    .find(|c| c.table == table && c.name == name)
                {
                    Some(existing) => existing.columns.push(column),
                    None => set.unique_constraints.push(UniqueConstraint {
                        table,
                        name,
                        columns: vec![column],
                    }),
                }
            }
            "FOREIGN KEY" => {
                let referenced_table = row.get("referenced_table")?.to_string();
                let referenced_column = row.get("referenced_column")?.to_string();
                match set
                    .foreign_keys
                    .iter_mut()
                    .find(|c| c.table == table && c.name == name)
                {
                    Some(existing) => {
                        existing.columns.push(column);
                        existing.referenced_columns.push(referenced_column);
                    }
                    None => set.foreign_keys.push(ForeignKeyConstraint {
                        table,
                        name,
                        columns: vec![column],
                        referenced_table,
                        referenced_columns: vec![referenced_column],
                        on_delete: row.opt("delete_rule").and_then(parse_fk_action),
                        on_update: row.opt("update_rule").and_then(parse_fk_action),
                    }),
                }
            }
            _ => {}
        }
    }

    Ok(set)
}

impl<'a, C: CatalogClient + Sync> SchemaIntrospector for PostgresIntrospector<'a, C> {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn introspect_tables(&self) -> Result<Vec<TableSnapshot>> {
        let rows = self.client.query_rows(TABLES_SQL).await?;
        self.build_tables(&rows)
    }

    async fn introspect_indexes(&self) -> Result<Vec<IndexDef>> {
        let rows = self.client.query_rows(INDEXES_SQL).await?;
        build_indexes(&rows)
    }

    async fn introspect_constraints(&self) -> Result<ConstraintSet> {
        let rows = self.client.query_rows(CONSTRAINTS_SQL).await?;
        build_constraints(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Option<&str>)]) -> CatalogRow {
        CatalogRow::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(|s| s.to_string()))),
        )
    }

    struct NoopClient;
    impl CatalogClient for NoopClient {
        async fn query_rows(&self, _sql: &str) -> Result<Vec<CatalogRow>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_build_tables_groups_columns_and_normalizes_types() {
        let client = NoopClient;
        let introspector = PostgresIntrospector::new(&client);
        let rows = vec![
            row(&[
                ("table_name", Some("users")),
                ("column_name", Some("id")),
                ("type_name", Some("uuid")),
                ("is_nullable", Some("NO")),
                ("column_default", None),
            ]),
            row(&[
                ("table_name", Some("users")),
                ("column_name", Some("active")),
                ("type_name", Some("bool")),
                ("is_nullable", Some("YES")),
                ("column_default", Some("true")),
            ]),
        ];

        let tables = introspector.build_tables(&rows).unwrap();
        assert_eq!(tables.len(), 1);
        let users = &tables[0];
        assert_eq!(users.columns["id"].type_name, "uuid");
        assert!(users.columns["id"].not_null);
        assert_eq!(users.columns["active"].type_name, "boolean");
        assert_eq!(users.columns["active"].default_sql.as_deref(), Some("true"));
    }

    #[test]
    fn test_build_indexes_preserves_column_order() {
        let rows = vec![
            row(&[
                ("table_name", Some("users")),
                ("index_name", Some("idx_name_age")),
                ("is_unique", Some("f")),
                ("column_name", Some("name")),
                ("ordinal", Some("1")),
            ]),
            row(&[
                ("table_name", Some("users")),
                ("index_name", Some("idx_name_age")),
                ("is_unique", Some("f")),
                ("column_name", Some("age")),
                ("ordinal", Some("2")),
            ]),
        ];

        let indexes = build_indexes(&rows).unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].columns, vec!["name", "age"]);
    }

    #[test]
    fn test_build_constraints_assembles_composite_fk() {
        let fk_row = |column: &'static str, referenced: &'static str| {
            row(&[
                ("table_name", Some("memberships")),
                ("constraint_name", Some("fk_memberships_user")),
                ("constraint_type", Some("FOREIGN KEY")),
                ("column_name", Some(column)),
                ("ordinal", Some("1")),
                ("referenced_table", Some("users")),
                ("referenced_column", Some(referenced)),
                ("delete_rule", Some("CASCADE")),
                ("update_rule", Some("NO ACTION")),
            ])
        };
        let rows = vec![fk_row("user_id", "id"), fk_row("tenant_id", "tenant_id")];

        let set = build_constraints(&rows).unwrap();
        assert_eq!(set.foreign_keys.len(), 1);
        let fk = &set.foreign_keys[0];
        assert_eq!(fk.columns, vec!["user_id", "tenant_id"]);
        assert_eq!(fk.referenced_columns, vec!["id", "tenant_id"]);
        assert_eq!(fk.on_delete, Some(crate::schema::ForeignKeyAction::Cascade));
    }

    #[test]
    fn test_composite_pk_arrives_once_per_column() {
        let pk_row = |column: &'static str, ordinal: &'static str| {
            row(&[
                ("table_name", Some("memberships")),
                ("constraint_name", Some("pk_memberships")),
                ("constraint_type", Some("PRIMARY KEY")),
                ("column_name", Some(column)),
                ("ordinal", Some(ordinal)),
                ("referenced_table", None),
                ("referenced_column", None),
                ("delete_rule", None),
                ("update_rule", None),
            ])
        };
        let rows = vec![pk_row("user_id", "1"), pk_row("org_id", "2")];

        let set = build_constraints(&rows).unwrap();
        assert_eq!(set.primary_keys.len(), 1);
        assert_eq!(set.primary_keys[0].columns, vec!["user_id", "org_id"]);
    }

    #[test]
    fn test_constraints_sql_resolves_referenced_columns_positionally() {
        // Composite keys corrupt without positional correlation: joining
        // the referenced side on name alone returns N rows per constrained
        // column, duplicating PK/unique columns and scrambling FK pairs.
        assert!(CONSTRAINTS_SQL.contains("position_in_unique_constraint"));
        assert!(!CONSTRAINTS_SQL.contains("constraint_column_usage"));
    }

    #[test]
    fn test_cockroachdb_variant_reports_its_dialect() {
        let client = NoopClient;
        let introspector = PostgresIntrospector::cockroachdb(&client);
        assert_eq!(introspector.dialect(), Dialect::CockroachDb);
    }
}
