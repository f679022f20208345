//! Introspection for sqlite.
//!
//! Sqlite has no information_schema; the catalog is `sqlite_master` plus
//! the pragma table-valued functions (`pragma_table_info`,
//! `pragma_index_list`, `pragma_index_info`, `pragma_foreign_key_list`),
//! which are joinable like ordinary tables.
//!
//! Sqlite does not persist names for primary keys and foreign keys, so
//! deterministic names are synthesized (`pk_<table>`, `fk_<table>_<id>`).
//! The same names must be used in the desired configuration or every run
//! will diff them.

use super::{parse_fk_action, CatalogClient, CatalogRow, ConstraintSet, SchemaIntrospector};
use crate::error::Result;
use crate::schema::{
    normalize_type_name, ColumnDef, Dialect, ForeignKeyConstraint, IndexDef, PrimaryKeyConstraint,
    TableSnapshot, UniqueConstraint,
};
use std::collections::BTreeMap;

const TABLES_SQL: &str = r#"
SELECT
    m.name        AS table_name,
    ti.name       AS column_name,
    ti.type       AS type_name,
    ti."notnull"  AS not_null,
    ti.dflt_value AS column_default
FROM sqlite_master m
JOIN pragma_table_info(m.name) ti
WHERE m.type = 'table'
  AND m.name NOT LIKE 'sqlite_%'
ORDER BY m.name, ti.cid
"#;

// origin 'c' is an explicitly created index; 'u' is the automatic index
// behind a unique constraint and 'pk' the one behind a primary key.
const INDEXES_SQL: &str = r#"
SELECT
    m.name      AS table_name,
    il.name     AS index_name,
    il."unique" AS is_unique,
    il.origin   AS origin,
    ii.name     AS column_name,
    ii.seqno    AS ordinal
FROM sqlite_master m
JOIN pragma_index_list(m.name) il
JOIN pragma_index_info(il.name) ii
WHERE m.type = 'table'
  AND m.name NOT LIKE 'sqlite_%'
ORDER BY m.name, il.name, ii.seqno
"#;

const PRIMARY_KEYS_SQL: &str = r#"
SELECT
    m.name  AS table_name,
    ti.name AS column_name,
    ti.pk   AS pk_ordinal
FROM sqlite_master m
JOIN pragma_table_info(m.name) ti
WHERE m.type = 'table'
  AND m.name NOT LIKE 'sqlite_%'
  AND ti.pk > 0
ORDER BY m.name, ti.pk
"#;

const FOREIGN_KEYS_SQL: &str = r#"
SELECT
    m.name       AS table_name,
    fk.id        AS fk_id,
    fk.seq       AS ordinal,
    fk."table"   AS referenced_table,
    fk."from"    AS column_name,
    fk."to"      AS referenced_column,
    fk.on_delete AS delete_rule,
    fk.on_update AS update_rule
FROM sqlite_master m
JOIN pragma_foreign_key_list(m.name) fk
WHERE m.type = 'table'
  AND m.name NOT LIKE 'sqlite_%'
ORDER BY m.name, fk.id, fk.seq
"#;

pub struct SqliteIntrospector<'a, C: CatalogClient> {
    client: &'a C,
}

impl<'a, C: CatalogClient + Sync> SqliteIntrospector<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    fn build_tables(&self, rows: &[CatalogRow]) -> Result<Vec<TableSnapshot>> {
        let mut tables: BTreeMap<String, TableSnapshot> = BTreeMap::new();
        for row in rows {
            let table_name = row.get("table_name")?;
            let column_name = row.get("column_name")?;
            let type_name = self.convert_type_name(row.opt("type_name").unwrap_or_default())?;

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
                    not_null: row.get_bool("not_null")?,
                    primary_key: false,
                    unique: false,
                    default_sql: row.opt("column_default").map(|s| s.to_string()),
                },
            );
        }
        Ok(tables.into_values().collect())
    }
}

fn build_indexes(rows: &[CatalogRow]) -> Result<(Vec<IndexDef>, Vec<UniqueConstraint>)> {
    let mut indexes: Vec<IndexDef> = Vec::new();
    let mut uniques: Vec<UniqueConstraint> = Vec::new();

    for row in rows {
        let table = row.get("table_name")?;
        let name = row.get("index_name")?;
        let column = row.get("column_name")?.to_string();

        match row.get("origin")? {
            // Explicitly created index.
            "c" => match indexes.last_mut() {
                Some(last) if last.table == table && last.name == name => {
                    last.columns.push(column);
                }
                _ => indexes.push(IndexDef {
                    table: table.to_string(),
                    name: name.to_string(),
                    columns: vec![column],
                    unique: row.get_bool("is_unique")?,
                }),
            },
            // Automatic index behind a unique constraint; surfaced as the
            // constraint itself. The primary key's automatic index is
            // covered by the pk ordinals in pragma_table_info.
            "u" => match uniques.last_mut() {
                Some(last) if last.table == table && last.name == name => {
                    last.columns.push(column);
                }
                _ => uniques.push(UniqueConstraint {
                    table: table.to_string(),
                    name: name.to_string(),
                    columns: vec![column],
                }),
            },
            _ => {}
        }
    }

    Ok((indexes, uniques))
}

fn build_primary_keys(rows: &[CatalogRow]) -> Result<Vec<PrimaryKeyConstraint>> {
    let mut primary_keys: Vec<PrimaryKeyConstraint> = Vec::new();
    for row in rows {
        let table = row.get("table_name")?;
        let column = row.get("column_name")?.to_string();

        match primary_keys.last_mut() {
            Some(last) if last.table == table => last.columns.push(column),
            _ => primary_keys.push(PrimaryKeyConstraint {
                table: table.to_string(),
                name: format!("pk_{}", table),
                columns: vec![column],
            }),
        }
    }
    Ok(primary_keys)
}

fn build_foreign_keys(rows: &[CatalogRow]) -> Result<Vec<ForeignKeyConstraint>> {
    let mut foreign_keys: Vec<ForeignKeyConstraint> = Vec::new();
    let mut last_key: Option<(String, String)> = None;

    for row in rows {
        let table = row.get("table_name")?;
        let id = row.get("fk_id")?;
        let column = row.get("column_name")?.to_string();
        let referenced_column = row.get("referenced_column")?.to_string();
        let key = (table.to_string(), id.to_string());

        if last_key.as_ref() == Some(&key) {
            if let Some(last) = foreign_keys.last_mut() {
                last.columns.push(column);
                last.referenced_columns.push(referenced_column);
            }
        } else {
            foreign_keys.push(ForeignKeyConstraint {
                table: table.to_string(),
                name: format!("fk_{}_{}", table, id),
                columns: vec![column],
                referenced_table: row.get("referenced_table")?.to_string(),
                referenced_columns: vec![referenced_column],
                on_delete: row.opt("delete_rule").and_then(parse_fk_action),
                on_update: row.opt("update_rule").and_then(parse_fk_action),
            });
            last_key = Some(key);
        }
    }
    Ok(foreign_keys)
}

impl<'a, C: CatalogClient + Sync> SchemaIntrospector for SqliteIntrospector<'a, C> {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    /// Columns declared with no type have BLOB affinity.
    fn convert_type_name(&self, raw: &str) -> Result<String> {
        if raw.trim().is_empty() {
            return Ok("blob".to_string());
        }
        normalize_type_name(self.dialect(), raw)
    }

    async fn introspect_tables(&self) -> Result<Vec<TableSnapshot>> {
        let rows = self.client.query_rows(TABLES_SQL).await?;
        self.build_tables(&rows)
    }

    async fn introspect_indexes(&self) -> Result<Vec<IndexDef>> {
        let rows = self.client.query_rows(INDEXES_SQL).await?;
        Ok(build_indexes(&rows)?.0)
    }

    async fn introspect_constraints(&self) -> Result<ConstraintSet> {
        let index_rows = self.client.query_rows(INDEXES_SQL).await?;
        let pk_rows = self.client.query_rows(PRIMARY_KEYS_SQL).await?;
        let fk_rows = self.client.query_rows(FOREIGN_KEYS_SQL).await?;

        Ok(ConstraintSet {
            primary_keys: build_primary_keys(&pk_rows)?,
            unique_constraints: build_indexes(&index_rows)?.1,
            foreign_keys: build_foreign_keys(&fk_rows)?,
        })
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
    fn test_typeless_column_maps_to_blob() {
        let client = NoopClient;
        let introspector = SqliteIntrospector::new(&client);
        let rows = vec![row(&[
            ("table_name", Some("stash")),
            ("column_name", Some("payload")),
            ("type_name", None),
            ("not_null", Some("0")),
            ("column_default", None),
        ])];

        let tables = introspector.build_tables(&rows).unwrap();
        assert_eq!(tables[0].columns["payload"].type_name, "blob");
    }

    #[test]
    fn test_unique_origin_becomes_constraint_not_index() {
        let rows = vec![
            row(&[
                ("table_name", Some("users")),
                ("index_name", Some("sqlite_autoindex_users_1")),
                ("is_unique", Some("1")),
                ("origin", Some("u")),
                ("column_name", Some("email")),
                ("ordinal", Some("0")),
            ]),
            row(&[
                ("table_name", Some("users")),
                ("index_name", Some("idx_users_name")),
                ("is_unique", Some("0")),
                ("origin", Some("c")),
                ("column_name", Some("name")),
                ("ordinal", Some("0")),
            ]),
        ];

        let (indexes, uniques) = build_indexes(&rows).unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, "idx_users_name");
        assert_eq!(uniques.len(), 1);
        assert_eq!(uniques[0].name, "sqlite_autoindex_users_1");
    }

    #[test]
    fn test_composite_primary_key_groups_by_table() {
        let rows = vec![
            row(&[
                ("table_name", Some("memberships")),
                ("column_name", Some("user_id")),
                ("pk_ordinal", Some("1")),
            ]),
            row(&[
                ("table_name", Some("memberships")),
                ("column_name", Some("org_id")),
                ("pk_ordinal", Some("2")),
            ]),
        ];

        let pks = build_primary_keys(&rows).unwrap();
        assert_eq!(pks.len(), 1);
        assert_eq!(pks[0].name, "pk_memberships");
        assert_eq!(pks[0].columns, vec!["user_id", "org_id"]);
    }

    #[test]
    fn test_foreign_keys_get_synthesized_names() {
        let fk_row = |id: &'static str, column: &'static str, referenced: &'static str| {
            row(&[
                ("table_name", Some("posts")),
                ("fk_id", Some(id)),
                ("ordinal", Some("0")),
                ("referenced_table", Some("users")),
                ("column_name", Some(column)),
                ("referenced_column", Some(referenced)),
                ("delete_rule", Some("CASCADE")),
                ("update_rule", Some("NO ACTION")),
            ])
        };
        let rows = vec![
            fk_row("0", "user_id", "id"),
            fk_row("0", "tenant_id", "tenant_id"),
            fk_row("1", "editor_id", "id"),
        ];

        let fks = build_foreign_keys(&rows).unwrap();
        assert_eq!(fks.len(), 2);
        assert_eq!(fks[0].name, "fk_posts_0");
        assert_eq!(fks[0].columns, vec!["user_id", "tenant_id"]);
        assert_eq!(fks[1].name, "fk_posts_1");
    }
}
