//! Introspection for mysql and mariadb.
//!
//! One implementing type serves both; they share `information_schema` and
//! the same auto-generated-artifact behavior (a unique constraint is
//! reported a second time as a unique index in `STATISTICS`, which the
//! reconciliation step removes).
//!
//! `COLUMN_TYPE` rather than `DATA_TYPE` is introspected so that
//! `tinyint(1)` survives long enough to be normalized to `boolean`.

use super::{parse_fk_action, CatalogClient, CatalogRow, ConstraintSet, SchemaIntrospector};
use crate::error::Result;
use crate::schema::{
    ColumnDef, Dialect, ForeignKeyConstraint, IndexDef, PrimaryKeyConstraint, TableSnapshot,
    UniqueConstraint,
};
use std::collections::BTreeMap;

const TABLES_SQL: &str = r#"
SELECT
    c.TABLE_NAME     AS table_name,
    c.COLUMN_NAME    AS column_name,
    c.COLUMN_TYPE    AS type_name,
    c.IS_NULLABLE    AS is_nullable,
    c.COLUMN_DEFAULT AS column_default
FROM information_schema.COLUMNS c
JOIN information_schema.TABLES t
  ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
WHERE c.TABLE_SCHEMA = DATABASE()
  AND t.TABLE_TYPE = 'BASE TABLE'
ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION
"#;

// The PRIMARY index is the primary key's storage artifact, never a
// standalone index.
const INDEXES_SQL: &str = r#"
SELECT
    s.TABLE_NAME  AS table_name,
    s.INDEX_NAME  AS index_name,
    s.COLUMN_NAME AS column_name,
    CASE s.NON_UNIQUE WHEN 0 THEN 'true' ELSE 'false' END AS is_unique,
    s.SEQ_IN_INDEX AS ordinal
FROM information_schema.STATISTICS s
WHERE s.TABLE_SCHEMA = DATABASE()
  AND s.INDEX_NAME <> 'PRIMARY'
ORDER BY s.TABLE_NAME, s.INDEX_NAME, s.SEQ_IN_INDEX
"#;

const CONSTRAINTS_SQL: &str = r#"
SELECT
    tc.TABLE_NAME           AS table_name,
    tc.CONSTRAINT_NAME      AS constraint_name,
    tc.CONSTRAINT_TYPE      AS constraint_type,
    kcu.COLUMN_NAME         AS column_name,
    kcu.ORDINAL_POSITION    AS ordinal,
    kcu.REFERENCED_TABLE_NAME  AS referenced_table,
    kcu.REFERENCED_COLUMN_NAME AS referenced_column,
    rc.DELETE_RULE          AS delete_rule,
    rc.UPDATE_RULE          AS update_rule
FROM information_schema.TABLE_CONSTRAINTS tc
JOIN information_schema.KEY_COLUMN_USAGE kcu
  ON kcu.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
 AND kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
 AND kcu.TABLE_NAME = tc.TABLE_NAME
LEFT JOIN information_schema.REFERENTIAL_CONSTRAINTS rc
  ON rc.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
 AND rc.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
WHERE tc.TABLE_SCHEMA = DATABASE()
  AND tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE', 'FOREIGN KEY')
ORDER BY tc.TABLE_NAME, tc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
"#;

pub struct MySqlIntrospector<'a, C: CatalogClient> {
    client: &'a C,
    dialect: Dialect,
}

impl<'a, C: CatalogClient + Sync> MySqlIntrospector<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            dialect: Dialect::MySql,
        }
    }

    pub fn mariadb(client: &'a C) -> Self {
        Self {
            client,
            dialect: Dialect::MariaDb,
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

impl<'a, C: CatalogClient + Sync> SchemaIntrospector for MySqlIntrospector<'a, C> {
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
