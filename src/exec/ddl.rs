//! Operation-to-DDL rendering.
//!
//! One operation renders to one or more SQL statements for a given
//! dialect. Rendering is pure: it never touches a connection, so the same
//! code path serves plan output and live application.
//!
//! Not every operation is expressible on every dialect. Sqlite cannot
//! alter a column in place or attach constraints to an existing table;
//! those render as [`MorphError::UnsupportedOperation`] rather than
//! silently emitting DDL that the engine would reject.

use crate::error::{MorphError, Result};
use crate::ops::Operation;
use crate::schema::{
    ColumnDef, Dialect, ForeignKeyConstraint, IndexDef, PrimaryKeyConstraint, TableSnapshot,
    UniqueConstraint,
};

/// Render one operation as the ordered SQL statements that apply it.
pub fn render_operation(dialect: Dialect, op: &Operation) -> Result<Vec<String>> {
    match op {
        Operation::CreateTable { table } => Ok(vec![render_create_table(dialect, table, None, &[])]),
        Operation::CreateTableWithConstraints {
            table,
            primary_key,
            unique_constraints,
        } => Ok(vec![render_create_table(
            dialect,
            table,
            primary_key.as_ref(),
            unique_constraints,
        )]),
        Operation::DropTable { table } => {
            Ok(vec![format!("DROP TABLE {}", dialect.quote_ident(table))])
        }
        Operation::AddColumn {
            table,
            column,
            definition,
        } => Ok(vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            dialect.quote_ident(table),
            render_column(dialect, column, definition)
        )]),
        Operation::DropColumn { table, column, .. } => Ok(vec![format!(
            "ALTER TABLE {} DROP COLUMN {}",
            dialect.quote_ident(table),
            dialect.quote_ident(column)
        )]),
        Operation::AlterColumn {
            table,
            column,
            before,
            after,
        } => render_alter_column(dialect, table, column, before, after),
        Operation::CreateIndex { index } => Ok(vec![render_create_index(dialect, index)]),
        Operation::DropIndex { index } => Ok(vec![render_drop_index(dialect, index)]),
        Operation::CreatePrimaryKeyConstraint { constraint } => {
            render_create_primary_key(dialect, constraint)
        }
        Operation::DropPrimaryKeyConstraint { constraint } => {
            render_drop_primary_key(dialect, constraint)
        }
        Operation::CreateUniqueConstraint { constraint } => {
            Ok(vec![render_create_unique(dialect, constraint)])
        }
        Operation::DropUniqueConstraint { constraint } => {
            Ok(vec![render_drop_unique(dialect, constraint)])
        }
        Operation::CreateForeignKeyConstraint { constraint } => {
            render_create_foreign_key(dialect, constraint)
        }
        Operation::DropForeignKeyConstraint { constraint } => {
            render_drop_foreign_key(dialect, constraint)
        }
    }
}

fn quote_list(dialect: Dialect, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_column(dialect: Dialect, name: &str, def: &ColumnDef) -> String {
    let mut sql = format!("{} {}", dialect.quote_ident(name), def.type_name);
    if def.not_null {
        sql.push_str(" NOT NULL");
    }
    if def.primary_key {
        sql.push_str(" PRIMARY KEY");
    }
    if def.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(default_sql) = &def.default_sql {
        sql.push_str(" DEFAULT ");
        sql.push_str(default_sql);
    }
    sql
}

fn render_create_table(
    dialect: Dialect,
    table: &TableSnapshot,
    primary_key: Option<&PrimaryKeyConstraint>,
    unique_constraints: &[UniqueConstraint],
) -> String {
    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|(name, def)| format!("    {}", render_column(dialect, name, def)))
        .collect();

    if let Some(pk) = primary_key {
        lines.push(format!(
            "    CONSTRAINT {} PRIMARY KEY ({})",
            dialect.quote_ident(&pk.name),
            quote_list(dialect, &pk.columns)
        ));
    }
    for uc in unique_constraints {
        lines.push(format!(
            "    CONSTRAINT {} UNIQUE ({})",
            dialect.quote_ident(&uc.name),
            quote_list(dialect, &uc.columns)
        ));
    }

    format!(
        "CREATE TABLE {} (\n{}\n)",
        dialect.quote_ident(&table.name),
        lines.join(",\n")
    )
}

// The before/after pair lets each dialect choose its own ALTER shape: a
// minimal clause per changed attribute where the dialect supports it, a
// full column rewrite where it only has MODIFY.
fn render_alter_column(
    dialect: Dialect,
    table: &str,
    column: &str,
    before: &ColumnDef,
    after: &ColumnDef,
) -> Result<Vec<String>> {
    match dialect {
        Dialect::Postgres | Dialect::CockroachDb => {
            if before.primary_key != after.primary_key || before.unique != after.unique {
                return Err(MorphError::UnsupportedOperation {
                    dialect: dialect.to_string(),
                    message: format!(
                        "cannot toggle the inline primary-key/unique flag on column {}.{}; \
                         declare a named constraint instead",
                        table, column
                    ),
                });
            }

            let mut statements = Vec::new();
            if before.type_name != after.type_name {
                statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
                    dialect.quote_ident(table),
                    dialect.quote_ident(column),
                    after.type_name
                ));
            }
            if before.not_null != after.not_null {
                let clause = if after.not_null {
                    "SET NOT NULL"
                } else {
                    "DROP NOT NULL"
                };
                statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} {}",
                    dialect.quote_ident(table),
                    dialect.quote_ident(column),
                    clause
                ));
            }
            Ok(statements)
        }
        Dialect::MySql | Dialect::MariaDb => {
            if before.primary_key != after.primary_key || before.unique != after.unique {
                return Err(MorphError::UnsupportedOperation {
                    dialect: dialect.to_string(),
                    message: format!(
                        "cannot toggle the inline primary-key/unique flag on column {}.{}; \
                         declare a named constraint instead",
                        table, column
                    ),
                });
            }

            // MODIFY rewrites the whole column, but key membership must not
            // be restated: the column already carries it, and MySQL rejects
            // a second PRIMARY KEY and accretes an extra unique index per
            // re-emitted UNIQUE.
            let rewritten = ColumnDef {
                primary_key: false,
                unique: false,
                ..after.clone()
            };
            Ok(vec![format!(
                "ALTER TABLE {} MODIFY COLUMN {}",
                dialect.quote_ident(table),
                render_column(dialect, column, &rewritten)
            )])
        }
        Dialect::Sqlite => Err(MorphError::UnsupportedOperation {
            dialect: dialect.to_string(),
            message: format!(
                "sqlite cannot alter column {}.{} in place; recreate the table",
                table, column
            ),
        }),
    }
}

fn render_create_index(dialect: Dialect, index: &IndexDef) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        unique,
        dialect.quote_ident(&index.name),
        dialect.quote_ident(&index.table),
        quote_list(dialect, &index.columns)
    )
}

fn render_drop_index(dialect: Dialect, index: &IndexDef) -> String {
    match dialect {
        // mysql scopes index names to their table.
        Dialect::MySql | Dialect::MariaDb => format!(
            "DROP INDEX {} ON {}",
            dialect.quote_ident(&index.name),
            dialect.quote_ident(&index.table)
        ),
        _ => format!("DROP INDEX {}", dialect.quote_ident(&index.name)),
    }
}

fn render_create_primary_key(
    dialect: Dialect,
    constraint: &PrimaryKeyConstraint,
) -> Result<Vec<String>> {
    match dialect {
        Dialect::Sqlite => Err(MorphError::UnsupportedOperation {
            dialect: dialect.to_string(),
            message: format!(
                "sqlite cannot add primary key {} to existing table {}; recreate the table",
                constraint.name, constraint.table
            ),
        }),
        // mysql primary keys are always named PRIMARY.
        Dialect::MySql | Dialect::MariaDb => Ok(vec![format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            dialect.quote_ident(&constraint.table),
            quote_list(dialect, &constraint.columns)
        )]),
        _ => Ok(vec![format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
            dialect.quote_ident(&constraint.table),
            dialect.quote_ident(&constraint.name),
            quote_list(dialect, &constraint.columns)
        )]),
    }
}

fn render_drop_primary_key(
    dialect: Dialect,
    constraint: &PrimaryKeyConstraint,
) -> Result<Vec<String>> {
    match dialect {
        Dialect::Sqlite => Err(MorphError::UnsupportedOperation {
            dialect: dialect.to_string(),
            message: format!(
                "sqlite cannot drop primary key {} from table {}; recreate the table",
                constraint.name, constraint.table
            ),
        }),
        Dialect::MySql | Dialect::MariaDb => Ok(vec![format!(
            "ALTER TABLE {} DROP PRIMARY KEY",
            dialect.quote_ident(&constraint.table)
        )]),
        _ => Ok(vec![format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            dialect.quote_ident(&constraint.table),
            dialect.quote_ident(&constraint.name)
        )]),
    }
}

fn render_create_unique(dialect: Dialect, constraint: &UniqueConstraint) -> String {
    match dialect {
        // sqlite has no ALTER TABLE ADD CONSTRAINT; a unique index is the
        // same enforcement and is what its catalog reports back anyway.
        Dialect::Sqlite => format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            dialect.quote_ident(&constraint.name),
            dialect.quote_ident(&constraint.table),
            quote_list(dialect, &constraint.columns)
        ),
        _ => format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
            dialect.quote_ident(&constraint.table),
            dialect.quote_ident(&constraint.name),
            quote_list(dialect, &constraint.columns)
        ),
    }
}

fn render_drop_unique(dialect: Dialect, constraint: &UniqueConstraint) -> String {
    match dialect {
        Dialect::Sqlite => format!("DROP INDEX {}", dialect.quote_ident(&constraint.name)),
        // mysql stores a unique constraint as an index.
        Dialect::MySql | Dialect::MariaDb => format!(
            "ALTER TABLE {} DROP INDEX {}",
            dialect.quote_ident(&constraint.table),
            dialect.quote_ident(&constraint.name)
        ),
        _ => format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            dialect.quote_ident(&constraint.table),
            dialect.quote_ident(&constraint.name)
        ),
    }
}

fn render_create_foreign_key(
    dialect: Dialect,
    constraint: &ForeignKeyConstraint,
) -> Result<Vec<String>> {
    if dialect == Dialect::Sqlite {
        return Err(MorphError::UnsupportedOperation {
            dialect: dialect.to_string(),
            message: format!(
                "sqlite cannot add foreign key {} to existing table {}; recreate the table",
                constraint.name, constraint.table
            ),
        });
    }

    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        dialect.quote_ident(&constraint.table),
        dialect.quote_ident(&constraint.name),
        quote_list(dialect, &constraint.columns),
        dialect.quote_ident(&constraint.referenced_table),
        quote_list(dialect, &constraint.referenced_columns)
    );
    if let Some(action) = constraint.on_delete {
        sql.push_str(" ON DELETE ");
        sql.push_str(action.as_sql());
    }
    if let Some(action) = constraint.on_update {
        sql.push_str(" ON UPDATE ");
        sql.push_str(action.as_sql());
    }
    Ok(vec![sql])
}

fn render_drop_foreign_key(
    dialect: Dialect,
    constraint: &ForeignKeyConstraint,
) -> Result<Vec<String>> {
    match dialect {
        Dialect::Sqlite => Err(MorphError::UnsupportedOperation {
            dialect: dialect.to_string(),
            message: format!(
                "sqlite cannot drop foreign key {} from table {}; recreate the table",
                constraint.name, constraint.table
            ),
        }),
        Dialect::MySql | Dialect::MariaDb => Ok(vec![format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            dialect.quote_ident(&constraint.table),
            dialect.quote_ident(&constraint.name)
        )]),
        _ => Ok(vec![format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            dialect.quote_ident(&constraint.table),
            dialect.quote_ident(&constraint.name)
        )]),
    }
}
