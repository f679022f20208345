use crate::error::{MorphError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported SQL engine.
///
/// Everything downstream of the introspection layer is dialect-neutral;
/// the dialect only matters for catalog queries, type-name synonyms and
/// DDL rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    CockroachDb,
    MySql,
    MariaDb,
    Sqlite,
}

impl std::str::FromStr for Dialect {
    type Err = MorphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "cockroachdb" | "cockroach" => Ok(Dialect::CockroachDb),
            "mysql" => Ok(Dialect::MySql),
            "mariadb" => Ok(Dialect::MariaDb),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(MorphError::Configuration(format!(
                "Unknown dialect: {}. Expected one of: postgres, cockroachdb, mysql, mariadb, sqlite",
                other
            ))),
        }
    }
}

impl Dialect {
    /// Whether DDL statements can be rolled back in a transaction.
    ///
    /// MySQL and MariaDB issue an implicit commit on every DDL statement,
    /// so a failed apply leaves earlier operations committed.
    pub fn supports_transactional_ddl(&self) -> bool {
        match self {
            Dialect::Postgres | Dialect::CockroachDb | Dialect::Sqlite => true,
            Dialect::MySql | Dialect::MariaDb => false,
        }
    }

    /// Identifier quoting for generated DDL.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Dialect::MySql | Dialect::MariaDb => format!("`{}`", ident.replace('`', "``")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Postgres => "postgres",
            Dialect::CockroachDb => "cockroachdb",
            Dialect::MySql => "mysql",
            Dialect::MariaDb => "mariadb",
            Dialect::Sqlite => "sqlite",
        };
        write!(f, "{}", name)
    }
}

/// Map a dialect-reported type name onto its canonical, dialect-neutral
/// spelling.
///
/// Both introspected and configured snapshots go through this before any
/// comparison, so the diff engine never sees two spellings of the same
/// type (e.g. `int8` vs `bigint`, or MySQL's `tinyint(1)` vs `boolean`).
/// Names that are not in the synonym table pass through lowercased; they
/// are assumed to be user-defined types and still compare canonically as
/// long as both sides spell them the same way.
pub fn normalize_type_name(dialect: Dialect, raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MorphError::UnknownTypeName {
            name: raw.to_string(),
            dialect: dialect.to_string(),
            message: "type name is empty".to_string(),
        });
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(MorphError::UnknownTypeName {
            name: raw.to_string(),
            dialect: dialect.to_string(),
            message: "type name contains control characters".to_string(),
        });
    }

    let lowered = trimmed.to_lowercase();
    // Collapse interior whitespace so "double  precision" and
    // "double precision" compare equal.
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");

    let canonical = match dialect {
        Dialect::Postgres | Dialect::CockroachDb => match collapsed.as_str() {
            "bool" => "boolean",
            "int2" => "smallint",
            "int" | "int4" => "integer",
            "int8" => "bigint",
            "float4" => "real",
            "float8" => "double precision",
            "character varying" => "varchar",
            "character" | "bpchar" => "char",
            "timestamp without time zone" | "timestamp" => "timestamp",
            "timestamp with time zone" => "timestamptz",
            "time without time zone" => "time",
            "time with time zone" => "timetz",
            "decimal" => "numeric",
            "serial" | "serial4" => "integer",
            "bigserial" | "serial8" => "bigint",
            "smallserial" | "serial2" => "smallint",
            other => other,
        },
        Dialect::MySql | Dialect::MariaDb => match collapsed.as_str() {
            "bool" | "boolean" | "tinyint(1)" => "boolean",
            "integer" | "int" => "integer",
            "dec" | "fixed" | "decimal" => "numeric",
            "double" | "real" => "double precision",
            "character varying" => "varchar",
            other => other,
        },
        Dialect::Sqlite => match collapsed.as_str() {
            "bool" | "boolean" => "boolean",
            "int" | "integer" => "integer",
            other => other,
        },
    };

    Ok(canonical.to_string())
}
