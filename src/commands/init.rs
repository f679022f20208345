//! The init command: write sample configuration and schema files to start
//! a new project from.

use crate::config::{MorphConfig, DEFAULT_SCHEMA_FILE};
use crate::error::{MorphError, Result};
use std::fs;
use std::path::PathBuf;

const SAMPLE_SCHEMA: &str = r#"# Desired schema for sqlmorph.
#
# Declare tables, columns, indexes and constraints here; `sqlmorph plan`
# shows the operations needed to get the database there, `sqlmorph apply`
# executes them.

[tables.users.columns.id]
type = "uuid"
not_null = true

[tables.users.columns.email]
type = "text"
not_null = true

[[primary_key_constraints]]
table = "users"
name = "pk_users_id"
columns = ["id"]

[[unique_constraints]]
table = "users"
name = "uq_users_email"
columns = ["email"]
"#;

pub fn execute_init() -> Result<()> {
    MorphConfig::write_sample_config()?;

    let schema_path = PathBuf::from(format!("{}.example", DEFAULT_SCHEMA_FILE));
    fs::write(&schema_path, SAMPLE_SCHEMA).map_err(|e| MorphError::FileWrite {
        path: schema_path,
        message: "cannot write sample schema".to_string(),
        source: e,
    })?;

    #[cfg(feature = "cli")]
    {
        use crate::config::CONFIG_FILE;
        use crate::logging::output;
        output::success(format!("wrote {}.example", CONFIG_FILE));
        output::success(format!("wrote {}.example", DEFAULT_SCHEMA_FILE));
        output::info("rename both files to drop the .example suffix, then edit them");
    }

    Ok(())
}
