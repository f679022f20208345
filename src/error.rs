use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sqlmorph
#[derive(Error, Debug)]
pub enum MorphError {
    // Desired-schema validation errors
    #[error("Invalid desired schema: {0}")]
    SchemaValidation(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Unrecognized type name {name:?} for dialect {dialect}: {message}")]
    UnknownTypeName {
        name: String,
        dialect: String,
        message: String,
    },

    // Introspection errors
    #[error("Introspection of {category} failed: {message}")]
    Introspection {
        category: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Database connection errors
    #[error("Failed to connect to database: {message}")]
    DatabaseConnection {
        message: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    // Apply-time errors
    #[error("Migration lock not acquired within {timeout_seconds}s - another sqlmorph apply may be running")]
    LockTimeout { timeout_seconds: u64 },

    #[error("Operation not supported on {dialect}: {message}")]
    UnsupportedOperation { dialect: String, message: String },

    #[error("Apply failed on operation {failed_operation}: {message} ({applied_count} operations applied before the failure)")]
    ApplyFailed {
        failed_operation: String,
        applied_count: usize,
        message: String,
    },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to load configuration from {path}: {message}")]
    ConfigLoad { path: PathBuf, message: String },

    // File system errors
    #[error("Failed to read {path}: {message}")]
    FileRead {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {message}")]
    FileWrite {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl From<tokio_postgres::Error> for MorphError {
    fn from(err: tokio_postgres::Error) -> Self {
        // tokio-postgres does not expose a connection-failure discriminant,
        // so fall back to inspecting the message
        if err.to_string().contains("connect") {
            MorphError::DatabaseConnection {
                message: err.to_string(),
                source: err,
            }
        } else {
            MorphError::Database {
                message: err.to_string(),
                source: err,
            }
        }
    }
}

impl From<std::io::Error> for MorphError {
    fn from(err: std::io::Error) -> Self {
        MorphError::Other(err.to_string())
    }
}

/// Result type alias for sqlmorph operations
pub type Result<T> = std::result::Result<T, MorphError>;

/// Helper function to format error with all its causes
pub fn format_error_chain(err: &MorphError) -> String {
    use std::error::Error;

    let mut output = format!("Error: {}", err);

    let mut current_err: &dyn Error = err;
    while let Some(source) = current_err.source() {
        output.push_str(&format!("\n  Caused by: {}", source));
        current_err = source;
    }

    output
}

/// Helper function to suggest fixes for common errors
pub fn suggest_fix(err: &MorphError) -> Option<String> {
    match err {
        MorphError::DatabaseConnection { .. } => Some(
            "Suggestions:\n\
             - Check if the database server is running\n\
             - Verify the connection string is correct\n\
             - Ensure the database exists and you have permission to access it"
                .to_string(),
        ),
        MorphError::InvalidConnectionString(_) => Some(
            "Connection string should be in format:\n\
             postgres://[user[:password]@][host][:port][/dbname][?param1=value1&...]"
                .to_string(),
        ),
        MorphError::LockTimeout { .. } => Some(
            "Another sqlmorph apply appears to hold the migration lock.\n\
             - Wait for it to finish, or\n\
             - Increase --lock-timeout if the other run is legitimate but slow"
                .to_string(),
        ),
        MorphError::SchemaValidation(_) => Some(
            "Review the desired schema file:\n\
             - Every table, index and constraint needs a non-empty name\n\
             - Index and constraint column lists must not be empty"
                .to_string(),
        ),
        MorphError::ApplyFailed { .. } => Some(
            "The target database is in a partially migrated state.\n\
             Review the list of operations applied before the failure and\n\
             repair manually before re-running apply."
                .to_string(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_failed_message_includes_progress() {
        let err = MorphError::ApplyFailed {
            failed_operation: "create_index idx_users_email".to_string(),
            applied_count: 3,
            message: "relation does not exist".to_string(),
        };

        let rendered = err.to_string();
        assert!(rendered.contains("create_index idx_users_email"));
        assert!(rendered.contains("3 operations applied"));
    }

    #[test]
    fn test_suggest_fix_for_lock_timeout() {
        let err = MorphError::LockTimeout { timeout_seconds: 30 };
        assert!(suggest_fix(&err).unwrap().contains("migration lock"));
    }

    #[test]
    fn test_format_error_chain_walks_sources() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = MorphError::FileRead {
            path: PathBuf::from("schema.toml"),
            message: "cannot open".to_string(),
            source: io_err,
        };

        let chain = format_error_chain(&err);
        assert!(chain.contains("schema.toml"));
        assert!(chain.contains("Caused by: no such file"));
    }
}
