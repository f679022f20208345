//! The apply command: compute the operations and execute them against the
//! database inside a transaction, under the cross-process migration lock.

use super::introspect_current;
use crate::config::{DesiredSchemaFile, MorphConfig};
use crate::consolidate::consolidate;
use crate::db::{connect_with_url, MigrationLock};
use crate::diff::diff_schema;
use crate::error::{MorphError, Result};
use crate::exec::{execute_operations, TransactionChannel};
use crate::introspect::reconcile_system_artifacts;
use crate::ops::Operation;
use crate::sort::sort_operations_by_dependency;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct ApplyResult {
    pub operations: Vec<Operation>,
    pub duration: Duration,
}

pub async fn execute_apply(config: &MorphConfig) -> Result<ApplyResult> {
    let started = Instant::now();
    let dialect = config.resolve_dialect()?;
    let schema_path = config.resolve_schema_file();
    let ideal = DesiredSchemaFile::load(&schema_path)?.into_snapshot(dialect)?;

    let connection_string = config.connection_string.as_deref().ok_or_else(|| {
        MorphError::Configuration("no database connection string configured".to_string())
    })?;
    let mut client = connect_with_url(connection_string).await?;

    let current = introspect_current(&client, dialect).await?;
    let current = reconcile_system_artifacts(current, &ideal);

    let operations = sort_operations_by_dependency(consolidate(diff_schema(&current, &ideal)));
    if operations.is_empty() {
        info!("database matches the desired schema");
        return Ok(ApplyResult {
            operations,
            duration: started.elapsed(),
        });
    }

    let mut lock = MigrationLock::new(connection_string);
    lock.acquire(&client, config.lock_timeout()).await?;

    // DDL runs in one transaction; on any failure the transaction is
    // dropped uncommitted and nothing sticks.
    let apply_result = run_in_transaction(&mut client, dialect, &operations).await;

    if let Err(e) = lock.release(&client).await {
        warn!("failed to release migration lock: {}", e);
    }
    apply_result?;

    info!(
        operations = operations.len(),
        "apply finished in {}",
        crate::logging::format_duration(started.elapsed())
    );

    Ok(ApplyResult {
        operations,
        duration: started.elapsed(),
    })
}

async fn run_in_transaction(
    client: &mut tokio_postgres::Client,
    dialect: crate::schema::Dialect,
    operations: &[Operation],
) -> Result<()> {
    let transaction = client.transaction().await.map_err(|e| MorphError::Database {
        message: "cannot open transaction".to_string(),
        source: e,
    })?;

    let mut channel = TransactionChannel::new(&transaction);
    execute_operations(dialect, operations, &mut channel).await?;

    transaction.commit().await.map_err(|e| MorphError::Database {
        message: "cannot commit transaction".to_string(),
        source: e,
    })
}

#[cfg(feature = "cli")]
pub fn print_apply_summary(result: &ApplyResult) {
    use crate::logging::{format_duration, output};

    if result.operations.is_empty() {
        output::success("Database matches the desired schema, nothing to do");
        return;
    }

    output::header(format!("Applied {} operation(s)", result.operations.len()));
    for op in &result.operations {
        output::success(op.to_string());
    }
    println!("\nfinished in {}", format_duration(result.duration));
}
