//! Plan/apply execution boundary.
//!
//! The sorted operation list is consumed here, strictly sequentially:
//! later operations may depend on earlier ones having committed. The
//! statement-execution channel is an injected capability, so plan mode
//! swaps a capturing channel in for the live one behind the same
//! interface and runs the exact rendering code path that apply runs.

pub mod ddl;

use crate::error::{MorphError, Result};
use crate::ops::{MigrationPlan, Operation};
use crate::schema::Dialect;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

pub use ddl::render_operation;

/// Capability to execute one DDL statement.
pub trait StatementChannel {
    fn execute(&mut self, sql: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Records rendered statements without sending them anywhere.
#[derive(Debug, Default)]
pub struct CapturingChannel {
    statements: Vec<String>,
}

impl CapturingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }
}

impl StatementChannel for CapturingChannel {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.statements.push(sql.to_string());
        Ok(())
    }
}

/// Live channel over an open database transaction.
///
/// Commit and rollback stay with the caller; the channel only executes.
pub struct TransactionChannel<'a, 'b> {
    transaction: &'a tokio_postgres::Transaction<'b>,
}

impl<'a, 'b> TransactionChannel<'a, 'b> {
    pub fn new(transaction: &'a tokio_postgres::Transaction<'b>) -> Self {
        Self { transaction }
    }
}

impl StatementChannel for TransactionChannel<'_, '_> {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql, "executing");
        self.transaction
            .batch_execute(sql)
            .await
            .map_err(|e| MorphError::Database {
                message: format!("DDL statement failed: {}", sql),
                source: e,
            })
    }
}

/// Render and execute the sorted operations, in order, over the given
/// channel. Returns the number of operations executed.
///
/// On a statement failure the remaining operations are abandoned and the
/// error reports the failing operation plus how many operations completed
/// before it; whether those are rolled back is the caller's transaction
/// decision.
pub async fn execute_operations<S: StatementChannel>(
    dialect: Dialect,
    operations: &[Operation],
    channel: &mut S,
) -> Result<usize> {
    for (applied, op) in operations.iter().enumerate() {
        op.validate()?;
        let statements = render_operation(dialect, op)?;
        for sql in &statements {
            if let Err(e) = channel.execute(sql).await {
                return Err(MorphError::ApplyFailed {
                    failed_operation: op.to_string(),
                    applied_count: applied,
                    message: e.to_string(),
                });
            }
        }
        info!(operation = %op, "applied");
    }
    Ok(operations.len())
}

/// Render the operations to SQL without touching a database.
pub async fn render_plan_sql(dialect: Dialect, operations: &[Operation]) -> Result<Vec<String>> {
    let mut channel = CapturingChannel::new();
    execute_operations(dialect, operations, &mut channel).await?;
    Ok(channel.into_statements())
}

/// sha256 over the rendered statements, for change detection between a
/// reviewed plan and a later apply.
pub fn plan_checksum(statements: &[String]) -> String {
    let mut hasher = Sha256::new();
    for sql in statements {
        hasher.update(sql.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Package sorted operations as a serializable plan.
pub async fn build_plan(dialect: Dialect, operations: Vec<Operation>) -> Result<MigrationPlan> {
    let statements = render_plan_sql(dialect, &operations).await?;
    Ok(MigrationPlan {
        dialect,
        generated_at: Utc::now(),
        checksum: plan_checksum(&statements),
        operations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, TableSnapshot};
    use std::collections::BTreeMap;

    fn create_users() -> Operation {
        let mut columns = BTreeMap::new();
        columns.insert(
            "id".to_string(),
            ColumnDef {
                type_name: "uuid".to_string(),
                not_null: true,
                primary_key: false,
                unique: false,
                default_sql: None,
            },
        );
        Operation::CreateTable {
            table: TableSnapshot {
                name: "users".to_string(),
                columns,
            },
        }
    }

    struct FailingChannel {
        fail_on: usize,
        executed: usize,
    }

    impl StatementChannel for FailingChannel {
        async fn execute(&mut self, _sql: &str) -> Result<()> {
            if self.executed == self.fail_on {
                return Err(MorphError::Internal("boom".to_string()));
            }
            self.executed += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_capturing_channel_records_in_order() {
        let ops = vec![
            create_users(),
            Operation::DropTable {
                table: "legacy".to_string(),
            },
        ];

        let statements = render_plan_sql(crate::schema::Dialect::Postgres, &ops)
            .await
            .unwrap();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE \"users\""));
        assert_eq!(statements[1], "DROP TABLE \"legacy\"");
    }

    #[tokio::test]
    async fn test_failure_reports_operation_and_progress() {
        let ops = vec![
            create_users(),
            Operation::DropTable {
                table: "legacy".to_string(),
            },
        ];
        let mut channel = FailingChannel {
            fail_on: 1,
            executed: 0,
        };

        let err = execute_operations(crate::schema::Dialect::Postgres, &ops, &mut channel)
            .await
            .unwrap_err();
        match err {
            MorphError::ApplyFailed {
                failed_operation,
                applied_count,
                ..
            } => {
                assert_eq!(failed_operation, "drop_table legacy");
                assert_eq!(applied_count, 1);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_checksum_is_stable_for_same_operations() {
        let ops = vec![create_users()];
        let a = build_plan(crate::schema::Dialect::Postgres, ops.clone())
            .await
            .unwrap();
        let b = build_plan(crate::schema::Dialect::Postgres, ops).await.unwrap();
        assert_eq!(a.checksum, b.checksum);
    }

    #[tokio::test]
    async fn test_invalid_operation_fails_before_execution() {
        let ops = vec![Operation::DropTable {
            table: "".to_string(),
        }];
        let mut channel = CapturingChannel::new();

        let err = execute_operations(crate::schema::Dialect::Postgres, &ops, &mut channel)
            .await
            .unwrap_err();
        assert!(matches!(err, MorphError::InvalidOperation(_)));
        assert!(channel.statements().is_empty());
    }
}
