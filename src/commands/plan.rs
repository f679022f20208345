//! The plan command: compute the operations that would bring the database
//! to the desired schema and render them as SQL, without executing.

use super::introspect_current;
use crate::config::{DesiredSchemaFile, MorphConfig};
use crate::consolidate::consolidate;
use crate::db::connect_with_url;
use crate::diff::diff_schema;
use crate::error::{MorphError, Result};
use crate::exec::{plan_checksum, render_plan_sql};
use crate::introspect::reconcile_system_artifacts;
use crate::ops::MigrationPlan;
use crate::sort::sort_operations_by_dependency;
use chrono::Utc;
use std::fs;
use std::path::Path;
use tracing::info;

pub struct PlanResult {
    pub plan: MigrationPlan,
    pub statements: Vec<String>,
}

impl PlanResult {
    pub fn is_empty(&self) -> bool {
        self.plan.operations.is_empty()
    }
}

pub async fn execute_plan(config: &MorphConfig, output: Option<&Path>) -> Result<PlanResult> {
    let dialect = config.resolve_dialect()?;
    let schema_path = config.resolve_schema_file();
    let ideal = DesiredSchemaFile::load(&schema_path)?.into_snapshot(dialect)?;

    let connection_string = config.connection_string.as_deref().ok_or_else(|| {
        MorphError::Configuration("no database connection string configured".to_string())
    })?;
    let client = connect_with_url(connection_string).await?;

    let current = introspect_current(&client, dialect).await?;
    let current = reconcile_system_artifacts(current, &ideal);

    let operations = sort_operations_by_dependency(consolidate(diff_schema(&current, &ideal)));
    info!(operations = operations.len(), "plan computed");

    let statements = render_plan_sql(dialect, &operations).await?;
    let plan = MigrationPlan {
        dialect,
        generated_at: Utc::now(),
        checksum: plan_checksum(&statements),
        operations,
    };

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&plan)
            .map_err(|e| MorphError::Internal(format!("cannot serialize plan: {}", e)))?;
        fs::write(path, json).map_err(|e| MorphError::FileWrite {
            path: path.to_path_buf(),
            message: "cannot write plan file".to_string(),
            source: e,
        })?;
        info!(path = %path.display(), "plan written");
    }

    Ok(PlanResult { plan, statements })
}

#[cfg(feature = "cli")]
pub fn print_plan_summary(result: &PlanResult) {
    use crate::logging::output;

    if result.is_empty() {
        output::success("Database matches the desired schema, nothing to do");
        return;
    }

    output::header(format!(
        "Plan: {} operation(s) for {}",
        result.plan.operations.len(),
        result.plan.dialect
    ));
    for op in &result.plan.operations {
        output::step(op.to_string());
    }

    output::header("SQL");
    for sql in &result.statements {
        println!("{};", sql);
    }

    println!("\nchecksum: {}", result.plan.checksum);
}
