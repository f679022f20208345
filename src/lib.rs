//! sqlmorph: declarative database-schema migration.
//!
//! Given a desired schema and the live structure of a target database,
//! sqlmorph computes the minimal ordered set of structural operations
//! needed to transform the latter into the former, then either renders
//! those operations as SQL for review (plan) or executes them (apply).
//!
//! The pipeline is diff -> consolidate -> sort -> execute; each stage is
//! independently callable and independently testable:
//!
//! ```
//! use sqlmorph::{diff_schema, consolidate, sort_operations_by_dependency, SchemaSnapshot};
//!
//! let current = SchemaSnapshot::default();
//! let ideal = SchemaSnapshot::default();
//! let operations =
//!     sort_operations_by_dependency(consolidate(diff_schema(&current, &ideal)));
//! assert!(operations.is_empty());
//! ```

#[cfg(feature = "cli")]
pub mod cli;
pub mod commands;
pub mod config;
pub mod consolidate;
pub mod db;
pub mod diff;
pub mod error;
pub mod exec;
pub mod introspect;
pub mod logging;
pub mod ops;
pub mod schema;
pub mod sort;

pub use consolidate::consolidate;
pub use diff::diff_schema;
pub use error::{MorphError, Result};
pub use exec::{
    execute_operations, render_operation, render_plan_sql, CapturingChannel, StatementChannel,
};
pub use introspect::{introspect_snapshot, reconcile_system_artifacts, SchemaIntrospector};
pub use ops::{MigrationPlan, Operation};
pub use schema::{Dialect, SchemaSnapshot};
pub use sort::sort_operations_by_dependency;

/// The full planning pipeline over two assembled snapshots.
pub fn plan_operations(current: &SchemaSnapshot, ideal: &SchemaSnapshot) -> Vec<Operation> {
    sort_operations_by_dependency(consolidate(diff_schema(current, ideal)))
}
