pub mod apply;
pub mod init;
pub mod plan;

pub use apply::{execute_apply, ApplyResult};
pub use init::execute_init;
pub use plan::{execute_plan, PlanResult};

#[cfg(feature = "cli")]
pub use apply::print_apply_summary;
#[cfg(feature = "cli")]
pub use plan::print_plan_summary;

use crate::error::{MorphError, Result};
use crate::introspect::{introspect_snapshot, PostgresIntrospector};
use crate::schema::{Dialect, SchemaSnapshot};
use tokio_postgres::Client;

// Only the postgres family connects natively; the other dialects'
// introspectors run over an externally provided driver adapter.
pub(crate) async fn introspect_current(
    client: &Client,
    dialect: Dialect,
) -> Result<SchemaSnapshot> {
    match dialect {
        Dialect::Postgres => introspect_snapshot(&PostgresIntrospector::new(client)).await,
        Dialect::CockroachDb => {
            introspect_snapshot(&PostgresIntrospector::cockroachdb(client)).await
        }
        other => Err(MorphError::Configuration(format!(
            "live introspection for {} requires an external driver adapter",
            other
        ))),
    }
}
