pub mod snapshot;
pub mod types;

pub use snapshot::{
    ColumnDef, ForeignKeyAction, ForeignKeyConstraint, IndexDef, PrimaryKeyConstraint,
    SchemaSnapshot, TableSnapshot, UniqueConstraint, RESERVED_TABLE_PREFIX,
};
pub use types::{normalize_type_name, Dialect};
