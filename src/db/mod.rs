pub mod connection;
pub mod locks;

pub use connection::{connect_to_database, connect_with_url, DatabaseConfig};
pub use locks::MigrationLock;
