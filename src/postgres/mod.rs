// ABOUTME: PostgreSQL target access module
// ABOUTME: Exports connection management, load encoders and the target database implementation

pub mod connection;
pub mod load;
pub mod target;
pub mod typemap;

pub use connection::{connect, connect_with_retry};
pub use target::PostgresTarget;
pub use typemap::mysql_to_postgres;
