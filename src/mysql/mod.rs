// ABOUTME: MySQL source access module
// ABOUTME: Exports connection helpers and the source database implementation

pub mod connection;
pub mod source;

pub use connection::connect;
pub use source::MysqlSource;
