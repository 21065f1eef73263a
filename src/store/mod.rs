//! Durable persistence for tasks and the conversation log.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{ChatMessage, Database};
