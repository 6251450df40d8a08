//! Database layer - source connection, identifier validation, value rendering

pub mod connection;
pub mod identifier;
pub mod value;

pub use connection::{ConnectionParams, ConnectionParamsBuilder, SourceConnection};
pub use identifier::TableName;
