//! Infrastructure layer: record source, result store, downstream clients,
//! the job dispatcher and consumer, and the consumer worker loop.

pub mod config;
pub mod downstream;
pub mod jobs;
pub mod records;
pub mod results;
pub mod workers;


pub use config::{AppConfig, ConfigError, TableName};
