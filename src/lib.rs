pub mod app;
pub mod clean;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod executor;
pub mod logging;
pub mod output;
pub mod query;
pub mod resume;
pub mod sparql;
pub mod store;
pub mod table;
