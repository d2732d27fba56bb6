pub mod client;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod metrics;
pub mod percentiles;
pub mod report;
pub mod worker;
