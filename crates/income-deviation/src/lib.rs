pub mod config;
pub mod deviation;
pub mod error;
pub mod telemetry;
