pub mod config;
pub mod error;
pub mod settlement;
pub mod telemetry;
