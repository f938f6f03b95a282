//! Infrastructure adapters and runtime bootstrap.

pub mod assets;
pub mod cloudfront;
pub mod db;
pub mod error;
pub mod telemetry;
