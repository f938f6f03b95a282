//! Application services layer.

pub mod error;
pub mod flush;
pub mod repos;
