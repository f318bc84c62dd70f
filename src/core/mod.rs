//! Scenario logic, shared types and errors

pub mod checks;
pub mod context;
pub mod error;
pub mod scenario;
pub mod types;
