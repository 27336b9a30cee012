//! FaultLab Server Library
//!
//! This module exports the scenario engines and HTTP routes for use in
//! integration tests and external tooling.

pub mod config;
pub mod health;
pub mod scenario;

// Re-export commonly used types
pub use config::Config;
pub use scenario::{ScenarioAppState, ScenarioCoordinator, ScenarioStats, scenario_routes};
