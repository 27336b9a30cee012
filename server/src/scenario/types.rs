//! Scenario data types and error definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error returned by a single call to the simulated dependency
#[derive(Debug, Clone, Error)]
pub enum DependencyError {
    #[error("Dependency unavailable: {0}")]
    Unavailable(String),

    #[error("Dependency returned status {status} for {resource_id}")]
    BadStatus { resource_id: String, status: u16 },
}

/// Why a single attempt failed
#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

/// Errors surfaced by the retry-storm engine
#[derive(Debug, Error)]
pub enum RetryStormError {
    #[error("Fetching {resource_id} failed after {attempts} attempts")]
    OperationFailed {
        resource_id: String,
        attempts: u32,
        #[source]
        source: AttemptError,
    },
}

/// Outcome of one attempt, recorded for tracing only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Ok,
    Timeout,
    Error,
}

/// One try of a simulated remote fetch
#[derive(Debug, Clone)]
pub struct CallAttempt {
    pub resource_id: String,
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
}

/// Order lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
}

/// An order held in the order ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub item_id: String,
    pub quantity: u32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Result of processing an order. Insufficient stock is reported here, not as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub message: String,
}

impl OrderResult {
    pub fn confirmed() -> Self {
        Self {
            success: true,
            message: "Order confirmed".to_string(),
        }
    }

    pub fn insufficient(available: u32) -> Self {
        Self {
            success: false,
            message: format!("Insufficient inventory. Available: {}", available),
        }
    }

    pub fn duplicate(order_id: &str) -> Self {
        Self {
            success: false,
            message: format!("Order {} already exists", order_id),
        }
    }
}

/// How a concurrent lock-order simulation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SimulationOutcome {
    /// Every worker finished before the detection timeout
    Completed { workers: usize },
    /// The detection timeout fired; `blocked` workers were left running
    DeadlockSuspected { workers: usize, blocked: usize },
}

/// Summary of one batch fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
}
