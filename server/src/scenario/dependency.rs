//! Simulated remote dependency

use async_trait::async_trait;
use bytes::Bytes;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Mutex;
use std::time::Duration;

use super::types::DependencyError;
use crate::config::DependencyConfig;

/// How long a "hung" call takes. Far beyond any per-attempt deadline.
const HUNG_CALL_DURATION: Duration = Duration::from_secs(300);

/// Trait for the remote service the retry-storm engine calls
#[async_trait]
pub trait Dependency: Send + Sync {
    /// Fetch the bytes of a resource
    async fn call(&self, resource_id: &str) -> Result<Bytes, DependencyError>;
}

/// What one call to the flaky dependency will do
#[derive(Debug, Clone, Copy, PartialEq)]
enum Behaviour {
    Respond(Duration),
    Fail(Duration),
    Hang,
}

/// Dependency with random latency that sometimes hangs and sometimes errors
pub struct FlakyDependency {
    rng: Mutex<ChaCha8Rng>,
    latency_min: Duration,
    latency_max: Duration,
    timeout_rate: f64,
    error_rate: f64,
}

impl FlakyDependency {
    pub fn new(config: &DependencyConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        Self {
            rng: Mutex::new(rng),
            latency_min: config.latency_min,
            latency_max: config.latency_max.max(config.latency_min),
            timeout_rate: config.timeout_rate.clamp(0.0, 1.0),
            error_rate: config.error_rate.clamp(0.0, 1.0),
        }
    }

    fn next_behaviour(&self) -> Behaviour {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let min = self.latency_min.as_millis() as u64;
        let max = self.latency_max.as_millis() as u64;
        let latency = Duration::from_millis(rng.random_range(min..=max));

        let roll: f64 = rng.random();
        if roll < self.timeout_rate {
            Behaviour::Hang
        } else if roll < self.timeout_rate + self.error_rate {
            Behaviour::Fail(latency)
        } else {
            Behaviour::Respond(latency)
        }
    }
}

#[async_trait]
impl Dependency for FlakyDependency {
    async fn call(&self, resource_id: &str) -> Result<Bytes, DependencyError> {
        match self.next_behaviour() {
            Behaviour::Respond(latency) => {
                tokio::time::sleep(latency).await;
                Ok(Bytes::from(format!("payload for {}", resource_id)))
            }
            Behaviour::Fail(latency) => {
                tokio::time::sleep(latency).await;
                Err(DependencyError::BadStatus {
                    resource_id: resource_id.to_string(),
                    status: 503,
                })
            }
            Behaviour::Hang => {
                tokio::time::sleep(HUNG_CALL_DURATION).await;
                Err(DependencyError::Unavailable(format!(
                    "no response for {} after {:?}",
                    resource_id, HUNG_CALL_DURATION
                )))
            }
        }
    }
}
