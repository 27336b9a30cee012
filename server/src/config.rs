//! Server configuration
//!
//! Configuration is loaded from environment variables. Every value has a default
//! so the server starts with no environment at all.

use std::env;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,

    /// Memory-leak scenario configuration
    pub cache: CacheConfig,

    /// Deadlock scenario configuration
    pub lock_order: LockOrderConfig,

    /// Retry-storm scenario configuration
    pub retry: RetryConfig,

    /// Simulated remote dependency configuration
    pub dependency: DependencyConfig,
}

/// Cache growth (memory leak) configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether the periodic leak loop runs
    pub periodic_enabled: bool,
    /// Interval between periodic inserts
    pub periodic_interval: Duration,
    /// Size of each synthetic payload in bytes
    pub payload_bytes: usize,
    /// Simulated processing time before each insert
    pub processing_delay: Duration,
}

/// Lock-order (deadlock) configuration
#[derive(Debug, Clone)]
pub struct LockOrderConfig {
    /// Lower bound of the delay held between the two lock acquisitions
    pub delay_min: Duration,
    /// Upper bound of the delay held between the two lock acquisitions
    pub delay_max: Duration,
    /// How long the coordinator waits before declaring a deadlock
    pub detection_timeout: Duration,
    /// Initial stock of the shared item
    pub initial_inventory: u32,
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per logical fetch
    pub max_attempts: u32,
    /// Deadline applied to each attempt on its own
    pub per_attempt_timeout: Duration,
    /// Unit of the linear backoff applied after non-timeout errors
    pub backoff_unit: Duration,
}

/// Flaky dependency configuration
#[derive(Debug, Clone)]
pub struct DependencyConfig {
    /// Minimum latency of a healthy call
    pub latency_min: Duration,
    /// Maximum latency of a healthy call
    pub latency_max: Duration,
    /// Probability that a call hangs past the attempt deadline
    pub timeout_rate: f64,
    /// Probability that a call returns an error
    pub error_rate: f64,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cache: CacheConfig::default(),
            lock_order: LockOrderConfig::default(),
            retry: RetryConfig::default(),
            dependency: DependencyConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            periodic_enabled: false,
            periodic_interval: Duration::from_secs(30),
            payload_bytes: 10 * 1024 * 1024, // 10 MiB
            processing_delay: Duration::from_millis(10),
        }
    }
}

impl Default for LockOrderConfig {
    fn default() -> Self {
        Self {
            delay_min: Duration::from_millis(10),
            delay_max: Duration::from_millis(50),
            detection_timeout: Duration::from_secs(10),
            initial_inventory: 100,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(2),
            backoff_unit: Duration::from_millis(100),
        }
    }
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            latency_min: Duration::from_millis(50),
            latency_max: Duration::from_millis(500),
            timeout_rate: 0.3,
            error_rate: 0.2,
            seed: None,
        }
    }
}

fn parse_bool(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        // Cache config
        if let Ok(val) = env::var("CACHE_LEAK_ENABLED") {
            config.cache.periodic_enabled = parse_bool(&val);
        }
        if let Ok(val) = env::var("CACHE_LEAK_INTERVAL_SECS")
            && let Ok(secs) = val.parse::<u64>()
            && secs > 0
        {
            config.cache.periodic_interval = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("CACHE_PAYLOAD_BYTES")
            && let Ok(bytes) = val.parse()
        {
            config.cache.payload_bytes = bytes;
        }
        if let Ok(val) = env::var("CACHE_PROCESSING_DELAY_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.cache.processing_delay = Duration::from_millis(ms);
        }

        // Lock-order config
        if let Ok(val) = env::var("LOCK_DELAY_MIN_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.lock_order.delay_min = Duration::from_millis(ms);
        }
        if let Ok(val) = env::var("LOCK_DELAY_MAX_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.lock_order.delay_max = Duration::from_millis(ms);
        }
        if config.lock_order.delay_max < config.lock_order.delay_min {
            config.lock_order.delay_max = config.lock_order.delay_min;
        }
        if let Ok(val) = env::var("DEADLOCK_DETECTION_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.lock_order.detection_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("INITIAL_INVENTORY")
            && let Ok(qty) = val.parse()
        {
            config.lock_order.initial_inventory = qty;
        }

        // Retry config
        if let Ok(val) = env::var("RETRY_MAX_ATTEMPTS")
            && let Ok(n) = val.parse::<u32>()
            && n > 0
        {
            config.retry.max_attempts = n;
        }
        if let Ok(val) = env::var("RETRY_ATTEMPT_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.retry.per_attempt_timeout = Duration::from_millis(ms);
        }
        if let Ok(val) = env::var("RETRY_BACKOFF_UNIT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.retry.backoff_unit = Duration::from_millis(ms);
        }

        // Dependency config
        if let Ok(val) = env::var("DEPENDENCY_LATENCY_MIN_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.dependency.latency_min = Duration::from_millis(ms);
        }
        if let Ok(val) = env::var("DEPENDENCY_LATENCY_MAX_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.dependency.latency_max = Duration::from_millis(ms);
        }
        if config.dependency.latency_max < config.dependency.latency_min {
            config.dependency.latency_max = config.dependency.latency_min;
        }
        if let Ok(val) = env::var("DEPENDENCY_TIMEOUT_RATE")
            && let Ok(rate) = val.parse::<f64>()
        {
            config.dependency.timeout_rate = rate.clamp(0.0, 1.0);
        }
        if let Ok(val) = env::var("DEPENDENCY_ERROR_RATE")
            && let Ok(rate) = val.parse::<f64>()
        {
            config.dependency.error_rate = rate.clamp(0.0, 1.0);
        }
        if let Ok(val) = env::var("DEPENDENCY_SEED")
            && let Ok(seed) = val.parse()
        {
            config.dependency.seed = Some(seed);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.cache.payload_bytes, 10_485_760);
        assert!(!config.cache.periodic_enabled);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.lock_order.initial_inventory, 100);
    }

    #[test]
    fn test_lock_delay_window_is_ordered() {
        let config = Config::default();
        assert!(config.lock_order.delay_min <= config.lock_order.delay_max);
        assert!(config.dependency.latency_min <= config.dependency.latency_max);
    }

    #[test]
    fn test_config_from_env() {
        // This test doesn't set env vars, so it should return defaults
        let config = Config::from_env();
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("yes"));
    }
}
