//! Inventory and order ledgers guarded by two independent locks
//!
//! `process_order` takes the inventory lock and then the order lock.
//! `restock_inventory` takes them in the opposite order. Both hold the first
//! lock across a randomized delay, so a concurrent order and restock on the
//! same item can each end up holding one lock while waiting forever for the
//! other. That ABBA deadlock is the behaviour this engine exists to produce;
//! the acquisition order must not be made consistent.

use chrono::Utc;
use indexmap::IndexMap;
use metrics::counter;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::stats::{LockOrderStats, StatsAggregator};
use super::types::{OrderRecord, OrderResult, OrderStatus, SimulationOutcome};
use crate::config::LockOrderConfig;

/// Item seeded at construction and targeted by simulations
pub const SHARED_ITEM_ID: &str = "ITEM-001";

/// Quantity each simulated order asks for
const SIMULATED_ORDER_QTY: u32 = 1;

/// Quantity each simulated restock adds
const SIMULATED_RESTOCK_QTY: u32 = 10;

pub struct LockOrderEngine {
    /// Resource A
    inventory: Mutex<HashMap<String, u32>>,
    /// Resource B
    orders: Mutex<IndexMap<String, OrderRecord>>,
    stats: Arc<StatsAggregator>,
    delay_min: Duration,
    delay_max: Duration,
}

impl LockOrderEngine {
    pub fn new(config: &LockOrderConfig, stats: Arc<StatsAggregator>) -> Self {
        let mut inventory = HashMap::new();
        inventory.insert(SHARED_ITEM_ID.to_string(), config.initial_inventory);

        Self {
            inventory: Mutex::new(inventory),
            orders: Mutex::new(IndexMap::new()),
            stats,
            delay_min: config.delay_min,
            delay_max: config.delay_max.max(config.delay_min),
        }
    }

    /// Random hold time between the two acquisitions
    fn contention_delay(&self) -> Duration {
        if self.delay_max.is_zero() {
            return Duration::ZERO;
        }
        let min = self.delay_min.as_micros() as u64;
        let max = self.delay_max.as_micros() as u64;
        Duration::from_micros(rand::rng().random_range(min..=max))
    }

    /// Reserve stock for an order: inventory lock first, then the order lock.
    pub async fn process_order(&self, order_id: &str, item_id: &str, qty: u32) -> OrderResult {
        let mut inventory = self.inventory.lock().await;
        debug!("Order {} holds inventory lock", order_id);

        tokio::time::sleep(self.contention_delay()).await;

        let mut orders = self.orders.lock().await;
        debug!("Order {} holds order lock", order_id);

        if orders.contains_key(order_id) {
            counter!("faultlab_orders_rejected_total").increment(1);
            warn!("Order {} rejected: id already in the ledger", order_id);
            return OrderResult::duplicate(order_id);
        }

        let available = inventory.get(item_id).copied().unwrap_or(0);
        if available < qty {
            counter!("faultlab_orders_rejected_total").increment(1);
            debug!(
                "Order {} rejected: wanted {} of {}, {} available",
                order_id, qty, item_id, available
            );
            return OrderResult::insufficient(available);
        }

        inventory.insert(item_id.to_string(), available - qty);
        orders.insert(
            order_id.to_string(),
            OrderRecord {
                id: order_id.to_string(),
                item_id: item_id.to_string(),
                quantity: qty,
                status: OrderStatus::Confirmed,
                created_at: Utc::now(),
            },
        );
        self.stats.record_successful_order();
        counter!("faultlab_orders_confirmed_total").increment(1);

        drop(orders);
        drop(inventory);

        info!("Order {} confirmed: {} x {}", order_id, qty, item_id);
        OrderResult::confirmed()
    }

    /// Add stock and confirm backorders it now covers: order lock first, then the inventory lock.
    pub async fn restock_inventory(&self, item_id: &str, qty: u32, reason: &str) {
        let mut orders = self.orders.lock().await;
        debug!("Restock of {} holds order lock", item_id);

        tokio::time::sleep(self.contention_delay()).await;

        let mut inventory = self.inventory.lock().await;
        debug!("Restock of {} holds inventory lock", item_id);

        let level = inventory.entry(item_id.to_string()).or_insert(0);
        *level = match level.checked_add(qty) {
            Some(sum) => sum,
            None => {
                warn!(
                    "Restock of {} by {} overflows level {}, capping at {}",
                    item_id,
                    qty,
                    *level,
                    u32::MAX
                );
                u32::MAX
            }
        };

        let mut promoted = 0;
        for order in orders.values_mut() {
            if order.item_id != item_id || order.status != OrderStatus::Pending {
                continue;
            }
            if order.quantity > *level {
                continue;
            }
            *level -= order.quantity;
            order.status = OrderStatus::Confirmed;
            self.stats.record_successful_order();
            promoted += 1;
        }
        let level = *level;

        drop(inventory);
        drop(orders);

        counter!("faultlab_restocks_total").increment(1);
        info!(
            "Restocked {} by {} ({}): level {}, {} backorders confirmed",
            item_id, qty, reason, level, promoted
        );
    }

    /// Record an order that waits for stock. Only takes the order lock.
    ///
    /// Returns `false` and leaves the ledger untouched when the id is taken.
    pub async fn place_backorder(&self, order_id: &str, item_id: &str, qty: u32) -> bool {
        let mut orders = self.orders.lock().await;
        if orders.contains_key(order_id) {
            warn!("Backorder {} rejected: id already in the ledger", order_id);
            return false;
        }
        orders.insert(
            order_id.to_string(),
            OrderRecord {
                id: order_id.to_string(),
                item_id: item_id.to_string(),
                quantity: qty,
                status: OrderStatus::Pending,
                created_at: Utc::now(),
            },
        );
        debug!("Backorder {} recorded for {} x {}", order_id, qty, item_id);
        true
    }

    /// Run orders and restocks against the shared item at the same time and
    /// wait for them up to `detection_timeout`.
    ///
    /// On timeout the workers are not cancelled. Any that are stuck inside the
    /// nested locks stay stuck for the rest of the process.
    pub async fn simulate_concurrent_operations(
        self: &Arc<Self>,
        n_orders: usize,
        n_restocks: usize,
        detection_timeout: Duration,
    ) -> SimulationOutcome {
        let start = Instant::now();
        let batch = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let workers = n_orders + n_restocks;
        info!(
            "Starting lock-order simulation {}: {} orders, {} restocks",
            batch, n_orders, n_restocks
        );

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(workers);
        for i in 0..n_orders {
            let engine = Arc::clone(self);
            let order_id = format!("SIM-{}-ORD-{}", batch, i);
            handles.push(tokio::spawn(async move {
                engine
                    .process_order(&order_id, SHARED_ITEM_ID, SIMULATED_ORDER_QTY)
                    .await;
            }));
        }
        for i in 0..n_restocks {
            let engine = Arc::clone(self);
            let reason = format!("simulation {} restock {}", batch, i);
            handles.push(tokio::spawn(async move {
                engine
                    .restock_inventory(SHARED_ITEM_ID, SIMULATED_RESTOCK_QTY, &reason)
                    .await;
            }));
        }

        let joined = tokio::time::timeout(detection_timeout, async {
            for handle in handles.iter_mut() {
                if let Err(e) = handle.await {
                    warn!("Lock-order worker failed: {}", e);
                }
            }
        })
        .await;

        if joined.is_ok() {
            info!(
                "Lock-order simulation {} completed in {:?}",
                batch,
                start.elapsed()
            );
            return SimulationOutcome::Completed { workers };
        }

        // Dropping the handles detaches the workers; nothing aborts them.
        let blocked = handles.iter().filter(|h| !h.is_finished()).count();
        self.stats.record_deadlock_detection(blocked as u64);
        counter!("faultlab_deadlock_detections_total").increment(1);
        warn!(
            "Deadlock suspected in simulation {}: {} of {} workers still blocked after {:?}",
            batch, blocked, workers, detection_timeout
        );

        SimulationOutcome::DeadlockSuspected { workers, blocked }
    }

    pub fn stats(&self) -> LockOrderStats {
        self.stats.lock_order()
    }

    /// Current stock of an item. Blocks while either simulation path holds the inventory lock.
    pub async fn inventory_level(&self, item_id: &str) -> u32 {
        self.inventory
            .lock()
            .await
            .get(item_id)
            .copied()
            .unwrap_or(0)
    }

    /// Orders in insertion order
    pub async fn orders(&self) -> Vec<OrderRecord> {
        self.orders.lock().await.values().cloned().collect()
    }
}
