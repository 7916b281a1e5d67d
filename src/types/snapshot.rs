use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field names shared by the snapshot producer and the renderer.
pub mod fields {
    pub const TOTAL_PRODUCTS: &str = "totalProducts";
    pub const MONTHLY_ORDERS: &str = "monthlyOrders";
    pub const MONTHLY_REVENUE: &str = "monthlyRevenue";
    pub const AVG_RATING: &str = "avgRating";
    pub const ORDERS_TODAY: &str = "ordersToday";
    pub const SALES_LAST_HOUR: &str = "salesLastHour";
    pub const ACTIVE_PRODUCTS: &str = "activeProducts";
    pub const PENDING_ORDERS: &str = "pendingOrders";
    pub const STOCK_ALERTS: &str = "stockAlerts";
    pub const TOTAL_STOCK: &str = "totalStock";
    pub const LOW_STOCK_ITEMS: &str = "lowStockItems";
    pub const OUT_OF_STOCK_ITEMS: &str = "outOfStockItems";
    pub const AVERAGE_ORDER_VALUE: &str = "averageOrderValue";
    pub const CONVERSION_RATE: &str = "conversionRate";
    pub const TOP_CATEGORIES: &str = "topCategories";
    pub const FAST_MOVING_ITEMS: &str = "fastMovingItems";
    pub const SLOW_MOVING_ITEMS: &str = "slowMovingItems";
    pub const PERFORMANCE_SCORE: &str = "performanceScore";
    pub const API_LATENCY_MS: &str = "apiLatencyMs";
    pub const API_SUCCESS_RATE: &str = "apiSuccessRate";
    pub const CACHE_HIT_RATE: &str = "cacheHitRate";
    pub const DATA_FRESHNESS_SECS: &str = "dataFreshnessSecs";
    pub const SYNC_QUEUE_DEPTH: &str = "syncQueueDepth";
    /// Epoch milliseconds of the refresh that produced the data.
    pub const LAST_SYNC_AT: &str = "lastSyncAt";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: String,
    pub sales: f64,
    pub orders: u64,
}

/// Point-in-time dashboard values. Never mutated after construction;
/// a refresh produces a new snapshot that replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    captured_at: u64,
    fields: BTreeMap<String, MetricValue>,
    #[serde(default)]
    sales_trend: Vec<TrendPoint>,
}

impl MetricSnapshot {
    pub fn empty(captured_at: u64) -> Self {
        Self {
            captured_at,
            fields: BTreeMap::new(),
            sales_trend: Vec::new(),
        }
    }

    pub fn builder(captured_at: u64) -> SnapshotBuilder {
        SnapshotBuilder {
            snapshot: Self::empty(captured_at),
        }
    }

    pub fn captured_at(&self) -> u64 {
        self.captured_at
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.fields.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.fields.get(name) {
            Some(MetricValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(MetricValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn sales_trend(&self) -> &[TrendPoint] {
        &self.sales_trend
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Start a successor snapshot that keeps every field of this one.
    pub fn successor(&self, captured_at: u64) -> SnapshotBuilder {
        SnapshotBuilder {
            snapshot: Self {
                captured_at,
                fields: self.fields.clone(),
                sales_trend: self.sales_trend.clone(),
            },
        }
    }
}

pub struct SnapshotBuilder {
    snapshot: MetricSnapshot,
}

impl SnapshotBuilder {
    pub fn number(mut self, name: &str, value: f64) -> Self {
        if value.is_finite() {
            self.snapshot
                .fields
                .insert(name.to_string(), MetricValue::Number(value));
        }
        self
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.snapshot
            .fields
            .insert(name.to_string(), MetricValue::Text(value.into()));
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.snapshot.fields.remove(name);
        self
    }

    pub fn sales_trend(mut self, trend: Vec<TrendPoint>) -> Self {
        self.snapshot.sales_trend = trend;
        self
    }

    pub fn build(self) -> MetricSnapshot {
        self.snapshot
    }
}
