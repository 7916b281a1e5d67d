//! Pure derivations from API payloads into dashboard figures.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::Serialize;

use crate::clock::{DAY_MS, HOUR_MS};
use crate::types::marketplace::{Order, Page, Product};
use crate::types::snapshot::TrendPoint;

pub const LOW_STOCK_THRESHOLD: i64 = 10;
pub const HIGH_VALUE_ORDER: f64 = 1_000.0;
pub const TREND_DAYS: u32 = 30;
pub const MOVING_ITEMS: usize = 10;
pub const TOP_CATEGORIES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub total_products: u64,
    pub active_products: u64,
    pub total_stock: i64,
    pub low_stock_items: u64,
    pub out_of_stock_items: u64,
}

pub fn summarize_products(page: &Page<Product>) -> ProductSummary {
    let mut summary = ProductSummary {
        total_products: page.total(),
        ..Default::default()
    };
    for product in &page.content {
        let stock = product.stock();
        summary.total_stock += stock.max(0);
        if stock <= 0 {
            summary.out_of_stock_items += 1;
        } else {
            if stock < LOW_STOCK_THRESHOLD {
                summary.low_stock_items += 1;
            }
            if product.approved != Some(false) {
                summary.active_products += 1;
            }
        }
    }
    summary
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub monthly_orders: u64,
    pub monthly_revenue: f64,
    pub average_order_value: f64,
    /// Delivered share of fetched orders, in percent.
    pub conversion_rate: f64,
    pub pending_orders: u64,
}

pub fn summarize_orders(page: &Page<Order>) -> OrderSummary {
    let mut revenue = 0.0;
    let mut delivered_value = 0.0;
    let mut delivered = 0u64;
    let mut pending = 0u64;
    for order in &page.content {
        revenue += order.value();
        if order.is_delivered() {
            delivered += 1;
            delivered_value += order.value();
        }
        if order.is_pending() {
            pending += 1;
        }
    }
    let fetched = page.content.len() as f64;
    OrderSummary {
        monthly_orders: page.total(),
        monthly_revenue: revenue,
        average_order_value: if delivered > 0 {
            delivered_value / delivered as f64
        } else {
            0.0
        },
        conversion_rate: if fetched > 0.0 {
            delivered as f64 / fetched * 100.0
        } else {
            0.0
        },
        pending_orders: pending,
    }
}

fn day_of(ms: u64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(ms as i64).map(|dt| dt.date_naive())
}

/// Daily sales and order counts for the `days` days ending at `now` (UTC),
/// oldest first. Days without orders are present with zeros.
pub fn sales_trend(orders: &[Order], now: u64, days: u32) -> Vec<TrendPoint> {
    let Some(today) = day_of(now) else {
        return Vec::new();
    };
    let mut buckets: BTreeMap<NaiveDate, (f64, u64)> = (0..days as i64)
        .map(|back| (today - ChronoDuration::days(back), (0.0, 0)))
        .collect();
    for order in orders {
        if let Some(day) = order.order_date.and_then(day_of) {
            if let Some(bucket) = buckets.get_mut(&day) {
                bucket.0 += order.value();
                bucket.1 += 1;
            }
        }
    }
    buckets
        .into_iter()
        .map(|(day, (sales, orders))| TrendPoint {
            date: day.format("%Y-%m-%d").to_string(),
            sales,
            orders,
        })
        .collect()
}

/// Revenue of orders placed within the hour before `now`.
pub fn sales_last_hour(orders: &[Order], now: u64) -> f64 {
    orders
        .iter()
        .filter(|o| {
            o.order_date
                .is_some_and(|d| d <= now && now - d < HOUR_MS)
        })
        .map(Order::value)
        .sum()
}

/// Orders placed on the same UTC day as `now`.
pub fn orders_on_day(orders: &[Order], now: u64) -> u64 {
    let Some(today) = day_of(now) else {
        return 0;
    };
    orders
        .iter()
        .filter(|o| o.order_date.and_then(day_of) == Some(today))
        .count() as u64
}

/// Union of two order lists; later duplicates (same order number) are dropped.
pub fn merge_orders(known: &[Order], incoming: Vec<Order>) -> Vec<Order> {
    let mut seen: HashSet<String> = known
        .iter()
        .filter(|o| !o.order_number.is_empty())
        .map(|o| o.order_number.clone())
        .collect();
    let mut merged = known.to_vec();
    for order in incoming {
        if order.order_number.is_empty() || seen.insert(order.order_number.clone()) {
            merged.push(order);
        }
    }
    merged
}

/// Start of the monthly order window.
pub fn month_start(now: u64) -> u64 {
    now.saturating_sub(TREND_DAYS as u64 * DAY_MS)
}

pub fn high_value_orders(orders: &[Order]) -> impl Iterator<Item = &Order> {
    orders.iter().filter(|o| o.value() > HIGH_VALUE_ORDER)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAlerts {
    pub out_of_stock: Vec<String>,
    pub low_stock: Vec<String>,
}

impl InventoryAlerts {
    pub fn total(&self) -> usize {
        self.out_of_stock.len() + self.low_stock.len()
    }
}

pub fn inventory_alerts(products: &[Product]) -> InventoryAlerts {
    let mut alerts = InventoryAlerts::default();
    for product in products {
        let stock = product.stock();
        if stock <= 0 {
            alerts.out_of_stock.push(product.title.clone());
        } else if stock < LOW_STOCK_THRESHOLD {
            alerts.low_stock.push(product.title.clone());
        }
    }
    alerts
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovingItems {
    pub fast: Vec<String>,
    pub slow: Vec<String>,
}

/// Rank by `salesCount`: the top `n` are fast movers, the bottom `n` slow movers.
pub fn moving_items(products: &[Product], n: usize) -> MovingItems {
    let mut ranked: Vec<&Product> = products.iter().collect();
    ranked.sort_by(|a, b| b.sales_count.unwrap_or(0).cmp(&a.sales_count.unwrap_or(0)));
    let fast = ranked.iter().take(n).map(|p| p.title.clone()).collect();
    let slow = ranked
        .iter()
        .skip(ranked.len().saturating_sub(n))
        .map(|p| p.title.clone())
        .collect();
    MovingItems { fast, slow }
}

/// 100, minus `(95 - success) * 2` below 95% success, minus up to 20 for
/// latency above one second. Never negative, whole points.
pub fn performance_score(success_rate: f64, average_latency_ms: f64) -> f64 {
    let mut score = 100.0;
    if success_rate < 95.0 {
        score -= (95.0 - success_rate) * 2.0;
    }
    if average_latency_ms > 1_000.0 {
        score -= ((average_latency_ms - 1_000.0) / 100.0).min(20.0);
    }
    score.max(0.0).floor()
}

/// Seller rating from the statistics payload, when the backend reports one.
pub fn average_rating(statistics: &serde_json::Value) -> Option<f64> {
    ["averageRating", "avgRating", "sellerScore"]
        .iter()
        .find_map(|key| statistics.get(key).and_then(serde_json::Value::as_f64))
}
