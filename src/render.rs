//! Projection of a [`MetricSnapshot`] onto the dashboard page bindings.

use std::io::Write;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::events::{event_names, to_notification, ChartUpdate, ConnectionUpdate, ElementUpdate};
use crate::types::snapshot::{fields, MetricSnapshot};
use crate::types::sync::ConnectionStatus;

pub const PLACEHOLDER: &str = "—";
pub const SALES_CHART_ID: &str = "trendyolSalesChart";

pub mod selectors {
    pub const TOTAL_PRODUCTS: &str = "#trendyol-total-products";
    pub const MONTHLY_ORDERS: &str = "#trendyol-monthly-orders";
    pub const MONTHLY_REVENUE: &str = "#trendyol-monthly-revenue";
    pub const AVG_RATING: &str = "#trendyol-avg-rating";
    pub const ORDERS_TODAY: &str = "#trendyol-orders-today";
    pub const SALES_LAST_HOUR: &str = "#trendyol-sales-last-hour";
    pub const ACTIVE_PRODUCTS: &str = "#trendyol-active-products";
    pub const PENDING_ORDERS: &str = "#trendyol-pending-orders";
    pub const STOCK_ALERTS: &str = "#trendyol-stock-alerts";
    pub const TOTAL_STOCK: &str = "#trendyol-total-stock";
    pub const LOW_STOCK_ITEMS: &str = "#trendyol-low-stock-items";
    pub const OUT_OF_STOCK_ITEMS: &str = "#trendyol-out-of-stock-items";
    pub const AVERAGE_ORDER_VALUE: &str = "#trendyol-average-order-value";
    pub const CONVERSION_RATE: &str = "#trendyol-conversion-rate";
    pub const TOP_CATEGORIES: &str = "#trendyol-top-categories";
    pub const FAST_MOVING_ITEMS: &str = "#trendyol-fast-moving-items";
    pub const SLOW_MOVING_ITEMS: &str = "#trendyol-slow-moving-items";
    pub const PERFORMANCE_SCORE: &str = "#performance-score";
    pub const API_LATENCY: &str = "#trendyol-api-latency";
    pub const API_SUCCESS_RATE: &str = "#trendyol-api-success-rate";
    pub const CACHE_HIT_RATE: &str = "#trendyol-cache-hit-rate";
    pub const DATA_FRESHNESS: &str = "#trendyol-data-freshness";
    pub const SYNC_QUEUE_DEPTH: &str = "#trendyol-sync-queue";
    pub const LAST_SYNC_TIME: &str = ".last-sync-time";
    pub const CONNECTION_DOT: &str = ".trendyol-connection-dot";
    pub const CONNECTION_TEXT: &str = ".trendyol-connection-text";
}

#[derive(Debug, Clone, Copy)]
enum Format {
    Count,
    Currency,
    Rating,
    Percent,
    Millis,
    Seconds,
    ClockTime,
}

const BINDINGS: &[(&str, &str, Format)] = &[
    (selectors::TOTAL_PRODUCTS, fields::TOTAL_PRODUCTS, Format::Count),
    (selectors::MONTHLY_ORDERS, fields::MONTHLY_ORDERS, Format::Count),
    (selectors::MONTHLY_REVENUE, fields::MONTHLY_REVENUE, Format::Currency),
    (selectors::AVG_RATING, fields::AVG_RATING, Format::Rating),
    (selectors::ORDERS_TODAY, fields::ORDERS_TODAY, Format::Count),
    (selectors::SALES_LAST_HOUR, fields::SALES_LAST_HOUR, Format::Currency),
    (selectors::ACTIVE_PRODUCTS, fields::ACTIVE_PRODUCTS, Format::Count),
    (selectors::PENDING_ORDERS, fields::PENDING_ORDERS, Format::Count),
    (selectors::STOCK_ALERTS, fields::STOCK_ALERTS, Format::Count),
    (selectors::TOTAL_STOCK, fields::TOTAL_STOCK, Format::Count),
    (selectors::LOW_STOCK_ITEMS, fields::LOW_STOCK_ITEMS, Format::Count),
    (selectors::OUT_OF_STOCK_ITEMS, fields::OUT_OF_STOCK_ITEMS, Format::Count),
    (selectors::AVERAGE_ORDER_VALUE, fields::AVERAGE_ORDER_VALUE, Format::Currency),
    (selectors::CONVERSION_RATE, fields::CONVERSION_RATE, Format::Percent),
    (selectors::TOP_CATEGORIES, fields::TOP_CATEGORIES, Format::Count),
    (selectors::FAST_MOVING_ITEMS, fields::FAST_MOVING_ITEMS, Format::Count),
    (selectors::SLOW_MOVING_ITEMS, fields::SLOW_MOVING_ITEMS, Format::Count),
    (selectors::PERFORMANCE_SCORE, fields::PERFORMANCE_SCORE, Format::Count),
    (selectors::API_LATENCY, fields::API_LATENCY_MS, Format::Millis),
    (selectors::API_SUCCESS_RATE, fields::API_SUCCESS_RATE, Format::Percent),
    (selectors::CACHE_HIT_RATE, fields::CACHE_HIT_RATE, Format::Percent),
    (selectors::DATA_FRESHNESS, fields::DATA_FRESHNESS_SECS, Format::Seconds),
    (selectors::SYNC_QUEUE_DEPTH, fields::SYNC_QUEUE_DEPTH, Format::Count),
    (selectors::LAST_SYNC_TIME, fields::LAST_SYNC_AT, Format::ClockTime),
];

/// Where rendered values go. Implementations must not block for long;
/// they are called from scheduler tasks.
pub trait DashboardSink: Send + Sync {
    fn set_text(&self, selector: &str, value: &str);
    fn set_chart(&self, chart: &ChartUpdate);
    fn set_connection(&self, update: &ConnectionUpdate);
}

/// Write every bound element, the sales chart and the connection indicator.
/// Fields missing from the snapshot render as [`PLACEHOLDER`].
pub fn render(snapshot: &MetricSnapshot, status: ConnectionStatus, sink: &dyn DashboardSink) {
    for (selector, field, format) in BINDINGS {
        let value = match (snapshot.number(field), snapshot.text(field)) {
            (Some(n), _) => apply(*format, n),
            (None, Some(text)) => text.to_string(),
            (None, None) => PLACEHOLDER.to_string(),
        };
        sink.set_text(selector, &value);
    }
    let trend = snapshot.sales_trend();
    sink.set_chart(&ChartUpdate {
        chart_id: SALES_CHART_ID.to_string(),
        labels: trend.iter().map(|p| p.date.clone()).collect(),
        sales: trend.iter().map(|p| p.sales).collect(),
        orders: trend.iter().map(|p| p.orders).collect(),
    });
    render_connection(status, sink);
}

pub fn render_connection(status: ConnectionStatus, sink: &dyn DashboardSink) {
    sink.set_connection(&ConnectionUpdate {
        dot_selector: selectors::CONNECTION_DOT.to_string(),
        text_selector: selectors::CONNECTION_TEXT.to_string(),
        status,
        text: status.label().to_string(),
    });
}

fn apply(format: Format, value: f64) -> String {
    match format {
        Format::Count => format_number(value),
        Format::Currency => format_currency(value),
        Format::Rating => format!("{:.1}", value),
        Format::Percent => format_percent(value),
        Format::Millis => format!("{} ms", group_tr(value.round(), 0)),
        Format::Seconds => format!("{} sn", group_tr(value.round(), 0)),
        Format::ClockTime => format_clock(value),
    }
}

/// Turkish percent notation, sign first: `%98,5`.
pub fn format_percent(value: f64) -> String {
    format!("%{}", group_tr(value, 1))
}

/// `HH:MM:SS` (UTC) of an epoch-millisecond timestamp.
pub fn format_clock(epoch_ms: f64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// `1.2M`, `1.5K`, otherwise Turkish digit grouping (`999`, `12,5`).
pub fn format_number(value: f64) -> String {
    if value >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else {
        group_tr(value, 3)
    }
}

/// Whole Turkish lira with `.` thousands separators: `₺67.843`.
pub fn format_currency(amount: f64) -> String {
    let grouped = group_tr(amount.abs().round(), 0);
    if amount < 0.0 && grouped != "0" {
        format!("-₺{}", grouped)
    } else {
        format!("₺{}", grouped)
    }
}

fn group_tr(value: f64, max_fraction: usize) -> String {
    let formatted = format!("{:.*}", max_fraction, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac)) => (int_part, frac.trim_end_matches('0')),
        None => (formatted.as_str(), ""),
    };
    let mut out = String::with_capacity(int_part.len() + int_part.len() / 3 + frac_part.len() + 2);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    if !frac_part.is_empty() {
        out.push(',');
        out.push_str(frac_part);
    }
    if value < 0.0 && out != "0" {
        out.insert(0, '-');
    }
    out
}

/// Emits JSON-RPC notifications, one per line, for a page host to apply.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn emit<T: serde::Serialize>(&self, event: &str, payload: &T) {
        let line = match to_notification(event, payload).and_then(|n| n.to_line().map_err(|e| e.to_string())) {
            Ok(line) => line,
            Err(e) => {
                warn!(event, error = %e, "Failed to encode dashboard notification");
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = out.write_all(line.as_bytes()).and_then(|_| out.flush()) {
            warn!(event, error = %e, "Failed to write dashboard notification");
        }
    }
}

impl<W: Write + Send> DashboardSink for JsonLinesSink<W> {
    fn set_text(&self, selector: &str, value: &str) {
        self.emit(
            event_names::DASHBOARD_ELEMENT,
            &ElementUpdate {
                selector: selector.to_string(),
                value: value.to_string(),
            },
        );
    }

    fn set_chart(&self, chart: &ChartUpdate) {
        self.emit(event_names::DASHBOARD_CHART, chart);
    }

    fn set_connection(&self, update: &ConnectionUpdate) {
        self.emit(event_names::DASHBOARD_CONNECTION, update);
    }
}

/// Logs rendered values; for headless runs.
pub struct TracingSink;

impl DashboardSink for TracingSink {
    fn set_text(&self, selector: &str, value: &str) {
        debug!(selector, value, "Dashboard element");
    }

    fn set_chart(&self, chart: &ChartUpdate) {
        debug!(chart_id = %chart.chart_id, points = chart.labels.len(), "Dashboard chart");
    }

    fn set_connection(&self, update: &ConnectionUpdate) {
        info!(status = update.status.as_str(), text = %update.text, "Connection status");
    }
}
