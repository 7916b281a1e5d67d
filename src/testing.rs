//! In-memory doubles shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use crate::api::{LatencySnapshot, MarketplaceApi, OrderQuery, ProductQuery};
use crate::credentials::ApiCredentials;
use crate::error::ApiError;
use crate::events::{ChartUpdate, ConnectionUpdate};
use crate::render::DashboardSink;
use crate::types::marketplace::{Category, CategoryList, Order, Page, Product};
use crate::types::sync::{ConnectionStatus, SyncItem};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Scripted marketplace. Every read fails with `failure` while it is set;
/// pushes fail for payloads carrying `"fail": true`.
#[derive(Default)]
pub struct FakeApi {
    pub products: Mutex<Vec<Product>>,
    pub total_products: Mutex<Option<u64>>,
    pub orders: Mutex<Vec<Order>>,
    pub categories: Mutex<Vec<Category>>,
    pub statistics: Mutex<Value>,
    pub failure: Mutex<Option<ApiError>>,
    pub latency: Mutex<LatencySnapshot>,
    pub installed_credentials: Mutex<Vec<ApiCredentials>>,
    pub products_calls: AtomicUsize,
    pub orders_calls: AtomicUsize,
    pub ping_calls: AtomicUsize,
    pub push_calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeApi {
    pub fn with_catalog(products: Vec<Product>, orders: Vec<Order>) -> Self {
        let api = Self::default();
        *lock(&api.products) = products;
        *lock(&api.orders) = orders;
        api
    }

    pub fn fail_with(&self, error: Option<ApiError>) {
        *lock(&self.failure) = error;
    }

    pub fn network_calls(&self) -> usize {
        self.products_calls.load(Ordering::SeqCst)
            + self.orders_calls.load(Ordering::SeqCst)
            + self.ping_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ApiError> {
        match lock(&self.failure).clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn page<T>(content: Vec<T>, total: Option<u64>) -> Page<T> {
    Page {
        content,
        total_elements: total,
        total_pages: None,
        page: None,
        size: None,
    }
}

impl MarketplaceApi for FakeApi {
    async fn products(&self, query: ProductQuery) -> Result<Page<Product>, ApiError> {
        self.products_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let products: Vec<Product> = lock(&self.products)
            .iter()
            .filter(|p| query.approved != Some(true) || p.approved != Some(false))
            .take(query.size as usize)
            .cloned()
            .collect();
        let total = *lock(&self.total_products);
        Ok(page(products, total))
    }

    async fn orders(&self, query: OrderQuery) -> Result<Page<Order>, ApiError> {
        self.orders_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let orders: Vec<Order> = lock(&self.orders)
            .iter()
            .filter(|o| {
                o.order_date
                    .map_or(true, |d| d >= query.start_ms && d <= query.end_ms)
            })
            .take(query.size as usize)
            .cloned()
            .collect();
        Ok(page(orders, None))
    }

    async fn categories(&self) -> Result<CategoryList, ApiError> {
        self.check()?;
        Ok(CategoryList {
            categories: lock(&self.categories).clone(),
        })
    }

    async fn statistics(&self) -> Result<Value, ApiError> {
        self.check()?;
        Ok(lock(&self.statistics).clone())
    }

    async fn push(&self, item: &SyncItem) -> Result<(), ApiError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.check()?;
        if item.payload().get("fail") == Some(&Value::Bool(true)) {
            return Err(ApiError::Network("connection reset".into()));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), ApiError> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        self.check()
    }

    fn latency(&self) -> LatencySnapshot {
        *lock(&self.latency)
    }

    fn set_credentials(&self, credentials: ApiCredentials) {
        lock(&self.installed_credentials).push(credentials);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Text(String, String),
    Chart(ChartUpdate),
    Connection(ConnectionStatus),
}

/// Keeps everything the renderer wrote, in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Recorded> {
        lock(&self.events).clone()
    }

    /// Last value written to `selector`.
    pub fn text(&self, selector: &str) -> Option<String> {
        lock(&self.events).iter().rev().find_map(|e| match e {
            Recorded::Text(s, v) if s == selector => Some(v.clone()),
            _ => None,
        })
    }

    pub fn texts(&self) -> Vec<(String, String)> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                Recorded::Text(s, v) => Some((s.clone(), v.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn charts(&self) -> Vec<ChartUpdate> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                Recorded::Chart(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connections(&self) -> Vec<ConnectionStatus> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                Recorded::Connection(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl DashboardSink for RecordingSink {
    fn set_text(&self, selector: &str, value: &str) {
        lock(&self.events).push(Recorded::Text(selector.to_string(), value.to_string()));
    }

    fn set_chart(&self, chart: &ChartUpdate) {
        lock(&self.events).push(Recorded::Chart(chart.clone()));
    }

    fn set_connection(&self, update: &ConnectionUpdate) {
        lock(&self.events).push(Recorded::Connection(update.status));
    }
}

/// Clock that only moves when told to.
pub struct ManualClock(std::sync::atomic::AtomicU64);

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self(std::sync::atomic::AtomicU64::new(start))
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl crate::clock::Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
