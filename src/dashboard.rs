//! The dashboard: one object owning every component the scheduler drives.

use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::api::{MarketplaceApi, OrderQuery, ProductQuery, RetryPolicy};
use crate::breaker::{BreakerStatus, CircuitBreaker, CircuitState};
use crate::cache::{CacheStats, PersistedCache, TtlCache};
use crate::clock::{Clock, SystemClock, HOUR_MS};
use crate::config::{AppConfig, ResilienceConfig};
use crate::credentials::CredentialResolver;
use crate::error::{ApiError, Severity};
use crate::error_log::{ErrorLog, ErrorPattern, SeverityCounts};
use crate::render::{self, DashboardSink};
use crate::store::{keys, LocalStore};
use crate::sync_queue::SyncQueue;
use crate::types::marketplace::{CategoryList, Order, Page, Product};
use crate::types::snapshot::{fields, MetricSnapshot, SnapshotBuilder};
use crate::types::sync::{ConnectionStatus, SyncItem};

pub mod cache_keys {
    pub const PRODUCTS: &str = "products:overview";
    pub const INVENTORY: &str = "products:inventory";
    pub const ORDERS: &str = "orders:monthly";
    pub const CATEGORIES: &str = "categories";
    pub const STATISTICS: &str = "statistics";
}

const OVERVIEW_PAGE_SIZE: u32 = 50;
const INVENTORY_PAGE_SIZE: u32 = 200;
const MONTHLY_ORDER_PAGE_SIZE: u32 = 100;
const NEW_ORDER_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fresh snapshot built and rendered.
    Updated,
    /// Circuit open; the last known good snapshot was rendered instead.
    Skipped,
    Failed,
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Updated)
    }
}

struct Fetched {
    products: Page<Product>,
    orders: Page<Order>,
    inventory: Option<Page<Product>>,
    categories: Option<CategoryList>,
    statistics: Option<Value>,
    new_orders: Vec<Order>,
    /// At least one primary call was answered by the API rather than the cache.
    live: bool,
}

struct ViewState {
    /// Last known good data plus live counters. Only replaced by a
    /// successful refresh or a live tick derived from it.
    current: Arc<MetricSnapshot>,
    last_success_at: Option<u64>,
    /// Last call the API itself answered successfully.
    last_live_at: Option<u64>,
    recent_orders: Vec<Order>,
}

pub struct Dashboard<A: MarketplaceApi> {
    api: A,
    cache: TtlCache,
    breaker: CircuitBreaker,
    errors: ErrorLog,
    queue: SyncQueue,
    store: LocalStore,
    sink: Arc<dyn DashboardSink>,
    retry: RetryPolicy,
    resilience: ResilienceConfig,
    clock: Arc<dyn Clock>,
    credentials: Option<CredentialResolver>,
    view: Mutex<ViewState>,
}

impl<A: MarketplaceApi> Dashboard<A> {
    pub fn new(api: A, store: LocalStore, config: &AppConfig, sink: Arc<dyn DashboardSink>) -> Self {
        Self::with_clock(api, store, config, sink, Arc::new(SystemClock))
    }

    /// Restores the persisted cache and last snapshot when present; a missing
    /// or unreadable record is a cold start.
    pub fn with_clock(
        api: A,
        store: LocalStore,
        config: &AppConfig,
        sink: Arc<dyn DashboardSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now_millis();
        let resilience = config.resilience.clone();

        let cache = match store.get_json::<PersistedCache>(keys::CACHE) {
            Ok(Some(persisted)) => {
                let cache = TtlCache::from_persisted(resilience.cache_ttl, persisted, now);
                debug!(entries = cache.stats().entries, "Restored response cache");
                cache
            }
            Ok(None) => TtlCache::new(resilience.cache_ttl),
            Err(e) => {
                warn!(error = %e, "Persisted cache unreadable, starting cold");
                TtlCache::new(resilience.cache_ttl)
            }
        };

        let current = match store.latest_snapshot() {
            Ok(Some(snapshot)) => {
                info!(captured_at = snapshot.captured_at(), "Restored last snapshot");
                Arc::new(snapshot)
            }
            Ok(None) => Arc::new(MetricSnapshot::empty(now)),
            Err(e) => {
                warn!(error = %e, "Stored snapshot unreadable, starting empty");
                Arc::new(MetricSnapshot::empty(now))
            }
        };

        Self {
            api,
            cache,
            breaker: CircuitBreaker::new(resilience.breaker_threshold, resilience.breaker_cooldown),
            errors: ErrorLog::new(
                resilience.error_log_capacity,
                resilience.error_pattern_window,
                resilience.error_pattern_threshold,
            ),
            queue: SyncQueue::new(),
            store,
            sink,
            retry: RetryPolicy::new(config.api.retry_base_delay, config.api.max_retry_attempts),
            resilience,
            clock,
            credentials: None,
            view: Mutex::new(ViewState {
                current,
                last_success_at: None,
                last_live_at: None,
                recent_orders: Vec::new(),
            }),
        }
    }

    /// Source consulted again when the API rejects the current credentials.
    pub fn with_credentials(mut self, resolver: CredentialResolver) -> Self {
        self.credentials = Some(resolver);
        self
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    fn view(&self) -> std::sync::MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn snapshot(&self) -> Arc<MetricSnapshot> {
        self.view().current.clone()
    }

    pub fn breaker_status(&self) -> BreakerStatus {
        self.breaker.status()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn error_counts(&self) -> SeverityCounts {
        self.errors.counts()
    }

    pub fn enqueue(&self, item: SyncItem) {
        self.queue.enqueue(item);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        let status = self.breaker.status();
        match status.state {
            CircuitState::Open => ConnectionStatus::Offline,
            CircuitState::HalfOpen => ConnectionStatus::Warning,
            CircuitState::Closed if status.failure_count > 0 => ConnectionStatus::Warning,
            CircuitState::Closed => ConnectionStatus::Connected,
        }
    }

    /// Primary refresh cycle: fetch (through the cache), push queued updates,
    /// build and persist a new snapshot, render it. Only answers from the API
    /// count as a breaker success; a half-open trial request bypasses the cache.
    pub async fn refresh(&self) -> RefreshOutcome {
        let now = self.now();
        if !self.breaker.allow_request_at(now) {
            debug!("Circuit open, serving last known good snapshot");
            self.render_fallback();
            return RefreshOutcome::Skipped;
        }

        let trial = self.breaker.state() == CircuitState::HalfOpen;
        let fetched = match self.fetch(now, trial).await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.handle_error(&e, "refresh");
                self.render_fallback();
                return RefreshOutcome::Failed;
            }
        };
        if fetched.live {
            self.record_live_success();
        } else {
            debug!("Primary data served from cache, breaker untouched");
        }
        self.drain_sync_queue().await;

        let now = self.now();
        let (snapshot, recent_orders) = self.compose(fetched, now);
        let snapshot = Arc::new(snapshot);
        if let Err(e) = self.store.save_snapshot(&snapshot) {
            warn!(error = %e, "Failed to persist snapshot");
        }
        self.persist_cache(now);
        {
            let mut view = self.view();
            view.current = snapshot.clone();
            view.last_success_at = Some(now);
            view.recent_orders = recent_orders;
        }
        info!(fields = snapshot.len(), "Dashboard refreshed");
        render::render(&snapshot, self.connection_status(), self.sink.as_ref());
        RefreshOutcome::Updated
    }

    /// Recompute live counters from data already held. No network.
    pub fn tick_live(&self) {
        let now = self.now();
        let (base, last_success, recent) = {
            let view = self.view();
            let recent = view.last_success_at.map(|_| view.recent_orders.clone());
            (view.current.clone(), view.last_success_at, recent)
        };
        let snapshot = Arc::new(
            self.with_live_fields(base.successor(now), now, last_success, recent.as_deref())
                .build(),
        );
        self.view().current = snapshot.clone();
        render::render(&snapshot, self.connection_status(), self.sink.as_ref());
    }

    /// Ping the API and feed the breaker. Skipped while the circuit is open
    /// and cooling down.
    pub async fn health_check(&self) -> bool {
        if !self.breaker.allow_request_at(self.now()) {
            render::render_connection(self.connection_status(), self.sink.as_ref());
            return false;
        }
        let healthy = match self.api.ping().await {
            Ok(()) => {
                self.record_live_success();
                true
            }
            Err(e) => {
                self.handle_error(&e, "health_check");
                false
            }
        };
        debug!(healthy, "Health check");
        render::render_connection(self.connection_status(), self.sink.as_ref());
        healthy
    }

    /// Only acts while the circuit is not closed. A successful ping is
    /// followed by a full refresh.
    pub async fn attempt_reconnection(&self) -> bool {
        if self.breaker.state() == CircuitState::Closed {
            return false;
        }
        info!("Attempting reconnection");
        if !self.health_check().await {
            return false;
        }
        info!("Connection restored, refreshing");
        self.refresh().await.is_success()
    }

    pub fn sweep_cache(&self) -> usize {
        let now = self.now();
        let removed = self.cache.sweep_at(now);
        self.persist_cache(now);
        removed
    }

    /// Look for recurring errors. A transient pattern still occurring after
    /// the last successful refresh forces degraded mode.
    pub fn analyze_errors(&self) -> Vec<ErrorPattern> {
        let now = self.now();
        let patterns = self.errors.patterns_at(now);
        debug!(recorded = self.errors.len(), patterns = patterns.len(), "Error analysis");
        for pattern in &patterns {
            warn!(kind = ?pattern.kind, occurrences = pattern.occurrences, "Recurring error pattern");
        }
        let last_live = self.view().last_live_at;
        let still_failing = match (self.errors.last_at(), last_live) {
            (Some(last_error), Some(success)) => last_error > success,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if still_failing
            && patterns.iter().any(ErrorPattern::is_transient)
            && self.breaker.state() != CircuitState::Open
        {
            let last = self.errors.recent(1).into_iter().next();
            warn!(
                last_error = last.as_ref().map(|r| r.message.as_str()).unwrap_or_default(),
                "Transient failures recurring, switching to offline mode"
            );
            self.breaker.force_open_at(now);
            self.render_fallback();
        }
        patterns
    }

    /// Classify, log and count a failure. Authentication failures reload
    /// credentials instead of being retried.
    pub fn handle_error(&self, error: &ApiError, context: &str) -> Severity {
        let now = self.now();
        let severity = self.errors.record(error, context, now);
        self.breaker.record_failure_at(now);
        if matches!(error, ApiError::Authentication(_)) {
            self.refresh_credentials();
        }
        severity
    }

    fn refresh_credentials(&self) {
        match &self.credentials {
            Some(resolver) => {
                let (credentials, source) = resolver.resolve();
                info!(?source, supplier_id = %credentials.supplier_id, "Reloaded API credentials");
                self.api.set_credentials(credentials);
            }
            None => warn!("Authentication rejected and no credential source configured"),
        }
    }

    fn record_live_success(&self) {
        self.breaker.record_success();
        self.view().last_live_at = Some(self.now());
    }

    fn render_fallback(&self) {
        let snapshot = self.snapshot();
        render::render(&snapshot, self.connection_status(), self.sink.as_ref());
    }

    fn persist_cache(&self, now: u64) {
        if let Err(e) = self.store.set_json(keys::CACHE, &self.cache.to_persisted(now)) {
            warn!(error = %e, "Failed to persist response cache");
        }
    }

    async fn drain_sync_queue(&self) {
        if self.queue.is_empty() {
            return;
        }
        let report = self
            .queue
            .process_batch(
                &self.api,
                self.resilience.sync_batch_size,
                self.resilience.sync_parallelism,
                self.resilience.sync_max_attempts,
            )
            .await;
        let now = self.now();
        for error in &report.errors {
            self.errors.record(error, "sync_queue", now);
        }
        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            requeued = report.requeued,
            dropped = report.dropped,
            "Sync batch processed"
        );
    }

    /// Serve `key` from the cache, or run `op` under the retry policy and
    /// cache its result. The flag is true when the value came from the API.
    async fn cached<T, F, Fut>(
        &self,
        key: &str,
        now: u64,
        bypass: bool,
        op: F,
    ) -> Result<(T, bool), ApiError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if !bypass {
            if let Some(value) = self.cache.get_at(key, now) {
                match serde_json::from_value(value) {
                    Ok(hit) => return Ok((hit, false)),
                    Err(e) => {
                        debug!(key, error = %e, "Discarding undecodable cache entry");
                        self.cache.invalidate(key);
                    }
                }
            }
        }
        let fresh = self.retry.run(key, op).await?;
        match serde_json::to_value(&fresh) {
            Ok(json) => self.cache.set_at(key, json, self.now()),
            Err(e) => warn!(key, error = %e, "Response not cacheable"),
        }
        Ok((fresh, true))
    }

    /// Failures of secondary data are logged but do not fail the cycle.
    fn optional<T>(&self, context: &str, result: Result<T, ApiError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.record(&e, context, self.now());
                None
            }
        }
    }

    /// `bypass` forces the primary calls to the network.
    async fn fetch(&self, now: u64, bypass: bool) -> Result<Fetched, ApiError> {
        let overview = ProductQuery::page(0, OVERVIEW_PAGE_SIZE);
        let (products, products_live) = self
            .cached(cache_keys::PRODUCTS, now, bypass, || self.api.products(overview))
            .await?;

        let month = OrderQuery {
            start_ms: aggregate::month_start(now),
            end_ms: now,
            size: MONTHLY_ORDER_PAGE_SIZE,
        };
        let (orders, orders_live) = self
            .cached(cache_keys::ORDERS, now, bypass, || self.api.orders(month))
            .await?;

        let stock = ProductQuery::approved(INVENTORY_PAGE_SIZE);
        let inventory = self
            .cached(cache_keys::INVENTORY, now, false, || self.api.products(stock))
            .await
            .map(|(page, _)| page);
        let inventory = self.optional("inventory", inventory);

        let categories = self
            .cached(cache_keys::CATEGORIES, now, false, || self.api.categories())
            .await
            .map(|(list, _)| list);
        let categories = self.optional("categories", categories);

        let statistics = self
            .cached(cache_keys::STATISTICS, now, false, || self.api.statistics())
            .await
            .map(|(stats, _)| stats);
        let statistics = self.optional("statistics", statistics);

        let new_orders = self.check_new_orders(now).await;

        Ok(Fetched {
            products,
            orders,
            inventory,
            categories,
            statistics,
            new_orders,
            live: products_live || orders_live,
        })
    }

    /// Orders placed since the persisted last check (one hour back on first run).
    async fn check_new_orders(&self, now: u64) -> Vec<Order> {
        let since = match self.store.get_json::<u64>(keys::LAST_ORDER_CHECK) {
            Ok(Some(t)) if t <= now => t,
            Ok(_) => now.saturating_sub(HOUR_MS),
            Err(e) => {
                warn!(error = %e, "Last order check unreadable");
                now.saturating_sub(HOUR_MS)
            }
        };
        let query = OrderQuery {
            start_ms: since,
            end_ms: now,
            size: NEW_ORDER_PAGE_SIZE,
        };
        match self.api.orders(query).await {
            Ok(page) => {
                if let Err(e) = self.store.set_json(keys::LAST_ORDER_CHECK, &now) {
                    warn!(error = %e, "Failed to persist last order check");
                }
                if !page.content.is_empty() {
                    info!(count = page.content.len(), "New orders since last check");
                }
                for order in aggregate::high_value_orders(&page.content) {
                    info!(
                        order_number = %order.order_number,
                        value = order.value(),
                        "High-value order received"
                    );
                }
                page.content
            }
            Err(e) => {
                self.errors.record(&e, "new_orders", self.now());
                Vec::new()
            }
        }
    }

    fn compose(&self, fetched: Fetched, now: u64) -> (MetricSnapshot, Vec<Order>) {
        let products = aggregate::summarize_products(&fetched.products);
        let orders = aggregate::summarize_orders(&fetched.orders);

        let stock_source: &[Product] = fetched
            .inventory
            .as_ref()
            .map_or(fetched.products.content.as_slice(), |p| p.content.as_slice());
        let alerts = aggregate::inventory_alerts(stock_source);
        if !alerts.out_of_stock.is_empty() {
            warn!(count = alerts.out_of_stock.len(), items = ?alerts.out_of_stock, "Products out of stock");
        }
        if !alerts.low_stock.is_empty() {
            info!(count = alerts.low_stock.len(), "Products running low on stock");
        }
        let moving = aggregate::moving_items(stock_source, aggregate::MOVING_ITEMS);

        let recent = aggregate::merge_orders(&fetched.orders.content, fetched.new_orders);

        let mut builder = MetricSnapshot::builder(now)
            .number(fields::TOTAL_PRODUCTS, products.total_products as f64)
            .number(fields::ACTIVE_PRODUCTS, products.active_products as f64)
            .number(fields::TOTAL_STOCK, products.total_stock as f64)
            .number(fields::LOW_STOCK_ITEMS, products.low_stock_items as f64)
            .number(fields::OUT_OF_STOCK_ITEMS, products.out_of_stock_items as f64)
            .number(fields::MONTHLY_ORDERS, orders.monthly_orders as f64)
            .number(fields::MONTHLY_REVENUE, orders.monthly_revenue)
            .number(fields::AVERAGE_ORDER_VALUE, orders.average_order_value)
            .number(fields::CONVERSION_RATE, orders.conversion_rate)
            .number(fields::PENDING_ORDERS, orders.pending_orders as f64)
            .number(fields::STOCK_ALERTS, alerts.total() as f64)
            .number(fields::LAST_SYNC_AT, now as f64)
            .text(fields::FAST_MOVING_ITEMS, moving.fast.join(", "))
            .text(fields::SLOW_MOVING_ITEMS, moving.slow.join(", "))
            .sales_trend(aggregate::sales_trend(&recent, now, aggregate::TREND_DAYS));

        if let Some(categories) = &fetched.categories {
            let top = categories.categories.len().min(aggregate::TOP_CATEGORIES);
            builder = builder.number(fields::TOP_CATEGORIES, top as f64);
        }
        if let Some(rating) = fetched.statistics.as_ref().and_then(aggregate::average_rating) {
            builder = builder.number(fields::AVG_RATING, rating);
        }

        let snapshot = self
            .with_live_fields(builder, now, Some(now), Some(recent.as_slice()))
            .build();
        (snapshot, recent)
    }

    /// Time-relative fields are recomputed from held orders, or dropped when
    /// no refresh has succeeded in this process yet.
    fn with_live_fields(
        &self,
        builder: SnapshotBuilder,
        now: u64,
        last_success: Option<u64>,
        recent: Option<&[Order]>,
    ) -> SnapshotBuilder {
        let latency = self.api.latency();
        let mut builder = builder
            .number(
                fields::PERFORMANCE_SCORE,
                aggregate::performance_score(latency.success_rate(), latency.average_ms),
            )
            .number(fields::API_LATENCY_MS, latency.average_ms)
            .number(fields::API_SUCCESS_RATE, latency.success_rate())
            .number(fields::CACHE_HIT_RATE, self.cache.stats().hit_rate())
            .number(fields::SYNC_QUEUE_DEPTH, self.queue.len() as f64);
        builder = match recent {
            Some(orders) => builder
                .number(fields::SALES_LAST_HOUR, aggregate::sales_last_hour(orders, now))
                .number(fields::ORDERS_TODAY, aggregate::orders_on_day(orders, now) as f64),
            None => builder
                .without(fields::SALES_LAST_HOUR)
                .without(fields::ORDERS_TODAY),
        };
        match last_success {
            Some(at) => builder.number(
                fields::DATA_FRESHNESS_SECS,
                (now.saturating_sub(at) / 1_000) as f64,
            ),
            None => builder.without(fields::DATA_FRESHNESS_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{DAY_MS, HOUR_MS};
    use crate::render::selectors;
    use crate::store::test_store;
    use crate::testing::{FakeApi, ManualClock, RecordingSink};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    // 2024-03-10T12:00:00Z
    const T0: u64 = 1_710_072_000_000;

    struct Harness {
        _dir: tempfile::TempDir,
        store: LocalStore,
        sink: Arc<RecordingSink>,
        clock: Arc<ManualClock>,
        dashboard: Dashboard<FakeApi>,
    }

    fn config() -> AppConfig {
        AppConfig::from_lookup(|key| match key {
            "TRENDSYNC_DATA_DIR" => Some("/tmp/trendsync-unused".to_string()),
            _ => None,
        })
    }

    fn harness(api: FakeApi) -> Harness {
        harness_with(api, config())
    }

    fn harness_with(api: FakeApi, config: AppConfig) -> Harness {
        let (dir, store) = test_store();
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(ManualClock::new(T0));
        let dashboard =
            Dashboard::with_clock(api, store.clone(), &config, sink.clone(), clock.clone());
        Harness {
            _dir: dir,
            store,
            sink,
            clock,
            dashboard,
        }
    }

    fn product(title: &str, stock: i64, sales: u64) -> Product {
        Product {
            barcode: format!("bc-{}", title),
            title: title.to_string(),
            stock_quantity: Some(stock),
            sales_count: Some(sales),
            ..Default::default()
        }
    }

    fn order(number: &str, price: f64, status: &str, date: u64) -> Order {
        Order {
            order_number: number.to_string(),
            total_price: Some(price),
            status: Some(status.to_string()),
            order_date: Some(date),
        }
    }

    fn catalog() -> FakeApi {
        let api = FakeApi::with_catalog(
            vec![
                product("Kazak", 4, 120),
                product("Mont", 0, 3),
                product("Gömlek", 25, 40),
            ],
            vec![
                order("A1", 1_500.0, "Delivered", T0 - 10 * 60_000),
                order("A2", 500.0, "Created", T0 - 2 * DAY_MS),
                order("A3", 250.0, "Delivered", T0 - 3 * DAY_MS),
            ],
        );
        *api.total_products.lock().unwrap() = Some(1_847);
        *api.statistics.lock().unwrap() = json!({ "averageRating": 4.7 });
        api
    }

    fn network_down() -> ApiError {
        ApiError::Network("connection refused".into())
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_builds_and_renders_snapshot() {
        let h = harness(catalog());
        assert_eq!(h.dashboard.refresh().await, RefreshOutcome::Updated);

        let snap = h.dashboard.snapshot();
        assert_eq!(snap.number(fields::TOTAL_PRODUCTS), Some(1_847.0));
        assert_eq!(snap.number(fields::MONTHLY_REVENUE), Some(2_250.0));
        assert_eq!(snap.number(fields::AVERAGE_ORDER_VALUE), Some(875.0));
        assert_eq!(snap.number(fields::PENDING_ORDERS), Some(1.0));
        assert_eq!(snap.number(fields::ORDERS_TODAY), Some(1.0));
        assert_eq!(snap.number(fields::SALES_LAST_HOUR), Some(1_500.0));
        assert_eq!(snap.number(fields::STOCK_ALERTS), Some(2.0));
        assert_eq!(snap.number(fields::AVG_RATING), Some(4.7));
        assert_eq!(snap.text(fields::FAST_MOVING_ITEMS), Some("Kazak, Gömlek, Mont"));
        assert_eq!(snap.sales_trend().len(), 30);

        assert_eq!(h.sink.text(selectors::TOTAL_PRODUCTS).as_deref(), Some("1.8K"));
        assert_eq!(h.sink.text(selectors::MONTHLY_REVENUE).as_deref(), Some("₺2.250"));
        assert_eq!(h.sink.connections().last(), Some(&ConnectionStatus::Connected));

        assert_eq!(h.store.snapshot_count().unwrap(), 1);
        assert_eq!(h.store.get_json::<u64>(keys::LAST_ORDER_CHECK).unwrap(), Some(T0));
    }

    #[tokio::test(start_paused = true)]
    async fn second_refresh_within_ttl_uses_cache() {
        let h = harness(catalog());
        h.dashboard.refresh().await;
        let api = &h.dashboard.api;
        assert_eq!(api.products_calls.load(Ordering::SeqCst), 2);
        assert_eq!(api.orders_calls.load(Ordering::SeqCst), 2);

        h.clock.advance(30_000);
        assert_eq!(h.dashboard.refresh().await, RefreshOutcome::Updated);
        assert_eq!(api.products_calls.load(Ordering::SeqCst), 2);
        // The new-order check is a delta query and never cached.
        assert_eq!(api.orders_calls.load(Ordering::SeqCst), 3);
        assert!(h.dashboard.cache_stats().hits >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_skips_network_and_shows_last_good() {
        let h = harness(catalog());
        h.dashboard.refresh().await;

        h.clock.advance(6 * 60_000);
        h.dashboard.api.fail_with(Some(network_down()));
        for _ in 0..5 {
            assert_eq!(h.dashboard.refresh().await, RefreshOutcome::Failed);
        }
        assert_eq!(h.dashboard.breaker_status().state, CircuitState::Open);

        let calls = h.dashboard.api.network_calls();
        h.sink.clear();
        assert_eq!(h.dashboard.refresh().await, RefreshOutcome::Skipped);
        assert_eq!(h.dashboard.api.network_calls(), calls);
        assert_eq!(h.sink.connections(), vec![ConnectionStatus::Offline]);
        assert_eq!(h.sink.text(selectors::TOTAL_PRODUCTS).as_deref(), Some("1.8K"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_before_failing() {
        let h = harness(FakeApi::default());
        h.dashboard.api.fail_with(Some(network_down()));
        assert_eq!(h.dashboard.refresh().await, RefreshOutcome::Failed);
        assert_eq!(h.dashboard.api.products_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.dashboard.error_counts().warning, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn authentication_failure_reloads_credentials_without_retry() {
        let (dir, store) = test_store();
        let sink = Arc::new(RecordingSink::default());
        let resolver = CredentialResolver::with_lookup(store.clone(), |key| match key {
            "TRENDYOL_SUPPLIER_ID" => Some("555".to_string()),
            "TRENDYOL_API_KEY" => Some("rotated-key".to_string()),
            "TRENDYOL_API_SECRET" => Some("rotated-secret".to_string()),
            _ => None,
        });
        let dashboard = Dashboard::with_clock(
            FakeApi::default(),
            store,
            &config(),
            sink,
            Arc::new(ManualClock::new(T0)),
        )
        .with_credentials(resolver);

        dashboard.api.fail_with(Some(ApiError::Authentication(401)));
        assert_eq!(dashboard.refresh().await, RefreshOutcome::Failed);
        assert_eq!(dashboard.api.products_calls.load(Ordering::SeqCst), 1);
        assert_eq!(dashboard.error_counts().critical, 1);
        let installed = dashboard.api.installed_credentials.lock().unwrap().clone();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].supplier_id, "555");
        drop(dir);
    }

    #[tokio::test(start_paused = true)]
    async fn cold_start_failure_renders_placeholders() {
        let h = harness(FakeApi::default());
        h.dashboard.api.fail_with(Some(network_down()));
        h.dashboard.refresh().await;
        assert_eq!(
            h.sink.text(selectors::TOTAL_PRODUCTS).as_deref(),
            Some(render::PLACEHOLDER)
        );
        assert_eq!(h.sink.connections().last(), Some(&ConnectionStatus::Warning));
    }

    #[tokio::test(start_paused = true)]
    async fn error_pattern_forces_offline_mode() {
        let mut cfg = config();
        cfg.resilience.breaker_threshold = 100;
        let h = harness_with(FakeApi::default(), cfg);
        h.dashboard.api.fail_with(Some(network_down()));
        for _ in 0..6 {
            h.dashboard.refresh().await;
        }
        assert_eq!(h.dashboard.breaker_status().state, CircuitState::Closed);

        let patterns = h.dashboard.analyze_errors();
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].is_transient());
        assert_eq!(h.dashboard.connection_status(), ConnectionStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn old_pattern_does_not_reopen_after_recovery() {
        let mut cfg = config();
        cfg.resilience.breaker_threshold = 100;
        let h = harness_with(catalog(), cfg);
        for _ in 0..6 {
            h.dashboard.handle_error(&network_down(), "refresh");
        }
        h.clock.advance(1_000);
        assert!(h.dashboard.refresh().await.is_success());
        assert_eq!(h.dashboard.analyze_errors().len(), 1);
        assert_eq!(h.dashboard.breaker_status().state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnection_only_acts_when_circuit_not_closed() {
        let h = harness(catalog());
        assert!(!h.dashboard.attempt_reconnection().await);
        assert_eq!(h.dashboard.api.ping_calls.load(Ordering::SeqCst), 0);

        for _ in 0..5 {
            h.dashboard.handle_error(&network_down(), "health_check");
        }
        assert_eq!(h.dashboard.connection_status(), ConnectionStatus::Offline);
        assert!(!h.dashboard.attempt_reconnection().await);
        assert_eq!(h.dashboard.api.ping_calls.load(Ordering::SeqCst), 0);

        h.clock.advance(30_000);
        assert!(h.dashboard.attempt_reconnection().await);
        assert_eq!(h.dashboard.api.ping_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.dashboard.connection_status(), ConnectionStatus::Connected);
        assert_eq!(
            h.dashboard.snapshot().number(fields::TOTAL_PRODUCTS),
            Some(1_847.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn health_check_feeds_breaker() {
        let h = harness(FakeApi::default());
        assert!(h.dashboard.health_check().await);
        h.dashboard.api.fail_with(Some(ApiError::Timeout(30_000)));
        assert!(!h.dashboard.health_check().await);
        assert_eq!(h.dashboard.breaker_status().failure_count, 1);
        assert_eq!(h.sink.connections().last(), Some(&ConnectionStatus::Warning));
    }

    #[tokio::test(start_paused = true)]
    async fn live_tick_updates_counters_without_network() {
        let h = harness(catalog());
        h.dashboard.refresh().await;
        let calls = h.dashboard.api.network_calls();

        h.clock.advance(30_000);
        h.dashboard.tick_live();
        let snap = h.dashboard.snapshot();
        assert_eq!(h.dashboard.api.network_calls(), calls);
        assert_eq!(snap.number(fields::DATA_FRESHNESS_SECS), Some(30.0));
        assert_eq!(snap.number(fields::TOTAL_PRODUCTS), Some(1_847.0));
        assert_eq!(snap.number(fields::SALES_LAST_HOUR), Some(1_500.0));

        h.clock.advance(55 * 60_000);
        h.dashboard.tick_live();
        assert_eq!(
            h.dashboard.snapshot().number(fields::SALES_LAST_HOUR),
            Some(0.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn warm_start_restores_snapshot_and_cache() {
        let (dir, store) = test_store();
        {
            let first = Dashboard::with_clock(
                catalog(),
                store.clone(),
                &config(),
                Arc::new(RecordingSink::default()),
                Arc::new(ManualClock::new(T0)),
            );
            assert!(first.refresh().await.is_success());
        }

        let api = FakeApi::default();
        api.fail_with(Some(network_down()));
        let second = Dashboard::with_clock(
            api,
            store,
            &config(),
            Arc::new(RecordingSink::default()),
            Arc::new(ManualClock::new(T0 + 60_000)),
        );
        assert_eq!(
            second.snapshot().number(fields::TOTAL_PRODUCTS),
            Some(1_847.0)
        );
        assert_eq!(second.refresh().await, RefreshOutcome::Updated);
        assert_eq!(second.api.products_calls.load(Ordering::SeqCst), 0);
        drop(dir);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_refresh_keeps_health_check_failures() {
        let h = harness(catalog());
        assert!(h.dashboard.refresh().await.is_success());

        h.dashboard.api.fail_with(Some(network_down()));
        for _ in 0..4 {
            assert!(!h.dashboard.health_check().await);
        }
        h.clock.advance(30_000);
        assert_eq!(h.dashboard.refresh().await, RefreshOutcome::Updated);

        let status = h.dashboard.breaker_status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failure_count, 4);
        assert_eq!(h.dashboard.connection_status(), ConnectionStatus::Warning);

        // The fifth failed check still trips the breaker.
        assert!(!h.dashboard.health_check().await);
        assert_eq!(h.dashboard.breaker_status().state, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_refresh_goes_to_the_network() {
        let h = harness(catalog());
        assert!(h.dashboard.refresh().await.is_success());
        let api = &h.dashboard.api;

        api.fail_with(Some(network_down()));
        for _ in 0..5 {
            h.dashboard.health_check().await;
        }
        assert_eq!(h.dashboard.breaker_status().state, CircuitState::Open);

        // Cache is still valid, but the trial call must not be answered from it.
        h.clock.advance(30_000);
        let before = api.products_calls.load(Ordering::SeqCst);
        assert_eq!(h.dashboard.refresh().await, RefreshOutcome::Failed);
        assert!(api.products_calls.load(Ordering::SeqCst) > before);
        assert_eq!(h.dashboard.breaker_status().state, CircuitState::Open);

        api.fail_with(None);
        h.clock.advance(30_000);
        let before = api.products_calls.load(Ordering::SeqCst);
        assert_eq!(h.dashboard.refresh().await, RefreshOutcome::Updated);
        assert_eq!(api.products_calls.load(Ordering::SeqCst), before + 1);
        assert_eq!(h.dashboard.breaker_status().state, CircuitState::Closed);
        assert_eq!(h.dashboard.connection_status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn restored_snapshot_drops_stale_hourly_figures() {
        let (dir, store) = test_store();
        {
            let first = Dashboard::with_clock(
                catalog(),
                store.clone(),
                &config(),
                Arc::new(RecordingSink::default()),
                Arc::new(ManualClock::new(T0)),
            );
            assert!(first.refresh().await.is_success());
            assert_eq!(first.snapshot().number(fields::SALES_LAST_HOUR), Some(1_500.0));
        }

        let sink = Arc::new(RecordingSink::default());
        let second = Dashboard::with_clock(
            FakeApi::default(),
            store,
            &config(),
            sink.clone(),
            Arc::new(ManualClock::new(T0 + 2 * HOUR_MS)),
        );
        second.tick_live();
        let snap = second.snapshot();
        assert_eq!(snap.number(fields::SALES_LAST_HOUR), None);
        assert_eq!(snap.number(fields::ORDERS_TODAY), None);
        assert_eq!(snap.number(fields::DATA_FRESHNESS_SECS), None);
        assert_eq!(snap.number(fields::TOTAL_PRODUCTS), Some(1_847.0));
        assert_eq!(snap.number(fields::LAST_SYNC_AT), Some(T0 as f64));
        assert_eq!(
            sink.text(selectors::SALES_LAST_HOUR).as_deref(),
            Some(render::PLACEHOLDER)
        );
        assert_eq!(sink.text(selectors::LAST_SYNC_TIME).as_deref(), Some("12:00:00"));
        drop(dir);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_drains_sync_queue() {
        let h = harness(catalog());
        h.dashboard.enqueue(SyncItem::InventoryUpdate(json!({"barcode": "bc-Mont", "quantity": 5})));
        h.dashboard.enqueue(SyncItem::OrderStatus(json!({"orderNumber": "A2", "status": "Picking"})));
        h.dashboard.refresh().await;
        assert_eq!(h.dashboard.queue_len(), 0);
        assert_eq!(h.dashboard.api.push_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            h.dashboard.snapshot().number(fields::SYNC_QUEUE_DEPTH),
            Some(0.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_expired_entries_and_persists() {
        let h = harness(catalog());
        h.dashboard.refresh().await;
        h.clock.advance(5 * 60_000);
        assert_eq!(h.dashboard.sweep_cache(), 5);
        let persisted: PersistedCache = h.store.get_json(keys::CACHE).unwrap().unwrap();
        assert!(persisted.data.is_empty());
    }
}
