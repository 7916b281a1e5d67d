pub mod client;
pub mod latency;
pub mod retry;

use std::future::Future;

use crate::credentials::ApiCredentials;
use crate::error::ApiError;
use crate::types::marketplace::{CategoryList, Order, Page, Product};
use crate::types::sync::SyncItem;

pub use client::ApiClient;
pub use latency::{LatencySnapshot, LatencyTracker};
pub use retry::RetryPolicy;

pub mod endpoints {
    pub const PRODUCTS: &str = "/products";
    pub const ORDERS: &str = "/orders";
    pub const ORDER_STATUS: &str = "/orders/status";
    pub const INVENTORY_BATCH: &str = "/products/batch-requests";
    pub const STATISTICS: &str = "/statistics";
    pub const CATEGORIES: &str = "/product-categories";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    pub page: u32,
    pub size: u32,
    pub approved: Option<bool>,
}

impl ProductQuery {
    pub fn page(page: u32, size: u32) -> Self {
        Self {
            page,
            size,
            approved: None,
        }
    }

    pub fn approved(size: u32) -> Self {
        Self {
            page: 0,
            size,
            approved: Some(true),
        }
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("page", self.page.to_string()), ("size", self.size.to_string())];
        if let Some(approved) = self.approved {
            params.push(("approved", approved.to_string()));
        }
        params
    }
}

/// Orders in `[start_ms, end_ms]`, epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderQuery {
    pub start_ms: u64,
    pub end_ms: u64,
    pub size: u32,
}

impl OrderQuery {
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("startDate", self.start_ms.to_string()),
            ("endDate", self.end_ms.to_string()),
            ("size", self.size.to_string()),
        ]
    }
}

/// The supplier API surface the dashboard depends on.
pub trait MarketplaceApi: Send + Sync + 'static {
    fn products(
        &self,
        query: ProductQuery,
    ) -> impl Future<Output = Result<Page<Product>, ApiError>> + Send;

    fn orders(&self, query: OrderQuery)
        -> impl Future<Output = Result<Page<Order>, ApiError>> + Send;

    fn categories(&self) -> impl Future<Output = Result<CategoryList, ApiError>> + Send;

    fn statistics(&self) -> impl Future<Output = Result<serde_json::Value, ApiError>> + Send;

    /// Send one outbound sync item to its write endpoint.
    fn push(&self, item: &SyncItem) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Cheapest authenticated call, used for health checks.
    fn ping(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn latency(&self) -> LatencySnapshot;

    fn set_credentials(&self, credentials: ApiCredentials);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_params_include_approved_only_when_set() {
        let plain = ProductQuery::page(0, 50).to_params();
        assert_eq!(plain.len(), 2);
        let approved = ProductQuery::approved(200).to_params();
        assert!(approved.contains(&("approved", "true".to_string())));
        assert!(approved.contains(&("size", "200".to_string())));
    }

    #[test]
    fn order_params_use_epoch_millis() {
        let params = OrderQuery {
            start_ms: 1_700_000_000_000,
            end_ms: 1_700_000_360_000,
            size: 50,
        }
        .to_params();
        assert_eq!(params[0], ("startDate", "1700000000000".to_string()));
        assert_eq!(params[2], ("size", "50".to_string()));
    }
}
