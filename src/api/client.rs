use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::endpoints;
use super::latency::{LatencySnapshot, LatencyTracker};
use super::{MarketplaceApi, OrderQuery, ProductQuery};
use crate::config::ApiConfig;
use crate::credentials::ApiCredentials;
use crate::error::ApiError;
use crate::types::marketplace::{CategoryList, Order, Page, Product};
use crate::types::sync::SyncItem;

const USER_AGENT: &str = concat!("trendsync/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY: usize = 200;

/// Authenticated client for the supplier REST API. No retries happen here;
/// callers wrap calls in a [`super::RetryPolicy`].
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    timeout: Duration,
    credentials: Mutex<ApiCredentials>,
    latency: LatencyTracker,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, credentials: ApiCredentials) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            timeout: config.timeout,
            credentials: Mutex::new(credentials),
            latency: LatencyTracker::new(),
        })
    }

    fn credentials(&self) -> ApiCredentials {
        self.credentials
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn url_for(&self, supplier_id: &str, path: &str) -> String {
        format!(
            "{}/{}/suppliers/{}{}",
            self.base_url, self.api_version, supplier_id, path
        )
    }

    /// One HTTP round trip under the configured timeout. The whole call
    /// (connect, send, read, decode) counts toward latency.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let creds = self.credentials();
        let url = self.url_for(&creds.supplier_id, path);
        let mut req = self
            .http
            .request(method.clone(), &url)
            .basic_auth(&creds.api_key, Some(&creds.api_secret))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, execute::<T>(req)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.timeout.as_millis() as u64)),
        };
        let elapsed = started.elapsed();
        self.latency.record(elapsed, outcome.is_ok());

        match &outcome {
            Ok(_) => debug!(%method, path, elapsed_ms = elapsed.as_millis() as u64, "API call ok"),
            Err(e) => warn!(%method, path, elapsed_ms = elapsed.as_millis() as u64, error = %e, "API call failed"),
        }
        outcome
    }

    pub async fn submit_inventory_batch(&self, items: &[Value]) -> Result<Value, ApiError> {
        let body = json!({ "items": items });
        self.request(Method::POST, endpoints::INVENTORY_BATCH, Some(&body), &[])
            .await
    }

    pub async fn update_product(&self, payload: &Value) -> Result<Value, ApiError> {
        self.request(Method::PUT, endpoints::PRODUCTS, Some(payload), &[])
            .await
    }

    pub async fn update_order_status(&self, payload: &Value) -> Result<Value, ApiError> {
        self.request(Method::PUT, endpoints::ORDER_STATUS, Some(payload), &[])
            .await
    }
}

async fn execute<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ApiError> {
    let response = req.send().await?;
    let status = response.status().as_u16();
    let text = response.text().await?;
    check_status(status, &text)?;
    parse_body(&text)
}

pub(crate) fn check_status(status: u16, body: &str) -> Result<(), ApiError> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(ApiError::Authentication(status)),
        _ => Err(ApiError::Http {
            status,
            message: body.chars().take(MAX_ERROR_BODY).collect(),
        }),
    }
}

/// Empty bodies (204, bare 200) decode as JSON `null`.
pub(crate) fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    let text = text.trim();
    let text = if text.is_empty() { "null" } else { text };
    Ok(serde_json::from_str(text)?)
}

impl MarketplaceApi for ApiClient {
    async fn products(&self, query: ProductQuery) -> Result<Page<Product>, ApiError> {
        self.request(Method::GET, endpoints::PRODUCTS, None, &query.to_params())
            .await
    }

    async fn orders(&self, query: OrderQuery) -> Result<Page<Order>, ApiError> {
        self.request(Method::GET, endpoints::ORDERS, None, &query.to_params())
            .await
    }

    async fn categories(&self) -> Result<CategoryList, ApiError> {
        self.request(Method::GET, endpoints::CATEGORIES, None, &[])
            .await
    }

    async fn statistics(&self) -> Result<Value, ApiError> {
        self.request(Method::GET, endpoints::STATISTICS, None, &[])
            .await
    }

    async fn push(&self, item: &SyncItem) -> Result<(), ApiError> {
        match item {
            SyncItem::ProductUpdate(payload) => self.update_product(payload).await?,
            SyncItem::OrderStatus(payload) => self.update_order_status(payload).await?,
            SyncItem::InventoryUpdate(payload) => {
                self.submit_inventory_batch(std::slice::from_ref(payload))
                    .await?
            }
        };
        Ok(())
    }

    async fn ping(&self) -> Result<(), ApiError> {
        self.request::<Value>(
            Method::GET,
            endpoints::PRODUCTS,
            None,
            &[("size", "1".to_string())],
        )
        .await
        .map(|_| ())
    }

    fn latency(&self) -> LatencySnapshot {
        self.latency.snapshot()
    }

    fn set_credentials(&self, credentials: ApiCredentials) {
        debug!(supplier_id = %credentials.supplier_id, "Installing API credentials");
        *self.credentials.lock().unwrap_or_else(|e| e.into_inner()) = credentials;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn config(base_url: &str, timeout: Duration) -> ApiConfig {
        ApiConfig {
            base_url: base_url.to_string(),
            api_version: "v2".to_string(),
            timeout,
            retry_base_delay: Duration::from_millis(10),
            max_retry_attempts: 3,
        }
    }

    fn client(base_url: &str, timeout: Duration) -> ApiClient {
        ApiClient::new(&config(base_url, timeout), ApiCredentials::demo()).unwrap()
    }

    /// Answer exactly one connection with a canned HTTP response.
    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 8192];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn url_includes_version_and_supplier() {
        let c = client("https://api.example.com/sapigw/", Duration::from_secs(1));
        assert_eq!(
            c.url_for("123", endpoints::PRODUCTS),
            "https://api.example.com/sapigw/v2/suppliers/123/products"
        );
    }

    #[test]
    fn status_mapping() {
        assert!(check_status(200, "").is_ok());
        assert!(check_status(204, "").is_ok());
        assert_eq!(check_status(401, ""), Err(ApiError::Authentication(401)));
        assert_eq!(check_status(403, ""), Err(ApiError::Authentication(403)));
        assert_eq!(
            check_status(503, "unavailable"),
            Err(ApiError::Http {
                status: 503,
                message: "unavailable".into()
            })
        );
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(1_000);
        match check_status(500, &body) {
            Err(ApiError::Http { message, .. }) => assert_eq!(message.len(), MAX_ERROR_BODY),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_body_parses_as_null() {
        let v: Value = parse_body("  ").unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn malformed_body_is_data_parse() {
        let r: Result<Page<Product>, ApiError> = parse_body("{not json");
        assert!(matches!(r, Err(ApiError::DataParse(_))));
    }

    #[tokio::test]
    async fn decodes_product_page() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 80\r\nConnection: close\r\n\r\n{\"content\":[{\"barcode\":\"B1\",\"title\":\"Mug\",\"stockQuantity\":4}],\"totalElements\":1}",
        );
        let c = client(&base, Duration::from_secs(5));
        let page = c.products(ProductQuery::page(0, 50)).await.unwrap();
        assert_eq!(page.total(), 1);
        assert_eq!(page.content[0].stock(), 4);
        let latency = c.latency();
        assert_eq!(latency.total_requests, 1);
        assert_eq!(latency.successful_requests, 1);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication() {
        let base = serve_once(
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let c = client(&base, Duration::from_secs(5));
        assert_eq!(c.ping().await, Err(ApiError::Authentication(401)));
        assert_eq!(c.latency().failed_requests, 1);
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // Connection is accepted by the kernel backlog but never answered.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let c = client(&base, Duration::from_millis(150));
        assert_eq!(c.ping().await, Err(ApiError::Timeout(150)));
        drop(listener);
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let c = client(&format!("http://{}", addr), Duration::from_secs(5));
        assert!(matches!(c.ping().await, Err(ApiError::Network(_))));
    }

    #[test]
    fn set_credentials_changes_url_supplier() {
        let c = client("https://api.example.com", Duration::from_secs(1));
        c.set_credentials(ApiCredentials {
            supplier_id: "42".into(),
            api_key: "k".into(),
            api_secret: "s".into(),
        });
        assert_eq!(c.credentials().supplier_id, "42");
    }
}
