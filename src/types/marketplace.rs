use serde::{Deserialize, Serialize};

/// Paged list envelope used by the supplier API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    pub total_elements: Option<u64>,
    pub total_pages: Option<u64>,
    pub page: Option<u64>,
    pub size: Option<u64>,
}

impl<T> Page<T> {
    /// Reported total, falling back to the number of items in this page.
    pub fn total(&self) -> u64 {
        self.total_elements.unwrap_or(self.content.len() as u64)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Product {
    pub barcode: String,
    pub title: String,
    pub stock_quantity: Option<i64>,
    pub sales_count: Option<u64>,
    pub sale_price: Option<f64>,
    pub approved: Option<bool>,
}

impl Product {
    pub fn stock(&self) -> i64 {
        self.stock_quantity.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Order {
    pub order_number: String,
    pub total_price: Option<f64>,
    pub status: Option<String>,
    /// Epoch milliseconds.
    pub order_date: Option<u64>,
}

impl Order {
    pub fn value(&self) -> f64 {
        self.total_price.unwrap_or(0.0)
    }

    pub fn is_delivered(&self) -> bool {
        self.status.as_deref() == Some("Delivered")
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self.status.as_deref(),
            Some("Created") | Some("Picking") | Some("Awaiting")
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryList {
    #[serde(default)]
    pub categories: Vec<Category>,
}
