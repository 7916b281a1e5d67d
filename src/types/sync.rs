use serde::{Deserialize, Serialize};

/// Outbound change waiting to be pushed to the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SyncItem {
    ProductUpdate(serde_json::Value),
    OrderStatus(serde_json::Value),
    InventoryUpdate(serde_json::Value),
}

impl SyncItem {
    pub fn label(&self) -> &'static str {
        match self {
            SyncItem::ProductUpdate(_) => "product_update",
            SyncItem::OrderStatus(_) => "order_status",
            SyncItem::InventoryUpdate(_) => "inventory_update",
        }
    }

    pub fn payload(&self) -> &serde_json::Value {
        match self {
            SyncItem::ProductUpdate(v) | SyncItem::OrderStatus(v) | SyncItem::InventoryUpdate(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Warning,
    Offline,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Warning => "warning",
            ConnectionStatus::Offline => "offline",
        }
    }

    /// Operator-facing label shown next to the status dot.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "Bağlı ve Sağlıklı",
            ConnectionStatus::Warning => "Bağlı - Uyarılar Var",
            ConnectionStatus::Offline => "Çevrimdışı Mod",
        }
    }
}
