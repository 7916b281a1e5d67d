use serde::{Deserialize, Serialize};

use crate::jsonrpc::JsonRpcNotification;
use crate::types::sync::ConnectionStatus;

/// Notification method names consumed by the dashboard page.
pub mod event_names {
    pub const DASHBOARD_ELEMENT: &str = "dashboard:element";
    pub const DASHBOARD_CHART: &str = "dashboard:chart";
    pub const DASHBOARD_CONNECTION: &str = "dashboard:connection";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementUpdate {
    pub selector: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartUpdate {
    pub chart_id: String,
    pub labels: Vec<String>,
    pub sales: Vec<f64>,
    pub orders: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUpdate {
    pub dot_selector: String,
    pub text_selector: String,
    pub status: ConnectionStatus,
    pub text: String,
}

pub fn to_notification<T: Serialize>(
    event: &str,
    payload: &T,
) -> Result<JsonRpcNotification, String> {
    let params = serde_json::to_value(payload).map_err(|e| e.to_string())?;
    Ok(JsonRpcNotification::new(event, Some(params)))
}
