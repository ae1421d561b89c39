use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Body of POST /api/chart
#[derive(Debug, Clone, Deserialize)]
pub struct ChartRequest {
    pub prompt: String,
    #[serde(default)]
    pub context: Option<HashMap<String, Value>>,
}

/// Error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct DatasetsResponse {
    pub datasets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}
