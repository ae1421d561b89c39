use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Aggregation applied to a metric field within each group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl Aggregation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sum" => Some(Aggregation::Sum),
            "avg" => Some(Aggregation::Avg),
            "min" => Some(Aggregation::Min),
            "max" => Some(Aggregation::Max),
            "count" => Some(Aggregation::Count),
            _ => None,
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Count => "count",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Doughnut,
    Area,
    Scatter,
}

impl ChartType {
    pub const ALL: [ChartType; 6] = [
        ChartType::Bar,
        ChartType::Line,
        ChartType::Pie,
        ChartType::Doughnut,
        ChartType::Area,
        ChartType::Scatter,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bar" => Some(ChartType::Bar),
            "line" => Some(ChartType::Line),
            "pie" => Some(ChartType::Pie),
            "doughnut" => Some(ChartType::Doughnut),
            "area" => Some(ChartType::Area),
            "scatter" => Some(ChartType::Scatter),
            _ => None,
        }
    }

    /// Pie-family charts color each slice individually
    pub fn is_segmented(&self) -> bool {
        matches!(self, ChartType::Pie | ChartType::Doughnut)
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Doughnut => "doughnut",
            ChartType::Area => "area",
            ChartType::Scatter => "scatter",
        };
        write!(f, "{}", s)
    }
}

/// Canonical time granularity for a dimension field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Value,
    Label,
    Date,
}

impl SortBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "value" => Some(SortBy::Value),
            "label" => Some(SortBy::Label),
            "date" => Some(SortBy::Date),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// Unvalidated intent as deserialized straight from the LLM completion.
///
/// Every field is loose on purpose: the model can and does emit synonyms,
/// missing fields, or the wrong shapes. Nothing downstream of the validator
/// ever touches this type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawChartIntent {
    pub dataset: Option<String>,
    pub metrics: Option<Vec<RawMetric>>,
    pub dimensions: Option<Vec<RawDimension>>,
    pub filters: Option<Vec<RawFilter>>,
    pub chart_type: Option<String>,
    pub title: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawMetric {
    pub field: Option<String>,
    pub aggregation: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDimension {
    pub field: Option<String>,
    pub granularity: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFilter {
    pub field: Option<String>,
    pub operator: Option<String>,
    pub value: Option<Value>,
}

/// Validated chart intent. Only the validator constructs this, so the query
/// engine and spec builder can trust its invariants: non-empty metrics, known
/// aggregations and chart type, limit within 1..=100.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartIntent {
    pub dataset: String,
    pub metrics: Vec<Metric>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<Dimension>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    pub chart_type: ChartType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub field: String,
    pub aggregation: Aggregation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Metric {
    /// Series label: explicit label, otherwise "agg(field)"
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("{}({})", self.aggregation, self.field))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Dimension {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Granularity>,
}

/// Filter operator stays a free string: the query engine deliberately passes
/// records through on operators it does not recognize instead of rejecting
/// the whole intent, so validation must not filter them out here.
#[derive(Debug, Clone, Serialize)]
pub struct Filter {
    pub field: String,
    pub operator: String,
    pub value: Value,
}

/// Catalog snapshot handed to the LLM so it only references real datasets,
/// fields and chart types.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentContext {
    pub datasets: Vec<DatasetInfo>,
    pub available_chart_types: Vec<ChartType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub name: String,
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
}
