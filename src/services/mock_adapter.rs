use std::cmp::Ordering;
use std::collections::HashMap;

use log::warn;
use serde_json::{json, Map, Value};

use crate::error::ResolveError;
use crate::models::chart::{ChartData, ChartDataset, ColorSpec};
use crate::models::intent::{Aggregation, ChartIntent, Filter, SortBy, SortOrder};
use crate::services::DataAdapter;

/// A single row: field name -> scalar value
pub type DataRecord = Map<String, Value>;

// Fill and border palettes cycled by index (Chart.js friendly rgba strings)
const FILL_PALETTE: [&str; 8] = [
    "rgba(59, 130, 246, 0.8)",  // blue
    "rgba(16, 185, 129, 0.8)",  // green
    "rgba(245, 158, 11, 0.8)",  // amber
    "rgba(239, 68, 68, 0.8)",   // red
    "rgba(139, 92, 246, 0.8)",  // purple
    "rgba(236, 72, 153, 0.8)",  // pink
    "rgba(20, 184, 166, 0.8)",  // teal
    "rgba(249, 115, 22, 0.8)",  // orange
];

const BORDER_PALETTE: [&str; 8] = [
    "rgba(59, 130, 246, 1)",
    "rgba(16, 185, 129, 1)",
    "rgba(245, 158, 11, 1)",
    "rgba(239, 68, 68, 1)",
    "rgba(139, 92, 246, 1)",
    "rgba(236, 72, 153, 1)",
    "rgba(20, 184, 166, 1)",
    "rgba(249, 115, 22, 1)",
];

#[derive(Debug)]
struct DatasetEntry {
    metrics: Vec<String>,
    dimensions: Vec<String>,
    records: Vec<DataRecord>,
}

#[derive(Debug, Default)]
struct Catalog {
    order: Vec<String>,
    datasets: HashMap<String, DatasetEntry>,
}

/// In-memory data adapter with a fixed demo catalog. Stands in for a real
/// warehouse connection; the catalog is immutable after construction so it
/// is shared read-only across requests.
#[derive(Clone, Debug)]
pub struct MockDataAdapter {
    catalog: std::sync::Arc<Catalog>,
}

impl MockDataAdapter {
    pub fn new() -> Self {
        let mut adapter = CatalogBuilder::default();

        adapter.register(
            "sales",
            &["amount", "quantity", "revenue"],
            &["month", "quarter", "year", "region", "category"],
            json!([
                { "month": "Jan", "quarter": "Q1", "year": 2024, "region": "North", "category": "Electronics", "amount": 45000, "quantity": 120, "revenue": 45000 },
                { "month": "Jan", "quarter": "Q1", "year": 2024, "region": "South", "category": "Electronics", "amount": 38000, "quantity": 95, "revenue": 38000 },
                { "month": "Jan", "quarter": "Q1", "year": 2024, "region": "North", "category": "Clothing", "amount": 22000, "quantity": 310, "revenue": 22000 },
                { "month": "Feb", "quarter": "Q1", "year": 2024, "region": "North", "category": "Electronics", "amount": 52000, "quantity": 140, "revenue": 52000 },
                { "month": "Feb", "quarter": "Q1", "year": 2024, "region": "South", "category": "Electronics", "amount": 41000, "quantity": 105, "revenue": 41000 },
                { "month": "Feb", "quarter": "Q1", "year": 2024, "region": "North", "category": "Clothing", "amount": 25000, "quantity": 340, "revenue": 25000 },
                { "month": "Mar", "quarter": "Q1", "year": 2024, "region": "North", "category": "Electronics", "amount": 48000, "quantity": 130, "revenue": 48000 },
                { "month": "Mar", "quarter": "Q1", "year": 2024, "region": "South", "category": "Electronics", "amount": 44000, "quantity": 115, "revenue": 44000 },
                { "month": "Mar", "quarter": "Q1", "year": 2024, "region": "North", "category": "Clothing", "amount": 28000, "quantity": 380, "revenue": 28000 },
                { "month": "Apr", "quarter": "Q2", "year": 2024, "region": "North", "category": "Electronics", "amount": 55000, "quantity": 145, "revenue": 55000 },
                { "month": "Apr", "quarter": "Q2", "year": 2024, "region": "South", "category": "Electronics", "amount": 47000, "quantity": 120, "revenue": 47000 },
                { "month": "May", "quarter": "Q2", "year": 2024, "region": "North", "category": "Electronics", "amount": 61000, "quantity": 160, "revenue": 61000 },
                { "month": "May", "quarter": "Q2", "year": 2024, "region": "South", "category": "Electronics", "amount": 52000, "quantity": 135, "revenue": 52000 },
                { "month": "Jun", "quarter": "Q2", "year": 2024, "region": "North", "category": "Electronics", "amount": 58000, "quantity": 155, "revenue": 58000 },
                { "month": "Jun", "quarter": "Q2", "year": 2024, "region": "South", "category": "Electronics", "amount": 49000, "quantity": 125, "revenue": 49000 }
            ]),
        );

        adapter.register(
            "users",
            &["signups", "activeUsers", "sessions"],
            &["month", "year", "channel"],
            json!([
                { "month": "Jan", "year": 2024, "channel": "Organic", "signups": 1200, "activeUsers": 8500, "sessions": 45000 },
                { "month": "Jan", "year": 2024, "channel": "Paid", "signups": 800, "activeUsers": 3200, "sessions": 18000 },
                { "month": "Feb", "year": 2024, "channel": "Organic", "signups": 1350, "activeUsers": 9200, "sessions": 51000 },
                { "month": "Feb", "year": 2024, "channel": "Paid", "signups": 950, "activeUsers": 3800, "sessions": 21000 },
                { "month": "Mar", "year": 2024, "channel": "Organic", "signups": 1500, "activeUsers": 10100, "sessions": 58000 },
                { "month": "Mar", "year": 2024, "channel": "Paid", "signups": 1100, "activeUsers": 4500, "sessions": 25000 },
                { "month": "Apr", "year": 2024, "channel": "Organic", "signups": 1650, "activeUsers": 11200, "sessions": 64000 },
                { "month": "Apr", "year": 2024, "channel": "Paid", "signups": 1250, "activeUsers": 5200, "sessions": 29000 },
                { "month": "May", "year": 2024, "channel": "Organic", "signups": 1800, "activeUsers": 12500, "sessions": 72000 },
                { "month": "May", "year": 2024, "channel": "Paid", "signups": 1400, "activeUsers": 6000, "sessions": 34000 },
                { "month": "Jun", "year": 2024, "channel": "Organic", "signups": 1950, "activeUsers": 13800, "sessions": 79000 },
                { "month": "Jun", "year": 2024, "channel": "Paid", "signups": 1550, "activeUsers": 6800, "sessions": 38000 }
            ]),
        );

        adapter.register(
            "products",
            &["price", "quantity", "revenue", "cost", "profit"],
            &["product", "category"],
            json!([
                { "product": "Laptop Pro", "category": "Electronics", "price": 1299, "quantity": 450, "revenue": 584550, "cost": 400000, "profit": 184550 },
                { "product": "Wireless Mouse", "category": "Electronics", "price": 49, "quantity": 2200, "revenue": 107800, "cost": 44000, "profit": 63800 },
                { "product": "USB-C Hub", "category": "Electronics", "price": 79, "quantity": 1800, "revenue": 142200, "cost": 54000, "profit": 88200 },
                { "product": "Mechanical Keyboard", "category": "Electronics", "price": 159, "quantity": 950, "revenue": 151050, "cost": 66500, "profit": 84550 },
                { "product": "Monitor 27\"", "category": "Electronics", "price": 449, "quantity": 620, "revenue": 278380, "cost": 186000, "profit": 92380 },
                { "product": "Webcam HD", "category": "Electronics", "price": 89, "quantity": 1400, "revenue": 124600, "cost": 56000, "profit": 68600 },
                { "product": "Headphones", "category": "Electronics", "price": 199, "quantity": 1100, "revenue": 218900, "cost": 88000, "profit": 130900 },
                { "product": "Tablet Stand", "category": "Accessories", "price": 39, "quantity": 3200, "revenue": 124800, "cost": 48000, "profit": 76800 }
            ]),
        );

        adapter.register(
            "orders",
            &["count", "amount"],
            &["month", "status", "region"],
            json!([
                { "month": "Jan", "status": "completed", "region": "North", "count": 1250, "amount": 125000 },
                { "month": "Jan", "status": "pending", "region": "North", "count": 85, "amount": 8500 },
                { "month": "Jan", "status": "cancelled", "region": "North", "count": 45, "amount": 4500 },
                { "month": "Feb", "status": "completed", "region": "North", "count": 1380, "amount": 138000 },
                { "month": "Feb", "status": "pending", "region": "North", "count": 92, "amount": 9200 },
                { "month": "Mar", "status": "completed", "region": "North", "count": 1520, "amount": 152000 },
                { "month": "Mar", "status": "pending", "region": "North", "count": 78, "amount": 7800 },
                { "month": "Apr", "status": "completed", "region": "North", "count": 1650, "amount": 165000 },
                { "month": "May", "status": "completed", "region": "North", "count": 1780, "amount": 178000 },
                { "month": "Jun", "status": "completed", "region": "North", "count": 1890, "amount": 189000 }
            ]),
        );

        adapter.register(
            "inventory",
            &["quantity"],
            &["product", "category", "status"],
            json!([
                { "product": "Laptop Pro", "category": "Electronics", "quantity": 125, "status": "in_stock" },
                { "product": "Wireless Mouse", "category": "Electronics", "quantity": 580, "status": "in_stock" },
                { "product": "USB-C Hub", "category": "Electronics", "quantity": 45, "status": "low_stock" },
                { "product": "Mechanical Keyboard", "category": "Electronics", "quantity": 210, "status": "in_stock" },
                { "product": "Monitor 27\"", "category": "Electronics", "quantity": 18, "status": "low_stock" },
                { "product": "Webcam HD", "category": "Electronics", "quantity": 340, "status": "in_stock" },
                { "product": "Headphones", "category": "Electronics", "quantity": 0, "status": "out_of_stock" },
                { "product": "Tablet Stand", "category": "Accessories", "quantity": 890, "status": "in_stock" }
            ]),
        );

        Self {
            catalog: std::sync::Arc::new(adapter.0),
        }
    }
}

#[derive(Default)]
struct CatalogBuilder(Catalog);

impl CatalogBuilder {
    fn register(&mut self, name: &str, metrics: &[&str], dimensions: &[&str], rows: Value) {
        let records = match rows {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        self.0.order.push(name.to_string());
        self.0.datasets.insert(
            name.to_string(),
            DatasetEntry {
                metrics: metrics.iter().map(|s| s.to_string()).collect(),
                dimensions: dimensions.iter().map(|s| s.to_string()).collect(),
                records,
            },
        );
    }
}

impl MockDataAdapter {
    /// Keep only records satisfying every filter (conjunction)
    fn apply_filters<'a>(&self, records: &'a [DataRecord], filters: &[Filter]) -> Vec<&'a DataRecord> {
        records
            .iter()
            .filter(|record| filters.iter().all(|f| record_matches(record, f)))
            .collect()
    }

    fn group_and_aggregate(&self, records: &[&DataRecord], intent: &ChartIntent) -> ChartData {
        let dimension = intent.dimensions.first();

        // No dimension: one label per metric, a single series over the whole
        // filtered set
        let Some(dimension) = dimension else {
            let labels: Vec<String> = intent.metrics.iter().map(|m| m.display_label()).collect();
            let data: Vec<f64> = intent
                .metrics
                .iter()
                .map(|m| aggregate(records, &m.field, m.aggregation))
                .collect();
            let n = data.len();

            return ChartData {
                labels,
                datasets: vec![ChartDataset {
                    label: "Value".to_string(),
                    data,
                    background_color: Some(ColorSpec::PerPoint(palette_cycle(&FILL_PALETTE, n))),
                    border_color: Some(ColorSpec::PerPoint(palette_cycle(&BORDER_PALETTE, n))),
                    border_width: Some(1),
                }],
            };
        };

        // Partition by stringified dimension value, first-seen order
        let mut labels: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<&DataRecord>> = HashMap::new();
        for record in records {
            let key = match record.get(&dimension.field) {
                None | Some(Value::Null) => "Unknown".to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            if !groups.contains_key(&key) {
                labels.push(key.clone());
            }
            groups.entry(key).or_default().push(record);
        }

        let datasets = intent
            .metrics
            .iter()
            .enumerate()
            .map(|(idx, metric)| {
                let data: Vec<f64> = labels
                    .iter()
                    .map(|label| aggregate(&groups[label], &metric.field, metric.aggregation))
                    .collect();

                let (background_color, border_color) = if intent.chart_type.is_segmented() {
                    (
                        ColorSpec::PerPoint(palette_cycle(&FILL_PALETTE, labels.len())),
                        ColorSpec::PerPoint(palette_cycle(&BORDER_PALETTE, labels.len())),
                    )
                } else {
                    (
                        ColorSpec::Single(FILL_PALETTE[idx % FILL_PALETTE.len()].to_string()),
                        ColorSpec::Single(BORDER_PALETTE[idx % BORDER_PALETTE.len()].to_string()),
                    )
                };

                ChartDataset {
                    label: metric.display_label(),
                    data,
                    background_color: Some(background_color),
                    border_color: Some(border_color),
                    border_width: Some(1),
                }
            })
            .collect();

        ChartData { labels, datasets }
    }

    /// Permute labels and every series (data + per-point colors) in lockstep
    fn sort_results(&self, chart: &mut ChartData, sort_by: SortBy, sort_order: SortOrder) {
        let mut indices: Vec<usize> = (0..chart.labels.len()).collect();

        indices.sort_by(|&a, &b| {
            let cmp = match sort_by {
                SortBy::Label => chart.labels[a].cmp(&chart.labels[b]),
                SortBy::Value => match chart.datasets.first() {
                    Some(series) => series.data[a]
                        .partial_cmp(&series.data[b])
                        .unwrap_or(Ordering::Equal),
                    None => Ordering::Equal,
                },
                // Labels arrive in first-seen record order, which for the
                // fixture data is already chronological
                SortBy::Date => Ordering::Equal,
            };
            match sort_order {
                SortOrder::Asc => cmp,
                SortOrder::Desc => cmp.reverse(),
            }
        });

        let permuted: Vec<String> = indices.iter().map(|&i| chart.labels[i].clone()).collect();
        chart.labels = permuted;
        for series in &mut chart.datasets {
            let permuted: Vec<f64> = indices.iter().map(|&i| series.data[i]).collect();
            series.data = permuted;
            for color in [&mut series.background_color, &mut series.border_color] {
                if let Some(ColorSpec::PerPoint(colors)) = color {
                    let permuted: Vec<String> = indices.iter().map(|&i| colors[i].clone()).collect();
                    *colors = permuted;
                }
            }
        }
    }

    fn apply_limit(&self, chart: &mut ChartData, limit: usize) {
        chart.labels.truncate(limit);
        for series in &mut chart.datasets {
            series.data.truncate(limit);
            for color in [&mut series.background_color, &mut series.border_color] {
                if let Some(ColorSpec::PerPoint(colors)) = color {
                    colors.truncate(limit);
                }
            }
        }
    }
}

impl Default for MockDataAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DataAdapter for MockDataAdapter {
    fn available_datasets(&self) -> Vec<String> {
        self.catalog.order.clone()
    }

    fn available_metrics(&self, dataset: &str) -> Vec<String> {
        self.catalog
            .datasets
            .get(dataset)
            .map(|entry| entry.metrics.clone())
            .unwrap_or_default()
    }

    fn available_dimensions(&self, dataset: &str) -> Vec<String> {
        self.catalog
            .datasets
            .get(dataset)
            .map(|entry| entry.dimensions.clone())
            .unwrap_or_default()
    }

    async fn execute_query(&self, intent: &ChartIntent) -> Result<ChartData, ResolveError> {
        let entry = self
            .catalog
            .datasets
            .get(&intent.dataset)
            .ok_or_else(|| ResolveError::UnknownDataset(intent.dataset.clone()))?;

        let filtered = self.apply_filters(&entry.records, &intent.filters);
        let mut chart = self.group_and_aggregate(&filtered, intent);

        if let Some(sort_by) = intent.sort_by {
            let sort_order = intent.sort_order.unwrap_or(SortOrder::Desc);
            self.sort_results(&mut chart, sort_by, sort_order);
        }

        if let Some(limit) = intent.limit {
            self.apply_limit(&mut chart, limit);
        }

        Ok(chart)
    }
}

fn palette_cycle(palette: &[&str], n: usize) -> Vec<String> {
    (0..n).map(|i| palette[i % palette.len()].to_string()).collect()
}

/// Equality across JSON number representations (45000 vs 45000.0 compare
/// equal); everything else falls back to plain value equality
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn record_matches(record: &DataRecord, filter: &Filter) -> bool {
    let value = record.get(&filter.field);

    match filter.operator.as_str() {
        "eq" => value.map_or(false, |v| values_equal(v, &filter.value)),
        "neq" => !value.map_or(false, |v| values_equal(v, &filter.value)),
        "gt" | "gte" | "lt" | "lte" => {
            // Numeric-only comparisons; anything else evaluates false
            let (Some(v), Some(fv)) = (value.and_then(Value::as_f64), filter.value.as_f64())
            else {
                return false;
            };
            match filter.operator.as_str() {
                "gt" => v > fv,
                "gte" => v >= fv,
                "lt" => v < fv,
                _ => v <= fv,
            }
        }
        "in" => match (&filter.value, value) {
            (Value::Array(options), Some(v)) => options.iter().any(|o| values_equal(o, v)),
            _ => false,
        },
        "between" => match (&filter.value, value.and_then(Value::as_f64)) {
            (Value::Array(bounds), Some(v)) if bounds.len() == 2 => {
                match (bounds[0].as_f64(), bounds[1].as_f64()) {
                    (Some(lo), Some(hi)) => v >= lo && v <= hi,
                    _ => false,
                }
            }
            _ => false,
        },
        other => {
            // Fail open on operators we do not recognize; the record passes
            // unfiltered
            warn!("Unrecognized filter operator '{}', record passes through", other);
            true
        }
    }
}

/// Reduce the numeric values of `field` across `records`. Non-numeric values
/// are excluded; an empty value set aggregates to 0.
fn aggregate(records: &[&DataRecord], field: &str, aggregation: Aggregation) -> f64 {
    let values: Vec<f64> = records
        .iter()
        .filter_map(|r| r.get(field).and_then(Value::as_f64))
        .collect();

    if values.is_empty() {
        return 0.0;
    }

    match aggregation {
        Aggregation::Sum => values.iter().sum(),
        Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
        Aggregation::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
        Aggregation::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        Aggregation::Count => values.len() as f64,
    }
}
