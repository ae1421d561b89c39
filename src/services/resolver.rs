use std::collections::HashMap;

use chrono::Utc;
use log::{info, warn};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ResolveError;
use crate::models::chart::{AxisSpec, ChartMetadata, ChartResponse, ChartSpec, LegendSpec};
use crate::models::intent::{ChartIntent, ChartType, DatasetInfo, IntentContext};
use crate::services::{validation, DataAdapter, LlmProvider};

/// Orchestrates the pipeline from prompt to rendered-chart response.
/// Stateless per request; the provider and adapter are injected once at
/// construction so tests can substitute fakes.
#[derive(Clone, Debug)]
pub struct IntentResolver<P, A>
where
    P: LlmProvider + Clone + std::fmt::Debug,
    A: DataAdapter + Clone + std::fmt::Debug,
{
    provider: P,
    adapter: A,
}

impl<P, A> IntentResolver<P, A>
where
    P: LlmProvider + Clone + std::fmt::Debug,
    A: DataAdapter + Clone + std::fmt::Debug,
{
    pub fn new(provider: P, adapter: A) -> Self {
        Self { provider, adapter }
    }

    pub fn available_datasets(&self) -> Vec<String> {
        self.adapter.available_datasets()
    }

    /// Resolve a natural-language prompt into a renderable chart response.
    /// One LLM round-trip per call; invalid LLM output is not retried here.
    pub async fn resolve(
        &self,
        prompt: &str,
        additional_context: Option<HashMap<String, Value>>,
    ) -> Result<ChartResponse, ResolveError> {
        let request_id = Uuid::new_v4();

        let prompt = validation::sanitize_prompt(prompt).ok_or(ResolveError::EmptyPrompt)?;
        info!("[Req-{}] Resolving prompt ({} chars)", request_id, prompt.len());

        let context = self.build_context(additional_context);

        let result = self.provider.generate_intent(&prompt, &context).await?;
        let mut raw_intent = result.intent;

        validation::normalize_intent(&mut raw_intent);
        let intent = validation::validate_intent(raw_intent).map_err(|errors| {
            warn!(
                "[Req-{}] LLM intent failed validation: {}",
                request_id,
                errors.join(", ")
            );
            ResolveError::InvalidIntent(errors)
        })?;

        info!(
            "[Req-{}] Executing {} query against dataset '{}'",
            request_id, intent.chart_type, intent.dataset
        );
        let data = self.adapter.execute_query(&intent).await?;

        let chart_spec = build_chart_spec(&intent);
        let record_count = data.labels.len();
        info!("[Req-{}] Resolved chart with {} data points", request_id, record_count);

        Ok(ChartResponse {
            chart_spec,
            data,
            metadata: ChartMetadata {
                generated_at: Utc::now().to_rfc3339(),
                dataset: intent.dataset.clone(),
                record_count,
                intent,
            },
        })
    }

    fn build_context(
        &self,
        additional_context: Option<HashMap<String, Value>>,
    ) -> IntentContext {
        let datasets = self
            .adapter
            .available_datasets()
            .into_iter()
            .map(|name| DatasetInfo {
                metrics: self.adapter.available_metrics(&name),
                dimensions: self.adapter.available_dimensions(&name),
                name,
            })
            .collect();

        IntentContext {
            datasets,
            available_chart_types: ChartType::ALL.to_vec(),
            additional_context,
        }
    }
}

/// Derive the presentation-level chart spec from a validated intent
pub fn build_chart_spec(intent: &ChartIntent) -> ChartSpec {
    let dimension = intent.dimensions.first();
    // Validation guarantees at least one metric
    let metric = &intent.metrics[0];

    let title = intent.title.clone().unwrap_or_else(|| {
        format!(
            "{}({}) by {}",
            metric.aggregation,
            metric.field,
            dimension.map(|d| d.field.as_str()).unwrap_or("value")
        )
    });

    ChartSpec {
        chart_type: intent.chart_type,
        title,
        x_axis: dimension.map(|d| AxisSpec {
            label: Some(d.field.clone()),
            axis_type: Some(if d.field == "date" { "time" } else { "category" }.to_string()),
        }),
        y_axis: Some(AxisSpec {
            label: Some(metric.display_label()),
            axis_type: Some("linear".to_string()),
        }),
        legend: Some(LegendSpec {
            position: Some("top".to_string()),
            display: Some(intent.metrics.len() > 1 || intent.chart_type.is_segmented()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chart::ChartData;
    use crate::models::intent::{
        Aggregation, Dimension, Metric, RawChartIntent, RawMetric,
    };
    use crate::services::{IntentResult, MockDataAdapter};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Provider that returns a canned raw intent without any network call
    #[derive(Clone, Debug)]
    struct FakeProvider {
        intent: RawChartIntent,
    }

    #[async_trait::async_trait]
    impl LlmProvider for FakeProvider {
        async fn generate_intent(
            &self,
            _prompt: &str,
            _context: &IntentContext,
        ) -> Result<IntentResult, ResolveError> {
            Ok(IntentResult {
                intent: self.intent.clone(),
                raw_response: String::new(),
            })
        }
    }

    /// Adapter wrapper that counts query executions
    #[derive(Clone, Debug)]
    struct CountingAdapter {
        inner: Arc<MockDataAdapter>,
        queries: Arc<AtomicUsize>,
    }

    impl CountingAdapter {
        fn new() -> Self {
            Self {
                inner: Arc::new(MockDataAdapter::new()),
                queries: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl DataAdapter for CountingAdapter {
        fn available_datasets(&self) -> Vec<String> {
            self.inner.available_datasets()
        }
        fn available_metrics(&self, dataset: &str) -> Vec<String> {
            self.inner.available_metrics(dataset)
        }
        fn available_dimensions(&self, dataset: &str) -> Vec<String> {
            self.inner.available_dimensions(dataset)
        }
        async fn execute_query(&self, intent: &ChartIntent) -> Result<ChartData, ResolveError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.execute_query(intent).await
        }
    }

    fn raw_intent(dataset: &str) -> RawChartIntent {
        RawChartIntent {
            dataset: Some(dataset.to_string()),
            metrics: Some(vec![RawMetric {
                field: Some("amount".to_string()),
                aggregation: Some("sum".to_string()),
                label: None,
            }]),
            chart_type: Some("bar".to_string()),
            ..Default::default()
        }
    }

    fn intent(dataset: &str) -> ChartIntent {
        ChartIntent {
            dataset: dataset.to_string(),
            metrics: vec![Metric {
                field: "amount".to_string(),
                aggregation: Aggregation::Sum,
                label: None,
            }],
            dimensions: Vec::new(),
            filters: Vec::new(),
            chart_type: ChartType::Bar,
            title: None,
            sort_by: None,
            sort_order: None,
            limit: None,
        }
    }

    #[tokio::test]
    async fn resolve_produces_spec_data_and_metadata() {
        let provider = FakeProvider {
            intent: raw_intent("sales"),
        };
        let resolver = IntentResolver::new(provider, CountingAdapter::new());

        let response = resolver.resolve("total sales", None).await.unwrap();
        assert_eq!(response.chart_spec.title, "sum(amount) by value");
        assert_eq!(response.metadata.dataset, "sales");
        assert_eq!(response.metadata.record_count, response.data.labels.len());
        assert_eq!(response.metadata.intent.dataset, "sales");
        for series in &response.data.datasets {
            assert_eq!(series.data.len(), response.data.labels.len());
        }
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_before_the_provider_runs() {
        let provider = FakeProvider {
            intent: raw_intent("sales"),
        };
        let resolver = IntentResolver::new(provider, CountingAdapter::new());

        let err = resolver.resolve("  <p></p> ", None).await.unwrap_err();
        assert!(matches!(err, ResolveError::EmptyPrompt));
    }

    #[tokio::test]
    async fn invalid_intent_never_reaches_the_query_engine() {
        let mut bad = raw_intent("sales");
        bad.metrics = Some(vec![]);
        let provider = FakeProvider { intent: bad };
        let adapter = CountingAdapter::new();
        let resolver = IntentResolver::new(provider, adapter.clone());

        let err = resolver.resolve("show sales", None).await.unwrap_err();
        match err {
            ResolveError::InvalidIntent(errors) => assert!(!errors.is_empty()),
            other => panic!("expected InvalidIntent, got {:?}", other),
        }
        assert_eq!(adapter.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dataset_invented_by_the_llm_surfaces_as_unknown_dataset() {
        let provider = FakeProvider {
            intent: raw_intent("weather"),
        };
        let resolver = IntentResolver::new(provider, CountingAdapter::new());

        let err = resolver.resolve("rainfall by month", None).await.unwrap_err();
        assert!(matches!(err, ResolveError::UnknownDataset(_)));
    }

    #[test]
    fn spec_title_uses_first_metric_and_dimension() {
        let mut i = intent("sales");
        i.dimensions = vec![Dimension {
            field: "region".to_string(),
            granularity: None,
        }];
        let spec = build_chart_spec(&i);
        assert_eq!(spec.title, "sum(amount) by region");
        assert_eq!(spec.x_axis.unwrap().axis_type.as_deref(), Some("category"));
        assert_eq!(spec.legend.unwrap().display, Some(false));
    }

    #[test]
    fn date_dimension_gets_a_time_axis() {
        let mut i = intent("sales");
        i.dimensions = vec![Dimension {
            field: "date".to_string(),
            granularity: None,
        }];
        let spec = build_chart_spec(&i);
        assert_eq!(spec.x_axis.unwrap().axis_type.as_deref(), Some("time"));
    }

    #[test]
    fn legend_shows_for_pie_or_multiple_metrics() {
        let mut i = intent("sales");
        i.chart_type = ChartType::Pie;
        assert_eq!(build_chart_spec(&i).legend.unwrap().display, Some(true));

        let mut i = intent("sales");
        i.metrics.push(Metric {
            field: "quantity".to_string(),
            aggregation: Aggregation::Avg,
            label: Some("Avg qty".to_string()),
        });
        assert_eq!(build_chart_spec(&i).legend.unwrap().display, Some(true));
    }

    #[test]
    fn explicit_title_wins() {
        let mut i = intent("sales");
        i.title = Some("Revenue picture".to_string());
        assert_eq!(build_chart_spec(&i).title, "Revenue picture");
    }

    #[test]
    fn ungrouped_spec_has_no_x_axis() {
        let spec = build_chart_spec(&intent("sales"));
        assert!(spec.x_axis.is_none());
        assert_eq!(spec.y_axis.unwrap().label.as_deref(), Some("sum(amount)"));
    }
}
