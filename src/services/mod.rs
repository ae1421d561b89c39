pub mod mock_adapter;
pub mod openai;
pub mod resolver;
pub mod validation;

use crate::error::ResolveError;
use crate::models::chart::ChartData;
use crate::models::intent::{ChartIntent, IntentContext, RawChartIntent};

/// What a language-model call produced: the parsed (still untrusted) intent
/// plus the raw completion text for logging/debugging.
#[derive(Debug, Clone)]
pub struct IntentResult {
    pub intent: RawChartIntent,
    pub raw_response: String,
}

/// A language-model backend that turns a prompt plus catalog context into a
/// structured chart intent. Output is unvalidated by contract; the resolver
/// owns validation.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync + 'static {
    async fn generate_intent(
        &self,
        prompt: &str,
        context: &IntentContext,
    ) -> Result<IntentResult, ResolveError>;
}

/// A queryable catalog of datasets. Introspection fails soft (empty lists
/// for unknown dataset names); only `execute_query` errors, and only for a
/// dataset missing from the catalog.
#[async_trait::async_trait]
pub trait DataAdapter: Send + Sync + 'static {
    fn available_datasets(&self) -> Vec<String>;
    fn available_metrics(&self, dataset: &str) -> Vec<String>;
    fn available_dimensions(&self, dataset: &str) -> Vec<String>;
    async fn execute_query(&self, intent: &ChartIntent) -> Result<ChartData, ResolveError>;
}

// Re-export the services
pub use mock_adapter::MockDataAdapter;
pub use openai::OpenAiProvider;
pub use resolver::IntentResolver;
