use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info};
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::ResolveError;
use crate::models::intent::{IntentContext, RawChartIntent};
use crate::services::{IntentResult, LlmProvider};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f64 = 0.1;

// The schema is embedded in the instruction text so the model returns
// exactly the shape the validator expects
const SYSTEM_PROMPT: &str = r#"You are a data visualization assistant. Your task is to convert natural language requests into structured JSON specifications for charts.

You must respond with valid JSON only, no markdown or explanations. The JSON must conform to this structure:

{
  "dataset": string,      // One of the available datasets
  "metrics": [{           // At least one metric required
    "field": string,      // Field to measure
    "aggregation": string // sum, avg, min, max, count
  }],
  "dimensions": [{        // Optional: how to group data
    "field": string,
    "granularity": string // For date fields: day, week, month, quarter, year
  }],
  "filters": [{           // Optional: filters to apply
    "field": string,
    "operator": string,   // eq, neq, gt, gte, lt, lte, in, between
    "value": any
  }],
  "chartType": string,    // bar, line, pie, doughnut, area, scatter
  "title": string,        // Optional: chart title
  "sortBy": string,       // Optional: value, label, date
  "sortOrder": string,    // Optional: asc, desc
  "limit": number         // Optional: max data points (1-100)
}

Guidelines:
- Choose the most appropriate chart type for the data
- Only reference fields that belong to the chosen dataset
- Use line charts for trends over time
- Use bar charts for comparisons
- Use pie/doughnut for proportions
- Infer reasonable defaults when not specified
- Generate a descriptive title if not provided"#;

/// LLM provider backed by the OpenAI chat completions API
#[derive(Clone, Debug)]
pub struct OpenAiProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
}

impl OpenAiProvider {
    /// Build from config. A missing API key is not fatal here: the provider
    /// is constructed anyway and every `generate_intent` call fails until
    /// the key is configured.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        match &config.openai_api_key {
            Some(_) => info!("OpenAiProvider initialized with model {}", config.openai_model),
            None => info!("OpenAiProvider initialized without an API key"),
        }

        Ok(Self {
            client,
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
        })
    }

    fn render_context(context: &IntentContext) -> String {
        let mut lines = vec!["Available context:".to_string(), "- Datasets:".to_string()];
        for dataset in &context.datasets {
            lines.push(format!(
                "  - {} (metrics: {}; dimensions: {})",
                dataset.name,
                dataset.metrics.join(", "),
                dataset.dimensions.join(", ")
            ));
        }
        lines.push(format!(
            "- Chart types: {}",
            context
                .available_chart_types
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        if let Some(additional) = &context.additional_context {
            lines.push(format!(
                "- Additional context: {}",
                serde_json::to_string(additional).unwrap_or_default()
            ));
        }
        lines.join("\n")
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate_intent(
        &self,
        prompt: &str,
        context: &IntentContext,
    ) -> Result<IntentResult, ResolveError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ResolveError::Provider("OpenAI API key is not configured".to_string()))?;

        let user_message = format!(
            "{}\n\nUser request: {}",
            Self::render_context(context),
            prompt
        );

        let request_body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_message },
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "response_format": { "type": "json_object" },
        });

        debug!("Sending intent request to OpenAI with model {}", self.model);

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send request to OpenAI API: {}", e);
                if e.is_timeout() {
                    ResolveError::Provider(format!(
                        "OpenAI API request timed out after {} seconds",
                        REQUEST_TIMEOUT_SECS
                    ))
                } else {
                    ResolveError::Provider(format!("Failed to reach OpenAI API: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            error!("OpenAI API error: status {}, details: {}", status, error_text);
            return Err(ResolveError::Provider(format!(
                "OpenAI API returned status {}",
                status
            )));
        }

        let response_json: Value = response.json().await.map_err(|e| {
            error!("Failed to parse OpenAI API response as JSON: {}", e);
            ResolveError::Provider(format!("Failed to parse OpenAI response: {}", e))
        })?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                error!("OpenAI response carried no completion content");
                ResolveError::Provider("No response content from OpenAI".to_string())
            })?;

        // Parse the completion into the untrusted intent shape; semantic
        // validation happens in the resolver, not here
        let intent: RawChartIntent = serde_json::from_str(content).map_err(|e| {
            error!("OpenAI completion was not a valid intent JSON: {}", e);
            ResolveError::Provider(format!("Unparseable intent from OpenAI: {}", e))
        })?;

        Ok(IntentResult {
            intent,
            raw_response: content.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::intent::{ChartType, DatasetInfo};

    #[test]
    fn context_rendering_lists_datasets_and_chart_types() {
        let context = IntentContext {
            datasets: vec![DatasetInfo {
                name: "sales".to_string(),
                metrics: vec!["amount".to_string()],
                dimensions: vec!["region".to_string()],
            }],
            available_chart_types: ChartType::ALL.to_vec(),
            additional_context: None,
        };

        let rendered = OpenAiProvider::render_context(&context);
        assert!(rendered.contains("sales (metrics: amount; dimensions: region)"));
        assert!(rendered.contains("bar, line, pie, doughnut, area, scatter"));
    }

    #[tokio::test]
    async fn missing_api_key_is_a_provider_error() {
        let config = Config {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            server_port: 8080,
        };
        let provider = OpenAiProvider::new(&config).unwrap();
        let context = IntentContext {
            datasets: Vec::new(),
            available_chart_types: ChartType::ALL.to_vec(),
            additional_context: None,
        };

        let err = provider.generate_intent("show sales", &context).await.unwrap_err();
        assert!(matches!(err, ResolveError::Provider(_)));
    }
}
