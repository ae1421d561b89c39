use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::intent::{
    Aggregation, ChartIntent, ChartType, Dimension, Filter, Granularity, Metric, RawChartIntent,
    SortBy, SortOrder,
};

const MAX_PROMPT_LEN: usize = 1000;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Strip HTML-like tags and braces from the user prompt, trim it, and cap
/// its length. Returns None when nothing usable remains.
pub fn sanitize_prompt(prompt: &str) -> Option<String> {
    let stripped = HTML_TAG.replace_all(prompt, "");
    let mut sanitized: String = stripped.chars().filter(|c| *c != '{' && *c != '}').collect();
    sanitized = sanitized.trim().to_string();

    if sanitized.chars().count() > MAX_PROMPT_LEN {
        sanitized = sanitized.chars().take(MAX_PROMPT_LEN).collect();
    }

    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Canonicalize vocabulary the LLM tends to drift on. Currently this covers
/// time granularity synonyms; an unknown granularity is dropped from its
/// dimension rather than failing the whole intent.
pub fn normalize_intent(intent: &mut RawChartIntent) {
    if let Some(dimensions) = &mut intent.dimensions {
        for dim in dimensions {
            if let Some(granularity) = dim.granularity.take() {
                dim.granularity = canonical_granularity(&granularity).map(str::to_string);
            }
        }
    }
}

fn canonical_granularity(raw: &str) -> Option<&'static str> {
    match raw.to_lowercase().as_str() {
        "daily" | "day" => Some("day"),
        "weekly" | "week" => Some("week"),
        "monthly" | "month" => Some("month"),
        "quarterly" | "quarter" => Some("quarter"),
        "yearly" | "annual" | "year" => Some("year"),
        _ => None,
    }
}

fn parse_granularity(s: &str) -> Option<Granularity> {
    match s {
        "day" => Some(Granularity::Day),
        "week" => Some(Granularity::Week),
        "month" => Some(Granularity::Month),
        "quarter" => Some(Granularity::Quarter),
        "year" => Some(Granularity::Year),
        _ => None,
    }
}

/// The trust boundary: turn an untrusted `RawChartIntent` into a validated
/// `ChartIntent`, or report every problem found.
///
/// Deliberately unchecked here: whether referenced field names exist in the
/// dataset's catalog (unknown fields aggregate to 0 / group as "Unknown"
/// downstream), and filter operator membership (the engine fails open on
/// operators it does not know).
pub fn validate_intent(raw: RawChartIntent) -> Result<ChartIntent, Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    let dataset = match raw.dataset {
        Some(d) if !d.trim().is_empty() => Some(d),
        _ => {
            errors.push("/dataset: must be a non-empty string".to_string());
            None
        }
    };

    let mut metrics: Vec<Metric> = Vec::new();
    match raw.metrics {
        Some(raw_metrics) if !raw_metrics.is_empty() => {
            for (i, m) in raw_metrics.into_iter().enumerate() {
                let field = match m.field {
                    Some(f) if !f.trim().is_empty() => Some(f),
                    _ => {
                        errors.push(format!("/metrics/{}/field: must be a non-empty string", i));
                        None
                    }
                };
                let aggregation = match m.aggregation.as_deref() {
                    Some(a) => match Aggregation::parse(a) {
                        Some(agg) => Some(agg),
                        None => {
                            errors.push(format!(
                                "/metrics/{}/aggregation: unknown aggregation '{}'",
                                i, a
                            ));
                            None
                        }
                    },
                    None => {
                        errors.push(format!("/metrics/{}/aggregation: is required", i));
                        None
                    }
                };
                if let (Some(field), Some(aggregation)) = (field, aggregation) {
                    metrics.push(Metric {
                        field,
                        aggregation,
                        label: m.label,
                    });
                }
            }
        }
        _ => errors.push("/metrics: must be a non-empty array".to_string()),
    }

    let mut dimensions: Vec<Dimension> = Vec::new();
    if let Some(raw_dimensions) = raw.dimensions {
        for (i, d) in raw_dimensions.into_iter().enumerate() {
            let Some(field) = d.field.filter(|f| !f.trim().is_empty()) else {
                errors.push(format!("/dimensions/{}/field: must be a non-empty string", i));
                continue;
            };
            // Normalization already canonicalized or dropped granularity, so
            // a leftover unknown value is a validation error
            let granularity = match d.granularity.as_deref() {
                Some(g) => match parse_granularity(g) {
                    Some(gran) => Some(gran),
                    None => {
                        errors.push(format!(
                            "/dimensions/{}/granularity: unknown granularity '{}'",
                            i, g
                        ));
                        None
                    }
                },
                None => None,
            };
            dimensions.push(Dimension { field, granularity });
        }
    }

    let mut filters: Vec<Filter> = Vec::new();
    if let Some(raw_filters) = raw.filters {
        for (i, f) in raw_filters.into_iter().enumerate() {
            let field = match f.field {
                Some(field) if !field.trim().is_empty() => Some(field),
                _ => {
                    errors.push(format!("/filters/{}/field: must be a non-empty string", i));
                    None
                }
            };
            let operator = match f.operator {
                Some(op) if !op.trim().is_empty() => Some(op),
                _ => {
                    errors.push(format!("/filters/{}/operator: is required", i));
                    None
                }
            };
            if let (Some(field), Some(operator)) = (field, operator) {
                filters.push(Filter {
                    field,
                    operator,
                    value: f.value.unwrap_or(serde_json::Value::Null),
                });
            }
        }
    }

    let chart_type = match raw.chart_type.as_deref() {
        Some(c) => match ChartType::parse(c) {
            Some(ct) => Some(ct),
            None => {
                errors.push(format!("/chartType: unknown chart type '{}'", c));
                None
            }
        },
        None => {
            errors.push("/chartType: is required".to_string());
            None
        }
    };

    let sort_by = match raw.sort_by.as_deref() {
        Some(s) => match SortBy::parse(s) {
            Some(sb) => Some(sb),
            None => {
                errors.push(format!("/sortBy: unknown sort key '{}'", s));
                None
            }
        },
        None => None,
    };

    let sort_order = match raw.sort_order.as_deref() {
        Some(s) => match SortOrder::parse(s) {
            Some(so) => Some(so),
            None => {
                errors.push(format!("/sortOrder: unknown sort order '{}'", s));
                None
            }
        },
        None => None,
    };

    let limit = match raw.limit {
        Some(l) if (1..=100).contains(&l) => Some(l as usize),
        Some(l) => {
            errors.push(format!("/limit: {} is outside the range 1-100", l));
            None
        }
        None => None,
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ChartIntent {
        // Both unwraps are guarded by the errors check above
        dataset: dataset.expect("validated"),
        metrics,
        dimensions,
        filters,
        chart_type: chart_type.expect("validated"),
        title: raw.title,
        sort_by,
        sort_order,
        limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::intent::{RawDimension, RawMetric};

    fn valid_raw() -> RawChartIntent {
        RawChartIntent {
            dataset: Some("sales".to_string()),
            metrics: Some(vec![RawMetric {
                field: Some("amount".to_string()),
                aggregation: Some("sum".to_string()),
                label: None,
            }]),
            chart_type: Some("bar".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn sanitize_strips_tags_and_braces() {
        assert_eq!(
            sanitize_prompt("  show <b>sales</b> by {region}  ").as_deref(),
            Some("show sales by region")
        );
    }

    #[test]
    fn sanitize_rejects_empty_results() {
        assert_eq!(sanitize_prompt("   "), None);
        assert_eq!(sanitize_prompt("<script></script>"), None);
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "a".repeat(1500);
        assert_eq!(sanitize_prompt(&long).unwrap().len(), 1000);
    }

    #[test]
    fn granularity_synonyms_are_canonicalized() {
        let mut raw = valid_raw();
        raw.dimensions = Some(vec![RawDimension {
            field: Some("month".to_string()),
            granularity: Some("Monthly".to_string()),
        }]);
        normalize_intent(&mut raw);
        assert_eq!(
            raw.dimensions.as_ref().unwrap()[0].granularity.as_deref(),
            Some("month")
        );

        let intent = validate_intent(raw).unwrap();
        assert_eq!(intent.dimensions[0].granularity, Some(Granularity::Month));
    }

    #[test]
    fn unknown_granularity_is_dropped_not_fatal() {
        let mut raw = valid_raw();
        raw.dimensions = Some(vec![RawDimension {
            field: Some("month".to_string()),
            granularity: Some("fortnightly".to_string()),
        }]);
        normalize_intent(&mut raw);
        assert_eq!(raw.dimensions.as_ref().unwrap()[0].granularity, None);

        let intent = validate_intent(raw).unwrap();
        assert_eq!(intent.dimensions[0].field, "month");
        assert_eq!(intent.dimensions[0].granularity, None);
    }

    #[test]
    fn missing_metrics_fails_validation() {
        let mut raw = valid_raw();
        raw.metrics = None;
        let errors = validate_intent(raw).unwrap_err();
        assert!(errors.iter().any(|e| e.starts_with("/metrics")));

        let mut raw = valid_raw();
        raw.metrics = Some(vec![]);
        assert!(validate_intent(raw).is_err());
    }

    #[test]
    fn unknown_aggregation_and_chart_type_are_reported_together() {
        let mut raw = valid_raw();
        raw.metrics = Some(vec![RawMetric {
            field: Some("amount".to_string()),
            aggregation: Some("median".to_string()),
            label: None,
        }]);
        raw.chart_type = Some("heatmap".to_string());

        let errors = validate_intent(raw).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("median"));
        assert!(errors[1].contains("heatmap"));
    }

    #[test]
    fn limit_must_be_within_bounds() {
        let mut raw = valid_raw();
        raw.limit = Some(0);
        assert!(validate_intent(raw).is_err());

        let mut raw = valid_raw();
        raw.limit = Some(101);
        assert!(validate_intent(raw).is_err());

        let mut raw = valid_raw();
        raw.limit = Some(10);
        assert_eq!(validate_intent(raw).unwrap().limit, Some(10));
    }

    #[test]
    fn filter_operators_are_not_membership_checked() {
        let mut raw = valid_raw();
        raw.filters = Some(vec![crate::models::intent::RawFilter {
            field: Some("amount".to_string()),
            operator: Some("like".to_string()),
            value: Some(serde_json::json!("45%")),
        }]);

        // Fail-open operators must survive validation so the engine can
        // decide what to do with them
        let intent = validate_intent(raw).unwrap();
        assert_eq!(intent.filters[0].operator, "like");
    }
}
