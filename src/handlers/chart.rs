use actix_web::{web, Error, HttpResponse};
use chrono::Utc;

use crate::error::ResolveError;
use crate::models::response::{ChartRequest, DatasetsResponse, ErrorResponse, HealthResponse};
use crate::services::{DataAdapter, IntentResolver, LlmProvider};

/// Resolve a natural-language prompt into a chart response
pub async fn generate_chart<P, A>(
    body: web::Json<ChartRequest>,
    resolver: web::Data<IntentResolver<P, A>>,
) -> Result<HttpResponse, Error>
where
    P: LlmProvider + Clone + std::fmt::Debug + 'static,
    A: DataAdapter + Clone + std::fmt::Debug + 'static,
{
    let ChartRequest { prompt, context } = body.into_inner();

    if prompt.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().json(ErrorResponse {
            error: "Missing or invalid prompt".to_string(),
            code: "INVALID_REQUEST".to_string(),
        }));
    }

    match resolver.resolve(&prompt, context).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) => {
            log::error!("Chart generation error: {}", e);
            let body = ErrorResponse {
                error: e.to_string(),
                code: e.code().to_string(),
            };
            let response = match e {
                ResolveError::Provider(_) => HttpResponse::InternalServerError().json(body),
                _ => HttpResponse::BadRequest().json(body),
            };
            Ok(response)
        }
    }
}

/// List the datasets the adapter can serve
pub async fn list_datasets<P, A>(
    resolver: web::Data<IntentResolver<P, A>>,
) -> Result<HttpResponse, Error>
where
    P: LlmProvider + Clone + std::fmt::Debug + 'static,
    A: DataAdapter + Clone + std::fmt::Debug + 'static,
{
    Ok(HttpResponse::Ok().json(DatasetsResponse {
        datasets: resolver.available_datasets(),
    }))
}

pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}
