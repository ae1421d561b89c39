mod config;
mod error;
mod handlers;
mod models;
mod services;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};

use config::Config;
use handlers::{generate_chart, health, list_datasets};
use services::{IntentResolver, MockDataAdapter, OpenAiProvider};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("🚀 Starting prompt-chart API");

    // Load configuration from environment variables
    let config = Config::from_env();

    // Wire the services explicitly; the resolver owns its provider and
    // adapter for the life of the process
    let adapter = MockDataAdapter::new();
    let provider = OpenAiProvider::new(&config).map_err(|e| {
        log::error!("❌ Failed to build LLM provider: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e)
    })?;
    let resolver = IntentResolver::new(provider, adapter);

    log::info!(
        "📊 Serving datasets: {}",
        resolver.available_datasets().join(", ")
    );

    let server_url = format!("http://127.0.0.1:{}", config.server_port);
    log::info!("🌐 Starting server at {}", server_url);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .app_data(web::Data::new(resolver.clone()))
            .service(
                web::resource("/api/chart")
                    .route(web::post().to(generate_chart::<OpenAiProvider, MockDataAdapter>)),
            )
            .service(
                web::resource("/api/chart/datasets")
                    .route(web::get().to(list_datasets::<OpenAiProvider, MockDataAdapter>)),
            )
            .service(web::resource("/health").route(web::get().to(health)))
    })
    .bind(format!("127.0.0.1:{}", config.server_port))
    .map_err(|e| {
        log::error!("❌ Failed to bind to port {}: {}", config.server_port, e);
        e
    })?
    .run()
    .await
}
