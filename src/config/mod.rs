use dotenv::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let openai_api_key = match env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => {
                log::warn!(
                    "OPENAI_API_KEY not set; chart requests will fail until it is configured"
                );
                None
            }
        };

        Self {
            openai_api_key,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("SERVER_PORT must be a valid port number"),
        }
    }
}
