mod config;
mod diagnosis;
mod errors;
mod routes;
mod upload;
mod weather;

#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use config::{AppConfig, BackendKind};
use diagnosis::{DiagnosisBackend, DiagnosisService};
use routes::configure_routes;
use std::io;
use weather::WeatherClient;

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    log::error!("{}: {}", context, err);
    io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::load().map_err(|e| startup_error("Invalid configuration", e))?;

    std::fs::create_dir_all(&config.upload_dir)?;
    log::info!("Staging uploads in {}", config.upload_dir.display());

    let http_client = config
        .http_client()
        .map_err(|e| startup_error("Failed to build HTTP client", e))?;

    let backend = DiagnosisBackend::from_config(&config, http_client.clone())
        .map_err(|e| startup_error("Failed to configure diagnosis backend", e))?;
    match config.backend {
        BackendKind::Proxy => {
            log::info!("Diagnosis backend: inference service at {}", config.ml_service_url)
        }
        BackendKind::Vision => {
            log::info!("Diagnosis backend: vision model {}", config.gemini.model)
        }
    }
    let diagnosis = web::Data::new(DiagnosisService::new(backend, config.max_upload_bytes));

    let weather = WeatherClient::new(http_client, &config.weather_base_url)
        .map_err(|e| startup_error("Invalid weather service URL", e))?;
    let weather = web::Data::new(weather);

    let static_dir = if config.static_dir.is_dir() {
        log::info!("Serving frontend from {}", config.static_dir.display());
        Some(config.static_dir.clone())
    } else {
        log::warn!(
            "Frontend directory {} not found, static files disabled",
            config.static_dir.display()
        );
        None
    };

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(diagnosis.clone())
            .app_data(weather.clone())
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
