use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{HttpRequest, HttpResponse, web};
use log::info;
use shared::HealthResponse;
use std::path::PathBuf;

use crate::diagnosis::DiagnosisService;
use crate::errors::ApiError;
use crate::upload::{self, UploadError};
use crate::weather::{self, WeatherClient, WeatherQuery};

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: Option<PathBuf>) {
    cfg.service(web::resource("/api/diagnose").route(web::post().to(handle_diagnose)))
        .service(web::resource("/api/weather").route(web::get().to(handle_weather)))
        .service(web::resource("/health").route(web::get().to(health)));
    if let Some(dir) = static_dir {
        cfg.service(Files::new("/static", dir).index_file("index.html"));
    }
}

async fn handle_diagnose(
    req: HttpRequest,
    payload: Multipart,
    service: web::Data<DiagnosisService>,
) -> Result<HttpResponse, ApiError> {
    if !upload::is_multipart(req.headers()) {
        return Err(UploadError::MissingImage.into());
    }

    let image = upload::read_image(payload, service.upload_limit()).await?;
    info!(
        "Received upload {} ({} bytes, {})",
        image.file_name.as_deref().unwrap_or("<unnamed>"),
        image.bytes.len(),
        image.mime_type
    );

    let result = service.diagnose(&image.bytes, &image.mime_type).await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn handle_weather(
    query: web::Query<WeatherQuery>,
    client: web::Data<WeatherClient>,
) -> Result<HttpResponse, ApiError> {
    let location = weather::resolve_location(&query)?;
    let report = client.forecast(location).await?;
    Ok(HttpResponse::Ok().json(report))
}

async fn health(service: web::Data<DiagnosisService>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        backend: service.backend_kind().to_string(),
    })
}
