use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use shared::DiagnosisResult;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use url::Url;
use uuid::Uuid;

use super::{BackendError, DiagnosisError};

const OCTET_STREAM: &str = "application/octet-stream";

/// Upload bytes parked on disk for the duration of one backend call.
/// The file is removed when this guard is dropped.
pub struct StagedUpload {
    file: NamedTempFile,
}

impl StagedUpload {
    pub async fn write(dir: &Path, request_id: Uuid, image: &[u8]) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let file = tempfile::Builder::new()
            .prefix(&format!("upload-{}-", request_id))
            .tempfile_in(dir)?;
        tokio::fs::write(file.path(), image).await?;
        debug!("[{}] Staged upload at {}", request_id, file.path().display());
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn file_name(&self) -> String {
        self.path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string())
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        debug!("Removing staged upload {}", self.file.path().display());
    }
}

/// Forwards the upload to an external classification service's `/predict`.
#[derive(Clone)]
pub struct ProxyInferenceBackend {
    client: Client,
    predict_url: Url,
    upload_dir: PathBuf,
}

impl ProxyInferenceBackend {
    pub fn new(client: Client, base_url: &Url, upload_dir: PathBuf) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            predict_url: crate::config::endpoint(base_url, "predict")?,
            upload_dir,
        })
    }

    pub async fn diagnose(
        &self,
        request_id: Uuid,
        image: &[u8],
        mime_type: &str,
    ) -> Result<DiagnosisResult, BackendError> {
        let staged = StagedUpload::write(&self.upload_dir, request_id, image)
            .await
            .map_err(DiagnosisError::Staging)?;
        let file = tokio::fs::File::open(staged.path())
            .await
            .map_err(DiagnosisError::Staging)?;

        let part = Part::stream_with_length(Body::from(file), image.len() as u64)
            .file_name(staged.file_name())
            .mime_str(forwarded_mime(mime_type))?;
        let form = Form::new().part("file", part);

        debug!("[{}] POST {}", request_id, self.predict_url);
        let response = self
            .client
            .post(self.predict_url.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let body = response.bytes().await?;
        let unrecognised = |reason: String| {
            warn!(
                "[{}] Inference service returned an unrecognised body: {}",
                request_id,
                String::from_utf8_lossy(&body)
            );
            BackendError::UnexpectedBody(reason)
        };
        let result = serde_json::from_slice::<DiagnosisResult>(&body)
            .map_err(|e| unrecognised(e.to_string()))?;
        if result.mixes_shapes() {
            return Err(unrecognised(
                "body mixes diagnosis and classifier fields".to_string(),
            ));
        }
        Ok(result)
    }
}

fn forwarded_mime(mime_type: &str) -> &str {
    match mime_type.split_once('/') {
        Some((kind, sub))
            if !kind.is_empty() && !sub.is_empty() && !mime_type.contains(char::is_whitespace) =>
        {
            mime_type
        }
        _ => OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dir_is_empty, http_client, spawn_upstream, unreachable_url};
    use actix_multipart::Multipart;
    use actix_web::{HttpResponse, web};
    use futures_util::TryStreamExt;
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn backend_for(base: &str, upload_dir: &Path, timeout: Duration) -> ProxyInferenceBackend {
        ProxyInferenceBackend::new(
            http_client(timeout),
            &Url::parse(base).unwrap(),
            upload_dir.to_path_buf(),
        )
        .unwrap()
    }

    #[test]
    fn malformed_mime_types_fall_back_to_octet_stream() {
        assert_eq!(forwarded_mime("image/jpeg"), "image/jpeg");
        assert_eq!(forwarded_mime("jpeg"), OCTET_STREAM);
        assert_eq!(forwarded_mime("image/"), OCTET_STREAM);
        assert_eq!(forwarded_mime("image/ png"), OCTET_STREAM);
    }

    #[actix_web::test]
    async fn staged_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::write(dir.path(), Uuid::new_v4(), b"bytes").await.unwrap();
        let path = staged.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"bytes");
        drop(staged);
        assert!(!path.exists());
        assert!(dir_is_empty(dir.path()));
    }

    #[actix_web::test]
    async fn streams_file_field_and_passes_response_through() {
        let base = spawn_upstream(|cfg| {
            cfg.route(
                "/predict",
                web::post().to(|mut payload: Multipart| async move {
                    let mut name = None;
                    let mut received = Vec::new();
                    while let Ok(Some(mut field)) = payload.try_next().await {
                        name = field.name().map(str::to_string);
                        while let Ok(Some(chunk)) = field.try_next().await {
                            received.extend_from_slice(&chunk);
                        }
                    }
                    HttpResponse::Ok().json(json!({
                        "class": "Apple___Black_rot",
                        "confidence": 88,
                        "recommendation": "Prune infected branches.",
                        "field": name,
                        "received": String::from_utf8_lossy(&received),
                    }))
                }),
            );
        });
        let dir = tempfile::tempdir().unwrap();

        let result = backend_for(&base, dir.path(), Duration::from_secs(5))
            .diagnose(Uuid::new_v4(), b"apple leaf pixels", "image/jpeg")
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "class": "Apple___Black_rot",
                "confidence": 88,
                "recommendation": "Prune infected branches.",
                "field": "file",
                "received": "apple leaf pixels",
            })
        );
        assert!(dir_is_empty(dir.path()));
    }

    #[actix_web::test]
    async fn connection_refused_is_a_transport_error_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let err = backend_for(&unreachable_url(), dir.path(), Duration::from_secs(5))
            .diagnose(Uuid::new_v4(), b"leaf", "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
        assert!(dir_is_empty(dir.path()));
    }

    #[actix_web::test]
    async fn slow_service_times_out_within_configured_window() {
        let base = spawn_upstream(|cfg| {
            cfg.route(
                "/predict",
                web::post().to(|| async {
                    actix_web::rt::time::sleep(Duration::from_secs(10)).await;
                    HttpResponse::Ok().finish()
                }),
            );
        });
        let dir = tempfile::tempdir().unwrap();

        let started = Instant::now();
        let err = backend_for(&base, dir.path(), Duration::from_millis(300))
            .diagnose(Uuid::new_v4(), b"leaf", "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(dir_is_empty(dir.path()));
    }

    #[actix_web::test]
    async fn unrecognised_body_is_rejected() {
        let base = spawn_upstream(|cfg| {
            cfg.route(
                "/predict",
                web::post().to(|| async { HttpResponse::Ok().json(json!({ "label": 3 })) }),
            );
        });
        let dir = tempfile::tempdir().unwrap();
        let err = backend_for(&base, dir.path(), Duration::from_secs(5))
            .diagnose(Uuid::new_v4(), b"leaf", "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::UnexpectedBody(_)));
        assert!(dir_is_empty(dir.path()));
    }

    #[actix_web::test]
    async fn body_mixing_both_shapes_is_rejected() {
        let base = spawn_upstream(|cfg| {
            cfg.route(
                "/predict",
                web::post().to(|| async {
                    HttpResponse::Ok().json(json!({
                        "disease": "Late Blight",
                        "confidence": 77,
                        "severity": "High",
                        "class": "Potato___Late_blight",
                        "error": "partial result"
                    }))
                }),
            );
        });
        let dir = tempfile::tempdir().unwrap();
        let err = backend_for(&base, dir.path(), Duration::from_secs(5))
            .diagnose(Uuid::new_v4(), b"leaf", "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::UnexpectedBody(ref reason) if reason.contains("mixes")));
        assert!(dir_is_empty(dir.path()));
    }
}
