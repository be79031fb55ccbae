pub mod extract;
pub mod prompt;
pub mod proxy;
pub mod vision;

use log::{error, info, warn};
use shared::{Classification, DiagnosisResult};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{AppConfig, BackendKind, ConfigError};
use proxy::ProxyInferenceBackend;
use vision::VisionModelBackend;

pub const COLD_START_ERROR: &str = "ML Service Cold Start";
pub const VISION_UNAVAILABLE_ERROR: &str = "Vision Model Unavailable";

/// Failures a caller of [`DiagnosisService::diagnose`] can observe.
#[derive(Debug, Error)]
pub enum DiagnosisError {
    #[error("No image uploaded")]
    MissingImage,
    #[error("Failed to parse AI response: {source}")]
    ResponseParse {
        #[source]
        source: serde_json::Error,
        raw: String,
    },
    #[error("Failed to stage upload: {0}")]
    Staging(#[source] std::io::Error),
}

/// Why a backend call did not produce a result. Everything except `Fault`
/// means the backend could not be used and the caller gets a degraded result.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend responded with {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("unrecognised response body: {0}")]
    UnexpectedBody(String),
    #[error(transparent)]
    Fault(#[from] DiagnosisError),
}

#[derive(Clone)]
pub enum DiagnosisBackend {
    Vision(VisionModelBackend),
    Proxy(ProxyInferenceBackend),
}

impl DiagnosisBackend {
    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Result<Self, ConfigError> {
        match config.backend {
            BackendKind::Proxy => ProxyInferenceBackend::new(
                client,
                &config.ml_service_url,
                config.upload_dir.clone(),
            )
            .map(DiagnosisBackend::Proxy)
            .map_err(|source| ConfigError::InvalidUrl {
                key: "ML_SERVICE_URL",
                source,
            }),
            BackendKind::Vision => {
                let api_key = config
                    .gemini_api_key()
                    .ok_or(ConfigError::MissingApiKey)?
                    .to_string();
                VisionModelBackend::new(client, &config.gemini.base_url, &config.gemini.model, api_key)
                    .map(DiagnosisBackend::Vision)
                    .map_err(|source| ConfigError::InvalidUrl {
                        key: "GEMINI_BASE_URL",
                        source,
                    })
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            DiagnosisBackend::Vision(_) => BackendKind::Vision,
            DiagnosisBackend::Proxy(_) => BackendKind::Proxy,
        }
    }

    async fn invoke(
        &self,
        request_id: Uuid,
        image: &[u8],
        mime_type: &str,
    ) -> Result<DiagnosisResult, BackendError> {
        match self {
            DiagnosisBackend::Vision(backend) => backend.diagnose(request_id, image, mime_type).await,
            DiagnosisBackend::Proxy(backend) => backend.diagnose(request_id, image, mime_type).await,
        }
    }

    fn degraded(&self) -> DiagnosisResult {
        let classification = match self {
            DiagnosisBackend::Proxy(_) => Classification::degraded(
                "ML Service Connecting...",
                "The AI Model is waking up. Please wait 30 seconds and try again.",
                COLD_START_ERROR,
            ),
            DiagnosisBackend::Vision(_) => Classification::degraded(
                VISION_UNAVAILABLE_ERROR,
                "The plant analysis service is temporarily unavailable. Please try again shortly.",
                VISION_UNAVAILABLE_ERROR,
            ),
        };
        DiagnosisResult::Classified(classification)
    }
}

/// Validates an upload, runs it through the configured backend and turns an
/// unreachable backend into a degraded result.
#[derive(Clone)]
pub struct DiagnosisService {
    backend: DiagnosisBackend,
    max_upload_bytes: usize,
}

impl DiagnosisService {
    pub fn new(backend: DiagnosisBackend, max_upload_bytes: usize) -> Self {
        Self {
            backend,
            max_upload_bytes,
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn upload_limit(&self) -> usize {
        self.max_upload_bytes
    }

    pub async fn diagnose(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<DiagnosisResult, DiagnosisError> {
        if image.is_empty() {
            return Err(DiagnosisError::MissingImage);
        }

        let request_id = Uuid::new_v4();
        info!(
            "[{}] Diagnosing {} byte image ({}) with {} backend",
            request_id,
            image.len(),
            mime_type,
            self.backend.kind()
        );

        match self.backend.invoke(request_id, image, mime_type).await {
            Ok(result) => {
                info!(
                    "[{}] Diagnosis complete, confidence {}",
                    request_id,
                    result.confidence().value()
                );
                Ok(result)
            }
            Err(BackendError::Fault(fault)) => {
                match &fault {
                    DiagnosisError::ResponseParse { source, raw } => {
                        error!("[{}] JSON parse error: {} Raw text: {}", request_id, source, raw)
                    }
                    other => error!("[{}] Diagnosis failed: {}", request_id, other),
                }
                Err(fault)
            }
            Err(unavailable) => {
                warn!(
                    "[{}] {} backend unavailable, returning degraded result: {}",
                    request_id,
                    self.backend.kind(),
                    unavailable
                );
                Ok(self.backend.degraded())
            }
        }
    }
}
