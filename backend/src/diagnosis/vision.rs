use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::{Diagnosis, DiagnosisResult};
use url::Url;
use uuid::Uuid;

use super::extract::extract_json_object;
use super::prompt::{DIAGNOSIS_PROMPT, NOT_A_PLANT};
use super::{BackendError, DiagnosisError};

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 2],
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Asks a vision-capable generative model for a JSON diagnosis.
#[derive(Clone)]
pub struct VisionModelBackend {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl VisionModelBackend {
    pub fn new(
        client: Client,
        base_url: &Url,
        model: &str,
        api_key: String,
    ) -> Result<Self, url::ParseError> {
        let endpoint = crate::config::endpoint(
            base_url,
            &format!("v1beta/models/{}:generateContent", model),
        )?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub async fn diagnose(
        &self,
        request_id: Uuid,
        image: &[u8],
        mime_type: &str,
    ) -> Result<DiagnosisResult, BackendError> {
        let body = GenerateContentRequest {
            contents: [Content {
                parts: [
                    Part::Text {
                        text: DIAGNOSIS_PROMPT,
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type,
                            data: BASE64.encode(image),
                        },
                    },
                ],
            }],
        };

        debug!("[{}] POST {}", request_id, self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let raw = response.json::<GenerateContentResponse>().await?.into_text();
        let diagnosis = parse_model_text(raw)?;
        if diagnosis.disease == NOT_A_PLANT {
            info!("[{}] Model reports the image is not a plant", request_id);
        }
        Ok(DiagnosisResult::Structured(diagnosis))
    }
}

/// Parses the model's reply text, keeping the raw text on failure.
pub fn parse_model_text(raw: String) -> Result<Diagnosis, DiagnosisError> {
    match serde_json::from_str::<Diagnosis>(extract_json_object(&raw)) {
        Ok(diagnosis) => Ok(diagnosis),
        Err(source) => Err(DiagnosisError::ResponseParse { source, raw }),
    }
}
