mod diagnosis;
mod weather;

use serde::{Deserialize, Serialize};

pub use diagnosis::{Classification, Confidence, Diagnosis, DiagnosisResult, Severity};
pub use weather::{
    CurrentConditions, DailyForecast, Location, WeatherReport, describe_weather_code,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
}
