use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Classifier confidence as a percentage, always within `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Confidence(f64);

impl Confidence {
    pub const ZERO: Confidence = Confidence(0.0);

    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Confidence(value.clamp(0.0, 100.0))
        } else {
            Confidence::ZERO
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Serialize for Confidence {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Whole percentages go back out as integers so a backend's `87` stays `87`.
        if self.0.fract() == 0.0 {
            serializer.serialize_u64(self.0 as u64)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

// Models occasionally answer with "90%" or "87.5" instead of a number.
impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Number(n) => n
                .as_f64()
                .map(Confidence::new)
                .ok_or_else(|| de::Error::custom("confidence is not representable as f64")),
            Value::String(s) => s
                .trim()
                .trim_end_matches('%')
                .trim()
                .parse::<f64>()
                .map(Confidence::new)
                .map_err(|_| de::Error::custom(format!("Invalid confidence string: {}", s))),
            _ => Err(de::Error::custom("Expected number or numeric string")),
        }
    }
}

/// Disease severity. Levels outside the known vocabulary are kept verbatim
/// in `Other` so a reply is never rejected over its wording.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Severity {
    #[default]
    None,
    Low,
    Moderate,
    High,
    Other(String),
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::None => "None",
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::High => "High",
            Severity::Other(label) => label.as_str(),
        }
    }
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "healthy" | "" => Severity::None,
            "low" | "mild" | "minor" | "slight" => Severity::Low,
            "moderate" | "medium" => Severity::Moderate,
            "high" | "severe" | "critical" | "very high" | "extreme" => Severity::High,
            _ => Severity::Other(value),
        }
    }
}

// A `null` severity reads as healthy.
impl From<Option<String>> for Severity {
    fn from(value: Option<String>) -> Self {
        value.map(Severity::from).unwrap_or_default()
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

/// Structured plant-health diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub disease: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub remedies: Vec<String>,
    #[serde(default)]
    pub prevention: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Single-label classifier output. Also the shape of a degraded response,
/// which carries `confidence: 0` and an `error` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub class: String,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Classification {
    pub fn degraded(
        class: impl Into<String>,
        recommendation: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            confidence: Confidence::ZERO,
            recommendation: Some(recommendation.into()),
            error: Some(error.into()),
            extra: Map::new(),
        }
    }
}

const STRUCTURED_KEYS: &[&str] = &[
    "disease",
    "severity",
    "description",
    "symptoms",
    "remedies",
    "prevention",
];
const CLASSIFIER_KEYS: &[&str] = &["class", "recommendation", "error"];

/// What `/api/diagnose` returns: exactly one of the two shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosisResult {
    Structured(Diagnosis),
    Classified(Classification),
}

impl DiagnosisResult {
    pub fn confidence(&self) -> Confidence {
        match self {
            DiagnosisResult::Structured(d) => d.confidence,
            DiagnosisResult::Classified(c) => c.confidence,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, DiagnosisResult::Classified(c) if c.error.is_some())
    }

    /// True when the passed-through extras carry fields of the other shape.
    pub fn mixes_shapes(&self) -> bool {
        let (extra, foreign) = match self {
            DiagnosisResult::Structured(d) => (&d.extra, CLASSIFIER_KEYS),
            DiagnosisResult::Classified(c) => (&c.extra, STRUCTURED_KEYS),
        };
        foreign.iter().any(|key| extra.contains_key(*key))
    }
}
