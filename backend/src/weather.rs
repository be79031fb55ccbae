use chrono::NaiveDate;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use shared::{CurrentConditions, DailyForecast, Location, WeatherReport, describe_weather_code};
use thiserror::Error;
use url::Url;

const FORECAST_DAYS: usize = 5;
const DEFAULT_CITY: &str = "New Delhi";

const CITIES: &[(&str, f64, f64)] = &[
    ("New Delhi", 28.61, 77.20),
    ("Mumbai", 19.07, 72.87),
    ("Bangalore", 12.97, 77.59),
    ("Chennai", 13.08, 80.27),
    ("Kolkata", 22.57, 88.36),
    ("Pune", 18.52, 73.85),
    ("Hyderabad", 17.38, 78.48),
    ("Ahmedabad", 23.02, 72.57),
    ("Jaipur", 26.91, 75.78),
    ("Lucknow", 26.84, 80.94),
];

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("Forecast request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Forecast service responded with {status}: {body}")]
    Upstream {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Explicit coordinates win; otherwise a known city, falling back to New Delhi.
pub fn resolve_location(query: &WeatherQuery) -> Result<Location, WeatherError> {
    match (query.latitude, query.longitude) {
        (Some(latitude), Some(longitude)) => {
            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                return Err(WeatherError::InvalidCoordinates(format!(
                    "latitude {} / longitude {} out of range",
                    latitude, longitude
                )));
            }
            let name = query
                .city
                .clone()
                .unwrap_or_else(|| format!("{:.2}, {:.2}", latitude, longitude));
            Ok(Location {
                name,
                latitude,
                longitude,
            })
        }
        (Some(_), None) | (None, Some(_)) => Err(WeatherError::InvalidCoordinates(
            "latitude and longitude must be given together".to_string(),
        )),
        (None, None) => {
            let wanted = query.city.as_deref().map(str::trim).unwrap_or(DEFAULT_CITY);
            let (name, latitude, longitude) = CITIES
                .iter()
                .find(|(name, _, _)| name.eq_ignore_ascii_case(wanted))
                .or_else(|| {
                    debug!("Unknown city {:?}, falling back to {}", wanted, DEFAULT_CITY);
                    CITIES.first()
                })
                .copied()
                .unwrap_or((DEFAULT_CITY, 28.61, 77.20));
            Ok(Location {
                name: name.to_string(),
                latitude,
                longitude,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentBlock,
    daily: DailyBlock,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    weather_code: u8,
    wind_speed_10m: f64,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    time: Vec<NaiveDate>,
    #[serde(default)]
    weather_code: Vec<Option<u8>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
}

impl ForecastResponse {
    fn into_report(self, location: Location) -> WeatherReport {
        let current = CurrentConditions {
            temperature_c: self.current.temperature_2m,
            relative_humidity_pct: self.current.relative_humidity_2m,
            wind_speed_kmh: self.current.wind_speed_10m,
            weather_code: self.current.weather_code,
            condition: describe_weather_code(self.current.weather_code).to_string(),
        };

        let daily_block = &self.daily;
        // Index 0 is today, which `current` already covers.
        let daily = daily_block
            .time
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, date)| {
                let code = (*daily_block.weather_code.get(i)?)?;
                Some(DailyForecast {
                    date: *date,
                    temperature_max_c: (*daily_block.temperature_2m_max.get(i)?)?,
                    temperature_min_c: (*daily_block.temperature_2m_min.get(i)?)?,
                    precipitation_mm: daily_block
                        .precipitation_sum
                        .get(i)
                        .copied()
                        .flatten()
                        .unwrap_or(0.0),
                    weather_code: code,
                    condition: describe_weather_code(code).to_string(),
                })
            })
            .take(FORECAST_DAYS)
            .collect();

        WeatherReport {
            location,
            current,
            daily,
        }
    }
}

/// Thin client over the Open-Meteo forecast endpoint.
#[derive(Clone)]
pub struct WeatherClient {
    client: Client,
    forecast_url: Url,
}

impl WeatherClient {
    pub fn new(client: Client, base_url: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            forecast_url: crate::config::endpoint(base_url, "v1/forecast")?,
        })
    }

    pub async fn forecast(&self, location: Location) -> Result<WeatherReport, WeatherError> {
        info!(
            "Fetching forecast for {} ({}, {})",
            location.name, location.latitude, location.longitude
        );
        let response = self
            .client
            .get(self.forecast_url.clone())
            .query(&[
                ("latitude", location.latitude.to_string()),
                ("longitude", location.longitude.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,weather_code,wind_speed_10m".to_string(),
                ),
                (
                    "daily",
                    "weather_code,temperature_2m_max,temperature_2m_min,precipitation_sum"
                        .to_string(),
                ),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WeatherError::Upstream { status, body });
        }

        let forecast = response.json::<ForecastResponse>().await?;
        Ok(forecast.into_report(location))
    }
}
