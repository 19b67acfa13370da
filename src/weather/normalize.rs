use super::types::{CurrentWeatherResponse, WeatherReport, WeatherResult};
use std::ops::RangeInclusive;
use thiserror::Error;

const KELVIN_OFFSET: f64 = 273.15;
const SUCCESS_CODE: i64 = 200;

#[derive(Error, Debug, PartialEq)]
pub enum NormalizeError {
    #[error("payload has no temperature")]
    MissingTemperature,
    #[error("payload has no weather condition")]
    MissingCondition,
}

// Evaluated top to bottom, first match wins.
const EMOJI_TABLE: &[(RangeInclusive<i64>, &str)] = &[
    (200..=232, "⛈"),
    (300..=321, "🌦"),
    (500..=531, "🌧"),
    (600..=622, "❄"),
    (701..=741, "🌫"),
    (762..=762, "🌋"),
    (771..=771, "💨"),
    (781..=781, "🌪"),
    (800..=800, "☀"),
    (801..=804, "☁"),
];

/// Lowercased, whitespace-trimmed city name used for cache keys and responses.
pub fn normalize_city(city: &str) -> String {
    city.trim().to_lowercase()
}

pub fn cache_key(city: &str) -> String {
    format!("weather:{}", normalize_city(city))
}

/// The provider reports success only with the integer code 200.
pub fn is_success(payload: &CurrentWeatherResponse) -> bool {
    payload.cod.as_i64() == Some(SUCCESS_CODE)
}

pub fn weather_info(payload: &CurrentWeatherResponse) -> Result<WeatherResult, NormalizeError> {
    let temperature_k = payload
        .main
        .as_ref()
        .map(|main| main.temp)
        .ok_or(NormalizeError::MissingTemperature)?;
    let condition = payload
        .weather
        .first()
        .ok_or(NormalizeError::MissingCondition)?;

    Ok(WeatherResult {
        temperature_celsius: temperature_k - KELVIN_OFFSET,
        temperature_fahrenheit: temperature_k * 9.0 / 5.0 - 459.67,
        weather_id: condition.id,
        description: condition.description.clone(),
    })
}

pub fn weather_emoji(weather_id: i64) -> &'static str {
    EMOJI_TABLE
        .iter()
        .find(|(range, _)| range.contains(&weather_id))
        .map(|(_, symbol)| *symbol)
        .unwrap_or("")
}

impl WeatherReport {
    pub fn new(city: &str, result: &WeatherResult) -> Self {
        Self {
            city: normalize_city(city),
            description: result.description.clone(),
            emoji: weather_emoji(result.weather_id).to_string(),
            temperature: format!("{:.0}°C", result.temperature_celsius),
        }
    }
}
