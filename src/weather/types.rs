use serde::{Deserialize, Serialize};

/// Current-weather payload as returned by OpenWeather.
///
/// `cod` is kept as a raw value because the provider sends it as a number on
/// success and as a string on most errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWeatherResponse {
    #[serde(default)]
    pub cod: serde_json::Value,
    pub main: Option<CurrentWeatherMain>,
    #[serde(default)]
    pub weather: Vec<CurrentWeatherCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWeatherMain {
    pub temp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWeatherCondition {
    pub id: i64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherResult {
    pub temperature_celsius: f64,
    // Computed alongside Celsius, never surfaced in a response.
    pub temperature_fahrenheit: f64,
    pub weather_id: i64,
    pub description: String,
}

/// Body of a successful `/weather` response and the cached payload.
///
/// Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub city: String,
    pub description: String,
    pub emoji: String,
    pub temperature: String,
}
