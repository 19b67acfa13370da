use super::types::CurrentWeatherResponse;
use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenWeatherError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error or request failed: {0}")]
    RequestFailed(String),
    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("Invalid response from weather provider: {0}")]
    InvalidBody(String),
}

impl From<reqwest::Error> for OpenWeatherError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OpenWeatherError::Timeout
        } else if err.is_decode() {
            OpenWeatherError::InvalidBody(err.to_string())
        } else {
            OpenWeatherError::RequestFailed(err.to_string())
        }
    }
}

/// Source of current-weather payloads for a single city.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_weather(&self, city: &str) -> Result<CurrentWeatherResponse, OpenWeatherError>;
}

pub struct OpenWeatherClient {
    client: Client,
    config: Config,
}

impl OpenWeatherClient {
    pub fn new(config: Config) -> Result<Self, OpenWeatherError> {
        // One attempt per request; the timeout is the only bound.
        let client = Client::builder()
            .user_agent("WeatherGateway/1.0")
            .timeout(config.upstream_timeout())
            .build()?;

        Ok(Self { client, config })
    }

    fn weather_url(&self) -> String {
        format!(
            "{}{}",
            self.config.openweather_base_url.trim_end_matches('/'),
            self.config.openweather_weather_path
        )
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn current_weather(&self, city: &str) -> Result<CurrentWeatherResponse, OpenWeatherError> {
        let response = self
            .client
            .get(self.weather_url())
            .query(&[("q", city), ("appid", self.config.openweather_api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OpenWeatherError::HttpStatus(status));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| OpenWeatherError::InvalidBody(e.to_string()))
    }
}
