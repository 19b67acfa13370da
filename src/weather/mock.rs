use super::openweather::{OpenWeatherError, WeatherProvider};
use super::types::CurrentWeatherResponse;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub enum MockReply {
    Payload(String),
    Timeout,
    NetworkFailure,
    Status(u16),
}

/// Provider that answers every call with the same scripted reply and counts calls.
pub struct MockWeatherProvider {
    reply: MockReply,
    calls: AtomicUsize,
    cities: Mutex<Vec<String>>,
}

impl MockWeatherProvider {
    pub fn new(reply: MockReply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            cities: Mutex::new(Vec::new()),
        }
    }

    pub fn with_payload(json: &str) -> Self {
        Self::new(MockReply::Payload(json.to_string()))
    }

    pub fn clear_sky() -> Self {
        Self::with_payload(
            r#"{"cod":200,"main":{"temp":300.0},"weather":[{"id":800,"description":"clear sky"}]}"#,
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested_cities(&self) -> Vec<String> {
        self.cities.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WeatherProvider for MockWeatherProvider {
    async fn current_weather(&self, city: &str) -> Result<CurrentWeatherResponse, OpenWeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut cities) = self.cities.lock() {
            cities.push(city.to_string());
        }

        match &self.reply {
            MockReply::Payload(json) => serde_json::from_str(json)
                .map_err(|e| OpenWeatherError::InvalidBody(e.to_string())),
            MockReply::Timeout => Err(OpenWeatherError::Timeout),
            MockReply::NetworkFailure => Err(OpenWeatherError::RequestFailed(
                "connection refused".to_string(),
            )),
            MockReply::Status(code) => Err(OpenWeatherError::HttpStatus(
                reqwest::StatusCode::from_u16(*code)
                    .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            )),
        }
    }
}
