use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::{
    ratelimit::{Decision, RateLimit, RateLimiter, RoutePolicy},
    weather::{
        self,
        normalize::{cache_key, is_success, normalize_city, weather_info, NormalizeError},
        openweather::{OpenWeatherError, WeatherProvider},
        types::WeatherReport,
        CacheStore,
    },
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn CacheStore>,
    pub cache_ttl: Duration,
    pub weather_client: Arc<dyn WeatherProvider>,
    pub rate_limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Please provide a city name")]
    MissingCity,
    #[error("City not found")]
    CityNotFound,
    // Every upstream failure shares one status; only the message differs.
    #[error("{0}")]
    Unavailable(String),
    #[error("Rate limit exceeded: {limit}")]
    RateLimited {
        limit: RateLimit,
        retry_after: Duration,
    },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingCity => StatusCode::BAD_REQUEST,
            ApiError::CityNotFound => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<OpenWeatherError> for ApiError {
    fn from(err: OpenWeatherError) -> Self {
        let message = match err {
            OpenWeatherError::Timeout => "Request timed out".to_string(),
            OpenWeatherError::RequestFailed(_) => "Network error or request failed".to_string(),
            OpenWeatherError::HttpStatus(status) => format!("HTTP error: {}", status),
            OpenWeatherError::InvalidBody(_) => "Invalid response from weather provider".to_string(),
        };
        ApiError::Unavailable(message)
    }
}

impl From<NormalizeError> for ApiError {
    fn from(_: NormalizeError) -> Self {
        ApiError::Unavailable("Invalid response from weather provider".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            ApiError::RateLimited { retry_after, .. } => Some(retry_after_secs(*retry_after)),
            _ => None,
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response();

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

// Whole seconds, rounded up, never zero.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

fn json_payload(payload: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], payload).into_response()
}

// Route handlers
pub async fn get_weather(
    State(state): State<AppState>,
    Query(params): Query<WeatherQuery>,
) -> Result<Response, ApiError> {
    let city = params
        .city
        .as_deref()
        .map(normalize_city)
        .filter(|city| !city.is_empty())
        .ok_or(ApiError::MissingCity)?;
    let key = cache_key(&city);

    if let Some(cached) = weather::lookup(state.cache.as_ref(), &key).await {
        tracing::info!("Found {} weather information in cache", city);
        return Ok(json_payload(cached));
    }

    tracing::info!("No cached weather for {}, fetching from OpenWeather", city);
    let data = state
        .weather_client
        .current_weather(&city)
        .await
        .map_err(|e| {
            tracing::error!("Weather fetch for {} failed: {}", city, e);
            ApiError::from(e)
        })?;

    if !is_success(&data) {
        tracing::info!("OpenWeather has no match for {} (cod {})", city, data.cod);
        return Err(ApiError::CityNotFound);
    }

    let result = weather_info(&data).map_err(|e| {
        tracing::error!("Unusable weather payload for {}: {}", city, e);
        ApiError::from(e)
    })?;
    tracing::debug!("{} is {:.1}°F", city, result.temperature_fahrenheit);
    let report = WeatherReport::new(&city, &result);
    let payload = serde_json::to_string(&report).map_err(|e| ApiError::Internal(e.to_string()))?;

    weather::store(state.cache.as_ref(), &key, payload.clone(), state.cache_ttl).await;
    Ok(json_payload(payload))
}

pub async fn slow() -> &'static str {
    ":("
}

pub async fn medium() -> &'static str {
    ":|"
}

pub async fn fast() -> &'static str {
    ":)"
}

#[derive(Clone)]
struct RouteLimit {
    limiter: Arc<RateLimiter>,
    route: &'static str,
    policy: RoutePolicy,
}

async fn enforce_rate_limit(
    State(guard): State<RouteLimit>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let identity = addr.ip().to_string();

    match guard.limiter.admit(&identity, guard.route, &guard.policy) {
        Decision::Allowed => next.run(request).await,
        Decision::Rejected { limit, retry_after } => {
            tracing::warn!("{} exceeded {} on /{}", identity, limit, guard.route);
            ApiError::RateLimited { limit, retry_after }.into_response()
        }
    }
}

fn route_limit(limiter: &Arc<RateLimiter>, route: &'static str, policy: RoutePolicy) -> RouteLimit {
    RouteLimit {
        limiter: limiter.clone(),
        route,
        policy,
    }
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    let limiter = state.rate_limiter.clone();

    Router::new()
        .route(
            "/weather",
            get(get_weather).layer(middleware::from_fn_with_state(
                route_limit(&limiter, "weather", RoutePolicy::Default),
                enforce_rate_limit,
            )),
        )
        .route(
            "/slow",
            get(slow).layer(middleware::from_fn_with_state(
                route_limit(
                    &limiter,
                    "slow",
                    RoutePolicy::Override(vec![RateLimit::per_minute(1)]),
                ),
                enforce_rate_limit,
            )),
        )
        .route(
            "/medium",
            get(medium).layer(middleware::from_fn_with_state(
                route_limit(
                    &limiter,
                    "medium",
                    RoutePolicy::Additive(vec![RateLimit::per_second(1)]),
                ),
                enforce_rate_limit,
            )),
        )
        .route(
            "/fast",
            get(fast).layer(middleware::from_fn_with_state(
                route_limit(&limiter, "fast", RoutePolicy::Default),
                enforce_rate_limit,
            )),
        )
        .with_state(state)
}
