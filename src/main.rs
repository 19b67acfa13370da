use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod ratelimit;
mod routes;
mod weather;

use config::Config;
use ratelimit::{RateLimit, RateLimiter};
use routes::{create_router, AppState};
use weather::{openweather::OpenWeatherClient, MokaStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let default_limits = RateLimit::parse_list(&config.rate_limit_default)?;
    tracing::info!(
        "Default rate limit: {}",
        default_limits
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    );

    let weather_client = Arc::new(OpenWeatherClient::new(config.clone())?);
    let cache = Arc::new(MokaStore::new(config.cache_max_capacity));
    let rate_limiter = Arc::new(RateLimiter::new(default_limits));

    // Create application state
    let state = AppState {
        cache,
        cache_ttl: config.cache_ttl(),
        weather_client,
        rate_limiter,
    };

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server starting on http://{}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
