pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod exchange;
pub mod log;
pub mod providers;
pub mod ratelimit;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::api::AppState;
use crate::cache::RateCache;
use crate::config::OutboundRateLimitConfig;
use crate::providers::{EndpointStyle, FailoverExchange, ProviderEndpoints, RestExchangeProvider};
use crate::ratelimit::{RateLimitedClient, RateLimiter};

pub async fn run(config_path: Option<&str>) -> Result<()> {
    info!("Exchange service starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = build_service(&config, shutdown_rx)?;

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;
    info!("Listening on http://{}", config.server.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
            // Wakes every request still queued on a limiter.
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("Server error")?;

    Ok(())
}

/// Assembles the full service: two rate-limited provider adapters behind
/// the failover orchestrator, wrapped in the HTTP router.
pub fn build_service(
    config: &config::AppConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<axum::Router> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("fxmux/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let policy = config.cache.policy();
    let outbound = config.rate_limits.outbound;

    let frankfurter = config
        .providers
        .frankfurter
        .as_ref()
        .context("Missing frankfurter provider configuration")?;
    let primary = Arc::new(RestExchangeProvider::new(
        "Frankfurter",
        ProviderEndpoints {
            latest_url: frankfurter.latest_url.clone(),
            historical_url: frankfurter.historical_url.clone(),
            style: EndpointStyle::RangeInPath,
        },
        outbound_transport(&http, outbound, shutdown.clone()),
        Arc::new(RateCache::new(policy)),
    ));

    let fixer = config
        .providers
        .fixer
        .as_ref()
        .context("Missing fixer provider configuration")?;
    let secondary = Arc::new(RestExchangeProvider::new(
        "Fixer",
        ProviderEndpoints {
            latest_url: fixer.latest_url.clone(),
            historical_url: fixer.timeseries_url.clone(),
            style: EndpointStyle::RangeInQuery {
                access_key: fixer.access_key.clone(),
            },
        },
        outbound_transport(&http, outbound, shutdown.clone()),
        Arc::new(RateCache::new(policy)),
    ));

    let exchange = Arc::new(FailoverExchange::new(primary, secondary));

    let inbound = config.rate_limits.inbound;
    let limiter = Arc::new(RateLimiter::fixed_window(
        inbound.permit_limit,
        Duration::from_secs(inbound.window_secs),
        inbound.queue_limit,
    ));

    Ok(api::create_router(AppState::new(
        exchange, limiter, shutdown,
    )))
}

fn outbound_transport(
    http: &reqwest::Client,
    config: OutboundRateLimitConfig,
    shutdown: watch::Receiver<bool>,
) -> RateLimitedClient {
    let limiter = Arc::new(RateLimiter::token_bucket(
        config.token_limit,
        config.tokens_per_period,
        Duration::from_secs(config.period_secs),
        config.queue_limit,
    ));
    RateLimitedClient::new(http.clone(), limiter, shutdown)
}
