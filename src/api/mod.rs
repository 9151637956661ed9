//! HTTP surface of the exchange service.

use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use crate::error::ExchangeError;
use crate::exchange::ExchangeRateProvider;
use crate::ratelimit::RateLimiter;

pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<dyn ExchangeRateProvider>,
    pub limiter: Arc<RateLimiter>,
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        exchange: Arc<dyn ExchangeRateProvider>,
        limiter: Arc<RateLimiter>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            exchange,
            limiter,
            shutdown,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/rates", axum::routing::get(handlers::latest_rates))
        .route("/api/convert", axum::routing::get(handlers::convert))
        .route(
            "/api/historical-rates",
            axum::routing::get(handlers::historical_rates),
        )
        .layer(middleware::from_fn_with_state(state.clone(), throttle))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Inbound fixed-window throttle. The permit is held for the whole request;
/// queued requests are cut loose when shutdown fires.
async fn throttle(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut shutdown = state.shutdown.clone();
    if *shutdown.borrow() {
        return handlers::error_response(&ExchangeError::Cancelled);
    }
    let _permit = tokio::select! {
        permit = state.limiter.acquire() => match permit {
            Ok(permit) => permit,
            Err(e) => return handlers::error_response(&e),
        },
        _ = shutdown.changed() => return handlers::error_response(&ExchangeError::Cancelled),
    };
    next.run(request).await
}
