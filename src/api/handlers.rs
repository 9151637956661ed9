use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ExchangeError;
use crate::exchange::{ExchangeRateSnapshot, PaginatedHistoricalRates};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestRatesQuery {
    pub base_currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertQuery {
    pub from_currency: String,
    pub to_currency: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ConversionResponse {
    pub from_currency: String,
    pub to_currency: String,
    pub amount: Decimal,
    pub converted_amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalRatesQuery {
    pub base_currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    10
}

pub async fn latest_rates(
    State(state): State<AppState>,
    Query(params): Query<LatestRatesQuery>,
) -> Result<Json<ExchangeRateSnapshot>, (StatusCode, String)> {
    let snapshot = state
        .exchange
        .latest_rates(&params.base_currency)
        .await
        .map_err(service_error)?;
    Ok(Json(snapshot))
}

pub async fn convert(
    State(state): State<AppState>,
    Query(params): Query<ConvertQuery>,
) -> Result<Json<ConversionResponse>, (StatusCode, String)> {
    if params.amount <= Decimal::ZERO {
        return Err((
            StatusCode::BAD_REQUEST,
            "amount must be greater than zero".to_string(),
        ));
    }

    let converted = state
        .exchange
        .convert(&params.from_currency, &params.to_currency, params.amount)
        .await
        .map_err(service_error)?;

    Ok(Json(ConversionResponse {
        from_currency: params.from_currency,
        to_currency: params.to_currency,
        amount: params.amount,
        converted_amount: converted,
    }))
}

pub async fn historical_rates(
    State(state): State<AppState>,
    Query(params): Query<HistoricalRatesQuery>,
) -> Result<Json<PaginatedHistoricalRates>, (StatusCode, String)> {
    if params.page < 1 || params.page_size < 1 {
        return Err((
            StatusCode::BAD_REQUEST,
            "page and pageSize must be greater than zero".to_string(),
        ));
    }

    let rates = state
        .exchange
        .historical_rates(
            &params.base_currency,
            params.start_date,
            params.end_date,
            params.page,
            params.page_size,
        )
        .await
        .map_err(service_error)?;
    Ok(Json(rates))
}

pub(super) fn error_status(e: &ExchangeError) -> StatusCode {
    match e {
        ExchangeError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        ExchangeError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        // Everything the providers surface becomes a not-found carrying the
        // error message as the body.
        _ => StatusCode::NOT_FOUND,
    }
}

fn service_error(e: ExchangeError) -> (StatusCode, String) {
    (error_status(&e), e.to_string())
}

pub(super) fn error_response(e: &ExchangeError) -> Response {
    (error_status(e), e.to_string()).into_response()
}
