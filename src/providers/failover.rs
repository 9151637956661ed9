use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

use crate::error::ExchangeResult;
use crate::exchange::{ExchangeRateProvider, ExchangeRateSnapshot, PaginatedHistoricalRates};

/// Calls the primary provider and falls back to the secondary on any error,
/// including decode and rate-not-found failures. The secondary is tried
/// exactly once; when it also fails, its error is returned unchanged and
/// the primary failure survives only in the log.
pub struct FailoverExchange {
    primary: Arc<dyn ExchangeRateProvider>,
    secondary: Arc<dyn ExchangeRateProvider>,
}

impl FailoverExchange {
    pub fn new(
        primary: Arc<dyn ExchangeRateProvider>,
        secondary: Arc<dyn ExchangeRateProvider>,
    ) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl ExchangeRateProvider for FailoverExchange {
    async fn latest_rates(&self, base_currency: &str) -> ExchangeResult<ExchangeRateSnapshot> {
        match self.primary.latest_rates(base_currency).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                warn!(
                    operation = "latest_rates",
                    error = %e,
                    "Primary provider failed, trying secondary"
                );
                self.secondary.latest_rates(base_currency).await
            }
        }
    }

    async fn convert(
        &self,
        from_currency: &str,
        to_currency: &str,
        amount: Decimal,
    ) -> ExchangeResult<Decimal> {
        match self
            .primary
            .convert(from_currency, to_currency, amount)
            .await
        {
            Ok(converted) => Ok(converted),
            Err(e) => {
                warn!(
                    operation = "convert",
                    error = %e,
                    "Primary provider failed, trying secondary"
                );
                self.secondary
                    .convert(from_currency, to_currency, amount)
                    .await
            }
        }
    }

    async fn historical_rates(
        &self,
        base_currency: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        page: usize,
        page_size: usize,
    ) -> ExchangeResult<PaginatedHistoricalRates> {
        match self
            .primary
            .historical_rates(base_currency, start_date, end_date, page, page_size)
            .await
        {
            Ok(rates) => Ok(rates),
            Err(e) => {
                warn!(
                    operation = "historical_rates",
                    error = %e,
                    "Primary provider failed, trying secondary"
                );
                self.secondary
                    .historical_rates(base_currency, start_date, end_date, page, page_size)
                    .await
            }
        }
    }
}
