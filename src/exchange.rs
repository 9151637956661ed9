//! Exchange rate lookups shared by providers and the HTTP layer.

use async_trait::async_trait;
use chrono::NaiveDate;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ExchangeResult;

/// Latest rates for one base currency as published by an upstream provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateSnapshot {
    #[serde(alias = "Base")]
    pub base: String,
    #[serde(alias = "Rates")]
    pub rates: BTreeMap<String, Decimal>,
}

/// Historical rate series as published by an upstream provider. The date
/// keys keep the order in which the provider emitted them.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoricalRateSeries {
    #[serde(alias = "Base")]
    pub base: String,
    #[serde(alias = "StartDate", alias = "startDate")]
    pub start_date: NaiveDate,
    #[serde(alias = "EndDate", alias = "endDate")]
    pub end_date: NaiveDate,
    #[serde(default, alias = "Rates")]
    pub rates: Option<IndexMap<NaiveDate, BTreeMap<String, Decimal>>>,
}

impl HistoricalRateSeries {
    /// Slices the series down to one page, preserving provider order.
    /// Returns `None` when the response carried no series at all.
    pub fn paginate(self, page: usize, page_size: usize) -> Option<PaginatedHistoricalRates> {
        let rates = self.rates?;
        let total_records = rates.len();
        // Saturate so an absurd page degrades to an empty page instead of
        // wrapping the skip count back into the data.
        let page_rates = rates
            .into_iter()
            .skip(page.saturating_sub(1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Some(PaginatedHistoricalRates {
            base: self.base,
            start_date: self.start_date,
            end_date: self.end_date,
            rates: page_rates,
            page,
            page_size,
            total_records,
        })
    }
}

/// One page of a historical rate series. `total_records` counts the full,
/// unsliced series so callers can derive the page count.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedHistoricalRates {
    pub base: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rates: IndexMap<NaiveDate, BTreeMap<String, Decimal>>,
    pub page: usize,
    pub page_size: usize,
    pub total_records: usize,
}

#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    async fn latest_rates(&self, base_currency: &str) -> ExchangeResult<ExchangeRateSnapshot>;

    async fn convert(
        &self,
        from_currency: &str,
        to_currency: &str,
        amount: Decimal,
    ) -> ExchangeResult<Decimal>;

    async fn historical_rates(
        &self,
        base_currency: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        page: usize,
        page_size: usize,
    ) -> ExchangeResult<PaginatedHistoricalRates>;
}
