use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::cache::RateCache;
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::{
    ExchangeRateProvider, ExchangeRateSnapshot, HistoricalRateSeries, PaginatedHistoricalRates,
};
use crate::ratelimit::RateLimitedClient;

/// How a provider encodes request parameters in its URLs.
#[derive(Debug, Clone)]
pub enum EndpointStyle {
    /// Date range appended to the path, base in the query string.
    RangeInPath,
    /// Everything in the query string, authenticated by an API key.
    RangeInQuery { access_key: String },
}

#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub latest_url: String,
    pub historical_url: String,
    pub style: EndpointStyle,
}

/// REST adapter for one upstream rate provider. Both upstreams are served
/// by this type; only the endpoint profile differs between them.
pub struct RestExchangeProvider {
    name: String,
    endpoints: ProviderEndpoints,
    transport: RateLimitedClient,
    cache: Arc<RateCache>,
}

impl RestExchangeProvider {
    pub fn new(
        name: &str,
        endpoints: ProviderEndpoints,
        transport: RateLimitedClient,
        cache: Arc<RateCache>,
    ) -> Self {
        RestExchangeProvider {
            name: name.to_string(),
            endpoints,
            transport,
            cache,
        }
    }

    fn latest_url(&self, base_currency: &str) -> String {
        match &self.endpoints.style {
            EndpointStyle::RangeInPath => format!(
                "{}?baseCurrency={}",
                self.endpoints.latest_url, base_currency
            ),
            EndpointStyle::RangeInQuery { access_key } => format!(
                "{}?access_key={}&base={}",
                self.endpoints.latest_url, access_key, base_currency
            ),
        }
    }

    fn historical_url(
        &self,
        base_currency: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> String {
        match &self.endpoints.style {
            EndpointStyle::RangeInPath => format!(
                "{}{}..{}?base={}",
                self.endpoints.historical_url, start_date, end_date, base_currency
            ),
            EndpointStyle::RangeInQuery { access_key } => format!(
                "{}?access_key={}&start_date={}&end_date={}&base={}",
                self.endpoints.historical_url, access_key, start_date, end_date, base_currency
            ),
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> ExchangeResult<T> {
        debug!(provider = %self.name, url, "Requesting rates");
        let response = self.transport.get(url).await?;

        if !response.status().is_success() {
            return Err(ExchangeError::UpstreamUnavailable {
                provider: self.name.clone(),
                status: response.status().as_u16(),
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ExchangeError::Decode {
            provider: self.name.clone(),
            source: e,
        })
    }
}

#[async_trait]
impl ExchangeRateProvider for RestExchangeProvider {
    #[instrument(name = "LatestRates", skip(self), fields(provider = %self.name))]
    async fn latest_rates(&self, base_currency: &str) -> ExchangeResult<ExchangeRateSnapshot> {
        let base = base_currency.to_ascii_uppercase();
        if let Some(snapshot) = self.cache.get(&base) {
            return Ok(snapshot);
        }

        let url = self.latest_url(&base);
        let snapshot: ExchangeRateSnapshot = self.fetch_json(&url).await?;
        self.cache.insert(base, snapshot.clone());
        Ok(snapshot)
    }

    async fn convert(
        &self,
        from_currency: &str,
        to_currency: &str,
        amount: Decimal,
    ) -> ExchangeResult<Decimal> {
        let target = to_currency.to_ascii_uppercase();
        let snapshot = self.latest_rates(from_currency).await?;
        let rate = match snapshot.rates.get(&target).copied() {
            Some(rate) => rate,
            None => return Err(ExchangeError::RateNotFound(target)),
        };
        amount
            .checked_mul(rate)
            .ok_or(ExchangeError::ConversionOverflow(target))
    }

    #[instrument(name = "HistoricalRates", skip(self), fields(provider = %self.name))]
    async fn historical_rates(
        &self,
        base_currency: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        page: usize,
        page_size: usize,
    ) -> ExchangeResult<PaginatedHistoricalRates> {
        let base = base_currency.to_ascii_uppercase();
        let url = self.historical_url(&base, start_date, end_date);
        let series: HistoricalRateSeries = self.fetch_json(&url).await?;

        series
            .paginate(page, page_size)
            .ok_or(ExchangeError::HistoricalDataUnavailable(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateLimiter;
    use rust_decimal_macros::dec;
    use std::fmt::Write;
    use std::time::Duration;
    use tokio::sync::watch;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> (RateLimitedClient, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let limiter = Arc::new(RateLimiter::token_bucket(
            100,
            100,
            Duration::from_secs(1),
            16,
        ));
        (
            RateLimitedClient::new(reqwest::Client::new(), limiter, rx),
            tx,
        )
    }

    fn frankfurter_style(server_uri: &str) -> (RestExchangeProvider, watch::Sender<bool>) {
        let (transport, tx) = transport();
        let provider = RestExchangeProvider::new(
            "Frankfurter",
            ProviderEndpoints {
                latest_url: format!("{server_uri}/v1/latest"),
                historical_url: format!("{server_uri}/v1/"),
                style: EndpointStyle::RangeInPath,
            },
            transport,
            Arc::new(RateCache::default()),
        );
        (provider, tx)
    }

    fn fixer_style(server_uri: &str) -> (RestExchangeProvider, watch::Sender<bool>) {
        let (transport, tx) = transport();
        let provider = RestExchangeProvider::new(
            "Fixer",
            ProviderEndpoints {
                latest_url: format!("{server_uri}/api/latest"),
                historical_url: format!("{server_uri}/api/timeseries"),
                style: EndpointStyle::RangeInQuery {
                    access_key: "k123".to_string(),
                },
            },
            transport,
            Arc::new(RateCache::default()),
        );
        (provider, tx)
    }

    async fn mount_latest(server: &MockServer, base: &str, body: &str, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .and(query_param("baseCurrency", base))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn historical_body(base: &str, days: u32) -> String {
        let mut rates = String::new();
        for day in 1..=days {
            if day > 1 {
                rates.push(',');
            }
            write!(rates, r#""2024-01-{day:02}": {{"USD": 1.09}}"#).unwrap();
        }
        format!(
            r#"{{"base": "{base}", "start_date": "2024-01-01", "end_date": "2024-01-{days:02}", "rates": {{{rates}}}}}"#
        )
    }

    #[tokio::test]
    async fn test_latest_rates_fetch() {
        let mock_server = MockServer::start().await;
        mount_latest(
            &mock_server,
            "EUR",
            r#"{"base": "EUR", "rates": {"USD": 1.090437, "GBP": 0.85}}"#,
            1,
        )
        .await;

        let (provider, _tx) = frankfurter_style(&mock_server.uri());
        let snapshot = provider.latest_rates("EUR").await.unwrap();

        assert_eq!(snapshot.base, "EUR");
        assert_eq!(snapshot.rates.len(), 2);
        assert_eq!(snapshot.rates["USD"], dec!(1.090437));
    }

    #[tokio::test]
    async fn test_latest_rates_cached_after_first_fetch() {
        let mock_server = MockServer::start().await;
        mount_latest(
            &mock_server,
            "EUR",
            r#"{"base": "EUR", "rates": {"USD": 1.090437}}"#,
            1,
        )
        .await;

        let (provider, _tx) = frankfurter_style(&mock_server.uri());

        let first = provider.latest_rates("EUR").await.unwrap();
        let second = provider.latest_rates("EUR").await.unwrap();
        assert_eq!(first, second);
        // expect(1) on the mock fails the test if the second call hit the
        // network.
    }

    #[tokio::test]
    async fn test_latest_rates_normalizes_base_case() {
        let mock_server = MockServer::start().await;
        mount_latest(
            &mock_server,
            "EUR",
            r#"{"base": "EUR", "rates": {"USD": 1.090437}}"#,
            1,
        )
        .await;

        let (provider, _tx) = frankfurter_style(&mock_server.uri());

        provider.latest_rates("eur").await.unwrap();
        provider.latest_rates("EUR").await.unwrap();
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let (provider, _tx) = frankfurter_style(&mock_server.uri());
        let err = provider.latest_rates("EUR").await.unwrap_err();

        assert!(matches!(
            err,
            ExchangeError::UpstreamUnavailable { status: 500, .. }
        ));
        assert_eq!(err.to_string(), "Frankfurter api is unavailable");
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let mock_server = MockServer::start().await;
        mount_latest(&mock_server, "EUR", r#"{"base": 42}"#, 1).await;

        let (provider, _tx) = frankfurter_style(&mock_server.uri());
        let err = provider.latest_rates("EUR").await.unwrap_err();

        assert!(matches!(err, ExchangeError::Decode { .. }));
        assert!(
            err.to_string()
                .contains("failed to parse Frankfurter response")
        );
    }

    #[tokio::test]
    async fn test_convert_exact_decimal_product() {
        let mock_server = MockServer::start().await;
        mount_latest(
            &mock_server,
            "EUR",
            r#"{"base": "EUR", "rates": {"USD": 1.040421}}"#,
            1,
        )
        .await;

        let (provider, _tx) = frankfurter_style(&mock_server.uri());
        let converted = provider.convert("EUR", "USD", dec!(100)).await.unwrap();

        assert_eq!(converted, dec!(104.0421));
    }

    #[tokio::test]
    async fn test_convert_unknown_target_currency() {
        let mock_server = MockServer::start().await;
        mount_latest(
            &mock_server,
            "EUR",
            r#"{"base": "EUR", "rates": {"USD": 1.090437}}"#,
            1,
        )
        .await;

        let (provider, _tx) = frankfurter_style(&mock_server.uri());
        let err = provider.convert("EUR", "jpy", dec!(10)).await.unwrap_err();

        assert!(matches!(err, ExchangeError::RateNotFound(ref code) if code == "JPY"));
        assert_eq!(err.to_string(), "exchange rate for JPY not found");
    }

    #[tokio::test]
    async fn test_convert_overflowing_amount_errors() {
        let mock_server = MockServer::start().await;
        mount_latest(
            &mock_server,
            "EUR",
            r#"{"base": "EUR", "rates": {"USD": 1.09}}"#,
            1,
        )
        .await;

        let (provider, _tx) = frankfurter_style(&mock_server.uri());
        let err = provider
            .convert("EUR", "USD", Decimal::MAX)
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::ConversionOverflow(ref code) if code == "USD"));
        assert_eq!(err.to_string(), "conversion to USD overflowed");
    }

    #[tokio::test]
    async fn test_convert_reuses_cached_snapshot() {
        let mock_server = MockServer::start().await;
        mount_latest(
            &mock_server,
            "EUR",
            r#"{"base": "EUR", "rates": {"USD": 1.040421}}"#,
            1,
        )
        .await;

        let (provider, _tx) = frankfurter_style(&mock_server.uri());

        provider.convert("EUR", "USD", dec!(100)).await.unwrap();
        provider.convert("EUR", "USD", dec!(250)).await.unwrap();
    }

    #[tokio::test]
    async fn test_historical_rates_paginated() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/2024-01-01..2024-01-25"))
            .and(query_param("base", "EUR"))
            .respond_with(ResponseTemplate::new(200).set_body_string(historical_body("EUR", 25)))
            .mount(&mock_server)
            .await;

        let (provider, _tx) = frankfurter_style(&mock_server.uri());
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 25).unwrap();

        let page = provider
            .historical_rates("EUR", start, end, 2, 10)
            .await
            .unwrap();
        assert_eq!(page.total_records, 25);
        assert_eq!(page.rates.len(), 10);
        assert_eq!(
            *page.rates.keys().next().unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()
        );

        let past_end = provider
            .historical_rates("EUR", start, end, 4, 10)
            .await
            .unwrap();
        assert!(past_end.rates.is_empty());
        assert_eq!(past_end.total_records, 25);
    }

    #[tokio::test]
    async fn test_historical_rates_never_cached() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/2024-01-01..2024-01-05"))
            .respond_with(ResponseTemplate::new(200).set_body_string(historical_body("EUR", 5)))
            .expect(2)
            .mount(&mock_server)
            .await;

        let (provider, _tx) = frankfurter_style(&mock_server.uri());
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();

        provider
            .historical_rates("EUR", start, end, 1, 10)
            .await
            .unwrap();
        provider
            .historical_rates("EUR", start, end, 1, 10)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_historical_missing_series() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/2024-01-01..2024-01-05"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"base": "EUR", "start_date": "2024-01-01", "end_date": "2024-01-05"}"#,
            ))
            .mount(&mock_server)
            .await;

        let (provider, _tx) = frankfurter_style(&mock_server.uri());
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();

        let err = provider
            .historical_rates("eur", start, end, 1, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::HistoricalDataUnavailable(ref base) if base == "EUR"));
        assert_eq!(err.to_string(), "no historical rates found for EUR");
    }

    #[tokio::test]
    async fn test_query_style_urls_carry_access_key() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/latest"))
            .and(query_param("access_key", "k123"))
            .and(query_param("base", "EUR"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"base": "EUR", "rates": {"USD": 1.090437}}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/timeseries"))
            .and(query_param("access_key", "k123"))
            .and(query_param("start_date", "2024-01-01"))
            .and(query_param("end_date", "2024-01-05"))
            .and(query_param("base", "EUR"))
            .respond_with(ResponseTemplate::new(200).set_body_string(historical_body("EUR", 5)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (provider, _tx) = fixer_style(&mock_server.uri());

        let snapshot = provider.latest_rates("EUR").await.unwrap();
        assert_eq!(snapshot.rates["USD"], dec!(1.090437));

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let page = provider
            .historical_rates("EUR", start, end, 1, 10)
            .await
            .unwrap();
        assert_eq!(page.total_records, 5);
    }

    #[tokio::test]
    async fn test_rate_limited_before_reaching_network() {
        let mock_server = MockServer::start().await;
        mount_latest(
            &mock_server,
            "EUR",
            r#"{"base": "EUR", "rates": {"USD": 1.090437}}"#,
            1,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .and(query_param("baseCurrency", "GBP"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"base": "GBP", "rates": {}}"#))
            .expect(0)
            .mount(&mock_server)
            .await;

        let (_tx, rx) = watch::channel(false);
        let limiter = Arc::new(RateLimiter::token_bucket(1, 1, Duration::from_secs(600), 0));
        let provider = RestExchangeProvider::new(
            "Frankfurter",
            ProviderEndpoints {
                latest_url: format!("{}/v1/latest", mock_server.uri()),
                historical_url: format!("{}/v1/", mock_server.uri()),
                style: EndpointStyle::RangeInPath,
            },
            RateLimitedClient::new(reqwest::Client::new(), limiter, rx),
            Arc::new(RateCache::default()),
        );

        provider.latest_rates("EUR").await.unwrap();

        // Different base, so the cache cannot answer; the limiter rejects
        // before any request goes out.
        let err = provider.latest_rates("GBP").await.unwrap_err();
        assert!(matches!(err, ExchangeError::RateLimitExceeded));
    }
}
