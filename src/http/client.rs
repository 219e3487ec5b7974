/// Rate-limited REST client over Binance's public klines endpoint.
///
/// Built on `reqwest` rather than a dedicated exchange SDK: it gives
/// access to `Retry-After` headers, a per-request timeout, and a seam to
/// plug in the token bucket/concurrency gate below — see DESIGN.md.
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::model::{parse_klines, Kline};
use super::rate_limit::{ConcurrencyGate, TokenBucket};
use crate::config::{HttpConfig, RateLimitConfig};
use crate::error::{PipelineError, Result};

const BASE_URL: &str = "https://api.binance.com/api/v3/klines";

pub struct RateLimitedClient {
    http: reqwest::Client,
    base_url: String,
    bucket: TokenBucket,
    gate: ConcurrencyGate,
    timeout: Duration,
    base_ms: u64,
    max_ms: u64,
    max_retries: u32,
}

impl RateLimitedClient {
    pub fn new(rate_limit: &RateLimitConfig, http_cfg: &HttpConfig) -> Result<Self> {
        Self::with_base_url(rate_limit, http_cfg, BASE_URL.to_string())
    }

    /// Same as `new`, but against an arbitrary endpoint — lets tests point
    /// the client at a local `wiremock` server instead of Binance.
    pub fn with_base_url(
        rate_limit: &RateLimitConfig,
        http_cfg: &HttpConfig,
        base_url: String,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build http client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            bucket: TokenBucket::new(rate_limit.requests_per_minute),
            gate: ConcurrencyGate::new(rate_limit.max_concurrent),
            timeout: Duration::from_millis(http_cfg.timeout_ms),
            base_ms: rate_limit.retry.base_ms,
            max_ms: rate_limit.retry.max_ms,
            max_retries: rate_limit.retry.max_retries,
        })
    }

    /// Fetch an ordered sequence of klines. `limit` must be <= 1000
    /// (MAX_API_LIMIT, enforced by the ingest engine).
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start: Option<i64>,
        end: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Kline>> {
        let mut attempt: u32 = 0;

        loop {
            match self.try_once(symbol, interval, start, end, limit).await {
                Ok(klines) => return Ok(klines),
                Err(PipelineError::TransientHttp {
                    status,
                    detail,
                    retry_after,
                }) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(PipelineError::PermanentHttp {
                            status: status.unwrap_or(0),
                            body: format!("exhausted retries after transient error: {detail}"),
                        });
                    }
                    let delay = retry_after.unwrap_or_else(|| self.backoff_delay(attempt));
                    warn!(
                        symbol,
                        interval,
                        attempt,
                        ?status,
                        detail,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient http error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_once(
        &self,
        symbol: &str,
        interval: &str,
        start: Option<i64>,
        end: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Kline>> {
        // Acquire order: gate, then bucket.
        let _permit = self.gate.acquire().await;
        self.bucket.take().await;

        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| PipelineError::Config(format!("bad base url: {e}")))?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("symbol", symbol);
            qp.append_pair("interval", interval);
            qp.append_pair("limit", &limit.to_string());
            if let Some(s) = start {
                qp.append_pair("startTime", &s.to_string());
            }
            if let Some(e) = end {
                qp.append_pair("endTime", &e.to_string());
            }
        }

        debug!(symbol, interval, start, end, limit, "fetching klines");

        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PipelineError::TransientHttp {
                status: e.status().map(|s| s.as_u16()),
                detail: format!("request failed or timed out: {e}"),
                retry_after: None,
            })?;

        let status = response.status();

        if status.as_u16() == 418 || status.as_u16() == 429 {
            let retry_after = parse_retry_after(response.headers());
            return Err(PipelineError::TransientHttp {
                status: Some(status.as_u16()),
                detail: "rate limited".into(),
                retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(PipelineError::TransientHttp {
                    status: Some(status.as_u16()),
                    detail: body,
                    retry_after: None,
                });
            }
            return Err(PipelineError::PermanentHttp {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::TransientHttp {
                status: None,
                detail: format!("failed reading response body: {e}"),
                retry_after: None,
            })?;

        parse_klines(&body)
    }

    /// `clamp(base · 2^attempt · (0.75 + U(0, 0.5)), baseMs, maxMs)`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter = 0.75 + rand::thread_rng().gen_range(0.0..0.5);
        let raw = self.base_ms as f64 * 2f64.powi(attempt as i32) * jitter;
        let clamped = raw.clamp(self.base_ms as f64, self.max_ms as f64);
        Duration::from_millis(clamped as u64)
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_clamped_between_base_and_max() {
        let cfg = RateLimitConfig {
            requests_per_minute: 1200,
            max_concurrent: 4,
            retry: crate::config::RetryConfig {
                base_ms: 500,
                max_ms: 5_000,
                max_retries: 5,
            },
        };
        let http_cfg = HttpConfig { timeout_ms: 10_000 };
        let client = RateLimitedClient::new(&cfg, &http_cfg).unwrap();
        for attempt in 0..10 {
            let d = client.backoff_delay(attempt);
            assert!(d.as_millis() >= 500);
            assert!(d.as_millis() <= 5_000);
        }
    }

    fn test_cfg() -> (RateLimitConfig, HttpConfig) {
        (
            RateLimitConfig {
                requests_per_minute: 6000,
                max_concurrent: 4,
                retry: crate::config::RetryConfig {
                    base_ms: 10,
                    max_ms: 200,
                    max_retries: 3,
                },
            },
            HttpConfig { timeout_ms: 5_000 },
        )
    }

    fn sample_body() -> String {
        serde_json::json!([[
            1700000000000i64, "100.0", "101.0", "99.0", "100.5", "10.0",
            1700003599999i64, "1005.0", 42, "5.0", "502.5", "0"
        ]])
        .to_string()
    }

    #[tokio::test]
    async fn retries_after_429_honoring_retry_after_header() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sample_body()))
            .expect(1)
            .mount(&server)
            .await;

        let (rl, http_cfg) = test_cfg();
        let client =
            RateLimitedClient::with_base_url(&rl, &http_cfg, format!("{}/api/v3/klines", server.uri()))
                .unwrap();

        let start = std::time::Instant::now();
        let klines = client
            .get_klines("BTCUSDT", "1h", None, None, 1)
            .await
            .unwrap();
        assert_eq!(klines.len(), 1);
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn permanent_4xx_is_not_retried() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(400).set_body_string("{\"code\":-1121,\"msg\":\"Invalid symbol.\"}"))
            .expect(1)
            .mount(&server)
            .await;

        let (rl, http_cfg) = test_cfg();
        let client =
            RateLimitedClient::with_base_url(&rl, &http_cfg, format!("{}/api/v3/klines", server.uri()))
                .unwrap();

        let err = client.get_klines("XX", "1h", None, None, 1).await.unwrap_err();
        assert!(matches!(err, PipelineError::PermanentHttp { status: 400, .. }));
    }
}
