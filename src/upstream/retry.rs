use anyhow::{Context, Result};
use rand::Rng;
use reqwest::{RequestBuilder, Response};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Upper bound on a server-supplied `Retry-After`, so one call can never block indefinitely.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Bounded retry policy for outbound calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub status_codes: Vec<u16>,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
    /// Floor for every wait between attempts, including server-supplied `Retry-After`.
    pub min_wait_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            status_codes: vec![429, 500, 502, 503, 504],
            base_backoff_ms: 500,
            max_backoff_ms: 8000,
            jitter_ms: 250,
            min_wait_ms: 0,
        }
    }
}

impl RetryConfig {
    /// Single attempt: failures surface immediately.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_min_wait(mut self, min_wait: Duration) -> Self {
        self.min_wait_ms = u64::try_from(min_wait.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Execute a request with configurable retries, backoff, jitter, and Retry-After support.
///
/// `build` is invoked once per attempt because a `RequestBuilder` is consumed by `send`.
/// Exhausting retries on a retryable status returns the last response, not an error.
pub async fn robust_request<F>(build: F, config: &RetryConfig) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if !config.status_codes.contains(&status.as_u16()) {
                    return Ok(response);
                }

                if attempt > config.max_retries {
                    debug!(
                        "Exhausted {} retries for {}; last status: {}",
                        config.max_retries,
                        response.url(),
                        status
                    );
                    return Ok(response);
                }

                let wait_duration = calculate_wait_time(&response, config, attempt);

                warn!(
                    "Attempt {}/{} failed with status {}. Retrying in {:?}...",
                    attempt,
                    config.max_retries + 1,
                    status,
                    wait_duration
                );

                sleep(wait_duration).await;
            }
            Err(e) => {
                // Network errors (DNS, connection refused, timeouts) are always retryable
                if attempt > config.max_retries {
                    return Err(e).context(format!("Request failed after {} attempts", attempt));
                }

                let wait_duration = calculate_backoff(config, attempt);
                warn!(
                    "Attempt {}/{} failed with error: {}. Retrying in {:?}...",
                    attempt,
                    config.max_retries + 1,
                    e,
                    wait_duration
                );

                sleep(wait_duration).await;
            }
        }
    }
}

fn calculate_wait_time(response: &Response, config: &RetryConfig, attempt: u32) -> Duration {
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    match retry_after {
        Some(seconds) => Duration::from_secs(seconds)
            .min(MAX_RETRY_AFTER)
            .max(Duration::from_millis(config.min_wait_ms)),
        None => calculate_backoff(config, attempt),
    }
}

fn calculate_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.base_backoff_ms as f64;
    let max = config.max_backoff_ms as f64;

    // Exponential: base * 2^(attempt - 1)
    let raw_backoff = base * 2_f64.powi((attempt as i32) - 1);
    let capped_backoff = raw_backoff.min(max);

    let jitter = if config.jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=config.jitter_ms)
    } else {
        0
    };

    Duration::from_millis(((capped_backoff as u64) + jitter).max(config.min_wait_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            status_codes: vec![429, 500, 502, 503],
            base_backoff_ms: 10,
            max_backoff_ms: 100,
            jitter_ms: 0,
            min_wait_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_retry_on_500_succeeds() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/sessions/abc"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/sessions/abc"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let url = format!("{}/v1/sessions/abc", mock_server.uri());

        let res = robust_request(|| client.get(&url), &fast_config(3))
            .await
            .unwrap();

        assert_eq!(res.status(), 200);
    }

    /// Upstream returns 429 with `Retry-After: 1` twice, then 200.
    #[tokio::test]
    async fn test_retry_respects_429_retry_after_header() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/sessions"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":"s1"}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let url = format!("{}/v1/sessions", mock_server.uri());

        let start = std::time::Instant::now();
        let resp = robust_request(|| client.post(&url).json(&serde_json::json!({})), &fast_config(3))
            .await
            .expect("request should succeed after retries");
        let elapsed = start.elapsed();

        assert_eq!(resp.status(), 200);
        assert!(
            elapsed.as_secs_f64() >= 1.8,
            "Elapsed {:.2}s should be >= 1.8s (two Retry-After: 1 waits)",
            elapsed.as_secs_f64()
        );
    }

    /// When all retries are exhausted, return the LAST response (not an error).
    #[tokio::test]
    async fn test_retry_exhausted_returns_last_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/mediaItems"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3) // 1 original + 2 retries
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let url = format!("{}/v1/mediaItems", mock_server.uri());

        let resp = robust_request(|| client.get(&url), &fast_config(2))
            .await
            .expect("should return last response even on exhaustion");

        assert_eq!(resp.status(), 503);
    }

    #[tokio::test]
    async fn test_no_retry_policy_makes_single_attempt() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/mediaItems"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let url = format!("{}/v1/mediaItems", mock_server.uri());

        let resp = robust_request(|| client.get(&url), &RetryConfig::none())
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
    }

    #[tokio::test]
    async fn test_non_retryable_status_returns_immediately() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/sessions/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let url = format!("{}/v1/sessions/gone", mock_server.uri());

        let resp = robust_request(|| client.get(&url), &fast_config(3))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let config = RetryConfig {
            max_retries: 10,
            status_codes: vec![],
            base_backoff_ms: 100,
            max_backoff_ms: 500,
            jitter_ms: 0,
            min_wait_ms: 0,
        };
        assert_eq!(calculate_backoff(&config, 1), Duration::from_millis(100));
        assert_eq!(calculate_backoff(&config, 2), Duration::from_millis(200));
        assert_eq!(calculate_backoff(&config, 3), Duration::from_millis(400));
        assert_eq!(calculate_backoff(&config, 4), Duration::from_millis(500));

        let floored = RetryConfig {
            min_wait_ms: 300,
            ..config
        };
        assert_eq!(calculate_backoff(&floored, 1), Duration::from_millis(300));
        assert_eq!(calculate_backoff(&floored, 3), Duration::from_millis(400));
    }

    /// `Retry-After: 0` must not undercut the configured minimum wait.
    #[tokio::test]
    async fn test_min_wait_applies_to_retry_after() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/sessions/s1"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/sessions/s1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let url = format!("{}/v1/sessions/s1", mock_server.uri());
        let config = fast_config(2).with_min_wait(Duration::from_millis(400));

        let start = std::time::Instant::now();
        let resp = robust_request(|| client.get(&url), &config).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(resp.status(), 200);
        assert!(
            elapsed >= Duration::from_millis(390),
            "retry went out after {:?}",
            elapsed
        );
    }
}
