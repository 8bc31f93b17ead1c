//! Retrying HTTP client with exponential backoff.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use super::transport::{HttpRequest, HttpResponse, Transport};
use crate::error::FetchError;

/// How many times to retry and how long to wait between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  /// Retries after the initial attempt (0 = a single attempt)
  pub max_retries: u32,
  /// Delay before the first retry; doubles for every retry after that
  pub base_delay: Duration,
  /// Spread each delay by ±factor (0.0 keeps the delays exact)
  pub jitter_factor: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_millis(1000),
      jitter_factor: 0.0,
    }
  }
}

impl RetryPolicy {
  /// Delay before retry `retry` (1-indexed): `base * 2^(retry-1)`.
  pub fn delay_for(&self, retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1).min(31);
    let delay = self.base_delay.saturating_mul(1u32 << exponent);

    let factor = self.jitter_factor.clamp(0.0, 1.0);
    if factor.is_nan() || factor == 0.0 {
      return delay;
    }

    let spread = rand::thread_rng().gen_range(-factor..=factor);
    delay.mul_f64(1.0 + spread)
  }
}

/// HTTP client that retries transport failures and 429/500 responses.
#[derive(Clone)]
pub struct RetryingHttpClient {
  transport: Arc<dyn Transport>,
  base_url: Url,
  policy: RetryPolicy,
}

impl RetryingHttpClient {
  pub fn new(transport: Arc<dyn Transport>, base_url: Url, policy: RetryPolicy) -> Self {
    Self {
      transport,
      base_url,
      policy,
    }
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  pub fn policy(&self) -> &RetryPolicy {
    &self.policy
  }

  /// Execute a request with the configured retry cap.
  pub async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
    self
      .execute_with_retries(request, self.policy.max_retries)
      .await
  }

  /// Execute a request, retrying at most `max_retries` times.
  ///
  /// Non-retryable failures return immediately. When the cap is reached the
  /// last failure is wrapped in `FetchError::RetryExhausted`.
  pub async fn execute_with_retries(
    &self,
    request: &HttpRequest,
    max_retries: u32,
  ) -> Result<HttpResponse, FetchError> {
    let mut attempt = 0u32;

    loop {
      let failure = match self.transport.send(request).await {
        Ok(response) if response.is_success() => {
          if attempt > 0 {
            debug!(
              url = %request.url,
              attempts = attempt + 1,
              "request succeeded after retry"
            );
          }
          return Ok(response);
        }
        Ok(response) => classify_status(response),
        Err(e) => e,
      };

      if !failure.is_retryable() {
        debug!(url = %request.url, error = %failure, "request failed with non-retryable error");
        return Err(failure);
      }

      if attempt >= max_retries {
        error!(
          url = %request.url,
          attempts = attempt + 1,
          error = %failure,
          "request failed after all retry attempts"
        );
        return Err(FetchError::RetryExhausted {
          attempts: attempt + 1,
          last: Box::new(failure),
        });
      }

      attempt += 1;
      let delay = self.policy.delay_for(attempt);
      warn!(
        url = %request.url,
        attempt,
        max_retries,
        delay_ms = delay.as_millis() as u64,
        error = %failure,
        "request failed, retrying"
      );
      tokio::time::sleep(delay).await;
    }
  }
}

/// Map a non-2xx response onto the error taxonomy.
fn classify_status(response: HttpResponse) -> FetchError {
  match response.status {
    429 | 500 => FetchError::RetryableHttp {
      status: response.status,
      body: response.body,
    },
    status => FetchError::TerminalHttp {
      status,
      body: response.body,
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{Reply, ScriptedTransport};

  const PATH: &str = "/api/creators/Alice";

  fn request() -> HttpRequest {
    HttpRequest::get(Url::parse("http://dash.test/api/creators/Alice").unwrap())
  }

  fn client(transport: &Arc<ScriptedTransport>) -> RetryingHttpClient {
    RetryingHttpClient::new(
      transport.clone(),
      Url::parse("http://dash.test/").unwrap(),
      RetryPolicy::default(),
    )
  }

  fn assert_gap(gap: Duration, expected_ms: u128) {
    let diff = gap.as_millis().abs_diff(expected_ms);
    assert!(diff <= 10, "gap {:?} expected ~{}ms", gap, expected_ms);
  }

  #[test]
  fn test_delay_doubles() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
    assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
  }

  #[test]
  fn test_delay_jitter_stays_in_band() {
    let policy = RetryPolicy {
      jitter_factor: 0.2,
      ..RetryPolicy::default()
    };
    for _ in 0..100 {
      let delay = policy.delay_for(2);
      assert!(delay >= Duration::from_millis(1600), "{:?}", delay);
      assert!(delay <= Duration::from_millis(2400), "{:?}", delay);
    }
  }

  #[test]
  fn test_nan_jitter_keeps_exact_delay() {
    let policy = RetryPolicy {
      jitter_factor: f64::NAN,
      ..RetryPolicy::default()
    };
    assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
  }

  #[tokio::test(start_paused = true)]
  async fn test_always_500_exhausts_after_cap() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.always(PATH, Reply::status(500, "boom"));

    let err = client(&transport).execute(&request()).await.unwrap_err();

    assert_eq!(transport.calls_to(PATH), 4);
    match err {
      FetchError::RetryExhausted { attempts, last } => {
        assert_eq!(attempts, 4);
        assert_eq!(
          *last,
          FetchError::RetryableHttp {
            status: 500,
            body: "boom".into()
          }
        );
      }
      other => panic!("expected RetryExhausted, got {:?}", other),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_backoff_delays_between_attempts() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.always(PATH, Reply::status(500, "boom"));

    let _ = client(&transport).execute(&request()).await;

    let times = transport.call_times(PATH);
    assert_eq!(times.len(), 4);
    assert_gap(times[1] - times[0], 1000);
    assert_gap(times[2] - times[1], 2000);
    assert_gap(times[3] - times[2], 4000);
  }

  #[tokio::test(start_paused = true)]
  async fn test_rate_limited_then_success() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
      .respond(PATH, Reply::status(429, "slow down"))
      .respond(PATH, Reply::status(429, "slow down"))
      .respond(PATH, Reply::status(200, r#"{"id": "c1"}"#));

    let response = client(&transport).execute(&request()).await.unwrap();

    assert_eq!(response.status, 200);
    let times = transport.call_times(PATH);
    assert_eq!(times.len(), 3);
    assert_gap(times[1] - times[0], 1000);
    assert_gap(times[2] - times[1], 2000);
  }

  #[tokio::test(start_paused = true)]
  async fn test_terminal_status_fails_fast() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.always(PATH, Reply::status(404, "no such creator"));

    let err = client(&transport).execute(&request()).await.unwrap_err();

    assert_eq!(transport.calls_to(PATH), 1);
    assert_eq!(
      err,
      FetchError::TerminalHttp {
        status: 404,
        body: "no such creator".into()
      }
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_network_failure_is_retried() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
      .respond(PATH, Reply::NetworkDown)
      .respond(PATH, Reply::status(200, "{}"));

    let response = client(&transport).execute(&request()).await.unwrap();

    assert!(response.is_success());
    assert_eq!(transport.calls_to(PATH), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_explicit_retry_cap() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.always(PATH, Reply::status(500, "boom"));

    let err = client(&transport)
      .execute_with_retries(&request(), 1)
      .await
      .unwrap_err();

    assert_eq!(transport.calls_to(PATH), 2);
    assert!(matches!(err, FetchError::RetryExhausted { attempts: 2, .. }));
  }

  #[tokio::test(start_paused = true)]
  async fn test_other_5xx_is_terminal() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.always(PATH, Reply::status(503, "maintenance"));

    let err = client(&transport).execute(&request()).await.unwrap_err();

    assert_eq!(transport.calls_to(PATH), 1);
    assert_eq!(err.status(), Some(503));
  }
}
