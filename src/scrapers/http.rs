//! HTTP access and request pacing shared by every scraper.
//!
//! # Architecture
//!
//! - [`HttpFetch`]: the single capability scrapers need, a GET returning the
//!   status and body. The real implementation is [`HttpClient`]; tests plug
//!   in canned responses.
//! - [`fetch_ok`]: GET that turns any non-2xx answer into a
//!   [`FetchError::Status`].
//! - [`Pacer`]: sleeps for a delay drawn uniformly from a configured
//!   interval between successive fetches.

use rand::{Rng, rng};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::config::{Bounds, HttpSettings};
use crate::error::FetchError;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for issuing GET requests.
///
/// Implementations must apply a timeout; a request never blocks forever.
pub trait HttpFetch {
    /// Fetch `url`. Non-2xx statuses are returned as a [`Page`], only
    /// transport failures are errors.
    async fn get(&self, url: &str) -> Result<Page, FetchError>;
}

/// [`HttpFetch`] backed by a shared `reqwest` client.
pub struct HttpClient {
    inner: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    /// Build a client with the configured timeout and browser-like headers.
    pub fn new(settings: &HttpSettings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let timeout = Duration::from_secs(settings.timeout_secs);
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { inner, timeout })
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpFetch for HttpClient {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str) -> Result<Page, FetchError> {
        let t0 = Instant::now();
        let network = |e: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let resp = self.inner.get(url).send().await.map_err(network)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(network)?;
        debug!(
            status,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "GET complete"
        );
        Ok(Page { status, body })
    }
}

/// GET `url` and return the body, failing on any non-2xx status.
pub async fn fetch_ok<H: HttpFetch>(http: &H, url: &str) -> Result<String, FetchError> {
    let page = http.get(url).await?;
    if !page.is_success() {
        warn!(%url, status = page.status, "Non-success status");
        return Err(FetchError::Status {
            url: url.to_string(),
            status: page.status,
        });
    }
    Ok(page.body)
}

/// Inter-request delay drawn uniformly from `[min, max]` seconds.
///
/// A degenerate interval (`min == max`) gives a fixed politeness delay.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    bounds: Bounds<f64>,
}

impl Pacer {
    pub fn new(bounds: Bounds<f64>) -> Self {
        Self { bounds }
    }

    /// Draw the next delay.
    pub fn draw(&self) -> Duration {
        let Bounds { min, max } = self.bounds;
        let secs = if max > min {
            rng().random_range(min..=max)
        } else {
            min
        };
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Sleep for a freshly drawn delay.
    pub async fn pause(&self) {
        let delay = self.draw();
        debug!(secs = delay.as_secs_f64(), "Pacing before next request");
        sleep(delay).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Canned-response [`HttpFetch`] for scraper tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};

    /// Serves queued pages per URL; the last queued page repeats.
    #[derive(Default)]
    pub struct StubHttp {
        pages: RefCell<HashMap<String, VecDeque<Page>>>,
        pub calls: RefCell<Vec<String>>,
    }

    impl StubHttp {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(self, url: &str, status: u16, body: &str) -> Self {
            self.pages
                .borrow_mut()
                .entry(url.to_string())
                .or_default()
                .push_back(Page {
                    status,
                    body: body.to_string(),
                });
            self
        }

        pub fn call_count(&self, url: &str) -> usize {
            self.calls.borrow().iter().filter(|u| *u == url).count()
        }
    }

    impl HttpFetch for StubHttp {
        async fn get(&self, url: &str) -> Result<Page, FetchError> {
            self.calls.borrow_mut().push(url.to_string());
            let mut pages = self.pages.borrow_mut();
            match pages.get_mut(url) {
                Some(queue) if queue.len() > 1 => Ok(queue.pop_front().expect("non-empty queue")),
                Some(queue) => queue.front().cloned().ok_or_else(|| FetchError::Network {
                    url: url.to_string(),
                    reason: "no page".into(),
                }),
                None => Err(FetchError::Network {
                    url: url.to_string(),
                    reason: "connection refused".into(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubHttp;
    use super::*;

    #[test]
    fn pacer_draws_within_bounds_and_varies() {
        let pacer = Pacer::new(Bounds::new(6.5, 12.5));
        let draws: Vec<Duration> = (0..64).map(|_| pacer.draw()).collect();
        for d in &draws {
            let s = d.as_secs_f64();
            assert!((6.5..=12.5).contains(&s), "{s} out of range");
        }
        let first = draws[0];
        assert!(draws.iter().any(|d| *d != first), "delay must not be constant");
    }

    #[test]
    fn degenerate_pacer_is_fixed() {
        let pacer = Pacer::new(Bounds::new(1.5, 1.5));
        assert_eq!(pacer.draw(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn fetch_ok_rejects_non_success() {
        let http = StubHttp::new()
            .with("https://a.test/ok", 200, "fine")
            .with("https://a.test/gone", 404, "missing");

        assert_eq!(fetch_ok(&http, "https://a.test/ok").await.unwrap(), "fine");
        let err = fetch_ok(&http, "https://a.test/gone").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        let err = fetch_ok(&http, "https://a.test/other").await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
    }
}
