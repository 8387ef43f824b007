//! REST client
//!
//! Every call goes through the rate limiter, carries the bot token and is
//! counted in the shared in-flight tracker while it is outstanding.

use chat_common::{RestConfig, Supervisor};
use chat_core::InFlight;
use dashmap::DashMap;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::error::RestError;
use crate::limiter::RestRateLimiter;
use crate::route::Route;

/// Header carrying the audit log reason of a mutating call
pub const HEADER_AUDIT_LOG_REASON: &str = "x-audit-log-reason";

/// A request to send: route, optional JSON body, optional audit reason
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub route: Route,
    pub body: Option<serde_json::Value>,
    pub audit_reason: Option<String>,
}

impl RestRequest {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            body: None,
            audit_reason: None,
        }
    }

    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn audit_reason(mut self, reason: impl Into<String>) -> Self {
        self.audit_reason = Some(reason.into());
        self
    }
}

/// A response that was not turned into a [`RestError`]
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl RestResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RestError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// `GET /gateway` and `GET /gateway/bot` response
#[derive(Debug, Deserialize)]
struct GatewayInfo {
    url: String,
}

struct Inner {
    http: reqwest::Client,
    config: RestConfig,
    authorization: HeaderValue,
    limiter: RestRateLimiter,
    in_flight: InFlight,
    supervisor: Supervisor,
    /// Resource key -> consecutive 404 count
    not_found: DashMap<String, u32>,
    gateway_url: OnceCell<String>,
}

/// Rate-limited REST client; clones share all state
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("api_base", &self.inner.config.api_base)
            .field("in_flight", &self.inner.in_flight.count())
            .finish()
    }
}

impl RestClient {
    /// Create a client
    ///
    /// `in_flight` is shared with the dispatch queue; `supervisor` receives
    /// the restart request on HTTP 401.
    pub fn new(
        config: RestConfig,
        token: &str,
        in_flight: InFlight,
        supervisor: Supervisor,
    ) -> Result<Self, RestError> {
        let mut authorization = HeaderValue::from_str(&format!("Bot {}", token.trim()))
            .map_err(|_| RestError::InvalidUrl("token is not a valid header value".to_string()))?;
        authorization.set_sensitive(true);

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        let limiter = RestRateLimiter::new(config.global_limit, config.global_window);

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                authorization,
                limiter,
                in_flight,
                supervisor,
                not_found: DashMap::new(),
                gateway_url: OnceCell::new(),
            }),
        })
    }

    pub fn limiter(&self) -> &RestRateLimiter {
        &self.inner.limiter
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.inner.in_flight
    }

    /// Whether a route has been marked missing
    pub fn is_missing(&self, route: &Route) -> bool {
        self.inner
            .not_found
            .get(&route.resource_key())
            .is_some_and(|count| *count >= self.inner.config.missing_route_threshold)
    }

    fn url(&self, route: &Route) -> Result<reqwest::Url, RestError> {
        let raw = format!("{}{}", self.inner.config.api_base, route.path());
        reqwest::Url::parse(&raw).map_err(|e| RestError::InvalidUrl(format!("{raw}: {e}")))
    }

    /// Send a request, honoring rate limits and the retry policy
    #[instrument(skip_all, fields(route = %request.route))]
    pub async fn execute(&self, request: RestRequest) -> Result<RestResponse, RestError> {
        let route = &request.route;
        let resource = route.resource_key();

        if self.is_missing(route) {
            tracing::debug!("Route marked missing, not sending");
            return Err(RestError::MissingRoute {
                route: route.to_string(),
            });
        }

        let url = self.url(route)?;
        let mut rate_limit_retries = 0;
        let mut transport_retried = false;

        loop {
            self.inner.limiter.reserve(route).await;

            let sent = {
                let _guard = self.inner.in_flight.enter();
                self.send_once(&request, url.clone()).await
            };

            let (status, headers, body) = match sent {
                Ok(parts) => parts,
                Err(e) if !transport_retried => {
                    // Transient network failure: one immediate re-attempt
                    tracing::warn!(error = %e, "Request failed, retrying once");
                    transport_retried = true;
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.inner.limiter.observe(route, &headers);

            match status {
                401 => {
                    self.inner
                        .supervisor
                        .restart(format!("HTTP 401 on {route}"));
                    return Err(RestError::Unauthorized { status, body });
                }
                404 => {
                    let streak = {
                        let mut count = self.inner.not_found.entry(resource.clone()).or_insert(0);
                        *count += 1;
                        *count
                    };
                    if streak >= self.inner.config.missing_route_threshold {
                        tracing::warn!(streak, "Route returned 404 repeatedly, marking missing");
                    }
                    return Err(RestError::NotFound {
                        route: route.to_string(),
                        status,
                        body,
                    });
                }
                429 => {
                    let info = self.inner.limiter.on_rate_limited(route, &headers, &body);
                    if rate_limit_retries < self.inner.config.max_retries {
                        rate_limit_retries += 1;
                        tracing::debug!(
                            attempt = rate_limit_retries,
                            retry_after_ms = info.retry_after.as_millis() as u64,
                            global = info.global,
                            "Retrying after rate limit"
                        );
                        continue;
                    }
                    return Err(RestError::RateLimited {
                        route: route.to_string(),
                        retry_after: info.retry_after,
                        global: info.global,
                        status,
                        body,
                    });
                }
                _ => {
                    self.inner.not_found.remove(&resource);
                    tracing::trace!(status, "Request completed");
                    return Ok(RestResponse {
                        status,
                        headers,
                        body,
                    });
                }
            }
        }
    }

    async fn send_once(
        &self,
        request: &RestRequest,
        url: reqwest::Url,
    ) -> Result<(u16, HeaderMap, String), RestError> {
        let mut builder = self
            .inner
            .http
            .request(request.route.method().clone(), url)
            .header(AUTHORIZATION, self.inner.authorization.clone());

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(reason) = &request.audit_reason {
            let encoded = utf8_percent_encode(reason, NON_ALPHANUMERIC).to_string();
            builder = builder.header(HEADER_AUDIT_LOG_REASON, encoded);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok((status, headers, body))
    }

    /// Gateway URL, fetched once and cached
    ///
    /// Tries `GET /gateway/bot` first and falls back to `GET /gateway`.
    pub async fn gateway_url(&self) -> Result<String, RestError> {
        self.inner
            .gateway_url
            .get_or_try_init(|| async {
                match self.fetch_gateway(Route::get("/gateway/bot")).await {
                    Ok(url) => Ok(url),
                    Err(e @ RestError::Unauthorized { .. }) => Err(e),
                    Err(e) => {
                        tracing::debug!(error = %e, "Bot gateway lookup failed, falling back");
                        self.fetch_gateway(Route::get("/gateway")).await
                    }
                }
            })
            .await
            .cloned()
    }

    async fn fetch_gateway(&self, route: Route) -> Result<String, RestError> {
        let response = self.execute(RestRequest::new(route)).await?;
        if !response.is_success() {
            return Err(RestError::InvalidUrl(format!(
                "gateway lookup returned {}",
                response.status
            )));
        }
        let info: GatewayInfo = response.json()?;
        tracing::info!(url = %info.url, "Gateway URL discovered");
        Ok(info.url)
    }
}
