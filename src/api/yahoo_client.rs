use anyhow::{anyhow, Context, Result};
use reqwest::{header::{HeaderMap, HeaderValue, ACCEPT}, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::{ApiRateLimiter, QuoteSummaryProvider};
use crate::models::{Config, YahooEndpoints};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// quoteSummary response envelope
#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: ResultBody,
}

/// chart response envelope
#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ResultBody,
}

#[derive(Debug, Deserialize)]
struct ResultBody {
    result: Option<Vec<Value>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: Option<String>,
}

impl ResultBody {
    /// First result object; `None` for "Not Found" or an empty result list
    fn into_first(self, endpoint: &str) -> Result<Option<Value>> {
        if let Some(error) = self.error {
            if error.code == "Not Found" {
                return Ok(None);
            }
            return Err(anyhow!(
                "{} error {}: {}",
                endpoint,
                error.code,
                error.description.unwrap_or_default()
            ));
        }
        Ok(self.result.and_then(|results| results.into_iter().next()))
    }
}

/// Price history back to the first trade, with dividend events
const CHART_RANGE: &str = "max";

/// Yahoo Finance quoteSummary client
pub struct YahooClient {
    client: Client,
    endpoints: YahooEndpoints,
    rate_limiter: ApiRateLimiter,
    crumb: Mutex<Option<String>>,
}

impl YahooClient {
    /// Create a new Yahoo client
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            endpoints: config.yahoo.clone(),
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
            crumb: Mutex::new(None),
        })
    }

    /// Get the session crumb, fetching one if none is cached
    async fn get_crumb(&self) -> Result<String> {
        let mut guard = self.crumb.lock().await;
        if let Some(crumb) = guard.as_ref() {
            return Ok(crumb.clone());
        }

        let crumb = self.fetch_crumb().await?;
        info!("🔑 Obtained Yahoo session crumb");
        *guard = Some(crumb.clone());
        Ok(crumb)
    }

    /// Visit the cookie endpoint, then exchange the session cookie for a crumb
    async fn fetch_crumb(&self) -> Result<String> {
        self.rate_limiter.wait().await;
        // The cookie endpoint answers with an error status but still sets the session cookie
        match self.client.get(&self.endpoints.cookie_url).send().await {
            Ok(response) => debug!("Cookie endpoint answered {}", response.status()),
            Err(e) => warn!("Cookie endpoint unreachable: {}", e),
        }

        self.rate_limiter.wait().await;
        let response = self
            .client
            .get(&self.endpoints.crumb_url)
            .send()
            .await
            .context("crumb request failed")?;

        let status = response.status();
        let body = response.text().await?;
        let crumb = body.trim();
        if !status.is_success() || crumb.is_empty() || crumb.contains('<') {
            return Err(anyhow!("crumb request failed with status {}", status));
        }

        Ok(crumb.to_string())
    }

    async fn forget_crumb(&self) {
        *self.crumb.lock().await = None;
    }

    /// Build the quoteSummary URL for a ticker
    pub fn quote_summary_url(&self, ticker: &str, modules: &[&str], crumb: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoints.api_base)
            .with_context(|| format!("invalid API base URL '{}'", self.endpoints.api_base))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("API base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["v10", "finance", "quoteSummary", ticker]);
        url.query_pairs_mut()
            .append_pair("modules", &modules.join(","))
            .append_pair("formatted", "false")
            .append_pair("crumb", crumb);
        Ok(url)
    }

    /// Build the chart URL for a ticker at one bar interval
    pub fn chart_url(&self, ticker: &str, interval: &str, crumb: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoints.api_base)
            .with_context(|| format!("invalid API base URL '{}'", self.endpoints.api_base))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("API base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", ticker]);
        url.query_pairs_mut()
            .append_pair("range", CHART_RANGE)
            .append_pair("interval", interval)
            .append_pair("events", "div")
            .append_pair("includeAdjustedClose", "true")
            .append_pair("crumb", crumb);
        Ok(url)
    }

    /// Rate-limited JSON GET. `Ok(None)` on 404; 401/403 drop the crumb.
    async fn get_json(&self, url: Url) -> Result<Option<reqwest::Response>> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        self.rate_limiter.wait().await;
        debug!("Making request to: {}", url);

        let response = self.client.get(url).headers(headers).send().await?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.forget_crumb().await;
                Err(anyhow!("Yahoo rejected the session ({}), crumb dropped", status))
            }
            s if !s.is_success() => {
                let error_text = response.text().await.unwrap_or_default();
                Err(anyhow!("API request failed with status {}: {}", s, error_text))
            }
            _ => Ok(Some(response)),
        }
    }
}

#[async_trait::async_trait]
impl QuoteSummaryProvider for YahooClient {
    async fn fetch_modules(&self, ticker: &str, modules: &[&str]) -> Result<Option<Value>> {
        let crumb = self.get_crumb().await?;
        let url = self.quote_summary_url(ticker, modules, &crumb)?;

        let Some(response) = self.get_json(url).await? else {
            debug!("No quoteSummary data for {}", ticker);
            return Ok(None);
        };
        let envelope: QuoteSummaryEnvelope = response
            .json()
            .await
            .context("malformed quoteSummary response")?;
        envelope.quote_summary.into_first("quoteSummary")
    }

    async fn fetch_chart(&self, ticker: &str, interval: &str) -> Result<Option<Value>> {
        let crumb = self.get_crumb().await?;
        let url = self.chart_url(ticker, interval, &crumb)?;

        let Some(response) = self.get_json(url).await? else {
            debug!("No {} chart for {}", interval, ticker);
            return Ok(None);
        };
        let envelope: ChartEnvelope = response.json().await.context("malformed chart response")?;
        envelope.chart.into_first("chart")
    }
}
