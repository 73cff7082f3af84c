//! A browser that renders pages by fetching their server-side HTML.
//!
//! Navigation is a GET; waiting for an element re-fetches the document until
//! the element shows up or the wait runs out; clicking follows a link or
//! submits the enclosing form. Cookies persist for the browser's lifetime so
//! that an accepted consent wall stays accepted.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info};
use url::Url;

use super::extract::{has_match, plan_click, ClickAction, FormMethod};
use super::{Browser, BrowserLauncher, Page};
use crate::models::ScrapeSettings;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// HTTP-backed browser with a shared cookie jar
pub struct HttpBrowser {
    client: Client,
    poll_interval: Duration,
    navigation_timeout: Duration,
    open_pages: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl HttpBrowser {
    pub fn new(settings: &ScrapeSettings) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_str(&settings.accept_language)
                .context("invalid Accept-Language value")?,
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("text/html,application/xhtml+xml"),
        );

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(settings.navigation_timeout)
            .build()?;

        Ok(Self {
            client,
            poll_interval: settings.poll_interval,
            navigation_timeout: settings.navigation_timeout,
            open_pages: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        })
    }

    /// Pages handed out and not yet closed
    pub fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        if self.is_closed() {
            return Err(anyhow!("browser is closed"));
        }
        self.open_pages.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(HttpPage {
            client: self.client.clone(),
            poll_interval: self.poll_interval,
            navigation_timeout: self.navigation_timeout,
            url: None,
            html: None,
            open_pages: Some(self.open_pages.clone()),
        }))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let leaked = self.open_pages();
            if leaked > 0 {
                debug!("Browser closed with {} page(s) still open", leaked);
            }
            info!("🧹 Browser closed");
        }
        Ok(())
    }
}

/// One document in an [`HttpBrowser`]
pub struct HttpPage {
    client: Client,
    poll_interval: Duration,
    navigation_timeout: Duration,
    url: Option<Url>,
    html: Option<String>,
    /// Present until the page is released
    open_pages: Option<Arc<AtomicUsize>>,
}

impl HttpPage {
    fn release(&mut self) {
        if let Some(counter) = self.open_pages.take() {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn current_url(&self) -> Result<Url> {
        self.url.clone().ok_or_else(|| anyhow!("page has not been navigated"))
    }

    async fn load(&mut self, request: reqwest::RequestBuilder, limit: Duration) -> Result<()> {
        let response = timeout(limit, request.send())
            .await
            .map_err(|_| anyhow!("navigation timed out after {:?}", limit))??;

        let status = response.status();
        let final_url = response.url().clone();
        if !status.is_success() {
            return Err(anyhow!("{} answered {}", final_url, status));
        }

        let html = timeout(limit, response.text())
            .await
            .map_err(|_| anyhow!("reading {} timed out", final_url))??;
        debug!("Loaded {} ({} bytes)", final_url, html.len());

        self.url = Some(final_url);
        self.html = Some(html);
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        let url = self.current_url()?;
        let request = self.client.get(url);
        self.load(request, self.navigation_timeout).await
    }

    fn matches(&self, selector: &str) -> Result<bool> {
        match &self.html {
            Some(html) => has_match(html, selector),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl Page for HttpPage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let url = Url::parse(url).with_context(|| format!("invalid page URL '{}'", url))?;
        let request = self.client.get(url);
        self.load(request, timeout).await
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.matches(selector)? {
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline || self.url.is_none() {
                return Ok(false);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
            if Instant::now() >= deadline {
                return Ok(false);
            }

            if let Err(e) = self.reload().await {
                debug!("Re-fetch while waiting for {} failed: {:#}", selector, e);
            }
        }
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let base = self.current_url()?;
        let html = self.html.as_deref().unwrap_or_default();

        let request = match plan_click(html, &base, selector)? {
            Some(ClickAction::Navigate(url)) => {
                if url.as_str().split('#').next() == base.as_str().split('#').next() {
                    // In-page anchor, nothing to load
                    return Ok(());
                }
                self.client.get(url)
            }
            Some(ClickAction::Submit { method: FormMethod::Post, action, fields }) => {
                self.client.post(action).form(&fields)
            }
            Some(ClickAction::Submit { method: FormMethod::Get, action, fields }) => {
                self.client.get(action).query(&fields)
            }
            None => return Err(anyhow!("nothing clickable matches {}", selector)),
        };

        self.load(request, self.navigation_timeout).await
    }

    fn content(&self) -> Option<String> {
        self.html.clone()
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        self.html = None;
        Ok(())
    }
}

impl Drop for HttpPage {
    fn drop(&mut self) {
        self.release();
    }
}

/// Launches an [`HttpBrowser`] per scraped batch
pub struct HttpBrowserLauncher {
    settings: ScrapeSettings,
}

impl HttpBrowserLauncher {
    pub fn new(settings: ScrapeSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrowserLauncher for HttpBrowserLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>> {
        let browser = HttpBrowser::new(&self.settings)?;
        info!("🌐 Browser launched");
        Ok(Arc::new(browser))
    }
}
