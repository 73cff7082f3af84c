//! Page rendering and extraction for reports that only exist as web pages.
//!
//! [`Browser`] and [`Page`] describe the small surface the page flows need:
//! navigate, wait for an element, click it and read the rendered document.
//! Pages are always obtained through [`with_page`] so that they are closed on
//! every path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

pub mod extract;
pub mod http;
pub mod pages;

pub use extract::{EarningsEvent, ScrapedTable};
pub use http::{HttpBrowser, HttpBrowserLauncher};

/// A single open document
#[async_trait]
pub trait Page: Send {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Wait until `selector` matches the current document.
    ///
    /// Returns `false` once `timeout` runs out without a match.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool>;

    async fn click(&mut self, selector: &str) -> Result<()>;

    /// Rendered document of the last navigation
    fn content(&self) -> Option<String>;

    async fn close(&mut self) -> Result<()>;
}

/// Something that hands out pages
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn Page>>;

    async fn close(&self) -> Result<()>;
}

/// Starts a browser for one scraped report batch
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Browser>>;
}

/// Open a page, run `f` on it and close the page whatever `f` returned.
pub async fn with_page<T, F>(browser: &dyn Browser, f: F) -> Result<T>
where
    F: for<'p> FnOnce(&'p mut dyn Page) -> BoxFuture<'p, Result<T>>,
{
    let mut page = browser.new_page().await?;
    let result = f(page.as_mut()).await;

    if let Err(e) = page.close().await {
        debug!("Closing page failed: {:#}", e);
    }
    result
}

/// Click a dialog away if it shows up within `wait`.
///
/// Absence of the dialog is the normal case, so nothing here is an error.
pub async fn dismiss_overlay(page: &mut dyn Page, selector: &str, wait: Duration) -> bool {
    match page.wait_for_selector(selector, wait).await {
        Ok(true) => match page.click(selector).await {
            Ok(()) => {
                debug!("Dismissed overlay {}", selector);
                true
            }
            Err(e) => {
                debug!("Overlay {} could not be clicked: {:#}", selector, e);
                false
            }
        },
        Ok(false) => false,
        Err(e) => {
            debug!("Waiting for overlay {} failed: {:#}", selector, e);
            false
        }
    }
}
