//! Scoped headless-chrome session for a single scrape request.
//!
//! The browser process is owned by the session value and killed when it drops,
//! so every exit path — success, extraction failure, timeout — releases it.
//! Sessions are never shared; concurrent scrapes each launch their own.

use std::{sync::Arc, thread::sleep, time::{Duration, Instant}};

use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::debug;

use crate::error::AppError;

use super::extract;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct BrowserSession {
    tab: Arc<Tab>,
    _browser: Browser,
}

impl BrowserSession {
    /// Launches a headless browser and navigates to `url`.
    pub fn open(url: &str, navigation_timeout: Duration) -> Result<Self, AppError> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .build()
            .map_err(|e| AppError::Browser(format!("bad launch options: {e}")))?;

        let browser =
            Browser::new(options).map_err(|e| AppError::Browser(format!("launch failed: {e}")))?;

        let tab = browser
            .new_tab()
            .map_err(|e| AppError::Browser(format!("failed to open tab: {e}")))?;
        tab.set_default_timeout(navigation_timeout);

        tab.navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| AppError::Browser(format!("navigation to {url} failed: {e}")))?;

        Ok(Self {
            tab,
            _browser: browser,
        })
    }

    /// Clicks the element at `selector`. A missing control means the page
    /// structure changed underneath us.
    pub fn click(&self, selector: &str) -> Result<(), AppError> {
        self.tab
            .find_element(selector)
            .map_err(|e| AppError::Extraction(format!("control '{selector}' not found: {e}")))?
            .click()
            .map_err(|e| AppError::Browser(format!("click on '{selector}' failed: {e}")))?;
        Ok(())
    }

    /// Outer HTML of the element at `selector`; absence signals an upstream
    /// page-structure change.
    pub fn container_html(&self, selector: &str) -> Result<String, AppError> {
        self.tab
            .find_element(selector)
            .map_err(|e| AppError::Extraction(format!("container '{selector}' not found: {e}")))?
            .get_content()
            .map_err(|e| AppError::Browser(format!("failed to read '{selector}': {e}")))
    }

    /// Polls until every container is extractable (menu content or the
    /// closed-hall marker). A container still absent while waiting may just
    /// be rendering, so absence only counts as not-yet-stable; at the
    /// deadline, a container that never appeared means the page structure
    /// changed, while present-but-unstable is a transient timeout.
    pub fn wait_until_stable(
        &self,
        selectors: &[&str],
        timeout: Duration,
    ) -> Result<(), AppError> {
        let deadline = Instant::now() + timeout;

        loop {
            let mut all_stable = true;
            let mut missing = None;

            for selector in selectors {
                match self.tab.find_element(selector) {
                    Ok(element) => {
                        let html = element.get_content().map_err(|e| {
                            AppError::Browser(format!("failed to read '{selector}': {e}"))
                        })?;
                        if !extract::is_stable(&html) {
                            all_stable = false;
                        }
                    }
                    Err(_) => {
                        all_stable = false;
                        missing = Some(*selector);
                    }
                }
            }

            if all_stable {
                return Ok(());
            }

            if Instant::now() >= deadline {
                debug!("containers not stable after {timeout:?}");
                return Err(match missing {
                    Some(selector) => {
                        AppError::Extraction(format!("container '{selector}' absent from page"))
                    }
                    None => AppError::MenuLoadTimeout,
                });
            }

            sleep(POLL_INTERVAL);
        }
    }
}
