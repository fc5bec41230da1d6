use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator, elements::Element};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::EngineError;
use crate::locator::ElementQuery;
use crate::page::{Page, SessionCookie};

/// Script that assigns a value without letting the portal's focus handlers
/// fire their auto-lookup popups
const SET_VALUE_SCRIPT: &str = r#"
    var el = arguments[0];
    el.onfocus = null;
    el.onblur = null;
    el.removeAttribute('onfocus');
    el.removeAttribute('onblur');
    el.value = arguments[1];
    return el.value;
"#;

/// Supported browser types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    /// Mozilla Firefox
    Firefox,
    /// Google Chrome/Chromium
    #[default]
    #[serde(alias = "chromium")]
    Chrome,
}

impl std::str::FromStr for BrowserType {
    type Err = anyhow::Error;

    /// Parse browser type from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "firefox" => Ok(BrowserType::Firefox),
            "chrome" | "chromium" => Ok(BrowserType::Chrome),
            _ => anyhow::bail!("Unsupported browser: {}", s),
        }
    }
}

impl BrowserType {
    /// Default WebDriver URL for this browser type
    pub fn default_webdriver_url(&self) -> &'static str {
        match self {
            BrowserType::Firefox => "http://localhost:4444",
            BrowserType::Chrome => "http://localhost:9515",
        }
    }
}

/// Browser window dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    /// Parse from "WIDTHxHEIGHT" or "WIDTH,HEIGHT" (e.g. "1920x1080")
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(['x', ',']).collect();
        if parts.len() != 2 {
            anyhow::bail!("Invalid window size format. Use WIDTHxHEIGHT (e.g., 1920x1080)");
        }

        let width = parts[0]
            .trim()
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid width in window size"))?;
        let height = parts[1]
            .trim()
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid height in window size"))?;

        Ok(ViewportSize { width, height })
    }
}

/// Connected WebDriver session
pub struct Browser {
    client: Client,
}

impl Browser {
    /// Open a new session on an already running WebDriver
    ///
    /// # Arguments
    /// * `browser_type` - Firefox or Chrome
    /// * `webdriver_url` - Where geckodriver/chromedriver listens
    /// * `window` - Optional window dimensions
    /// * `headless` - Whether to run in headless mode
    pub async fn connect(
        browser_type: BrowserType,
        webdriver_url: &str,
        window: Option<ViewportSize>,
        headless: bool,
    ) -> Result<Self> {
        info!("Connecting to {:?} WebDriver at {}", browser_type, webdriver_url);

        let mut caps = serde_json::Map::new();

        match &browser_type {
            BrowserType::Firefox => {
                let mut args = Vec::new();

                if headless {
                    args.push("--headless".to_string());
                }

                if let Some(size) = &window {
                    args.push(format!("--width={}", size.width));
                    args.push(format!("--height={}", size.height));
                }

                caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
            }
            BrowserType::Chrome => {
                let mut args = vec![
                    "--no-sandbox".to_string(),
                    "--disable-gpu".to_string(),
                    "--disable-dev-shm-usage".to_string(),
                ];

                if headless {
                    args.push("--headless=new".to_string());
                }

                if let Some(size) = &window {
                    args.push(format!("--window-size={},{}", size.width, size.height));
                }

                caps.insert(
                    "goog:chromeOptions".to_string(),
                    json!({
                        "args": args,
                        "excludeSwitches": ["enable-automation"],
                        "useAutomationExtension": false,
                    }),
                );
            }
        }

        let client = ClientBuilder::rustls()
            .capabilities(caps)
            .connect(webdriver_url)
            .await
            .with_context(|| format!("Failed to connect to WebDriver at {}", webdriver_url))?;

        if let Some(size) = window
            && let Err(e) = client.set_window_size(size.width, size.height).await
        {
            // Window sizing is best-effort
            debug!("Note: Could not set window size: {}", e);
        }

        Ok(Browser { client })
    }

    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

fn map_cmd(err: CmdError, what: &str) -> EngineError {
    if err.is_miss() {
        EngineError::not_found(what, &err)
    } else {
        EngineError::interaction(what, err)
    }
}

#[async_trait]
impl Page for Browser {
    type Element = Element;

    async fn wait_for(
        &self,
        query: &ElementQuery,
        timeout: Duration,
    ) -> Result<Element, EngineError> {
        debug!("Waiting up to {:?} for {}", timeout, query);
        self.client
            .wait()
            .at_most(timeout)
            .for_element(query.as_locator())
            .await
            .map_err(|e| match e {
                CmdError::WaitTimeout => EngineError::Timeout {
                    what: query.to_string(),
                    after: timeout,
                },
                other => map_cmd(other, &query.to_string()),
            })
    }

    async fn find_all(&self, query: &ElementQuery) -> Result<Vec<Element>, EngineError> {
        self.client
            .find_all(query.as_locator())
            .await
            .map_err(|e| map_cmd(e, &query.to_string()))
    }

    async fn find_all_in(
        &self,
        parent: &Element,
        query: &ElementQuery,
    ) -> Result<Vec<Element>, EngineError> {
        parent
            .find_all(query.as_locator())
            .await
            .map_err(|e| map_cmd(e, &query.to_string()))
    }

    async fn clear(&self, element: &Element) -> Result<(), EngineError> {
        element.clear().await.map_err(|e| map_cmd(e, "clear"))
    }

    async fn send_keys(&self, element: &Element, text: &str) -> Result<(), EngineError> {
        element.send_keys(text).await.map_err(|e| map_cmd(e, "type"))
    }

    async fn click(&self, element: &Element) -> Result<(), EngineError> {
        element.click().await.map_err(|e| map_cmd(e, "click"))
    }

    async fn select_by_value(&self, element: &Element, value: &str) -> Result<(), EngineError> {
        element
            .select_by_value(value)
            .await
            .map_err(|e| map_cmd(e, "select"))
    }

    async fn select_by_label(&self, element: &Element, label: &str) -> Result<(), EngineError> {
        let xpath = format!(".//option[normalize-space(.)={}]", xpath_text(label));
        let option = element
            .find(Locator::XPath(&xpath))
            .await
            .map_err(|e| map_cmd(e, "select"))?;
        option.click().await.map_err(|e| map_cmd(e, "select"))
    }

    async fn is_selected(&self, element: &Element) -> Result<bool, EngineError> {
        element.is_selected().await.map_err(|e| map_cmd(e, "is_selected"))
    }

    async fn is_enabled(&self, element: &Element) -> Result<bool, EngineError> {
        element.is_enabled().await.map_err(|e| map_cmd(e, "is_enabled"))
    }

    async fn attr(&self, element: &Element, name: &str) -> Result<Option<String>, EngineError> {
        element.attr(name).await.map_err(|e| map_cmd(e, name))
    }

    async fn set_value_direct(&self, element: &Element, value: &str) -> Result<(), EngineError> {
        let target = serde_json::to_value(element)
            .map_err(|e| EngineError::interaction("set_value", e))?;
        self.client
            .execute(SET_VALUE_SCRIPT, vec![target, json!(value)])
            .await
            .map(|_| ())
            .map_err(|e| map_cmd(e, "set_value"))
    }

    async fn try_absorb_dialog(&self, window: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            if let Ok(text) = self.client.get_alert_text().await {
                match self.client.accept_alert().await {
                    Ok(()) => {
                        info!("Accepted dialog: {}", text);
                        return Some(text);
                    }
                    Err(e) => debug!("Dialog vanished before it could be accepted: {}", e),
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn cookie(&self, name: &str) -> Option<SessionCookie> {
        match self.client.get_named_cookie(name).await {
            Ok(cookie) => Some(SessionCookie {
                name: cookie.name().to_string(),
                value: cookie.value().to_string(),
            }),
            Err(e) => {
                debug!("Cookie {} not available: {}", name, e);
                None
            }
        }
    }

    async fn goto(&self, url: &str) -> Result<(), EngineError> {
        info!("Navigating to {}", url);
        self.client
            .goto(url)
            .await
            .map_err(|e| EngineError::WebDriver(e.to_string()))?;

        // Wait for the page to be ready
        for _ in 0..20 {
            match self
                .client
                .execute("return document.readyState === 'complete';", vec![])
                .await
            {
                Ok(serde_json::Value::Bool(true)) => break,
                _ => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, EngineError> {
        self.client
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(|e| EngineError::WebDriver(e.to_string()))
    }

    async fn refresh(&self) -> Result<(), EngineError> {
        self.client
            .refresh()
            .await
            .map_err(|e| EngineError::WebDriver(e.to_string()))
    }
}

fn xpath_text(value: &str) -> String {
    if value.contains('\'') {
        format!("\"{}\"", value)
    } else {
        format!("'{}'", value)
    }
}
