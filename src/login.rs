//! Login and post-login navigation to the entry form

use anyhow::{Context, Result, bail};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{LoginConfig, NavStep, SuccessIndicator, Timings};
use crate::locator::{LocatorSpec, resolve};
use crate::page::Page;

const PAGE_SETTLE: Duration = Duration::from_secs(2);
const LOGIN_RESPONSE_WAIT: Duration = Duration::from_secs(3);

/// Sign in through the portal's login page and verify the result
pub async fn login<P: Page>(page: &P, config: &LoginConfig, timings: &Timings) -> Result<()> {
    if config.username.is_empty() || config.password.is_empty() {
        bail!("Login configuration is missing the username or password");
    }

    info!("Opening login page: {}", config.login_url);
    page.goto(&config.login_url).await?;
    tokio::time::sleep(PAGE_SETTLE.min(timings.element_timeout())).await;

    let elements = &config.elements;
    type_into(page, &elements.username_field, &config.username, timings)
        .await
        .context("Failed to fill the username")?;
    tokio::time::sleep(timings.pacing()).await;
    type_into(page, &elements.password_field, &config.password, timings)
        .await
        .context("Failed to fill the password")?;
    tokio::time::sleep(timings.pacing()).await;

    let button = page
        .wait_for(&elements.login_button.query(), timings.element_timeout())
        .await
        .context("Login button not found")?;
    page.click(&button).await?;

    info!("Waiting for the login response...");
    tokio::time::sleep(LOGIN_RESPONSE_WAIT.min(timings.element_timeout())).await;

    verify(page, &config.success_indicator, timings).await?;
    info!("Logged in as {}", config.username);
    Ok(())
}

async fn type_into<P: Page>(
    page: &P,
    field: &LocatorSpec,
    text: &str,
    timings: &Timings,
) -> Result<()> {
    let element = page.wait_for(&field.query(), timings.element_timeout()).await?;
    page.clear(&element).await?;
    page.send_keys(&element, text).await?;
    Ok(())
}

async fn verify<P: Page>(page: &P, indicator: &SuccessIndicator, timings: &Timings) -> Result<()> {
    match indicator {
        SuccessIndicator::UrlContains { value } => {
            let url = page.current_url().await?;
            debug!("Current URL after login: {}", url);
            if !url.contains(value.as_str()) {
                bail!("Login check failed: URL {} does not contain '{}'", url, value);
            }
        }
        SuccessIndicator::ElementExists { locator, value } => {
            page.wait_for(&resolve(locator, value), timings.element_timeout())
                .await
                .with_context(|| format!("Login check failed: element '{}' not found", value))?;
        }
        SuccessIndicator::Unchecked => {
            warn!("No login success check configured; assuming the login worked");
        }
    }
    Ok(())
}

/// Run the configured navigation steps in order
pub async fn navigate<P: Page>(page: &P, steps: &[NavStep], timings: &Timings) -> Result<()> {
    for (i, step) in steps.iter().enumerate() {
        debug!("Navigation step {}: {:?}", i + 1, step);
        run_step(page, step, timings)
            .await
            .with_context(|| format!("Navigation step {} failed", i + 1))?;
        tokio::time::sleep(timings.pacing()).await;
    }
    if !steps.is_empty() {
        info!("Reached the entry form after {} navigation step(s)", steps.len());
    }
    Ok(())
}

async fn run_step<P: Page>(page: &P, step: &NavStep, timings: &Timings) -> Result<()> {
    let timeout = timings.element_timeout();
    match step {
        NavStep::Goto { url } => page.goto(url).await?,
        NavStep::Click { locator, value } => {
            let element = page.wait_for(&resolve(locator, value), timeout).await?;
            page.click(&element).await?;
        }
        NavStep::Fill {
            locator,
            value,
            text,
        } => {
            let element = page.wait_for(&resolve(locator, value), timeout).await?;
            page.clear(&element).await?;
            page.send_keys(&element, text).await?;
        }
        NavStep::Select {
            locator,
            value,
            option,
        } => {
            let element = page.wait_for(&resolve(locator, value), timeout).await?;
            if page.select_by_value(&element, option).await.is_err() {
                page.select_by_label(&element, option).await?;
            }
        }
        NavStep::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
    }
    Ok(())
}
