//! Primary entry form: fill one row, submit, reset on failure

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dictionary::DictionaryLookup;
use crate::errors::EngineError;
use crate::fields::FieldDispatcher;
use crate::page::Page;
use crate::types::{FormOutcome, RowRecord};

/// Where the controller is within one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormState {
    Idle,
    Filling,
    Submitting,
    Success,
    Reset,
}

pub struct FormController<'a, P: Page, D: DictionaryLookup> {
    page: &'a P,
    config: &'a Config,
    dispatcher: FieldDispatcher<'a, P, D>,
}

impl<'a, P: Page, D: DictionaryLookup> FormController<'a, P, D> {
    pub fn new(page: &'a P, dictionary: &'a D, config: &'a Config) -> Self {
        FormController {
            page,
            config,
            dispatcher: FieldDispatcher::new(page, dictionary, config),
        }
    }

    /// Fill and submit one row
    pub async fn process(&self, row: &RowRecord) -> FormOutcome {
        let mut state = FormState::Idle;

        advance(&mut state, FormState::Filling);
        if let Err(e) = self.fill_all(row).await {
            advance(&mut state, FormState::Reset);
            return self.reset(e).await;
        }

        advance(&mut state, FormState::Submitting);
        if let Err(e) = self.submit().await {
            advance(&mut state, FormState::Reset);
            return self.reset(e).await;
        }

        advance(&mut state, FormState::Success);
        FormOutcome::success()
    }

    /// Fill every column in row order, stopping at the first failure
    pub async fn fill_all(&self, row: &RowRecord) -> Result<(), EngineError> {
        info!("Filling form with {} column(s)", row.len());
        for (key, value) in row.iter() {
            self.dispatcher.fill(key, value).await?;
        }
        info!("Form filled");
        Ok(())
    }

    async fn submit(&self) -> Result<(), EngineError> {
        let timings = &self.config.timings;
        let button = self
            .page
            .wait_for(&self.config.controls.submit.query(), timings.element_timeout())
            .await
            .map_err(|e| e.for_field("submit"))?;
        self.page
            .click(&button)
            .await
            .map_err(|e| e.for_field("submit"))?;

        match self.page.try_absorb_dialog(timings.dialog_window()).await {
            Some(text) => info!("Submit confirmed: {}", text),
            None => debug!("No confirmation dialog after submit"),
        }

        tokio::time::sleep(timings.post_submit_wait()).await;
        info!("Form submitted");
        Ok(())
    }

    /// Best-effort reset; its own failure is only logged
    async fn reset(&self, cause: EngineError) -> FormOutcome {
        error!("Row failed: {}", cause);

        if let Some(reset) = &self.config.controls.reset {
            let attempt = async {
                let button = self
                    .page
                    .wait_for(&reset.query(), self.config.timings.element_timeout())
                    .await?;
                self.page.click(&button).await
            };
            match attempt.await {
                Ok(()) => info!("Form reset"),
                Err(e) => warn!("Could not reset form: {}", e),
            }
            // Some portals confirm a reset too
            self.page
                .try_absorb_dialog(self.config.timings.dialog_window())
                .await;
        }

        FormOutcome::failure(cause.to_string())
    }
}

fn advance(state: &mut FormState, next: FormState) {
    debug!("Form state {:?} -> {:?}", state, next);
    *state = next;
}
