//! Per-row orchestration of the primary form and the antibiotic sub-form

use chrono::Local;
use tracing::{info, info_span, Instrument};

use crate::antibiotic::AntibioticController;
use crate::config::Config;
use crate::dictionary::DictionaryLookup;
use crate::form::FormController;
use crate::page::Page;
use crate::types::{AntibioticOutcome, RowRecord, RowResult};

pub struct Engine<'a, P: Page, D: DictionaryLookup> {
    form: FormController<'a, P, D>,
    antibiotic: AntibioticController<'a, P, D>,
}

impl<'a, P: Page, D: DictionaryLookup> Engine<'a, P, D> {
    pub fn new(page: &'a P, dictionary: &'a D, config: &'a Config) -> Self {
        Engine {
            form: FormController::new(page, dictionary, config),
            antibiotic: AntibioticController::new(page, dictionary, config),
        }
    }

    /// Run one row through both forms
    ///
    /// The sub-form only runs once the primary form has been submitted.
    pub async fn process_row(&self, index: usize, row: &RowRecord) -> RowResult {
        let span = info_span!("row", index);
        async {
            let outcome = self.form.process(row).await;
            let antibiotic = if outcome.succeeded {
                self.antibiotic.process(row).await
            } else {
                AntibioticOutcome::NotRequired
            };

            info!(
                "Row {} finished: form {}, antibiotic {}",
                index,
                if outcome.succeeded { "ok" } else { "failed" },
                antibiotic.label()
            );

            RowResult {
                index,
                row: row.clone(),
                outcome,
                antibiotic,
                processed_at: Local::now(),
            }
        }
        .instrument(span)
        .await
    }
}
