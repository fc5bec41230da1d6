//! Antibiotic disclosure sub-form
//!
//! After a record is submitted the portal lists it in a results table with a
//! present/absent selector. "Present" opens a detail form describing the
//! drug. A failure here never retracts the submitted record.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{AntibioticConfig, Config};
use crate::dictionary::DictionaryLookup;
use crate::dosage::{self, DosageBreakdown};
use crate::errors::EngineError;
use crate::fields::{is_absent, is_present};
use crate::locator::{ElementQuery, LocatorSpec};
use crate::normalize::CodeCategory;
use crate::page::Page;
use crate::types::{AntibioticOutcome, FieldKind, FieldSpec, RowRecord, normalize_key};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const RETURN_CONTROL_TIMEOUT: Duration = Duration::from_secs(3);

/// Row value of the present/absent column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Present,
    Absent,
}

/// Where the sub-form controller is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubFormState {
    LocatingResultRow,
    TogglingIndicator,
    OpeningDetail,
    FillingDetail,
    Saving,
    Returning,
    Done,
}

/// Substring rules for detail columns, checked against whitespace-free headers
fn is_drug_name_key(key: &str) -> bool {
    key.contains('药') && key.contains('名')
}

fn is_spec_key(key: &str) -> bool {
    key.contains("规格")
}

fn is_instruction_key(key: &str) -> bool {
    key.contains("用法") && !key.contains("途径")
}

fn is_amount_key(key: &str) -> bool {
    (key.contains("用量") || key.contains("剂量") || key.contains("单次")) && !key.contains("用法")
}

fn is_route_key(key: &str) -> bool {
    key.contains("途径") || key.contains("给药方式")
}

fn is_quantity_key(key: &str) -> bool {
    (key.contains("数量") || key.contains("总量")) && !key.contains("品种")
}

fn is_indicator_key(key: &str, domain_term: &str) -> bool {
    key.contains(domain_term) && (key.contains('有') || key.contains('无'))
}

/// Whether a column feeds the sub-form rather than the primary form
pub fn is_antibiotic_column(key: &str, domain_term: &str) -> bool {
    let key = normalize_key(key);
    key.contains(domain_term)
        || is_drug_name_key(&key)
        || is_spec_key(&key)
        || is_instruction_key(&key)
        || is_amount_key(&key)
        || is_route_key(&key)
        || is_quantity_key(&key)
}

/// Read the present/absent indicator, if the row carries one
pub fn find_indicator(row: &RowRecord, domain_term: &str) -> Option<Indicator> {
    let value = row.find_value(|key| is_indicator_key(key, domain_term))?;
    if is_present(value) {
        Some(Indicator::Present)
    } else if is_absent(value) {
        Some(Indicator::Absent)
    } else {
        warn!("Unrecognized antibiotic indicator value: {}", value);
        None
    }
}

/// Detail values pulled from a row by fuzzy header matching
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailColumns {
    pub drug_name: Option<String>,
    pub spec: Option<String>,
    pub amount: Option<String>,
    pub instruction: Option<String>,
    pub route: Option<String>,
    pub quantity: Option<String>,
}

impl DetailColumns {
    pub fn extract(row: &RowRecord, domain_term: &str) -> Self {
        let pick = |rule: fn(&str) -> bool| {
            row.find_value(|key| rule(key) && !is_indicator_key(key, domain_term))
                .map(str::to_string)
        };

        DetailColumns {
            drug_name: pick(is_drug_name_key),
            spec: pick(is_spec_key),
            amount: pick(is_amount_key),
            instruction: pick(is_instruction_key),
            route: pick(is_route_key),
            quantity: pick(is_quantity_key),
        }
    }

    /// Per-dose breakdown: the instruction first, the amount cell for gaps
    pub fn dosage(&self) -> DosageBreakdown {
        let mut breakdown = dosage::parse(self.instruction.as_deref().unwrap_or(""));
        if let Some(amount) = &self.amount {
            let from_amount = dosage::parse(amount);
            if !breakdown.has_dose() {
                breakdown.dose_value = from_amount.dose_value;
                breakdown.dose_unit = from_amount.dose_unit;
            }
            if breakdown.frequency.is_empty() {
                breakdown.frequency = from_amount.frequency;
            }
        }
        breakdown
    }

    /// Total quantity and unit; an explicit quantity cell wins over the dose
    pub fn total(&self, per_dose: &DosageBreakdown) -> (String, String) {
        if let Some((value, unit)) = self.quantity.as_deref().and_then(dosage::parse_quantity) {
            let unit = if unit.is_empty() {
                per_dose.dose_unit.clone()
            } else {
                unit
            };
            return (value, unit);
        }
        (per_dose.dose_value.clone(), per_dose.dose_unit.clone())
    }
}

pub struct AntibioticController<'a, P: Page, D: DictionaryLookup> {
    page: &'a P,
    dictionary: &'a D,
    config: &'a Config,
}

impl<'a, P: Page, D: DictionaryLookup> AntibioticController<'a, P, D> {
    pub fn new(page: &'a P, dictionary: &'a D, config: &'a Config) -> Self {
        AntibioticController {
            page,
            dictionary,
            config,
        }
    }

    fn settings(&self) -> &AntibioticConfig {
        &self.config.antibiotic
    }

    /// Reconcile the sub-form for a row whose primary form was just submitted
    pub async fn process(&self, row: &RowRecord) -> AntibioticOutcome {
        if !self.settings().enabled {
            return AntibioticOutcome::NotRequired;
        }
        let Some(indicator) = find_indicator(row, &self.settings().domain_term) else {
            debug!("Row has no antibiotic indicator");
            return AntibioticOutcome::NotRequired;
        };

        info!("Antibiotic indicator: {:?}", indicator);
        match self.run(row, indicator).await {
            Ok(()) => AntibioticOutcome::Completed,
            Err(e) => {
                warn!("Antibiotic sub-form failed: {}", e);
                AntibioticOutcome::Failed(e.to_string())
            }
        }
    }

    async fn run(&self, row: &RowRecord, indicator: Indicator) -> Result<(), EngineError> {
        let mut state = SubFormState::LocatingResultRow;
        tokio::time::sleep(self.settings().wait_after_submit()).await;
        let result_row = self.locate_result_row().await?;

        advance(&mut state, SubFormState::TogglingIndicator);
        self.toggle_indicator(&result_row, indicator).await?;
        if indicator == Indicator::Absent {
            advance(&mut state, SubFormState::Done);
            return Ok(());
        }

        advance(&mut state, SubFormState::OpeningDetail);
        self.open_detail(&result_row).await?;

        advance(&mut state, SubFormState::FillingDetail);
        self.fill_detail(row).await?;

        advance(&mut state, SubFormState::Saving);
        self.save().await?;

        advance(&mut state, SubFormState::Returning);
        self.return_to_list().await;

        advance(&mut state, SubFormState::Done);
        Ok(())
    }

    /// First data row of the results table that carries an id
    ///
    /// The table re-renders right after a submit, so lookup errors during a
    /// poll count as "not there yet". The last one is reported on timeout.
    async fn locate_result_row(&self) -> Result<P::Element, EngineError> {
        let timeout = self.config.timings.element_timeout();
        let deadline = Instant::now() + timeout;
        let mut last_error = None;

        loop {
            match self.scan_result_table().await {
                Ok(Some(row)) => return Ok(row),
                Ok(None) => {}
                Err(e) => {
                    debug!("Results table not readable yet: {}", e);
                    last_error = Some(e);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let mut what = format!("result row in #{}", self.settings().result_table_id);
                if let Some(e) = last_error {
                    what = format!("{} (last error: {})", what, e);
                }
                return Err(EngineError::Timeout {
                    what,
                    after: timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn scan_result_table(&self) -> Result<Option<P::Element>, EngineError> {
        let table = ElementQuery::Id(self.settings().result_table_id.clone());
        let rows = ElementQuery::Css("tr".to_string());
        let header_cells = ElementQuery::Css("th".to_string());

        let Some(table) = self.page.find_all(&table).await?.into_iter().next() else {
            return Ok(None);
        };
        for tr in self.page.find_all_in(&table, &rows).await? {
            if !self.page.find_all_in(&tr, &header_cells).await?.is_empty() {
                continue;
            }
            let id = self.page.attr(&tr, "id").await?.unwrap_or_default();
            if !id.trim().is_empty() {
                debug!("Located result row {}", id);
                return Ok(Some(tr));
            }
        }
        Ok(None)
    }

    async fn toggle_indicator(
        &self,
        result_row: &P::Element,
        indicator: Indicator,
    ) -> Result<(), EngineError> {
        let settings = self.settings();
        let wanted = match indicator {
            Indicator::Present => &settings.present_value,
            Indicator::Absent => &settings.absent_value,
        };
        let selector = ElementQuery::Css(settings.indicator_selector.clone());

        for input in self.page.find_all_in(result_row, &selector).await? {
            let value = self.page.attr(&input, "value").await?.unwrap_or_default();
            if value != *wanted {
                continue;
            }
            if !self.page.is_selected(&input).await? {
                self.page
                    .click(&input)
                    .await
                    .map_err(|e| e.for_field("antibiotic indicator"))?;
            }
            info!("Antibiotic indicator set to {:?}", indicator);
            return Ok(());
        }

        Err(EngineError::not_found(
            "antibiotic indicator",
            format!("{}[value=\"{}\"]", settings.indicator_selector, wanted),
        ))
    }

    async fn open_detail(&self, result_row: &P::Element) -> Result<(), EngineError> {
        let settings = self.settings();
        let trigger_query = ElementQuery::Css(settings.detail_trigger.clone());

        let mut trigger = self.find_trigger(result_row, &trigger_query).await?;
        if !self.page.is_enabled(&trigger).await? {
            debug!("Detail trigger disabled, retrying once");
            tokio::time::sleep(self.config.timings.disabled_retry()).await;
            trigger = self.find_trigger(result_row, &trigger_query).await?;
            if !self.page.is_enabled(&trigger).await? {
                return Err(EngineError::interaction(
                    "detail trigger",
                    "still disabled after retry",
                ));
            }
        }

        self.page
            .click(&trigger)
            .await
            .map_err(|e| e.for_field("detail trigger"))?;
        tokio::time::sleep(settings.detail.wait_after_click()).await;

        self.page
            .wait_for(&settings.detail.marker.query(), self.config.timings.element_timeout())
            .await
            .map_err(|e| e.for_field("detail form"))?;
        info!("Detail form open");
        Ok(())
    }

    async fn find_trigger(
        &self,
        result_row: &P::Element,
        query: &ElementQuery,
    ) -> Result<P::Element, EngineError> {
        self.page
            .find_all_in(result_row, query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::not_found("detail trigger", query))
    }

    async fn fill_detail(&self, row: &RowRecord) -> Result<(), EngineError> {
        let settings = self.settings();
        let fields = &settings.detail.fields;
        let columns = DetailColumns::extract(row, &settings.domain_term);

        let drug_name = columns
            .drug_name
            .clone()
            .ok_or_else(|| EngineError::InvalidValue {
                field: "drug_name".to_string(),
                value: String::new(),
            })?;

        let session = self.page.cookie(&self.config.dictionary.cookie_name).await;
        match self.dictionary.lookup_drug(&drug_name, session.as_ref()).await {
            Some(found) => {
                self.assign(&fields.drug_name, "drug_name", &found.name).await?;
                self.assign(&fields.drug_id, "drug_id", found.extra("id")).await?;
                let spec = match found.extra("spec") {
                    "" => columns.spec.as_deref().unwrap_or(""),
                    spec => spec,
                };
                self.assign(&fields.drug_spec, "drug_spec", spec).await?;
            }
            None => {
                warn!("Drug '{}' not in dictionary, using the raw name", drug_name);
                self.assign(&fields.drug_name, "drug_name", &drug_name).await?;
                if let Some(spec) = &columns.spec {
                    self.assign(&fields.drug_spec, "drug_spec", spec).await?;
                }
            }
        }

        let per_dose = columns.dosage();
        let (total_value, total_unit) = columns.total(&per_dose);
        debug!(
            "Dosage {:?}, total {} {}, route {:?}",
            per_dose, total_value, total_unit, columns.route
        );

        let normalizer = &self.config.normalizer;
        self.type_text(&fields.total_quantity, "total_quantity", &total_value)
            .await?;
        self.select(
            &fields.total_unit,
            "total_unit",
            &normalizer.normalize(&total_unit, CodeCategory::Dose),
        )
        .await?;
        self.type_text(&fields.dose_value, "dose_value", &per_dose.dose_value)
            .await?;
        self.select(
            &fields.dose_unit,
            "dose_unit",
            &normalizer.normalize(&per_dose.dose_unit, CodeCategory::Dose),
        )
        .await?;
        self.select(
            &fields.frequency,
            "frequency",
            &normalizer.normalize(&per_dose.frequency, CodeCategory::Frequency),
        )
        .await?;
        self.select(
            &fields.route,
            "route",
            &normalizer.normalize(columns.route.as_deref().unwrap_or(""), CodeCategory::Route),
        )
        .await?;

        info!("Detail form filled for {}", drug_name);
        Ok(())
    }

    async fn save(&self) -> Result<(), EngineError> {
        let detail = &self.settings().detail;
        let button = self
            .page
            .wait_for(&detail.save.query(), self.config.timings.element_timeout())
            .await
            .map_err(|e| e.for_field("detail save"))?;
        self.page
            .click(&button)
            .await
            .map_err(|e| e.for_field("detail save"))?;

        match self
            .page
            .try_absorb_dialog(self.config.timings.dialog_window())
            .await
        {
            Some(text) => info!("Detail save confirmed: {}", text),
            None => debug!("No confirmation dialog after detail save"),
        }
        Ok(())
    }

    /// The portal sometimes returns on its own, so a missing control is fine
    async fn return_to_list(&self) {
        let timeout = self
            .config
            .timings
            .element_timeout()
            .min(RETURN_CONTROL_TIMEOUT);

        for control in &self.settings().detail.return_controls {
            let query = control.query();
            let clicked = match self.page.wait_for(&query, timeout).await {
                Ok(button) => self.page.click(&button).await,
                Err(e) => Err(e),
            };
            match clicked {
                Ok(()) => {
                    info!("Returned to list via {}", query);
                    return;
                }
                Err(e) => debug!("Return control {} unavailable: {}", query, e),
            }
        }
        info!("No return control found; assuming the portal returned to the list");
    }

    async fn assign(
        &self,
        locator: &LocatorSpec,
        name: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        let spec =
            FieldSpec::new(FieldKind::Text, locator.locator.clone(), &locator.value).direct();
        self.apply(name, value, &spec).await
    }

    async fn type_text(
        &self,
        locator: &LocatorSpec,
        name: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        if value.is_empty() {
            debug!("No value for {}", name);
            return Ok(());
        }
        let spec = FieldSpec::new(FieldKind::Text, locator.locator.clone(), &locator.value);
        self.apply(name, value, &spec).await
    }

    async fn select(
        &self,
        locator: &LocatorSpec,
        name: &str,
        code: &str,
    ) -> Result<(), EngineError> {
        let spec = FieldSpec::new(FieldKind::Dropdown, locator.locator.clone(), &locator.value);
        self.apply(name, code, &spec).await
    }

    async fn apply(&self, name: &str, value: &str, spec: &FieldSpec) -> Result<(), EngineError> {
        spec.kind
            .fill(self.page, name, value, spec, self.config.timings.element_timeout())
            .await?;
        tokio::time::sleep(self.config.timings.pacing()).await;
        Ok(())
    }
}

fn advance(state: &mut SubFormState, next: SubFormState) {
    debug!("Antibiotic state {:?} -> {:?}", state, next);
    *state = next;
}

#[cfg(test)]
#[path = "antibiotic_test.rs"]
mod antibiotic_test;
