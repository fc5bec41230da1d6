//! Field dispatch: one row column to the right page interaction
//!
//! The generic path is chosen by the field's [`FieldKind`]. A handful of
//! logical fields carry portal-specific rules that run before it.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::antibiotic;
use crate::config::Config;
use crate::dictionary::DictionaryLookup;
use crate::errors::EngineError;
use crate::page::Page;
use crate::types::{FieldKind, FieldSpec};

/// Aggregate column holding up to five comma-separated diagnoses
pub const DIAGNOSIS_KEY: &str = "diagnosis";
pub const MAX_DIAGNOSES: usize = 5;

const DEPARTMENT_QUALIFIERS: &[&str] = &["门诊", "outpatient"];

impl FieldKind {
    /// Perform this kind's interaction for `value`
    pub async fn fill<P: Page>(
        self,
        page: &P,
        name: &str,
        value: &str,
        spec: &FieldSpec,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        self.interact(page, name, value, spec, timeout)
            .await
            .map_err(|e| e.for_field(name))
    }

    async fn interact<P: Page>(
        self,
        page: &P,
        name: &str,
        value: &str,
        spec: &FieldSpec,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        match self {
            FieldKind::Text => {
                let element = page.wait_for(&spec.query(), timeout).await?;
                if spec.direct {
                    page.set_value_direct(&element, value).await?;
                    debug!("Assigned {} = {}", name, value);
                } else {
                    page.clear(&element).await?;
                    page.send_keys(&element, value).await?;
                    debug!("Typed {} = {}", name, value);
                }
            }
            FieldKind::Dropdown => {
                let element = page.wait_for(&spec.query(), timeout).await?;
                if let Err(e) = page.select_by_value(&element, value).await {
                    debug!("No option with value {:?} for {} ({}), trying label", value, name, e);
                    page.select_by_label(&element, value).await?;
                }
                debug!("Selected {} = {}", name, value);
            }
            FieldKind::Radio => {
                let raw = spec.raw_option(value);
                let element = page.wait_for(&spec.query().with_value(raw), timeout).await?;
                if page.is_selected(&element).await? {
                    debug!("Radio {} already set to {}", name, raw);
                } else {
                    page.click(&element).await?;
                    debug!("Checked {} = {} ({})", name, value, raw);
                }
            }
            FieldKind::Button => {
                let element = page.wait_for(&spec.query(), timeout).await?;
                page.click(&element).await?;
                debug!("Clicked {}", name);
            }
            FieldKind::Hidden => {
                debug!("Skipping hidden field {}", name);
            }
        }
        Ok(())
    }
}

/// Fills row columns onto the entry form
pub struct FieldDispatcher<'a, P: Page, D: DictionaryLookup> {
    page: &'a P,
    dictionary: &'a D,
    config: &'a Config,
}

impl<'a, P: Page, D: DictionaryLookup> FieldDispatcher<'a, P, D> {
    pub fn new(page: &'a P, dictionary: &'a D, config: &'a Config) -> Self {
        FieldDispatcher {
            page,
            dictionary,
            config,
        }
    }

    /// Fill one row column
    ///
    /// Blank values are skipped without touching the page. Columns with no
    /// field spec are skipped with a warning.
    pub async fn fill(&self, key: &str, raw: &str) -> Result<(), EngineError> {
        let value = raw.trim();
        let name = self.config.logical_name(key);

        if value.is_empty() {
            debug!("Skipping empty field: {}", name);
            return Ok(());
        }

        match name.as_str() {
            DIAGNOSIS_KEY => self.fill_diagnoses(value).await,
            "age" => self.fill_age(value).await,
            "department" => {
                let cleaned = clean_department(value);
                self.fill_named("department", &cleaned).await
            }
            "drug_variety_count" => {
                let count =
                    coerce_integer(value).ok_or_else(|| EngineError::InvalidValue {
                        field: name.clone(),
                        value: value.to_string(),
                    })?;
                self.fill_named("drug_variety_count", &count).await
            }
            "injectable" => self.fill_injectable(value).await,
            _ => match self.config.field_spec(&name) {
                Some(spec) => self.fill_with(&name, value, spec).await,
                None if self.is_sub_form_column(key) => {
                    debug!("Column {} belongs to the antibiotic sub-form", name);
                    Ok(())
                }
                None => {
                    warn!("No field spec configured for: {}", name);
                    Ok(())
                }
            },
        }
    }

    fn is_sub_form_column(&self, key: &str) -> bool {
        antibiotic::is_antibiotic_column(key, &self.config.antibiotic.domain_term)
    }

    /// Generic fill followed by the pacing delay
    pub async fn fill_with(
        &self,
        name: &str,
        value: &str,
        spec: &FieldSpec,
    ) -> Result<(), EngineError> {
        spec.kind
            .fill(self.page, name, value, spec, self.config.timings.element_timeout())
            .await?;
        tokio::time::sleep(self.config.timings.pacing()).await;
        Ok(())
    }

    async fn fill_named(&self, name: &str, value: &str) -> Result<(), EngineError> {
        let spec = self
            .config
            .field_spec(name)
            .ok_or_else(|| EngineError::Config(format!("no field spec for {}", name)))?;
        self.fill_with(name, value, spec).await
    }

    /// Dictionary-resolved values skip typing so the portal's focus lookup
    /// never fires
    async fn fill_resolved(&self, name: &str, value: &str) -> Result<(), EngineError> {
        let Some(spec) = self.config.field_spec(name) else {
            warn!("No field spec configured for: {}", name);
            return Ok(());
        };
        let mut spec = spec.clone();
        spec.direct = true;
        self.fill_with(name, value, &spec).await
    }

    async fn fill_age(&self, value: &str) -> Result<(), EngineError> {
        let (number, unit) = split_age(value).ok_or_else(|| EngineError::InvalidValue {
            field: "age".to_string(),
            value: value.to_string(),
        })?;

        if let Some(unit) = unit {
            self.fill_named("age_unit", unit).await?;
        }
        self.fill_named("age", number).await
    }

    async fn fill_injectable(&self, value: &str) -> Result<(), EngineError> {
        self.fill_named("injectable", value).await?;

        if is_present(value) {
            if self.config.field_spec("injectable_count").is_some() {
                self.fill_named("injectable_count", "1").await?;
            } else {
                warn!("Injectable present but no injectable_count field configured");
            }
        }
        Ok(())
    }

    async fn fill_diagnoses(&self, value: &str) -> Result<(), EngineError> {
        let terms = split_diagnoses(value);
        info!("Resolving {} diagnosis term(s)", terms.len());

        let session = self.page.cookie(&self.config.dictionary.cookie_name).await;

        for (slot, term) in (1..).zip(terms) {
            let Some(found) = self.dictionary.lookup_diagnosis(term, session.as_ref()).await
            else {
                warn!("Diagnosis '{}' not found in dictionary, slot {} left empty", term, slot);
                continue;
            };

            self.fill_resolved(&format!("diagnosis{}_name", slot), &found.name).await?;
            self.fill_resolved(&format!("diagnosis{}_code", slot), &found.code).await?;
        }
        Ok(())
    }
}

/// Remove whitespace and the outpatient qualifier from a department name
pub fn clean_department(value: &str) -> String {
    let mut cleaned: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    for qualifier in DEPARTMENT_QUALIFIERS {
        while let Some(pos) = cleaned.to_ascii_lowercase().find(qualifier) {
            cleaned.replace_range(pos..pos + qualifier.len(), "");
        }
    }
    cleaned
}

/// Split `"45岁"` into `("45", Some("岁"))`; a bare number has no unit
pub fn split_age(value: &str) -> Option<(&str, Option<&str>)> {
    let value = value.trim();
    let (last_start, last) = value.char_indices().next_back()?;

    if last.is_ascii_digit() {
        return Some((value, None));
    }

    let number = value[..last_start].trim();
    if number.is_empty() {
        return None;
    }
    Some((number, Some(&value[last_start..])))
}

/// Spreadsheet numbers often arrive as `"3.0"`
pub fn coerce_integer(value: &str) -> Option<String> {
    let number: f64 = value.trim().parse().ok()?;
    if !number.is_finite() {
        return None;
    }
    Some((number.trunc() as i64).to_string())
}

/// Split on full-width and half-width commas, keeping at most five terms
pub fn split_diagnoses(value: &str) -> Vec<&str> {
    value
        .split([',', '，'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .take(MAX_DIAGNOSES)
        .collect()
}

/// Whether a yes/no style cell means "present"
pub fn is_present(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "有" | "是" | "yes" | "y" | "true" | "1"
    )
}

/// Whether a yes/no style cell means "absent"
pub fn is_absent(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "无" | "否" | "no" | "n" | "false" | "0"
    )
}

#[cfg(test)]
#[path = "fields_test.rs"]
mod fields_test;
