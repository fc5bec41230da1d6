//! Run configuration loaded from a JSON file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::antibiotic;
use crate::fields::{DIAGNOSIS_KEY, MAX_DIAGNOSES};
use crate::locator::{LocatorSpec, LocatorStrategy};
use crate::normalize::Normalizer;
use crate::types::{FieldSpec, RowRecord, normalize_key};
use crate::webdriver::{BrowserType, ViewportSize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default)]
    pub login: LoginConfig,
    /// Opened directly when login is disabled
    #[serde(default)]
    pub website_url: Option<String>,
    /// Steps run after login to reach the entry form (month selection etc.)
    #[serde(default)]
    pub navigation: Vec<NavStep>,
    #[serde(default)]
    pub data: DataConfig,
    pub form_elements: HashMap<String, FieldSpec>,
    /// Spreadsheet header to logical field name
    #[serde(default)]
    pub field_aliases: HashMap<String, String>,
    pub controls: Controls,
    #[serde(default)]
    pub dictionary: DictionaryConfig,
    #[serde(default)]
    pub normalizer: Normalizer,
    #[serde(default)]
    pub antibiotic: AntibioticConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub browser: BrowserType,
    /// Defaults to the standard port of the chosen driver
    pub webdriver_url: Option<String>,
    pub headless: bool,
    pub window_size: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        BrowserSettings {
            browser: BrowserType::Chrome,
            webdriver_url: None,
            headless: false,
            window_size: Some("1920,1080".to_string()),
        }
    }
}

impl BrowserSettings {
    pub fn webdriver_url(&self) -> &str {
        self.webdriver_url
            .as_deref()
            .unwrap_or(self.browser.default_webdriver_url())
    }

    pub fn window(&self) -> Result<Option<ViewportSize>> {
        self.window_size.as_deref().map(ViewportSize::parse).transpose()
    }
}

/// Wait budgets and pacing delays, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Budget for locating any element
    pub element_timeout_ms: u64,
    /// Pause after every field fill so the page's handlers keep up
    pub pacing_ms: u64,
    /// How long to watch for a confirmation dialog after a submit/save
    pub dialog_window_ms: u64,
    /// Settle time after the primary submit
    pub post_submit_wait_ms: u64,
    /// Wait before re-checking a disabled detail trigger
    pub disabled_retry_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            element_timeout_ms: 30_000,
            pacing_ms: 500,
            dialog_window_ms: 2_000,
            post_submit_wait_ms: 2_000,
            disabled_retry_ms: 1_000,
        }
    }
}

impl Timings {
    /// No pacing at all; for driving mock pages
    pub fn immediate() -> Self {
        Timings {
            element_timeout_ms: 50,
            pacing_ms: 0,
            dialog_window_ms: 0,
            post_submit_wait_ms: 0,
            disabled_retry_ms: 0,
        }
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn dialog_window(&self) -> Duration {
        Duration::from_millis(self.dialog_window_ms)
    }

    pub fn post_submit_wait(&self) -> Duration {
        Duration::from_millis(self.post_submit_wait_ms)
    }

    pub fn disabled_retry(&self) -> Duration {
        Duration::from_millis(self.disabled_retry_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub enabled: bool,
    pub login_url: String,
    pub username: String,
    pub password: String,
    pub elements: LoginElements,
    pub success_indicator: SuccessIndicator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginElements {
    pub username_field: LocatorSpec,
    pub password_field: LocatorSpec,
    pub login_button: LocatorSpec,
}

impl Default for LoginElements {
    fn default() -> Self {
        LoginElements {
            username_field: LocatorSpec::new(LocatorStrategy::Id, "username"),
            password_field: LocatorSpec::new(LocatorStrategy::Id, "password"),
            login_button: LocatorSpec::new(LocatorStrategy::Id, "login"),
        }
    }
}

/// How a successful login is recognized
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuccessIndicator {
    UrlContains {
        value: String,
    },
    ElementExists {
        #[serde(default)]
        locator: LocatorStrategy,
        value: String,
    },
    /// No check configured, or a type this build does not know
    #[default]
    #[serde(other)]
    Unchecked,
}

/// One step of the post-login workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NavStep {
    Goto {
        url: String,
    },
    Click {
        #[serde(default)]
        locator: LocatorStrategy,
        value: String,
    },
    Fill {
        #[serde(default)]
        locator: LocatorStrategy,
        value: String,
        text: String,
    },
    Select {
        #[serde(default)]
        locator: LocatorStrategy,
        value: String,
        option: String,
    },
    Wait {
        ms: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub input_file: Option<PathBuf>,
    /// Worksheet to read from a workbook; the first sheet when unset
    pub sheet_name: Option<String>,
    /// May contain a `{timestamp}` placeholder
    pub output_file: String,
    pub refresh_between_rows: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            input_file: None,
            sheet_name: None,
            output_file: "output/results_{timestamp}.csv".to_string(),
            refresh_between_rows: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Controls {
    pub submit: LocatorSpec,
    #[serde(default)]
    pub reset: Option<LocatorSpec>,
}

/// Remote dictionary search endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    pub endpoint: String,
    /// Browser cookie forwarded to authenticate the lookup
    pub cookie_name: String,
    pub timeout_ms: u64,
    pub diagnosis: DictionaryTable,
    pub drug: DictionaryTable,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        DictionaryConfig {
            endpoint: String::new(),
            cookie_name: "JSESSIONID".to_string(),
            timeout_ms: 10_000,
            diagnosis: DictionaryTable::new("dict_diag"),
            drug: DictionaryTable::new("dict_drug")
                .with_extra("spec", "spec")
                .with_extra("id", "id"),
        }
    }
}

impl DictionaryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Form fields sent for one dictionary table and the JSON fields read back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryTable {
    pub table: String,
    #[serde(default = "default_search_field")]
    pub search_field: String,
    #[serde(default = "default_order_field")]
    pub order_field: String,
    #[serde(default = "default_name_field")]
    pub name_field: String,
    #[serde(default = "default_code_field")]
    pub code_field: String,
    /// Extra match key to JSON field
    #[serde(default)]
    pub extra_fields: HashMap<String, String>,
}

fn default_search_field() -> String {
    "szimu".to_string()
}

fn default_order_field() -> String {
    "code".to_string()
}

fn default_name_field() -> String {
    "name".to_string()
}

fn default_code_field() -> String {
    "code".to_string()
}

impl DictionaryTable {
    pub fn new(table: &str) -> Self {
        DictionaryTable {
            table: table.to_string(),
            search_field: default_search_field(),
            order_field: default_order_field(),
            name_field: default_name_field(),
            code_field: default_code_field(),
            extra_fields: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, json_field: &str) -> Self {
        self.extra_fields
            .insert(key.to_string(), json_field.to_string());
        self
    }
}

/// Antibiotic disclosure sub-form settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AntibioticConfig {
    pub enabled: bool,
    /// `id` of the table listing submitted records
    pub result_table_id: String,
    pub wait_after_submit_ms: u64,
    /// Term every antibiotic column header contains
    pub domain_term: String,
    /// Radio values of the present/absent selector in a result row
    pub present_value: String,
    pub absent_value: String,
    /// CSS, relative to the result row
    pub indicator_selector: String,
    /// CSS, relative to the result row
    pub detail_trigger: String,
    pub detail: DetailConfig,
}

impl Default for AntibioticConfig {
    fn default() -> Self {
        AntibioticConfig {
            enabled: false,
            result_table_id: "resultTable".to_string(),
            wait_after_submit_ms: 2_000,
            domain_term: "抗菌".to_string(),
            present_value: "1".to_string(),
            absent_value: "0".to_string(),
            indicator_selector: "input[type=\"radio\"]".to_string(),
            detail_trigger: "input[type=\"button\"], button".to_string(),
            detail: DetailConfig::default(),
        }
    }
}

impl AntibioticConfig {
    pub fn wait_after_submit(&self) -> Duration {
        Duration::from_millis(self.wait_after_submit_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailConfig {
    pub wait_after_click_ms: u64,
    /// Element whose presence means the detail form is open
    pub marker: LocatorSpec,
    pub fields: DetailFields,
    pub save: LocatorSpec,
    /// Tried in order after saving
    pub return_controls: Vec<LocatorSpec>,
}

impl Default for DetailConfig {
    fn default() -> Self {
        DetailConfig {
            wait_after_click_ms: 1_500,
            marker: LocatorSpec::new(LocatorStrategy::Id, "drugDetailForm"),
            fields: DetailFields::default(),
            save: LocatorSpec::new(LocatorStrategy::Id, "btnSave"),
            return_controls: vec![
                LocatorSpec::new(LocatorStrategy::LinkText, "返回"),
                LocatorSpec::css("input[value=\"返回\"]"),
            ],
        }
    }
}

impl DetailConfig {
    pub fn wait_after_click(&self) -> Duration {
        Duration::from_millis(self.wait_after_click_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailFields {
    pub drug_name: LocatorSpec,
    pub drug_id: LocatorSpec,
    pub drug_spec: LocatorSpec,
    pub total_quantity: LocatorSpec,
    pub total_unit: LocatorSpec,
    pub dose_value: LocatorSpec,
    pub dose_unit: LocatorSpec,
    pub frequency: LocatorSpec,
    pub route: LocatorSpec,
}

impl Default for DetailFields {
    fn default() -> Self {
        let id = |v: &str| LocatorSpec::new(LocatorStrategy::Id, v);
        DetailFields {
            drug_name: id("drug_name"),
            drug_id: id("drug_id"),
            drug_spec: id("drug_spec"),
            total_quantity: id("total_quantity"),
            total_unit: id("total_unit"),
            dose_value: id("dose_value"),
            dose_unit: id("dose_unit"),
            frequency: id("frequency"),
            route: id("route"),
        }
    }
}

impl DetailFields {
    fn all(&self) -> [(&'static str, &LocatorSpec); 9] {
        [
            ("drug_name", &self.drug_name),
            ("drug_id", &self.drug_id),
            ("drug_spec", &self.drug_spec),
            ("total_quantity", &self.total_quantity),
            ("total_unit", &self.total_unit),
            ("dose_value", &self.dose_value),
            ("dose_unit", &self.dose_unit),
            ("frequency", &self.frequency),
            ("route", &self.route),
        ]
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!(
            "Loaded {} form elements from {}",
            config.form_elements.len(),
            path.display()
        );
        Ok(config)
    }

    /// Logical field name for a spreadsheet header
    pub fn logical_name(&self, key: &str) -> String {
        let key = normalize_key(key);
        self.field_aliases
            .iter()
            .find(|(header, _)| normalize_key(header) == key)
            .map(|(_, name)| name.clone())
            .unwrap_or(key)
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.form_elements.get(name).or_else(|| {
            let wanted = normalize_key(name);
            self.form_elements
                .iter()
                .find(|(k, _)| normalize_key(k) == wanted)
                .map(|(_, spec)| spec)
        })
    }

    /// Problems a careful operator would want to fix before a run
    ///
    /// Unknown locator strategies still resolve (as ids) at run time; with
    /// `--strict` the CLI refuses to start while any issue is reported.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let mut check = |what: String, strategy: &LocatorStrategy| {
            if let LocatorStrategy::Unknown(name) = strategy {
                issues.push(format!(
                    "{}: unknown locator strategy '{}' (will be looked up by id)",
                    what, name
                ));
            }
        };

        let mut names: Vec<&String> = self.form_elements.keys().collect();
        names.sort();
        for name in names {
            check(
                format!("form_elements.{}", name),
                &self.form_elements[name].locator,
            );
        }
        check("controls.submit".into(), &self.controls.submit.locator);
        if let Some(reset) = &self.controls.reset {
            check("controls.reset".into(), &reset.locator);
        }
        for step in &self.navigation {
            match step {
                NavStep::Click { locator, .. }
                | NavStep::Fill { locator, .. }
                | NavStep::Select { locator, .. } => check("navigation".into(), locator),
                NavStep::Goto { .. } | NavStep::Wait { .. } => {}
            }
        }
        if self.antibiotic.enabled {
            let detail = &self.antibiotic.detail;
            check("antibiotic.detail.marker".into(), &detail.marker.locator);
            check("antibiotic.detail.save".into(), &detail.save.locator);
            for (name, spec) in detail.fields.all() {
                check(format!("antibiotic.detail.fields.{}", name), &spec.locator);
            }
            for spec in &detail.return_controls {
                check("antibiotic.detail.return_controls".into(), &spec.locator);
            }
        }

        for slot in 1..=MAX_DIAGNOSES {
            let name = format!("{}{}_name", DIAGNOSIS_KEY, slot);
            let code = format!("{}{}_code", DIAGNOSIS_KEY, slot);
            match (self.field_spec(&name), self.field_spec(&code)) {
                (Some(_), None) => issues.push(format!("form_elements.{}: missing", code)),
                (None, Some(_)) => issues.push(format!("form_elements.{}: missing", name)),
                _ => {}
            }
        }

        if self.controls.submit.value.trim().is_empty() {
            issues.push("controls.submit: locator value is empty".to_string());
        }

        let needs_dictionary = self.antibiotic.enabled
            || self
                .form_elements
                .keys()
                .any(|k| k.starts_with(DIAGNOSIS_KEY));
        if needs_dictionary {
            if self.dictionary.endpoint.trim().is_empty() {
                issues.push("dictionary.endpoint: not set but lookups are needed".to_string());
            } else if let Err(e) = url::Url::parse(&self.dictionary.endpoint) {
                issues.push(format!("dictionary.endpoint: {}", e));
            }
        }

        if self.antibiotic.enabled && self.antibiotic.result_table_id.trim().is_empty() {
            issues.push("antibiotic.result_table_id: empty".to_string());
        }

        if self.login.enabled
            && (self.login.username.is_empty() || self.login.password.is_empty())
        {
            issues.push("login: username and password are required".to_string());
        }

        issues
    }

    /// Row columns that have no field spec and will be skipped
    pub fn check_row_keys(&self, row: &RowRecord) -> Vec<String> {
        row.keys()
            .filter(|key| {
                let name = self.logical_name(key);
                name != DIAGNOSIS_KEY
                    && !antibiotic::is_antibiotic_column(key, &self.antibiotic.domain_term)
                    && self.field_spec(&name).is_none()
            })
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
