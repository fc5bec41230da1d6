use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::locator::{ElementQuery, LocatorStrategy, resolve};

/// Interaction used to fill a field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Free text input or textarea
    #[serde(alias = "input", alias = "textarea")]
    Text,
    /// `<select>` element
    #[serde(alias = "select")]
    Dropdown,
    /// Radio button group
    Radio,
    /// Clickable control
    Button,
    /// Present in the data but never touched on the page
    Hidden,
}

/// How one logical field is located and filled
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub locator: LocatorStrategy,
    pub value: String,
    /// Semantic label to raw option value (radio groups)
    #[serde(default)]
    pub options: HashMap<String, String>,
    /// Assign the value through the DOM instead of typing it
    #[serde(default)]
    pub direct: bool,
}

impl FieldSpec {
    pub fn new(kind: FieldKind, locator: LocatorStrategy, value: impl Into<String>) -> Self {
        FieldSpec {
            kind,
            locator,
            value: value.into(),
            options: HashMap::new(),
            direct: false,
        }
    }

    pub fn with_option(mut self, label: &str, raw: &str) -> Self {
        self.options.insert(label.to_string(), raw.to_string());
        self
    }

    pub fn direct(mut self) -> Self {
        self.direct = true;
        self
    }

    pub fn query(&self) -> ElementQuery {
        resolve(&self.locator, &self.value)
    }

    /// Raw option value for a semantic label, or the label itself
    pub fn raw_option<'a>(&'a self, label: &'a str) -> &'a str {
        self.options.get(label).map(String::as_str).unwrap_or(label)
    }
}

/// Remove every whitespace character, including newlines inside headers
pub fn normalize_key(key: &str) -> String {
    key.chars().filter(|c| !c.is_whitespace()).collect()
}

/// One spreadsheet row as ordered `(column, value)` pairs
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRecord {
    entries: Vec<(String, String)>,
}

impl RowRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.push(key, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Value of the column whose normalized key equals `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        let wanted = normalize_key(key);
        self.iter()
            .find(|(k, _)| normalize_key(k) == wanted)
            .map(|(_, v)| v)
    }

    /// First non-empty value whose normalized key satisfies `matches`
    pub fn find_value(&self, matches: impl Fn(&str) -> bool) -> Option<&str> {
        self.iter()
            .find(|(k, v)| matches(&normalize_key(k)) && !v.trim().is_empty())
            .map(|(_, v)| v.trim())
    }
}

impl FromIterator<(String, String)> for RowRecord {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        RowRecord {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Best candidate returned by the dictionary endpoint
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryMatch {
    pub name: String,
    pub code: String,
    /// Drug matches add `spec` and `id`
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl DictionaryMatch {
    pub fn extra(&self, key: &str) -> &str {
        self.extra.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Result of the primary form for one row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormOutcome {
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl FormOutcome {
    pub fn success() -> Self {
        FormOutcome {
            succeeded: true,
            failure_reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        FormOutcome {
            succeeded: false,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Result of the antibiotic sub-form for one row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum AntibioticOutcome {
    /// Disabled, no indicator in the row, or the primary form failed
    NotRequired,
    Completed,
    Failed(String),
}

impl AntibioticOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, AntibioticOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            AntibioticOutcome::NotRequired => "无需处理",
            AntibioticOutcome::Completed => "成功",
            AntibioticOutcome::Failed(_) => "失败",
        }
    }
}

/// Everything the result writer records about one row
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RowResult {
    /// 1-based position in the input
    pub index: usize,
    pub row: RowRecord,
    pub outcome: FormOutcome,
    pub antibiotic: AntibioticOutcome,
    pub processed_at: chrono::DateTime<chrono::Local>,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
