//! Locator strategies and the element queries they resolve to

use fantoccini::Locator;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// How a configured element is found on the page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LocatorStrategy {
    #[default]
    Id,
    Name,
    XPath,
    CssSelector,
    ClassName,
    TagName,
    LinkText,
    /// Anything else found in the configuration; resolved as an id
    Unknown(String),
}

impl From<String> for LocatorStrategy {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "id" => LocatorStrategy::Id,
            "name" => LocatorStrategy::Name,
            "xpath" => LocatorStrategy::XPath,
            "css" | "css_selector" | "css selector" => LocatorStrategy::CssSelector,
            "class" | "class_name" | "class name" => LocatorStrategy::ClassName,
            "tag" | "tag_name" | "tag name" => LocatorStrategy::TagName,
            "link_text" | "link text" => LocatorStrategy::LinkText,
            _ => LocatorStrategy::Unknown(s),
        }
    }
}

impl From<LocatorStrategy> for String {
    fn from(strategy: LocatorStrategy) -> Self {
        match strategy {
            LocatorStrategy::Id => "id".to_string(),
            LocatorStrategy::Name => "name".to_string(),
            LocatorStrategy::XPath => "xpath".to_string(),
            LocatorStrategy::CssSelector => "css_selector".to_string(),
            LocatorStrategy::ClassName => "class_name".to_string(),
            LocatorStrategy::TagName => "tag_name".to_string(),
            LocatorStrategy::LinkText => "link_text".to_string(),
            LocatorStrategy::Unknown(s) => s,
        }
    }
}

/// A configured `(strategy, value)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorSpec {
    #[serde(default)]
    pub locator: LocatorStrategy,
    pub value: String,
}

impl LocatorSpec {
    pub fn new(locator: LocatorStrategy, value: impl Into<String>) -> Self {
        LocatorSpec {
            locator,
            value: value.into(),
        }
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::CssSelector, value)
    }

    pub fn query(&self) -> ElementQuery {
        resolve(&self.locator, &self.value)
    }
}

/// Element query in the shapes the WebDriver protocol understands
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementQuery {
    Id(String),
    Css(String),
    XPath(String),
    LinkText(String),
}

/// Translate a configured strategy into an element query
///
/// WebDriver has no native name/class/tag strategies, so those become CSS.
/// Unknown strategies fall back to an id lookup.
pub fn resolve(strategy: &LocatorStrategy, value: &str) -> ElementQuery {
    match strategy {
        LocatorStrategy::Id => ElementQuery::Id(value.to_string()),
        LocatorStrategy::Name => ElementQuery::Css(format!("[name=\"{}\"]", css_escape(value))),
        LocatorStrategy::XPath => ElementQuery::XPath(value.to_string()),
        LocatorStrategy::CssSelector => ElementQuery::Css(value.to_string()),
        LocatorStrategy::ClassName => ElementQuery::Css(
            value
                .split_whitespace()
                .map(|class| format!(".{}", class))
                .collect::<String>(),
        ),
        LocatorStrategy::TagName => ElementQuery::Css(value.to_string()),
        LocatorStrategy::LinkText => ElementQuery::LinkText(value.to_string()),
        LocatorStrategy::Unknown(name) => {
            warn!("Unknown locator strategy '{}', looking up '{}' by id", name, value);
            ElementQuery::Id(value.to_string())
        }
    }
}

impl ElementQuery {
    /// Borrow as a fantoccini locator
    pub fn as_locator(&self) -> Locator<'_> {
        match self {
            ElementQuery::Id(id) => Locator::Id(id),
            ElementQuery::Css(css) => Locator::Css(css),
            ElementQuery::XPath(xpath) => Locator::XPath(xpath),
            ElementQuery::LinkText(text) => Locator::LinkText(text),
        }
    }

    /// Narrow a radio group query to the input carrying `raw` as its value
    pub fn with_value(&self, raw: &str) -> ElementQuery {
        match self {
            ElementQuery::Id(id) => ElementQuery::Css(format!(
                "[id=\"{}\"][value=\"{}\"]",
                css_escape(id),
                css_escape(raw)
            )),
            ElementQuery::Css(css) => {
                // Apply the attribute filter to every alternative of a selector list
                let narrowed: Vec<String> = split_selector_list(css)
                    .into_iter()
                    .map(|part| format!("{}[value=\"{}\"]", part.trim(), css_escape(raw)))
                    .collect();
                ElementQuery::Css(narrowed.join(", "))
            }
            ElementQuery::XPath(xpath) => {
                ElementQuery::XPath(format!("{}[@value={}]", xpath, xpath_literal(raw)))
            }
            ElementQuery::LinkText(_) => ElementQuery::Css(format!(
                "input[type=\"radio\"][value=\"{}\"]",
                css_escape(raw)
            )),
        }
    }
}

impl fmt::Display for ElementQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementQuery::Id(v) => write!(f, "id={}", v),
            ElementQuery::Css(v) => write!(f, "css={}", v),
            ElementQuery::XPath(v) => write!(f, "xpath={}", v),
            ElementQuery::LinkText(v) => write!(f, "link_text={}", v),
        }
    }
}

/// Split a CSS selector list on commas outside quotes, brackets and parens
fn split_selector_list(css: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in css.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&css[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&css[start..]);
    parts
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        let parts: Vec<String> = value.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

#[cfg(test)]
#[path = "locator_test.rs"]
mod locator_test;
