//! The surface every engine component drives
//!
//! Controllers borrow a `Page` for the duration of a call and never close it.
//! `webdriver::Browser` implements it for a live session.

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::EngineError;
use crate::locator::ElementQuery;

/// Forwardable session cookie taken from the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

impl SessionCookie {
    pub fn header_value(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

#[async_trait]
pub trait Page: Send + Sync {
    type Element: Clone + Send + Sync + std::fmt::Debug;

    /// Poll until an element matching `query` exists
    async fn wait_for(
        &self,
        query: &ElementQuery,
        timeout: Duration,
    ) -> Result<Self::Element, EngineError>;

    /// All current matches, without waiting
    async fn find_all(&self, query: &ElementQuery) -> Result<Vec<Self::Element>, EngineError>;

    /// All current matches below `parent`, without waiting
    async fn find_all_in(
        &self,
        parent: &Self::Element,
        query: &ElementQuery,
    ) -> Result<Vec<Self::Element>, EngineError>;

    async fn clear(&self, element: &Self::Element) -> Result<(), EngineError>;

    async fn send_keys(&self, element: &Self::Element, text: &str) -> Result<(), EngineError>;

    async fn click(&self, element: &Self::Element) -> Result<(), EngineError>;

    async fn select_by_value(&self, element: &Self::Element, value: &str)
    -> Result<(), EngineError>;

    async fn select_by_label(&self, element: &Self::Element, label: &str)
    -> Result<(), EngineError>;

    async fn is_selected(&self, element: &Self::Element) -> Result<bool, EngineError>;

    async fn is_enabled(&self, element: &Self::Element) -> Result<bool, EngineError>;

    async fn attr(&self, element: &Self::Element, name: &str)
    -> Result<Option<String>, EngineError>;

    /// Set `value` through the DOM after stripping the element's focus/blur hooks
    async fn set_value_direct(&self, element: &Self::Element, value: &str)
    -> Result<(), EngineError>;

    /// Accept a native dialog if one shows up within `window`
    ///
    /// Returns the dialog text, or `None` when no dialog appeared. Absence is
    /// not an error.
    async fn try_absorb_dialog(&self, window: Duration) -> Option<String>;

    async fn cookie(&self, name: &str) -> Option<SessionCookie>;

    async fn goto(&self, url: &str) -> Result<(), EngineError>;

    async fn current_url(&self) -> Result<String, EngineError>;

    async fn refresh(&self) -> Result<(), EngineError>;
}
