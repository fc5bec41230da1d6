// Common test utilities: an in-memory portal page and a canned dictionary

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use formpilot::config::Config;
use formpilot::dictionary::{DictionaryKind, DictionaryLookup};
use formpilot::errors::EngineError;
use formpilot::locator::{ElementQuery, LocatorStrategy, resolve};
use formpilot::page::{Page, SessionCookie};
use formpilot::types::DictionaryMatch;

/// Everything the engine did to the page, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Clear(String),
    Type(String, String),
    Assign(String, String),
    Select(String, String),
    Click(String),
    Dialog(String),
    Goto(String),
    Refresh,
}

impl Action {
    /// Label of the element the action touched, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            Action::Clear(l)
            | Action::Type(l, _)
            | Action::Assign(l, _)
            | Action::Select(l, _)
            | Action::Click(l) => Some(l),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockElement(usize);

enum Effect {
    Reveal(ElementQuery, usize),
    Dialog(String),
}

#[derive(Default)]
struct Node {
    label: String,
    attrs: HashMap<String, String>,
    selected: bool,
    disabled_checks: u32,
    /// `(value, label)`; `None` accepts any value
    options: Option<Vec<(String, String)>>,
    children: Vec<(ElementQuery, usize)>,
}

#[derive(Default)]
struct State {
    nodes: Vec<Node>,
    top: Vec<(ElementQuery, usize)>,
    on_click: HashMap<usize, Vec<Effect>>,
    dialogs: VecDeque<String>,
    /// Attribute name to the number of reads that still fail
    failing_attrs: HashMap<String, u32>,
    actions: Vec<Action>,
    cookie: Option<SessionCookie>,
    url: String,
}

/// A page whose elements are registered up front by query
#[derive(Default)]
pub struct MockPage {
    state: Mutex<State>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an element that is not on the page yet
    pub fn node(&self, label: &str) -> MockElement {
        let mut state = self.state.lock().unwrap();
        state.nodes.push(Node {
            label: label.to_string(),
            ..Default::default()
        });
        MockElement(state.nodes.len() - 1)
    }

    /// Create an element reachable from the document
    pub fn add(&self, query: ElementQuery, label: &str) -> MockElement {
        let element = self.node(label);
        self.attach(query, element);
        element
    }

    /// Shorthand for an element found by id
    pub fn add_id(&self, id: &str, label: &str) -> MockElement {
        self.add(ElementQuery::Id(id.to_string()), label)
    }

    pub fn attach(&self, query: ElementQuery, element: MockElement) {
        self.state.lock().unwrap().top.push((query, element.0));
    }

    pub fn add_child(&self, parent: MockElement, query: ElementQuery, label: &str) -> MockElement {
        let element = self.node(label);
        let mut state = self.state.lock().unwrap();
        state.nodes[parent.0].children.push((query, element.0));
        element
    }

    pub fn set_attr(&self, element: MockElement, name: &str, value: &str) {
        self.state.lock().unwrap().nodes[element.0]
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_selected(&self, element: MockElement) {
        self.state.lock().unwrap().nodes[element.0].selected = true;
    }

    /// Report the element as disabled for the next `checks` enabled checks
    pub fn disable_for(&self, element: MockElement, checks: u32) {
        self.state.lock().unwrap().nodes[element.0].disabled_checks = checks;
    }

    pub fn set_options(&self, element: MockElement, options: &[(&str, &str)]) {
        self.state.lock().unwrap().nodes[element.0].options = Some(
            options
                .iter()
                .map(|(v, l)| (v.to_string(), l.to_string()))
                .collect(),
        );
    }

    /// Clicking `trigger` makes `element` findable by `query`
    pub fn reveal_on_click(&self, trigger: MockElement, query: ElementQuery, element: MockElement) {
        self.state
            .lock()
            .unwrap()
            .on_click
            .entry(trigger.0)
            .or_default()
            .push(Effect::Reveal(query, element.0));
    }

    /// Clicking `trigger` raises a native dialog
    pub fn dialog_on_click(&self, trigger: MockElement, text: &str) {
        self.state
            .lock()
            .unwrap()
            .on_click
            .entry(trigger.0)
            .or_default()
            .push(Effect::Dialog(text.to_string()));
    }

    /// Make the next `times` reads of attribute `name` fail like a stale element
    pub fn fail_attr(&self, name: &str, times: u32) {
        self.state
            .lock()
            .unwrap()
            .failing_attrs
            .insert(name.to_string(), times);
    }

    pub fn set_cookie(&self, name: &str, value: &str) {
        self.state.lock().unwrap().cookie = Some(SessionCookie {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    pub fn set_url(&self, url: &str) {
        self.state.lock().unwrap().url = url.to_string();
    }

    pub fn actions(&self) -> Vec<Action> {
        self.state.lock().unwrap().actions.clone()
    }

    /// Actions that touched the element labelled `label`
    pub fn actions_on(&self, label: &str) -> Vec<Action> {
        self.actions()
            .into_iter()
            .filter(|a| a.target() == Some(label))
            .collect()
    }

    pub fn touched(&self, label: &str) -> bool {
        !self.actions_on(label).is_empty()
    }

    pub fn clicks(&self, label: &str) -> usize {
        self.actions_on(label)
            .iter()
            .filter(|a| matches!(a, Action::Click(_)))
            .count()
    }

    pub fn clear_actions(&self) {
        self.state.lock().unwrap().actions.clear();
    }

    fn record(&self, action: Action) {
        self.state.lock().unwrap().actions.push(action);
    }

    fn label(&self, element: &MockElement) -> String {
        self.state.lock().unwrap().nodes[element.0].label.clone()
    }
}

#[async_trait]
impl Page for MockPage {
    type Element = MockElement;

    async fn wait_for(
        &self,
        query: &ElementQuery,
        timeout: Duration,
    ) -> Result<MockElement, EngineError> {
        self.find_all(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Timeout {
                what: query.to_string(),
                after: timeout,
            })
    }

    async fn find_all(&self, query: &ElementQuery) -> Result<Vec<MockElement>, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .top
            .iter()
            .filter(|(q, _)| q == query)
            .map(|(_, id)| MockElement(*id))
            .collect())
    }

    async fn find_all_in(
        &self,
        parent: &MockElement,
        query: &ElementQuery,
    ) -> Result<Vec<MockElement>, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(state.nodes[parent.0]
            .children
            .iter()
            .filter(|(q, _)| q == query)
            .map(|(_, id)| MockElement(*id))
            .collect())
    }

    async fn clear(&self, element: &MockElement) -> Result<(), EngineError> {
        self.record(Action::Clear(self.label(element)));
        Ok(())
    }

    async fn send_keys(&self, element: &MockElement, text: &str) -> Result<(), EngineError> {
        self.record(Action::Type(self.label(element), text.to_string()));
        Ok(())
    }

    async fn click(&self, element: &MockElement) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let label = state.nodes[element.0].label.clone();
        state.nodes[element.0].selected = true;
        state.actions.push(Action::Click(label));

        if let Some(effects) = state.on_click.remove(&element.0) {
            for effect in effects {
                match effect {
                    Effect::Reveal(query, id) => state.top.push((query, id)),
                    Effect::Dialog(text) => state.dialogs.push_back(text),
                }
            }
        }
        Ok(())
    }

    async fn select_by_value(&self, element: &MockElement, value: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let node = &state.nodes[element.0];
        let known = match &node.options {
            None => true,
            Some(options) => options.iter().any(|(v, _)| v == value),
        };
        if !known {
            return Err(EngineError::interaction(&node.label, format!("no option {}", value)));
        }
        let label = node.label.clone();
        state.actions.push(Action::Select(label, value.to_string()));
        Ok(())
    }

    async fn select_by_label(&self, element: &MockElement, wanted: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let node = &state.nodes[element.0];
        let value = node
            .options
            .as_ref()
            .and_then(|options| options.iter().find(|(_, l)| l == wanted))
            .map(|(v, _)| v.clone())
            .ok_or_else(|| EngineError::interaction(&node.label, format!("no label {}", wanted)))?;
        let label = node.label.clone();
        state.actions.push(Action::Select(label, value));
        Ok(())
    }

    async fn is_selected(&self, element: &MockElement) -> Result<bool, EngineError> {
        Ok(self.state.lock().unwrap().nodes[element.0].selected)
    }

    async fn is_enabled(&self, element: &MockElement) -> Result<bool, EngineError> {
        let mut state = self.state.lock().unwrap();
        let node = &mut state.nodes[element.0];
        if node.disabled_checks > 0 {
            node.disabled_checks -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    async fn attr(&self, element: &MockElement, name: &str) -> Result<Option<String>, EngineError> {
        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.failing_attrs.get_mut(name).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(EngineError::interaction(name, "stale element reference"));
        }
        Ok(state.nodes[element.0].attrs.get(name).cloned())
    }

    async fn set_value_direct(&self, element: &MockElement, value: &str) -> Result<(), EngineError> {
        self.record(Action::Assign(self.label(element), value.to_string()));
        Ok(())
    }

    async fn try_absorb_dialog(&self, _window: Duration) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        let text = state.dialogs.pop_front()?;
        state.actions.push(Action::Dialog(text.clone()));
        Some(text)
    }

    async fn cookie(&self, name: &str) -> Option<SessionCookie> {
        self.state
            .lock()
            .unwrap()
            .cookie
            .clone()
            .filter(|c| c.name == name)
    }

    async fn goto(&self, url: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.url = url.to_string();
        state.actions.push(Action::Goto(url.to_string()));
        Ok(())
    }

    async fn current_url(&self) -> Result<String, EngineError> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn refresh(&self) -> Result<(), EngineError> {
        self.record(Action::Refresh);
        Ok(())
    }
}

/// Dictionary answering from a fixed table and recording every call
#[derive(Default)]
pub struct MockDictionary {
    entries: HashMap<(&'static str, String), DictionaryMatch>,
    calls: Mutex<Vec<(DictionaryKind, String, Option<String>)>>,
}

fn kind_key(kind: DictionaryKind) -> &'static str {
    match kind {
        DictionaryKind::Diagnosis => "diagnosis",
        DictionaryKind::Drug => "drug",
    }
}

impl MockDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnosis(mut self, keyword: &str, name: &str, code: &str) -> Self {
        self.entries.insert(
            ("diagnosis", keyword.to_string()),
            DictionaryMatch {
                name: name.to_string(),
                code: code.to_string(),
                extra: HashMap::new(),
            },
        );
        self
    }

    pub fn drug(mut self, keyword: &str, name: &str, id: &str, spec: &str) -> Self {
        self.entries.insert(
            ("drug", keyword.to_string()),
            DictionaryMatch {
                name: name.to_string(),
                code: id.to_string(),
                extra: HashMap::from([
                    ("id".to_string(), id.to_string()),
                    ("spec".to_string(), spec.to_string()),
                ]),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<(DictionaryKind, String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DictionaryLookup for MockDictionary {
    async fn lookup(
        &self,
        kind: DictionaryKind,
        keyword: &str,
        session: Option<&SessionCookie>,
    ) -> Option<DictionaryMatch> {
        self.calls.lock().unwrap().push((
            kind,
            keyword.to_string(),
            session.map(|s| s.header_value()),
        ));
        self.entries
            .get(&(kind_key(kind), keyword.to_string()))
            .cloned()
    }
}

/// Portal configuration matching [`portal_page`]
pub fn portal_config() -> Config {
    let mut form_elements = serde_json::json!({
        "patient_name": {"type": "text", "value": "brxm"},
        "sex": {"type": "radio", "locator": "name", "value": "xb", "options": {"男": "1", "女": "2"}},
        "age": {"type": "text", "value": "nl"},
        "age_unit": {"type": "select", "value": "nldw"},
        "department": {"type": "select", "value": "ks"},
        "drug_variety_count": {"type": "text", "value": "ypzs"},
        "injectable": {"type": "radio", "locator": "name", "value": "zsj", "options": {"有": "1", "无": "0"}},
        "injectable_count": {"type": "text", "value": "zsjs"},
        "remark": {"type": "hidden", "value": "bz"}
    });
    for slot in 1..=5 {
        form_elements[format!("diagnosis{}_name", slot)] =
            serde_json::json!({"type": "text", "value": format!("zd{}mc", slot)});
        form_elements[format!("diagnosis{}_code", slot)] =
            serde_json::json!({"type": "text", "value": format!("zd{}bm", slot)});
    }

    serde_json::from_value(serde_json::json!({
        "timings": {
            "element_timeout_ms": 50,
            "pacing_ms": 0,
            "dialog_window_ms": 0,
            "post_submit_wait_ms": 0,
            "disabled_retry_ms": 0
        },
        "form_elements": form_elements,
        "field_aliases": {
            "姓名": "patient_name",
            "性别": "sex",
            "年龄": "age",
            "科室": "department",
            "药品品种数": "drug_variety_count",
            "注射剂": "injectable",
            "诊断": "diagnosis",
            "备注": "remark"
        },
        "controls": {"submit": {"value": "btnSubmit"}, "reset": {"value": "btnReset"}},
        "dictionary": {"endpoint": "http://dict.local/search"},
        "antibiotic": {
            "enabled": true,
            "wait_after_submit_ms": 0,
            "detail": {"wait_after_click_ms": 0}
        }
    }))
    .unwrap()
}

/// Handles to the elements of the sub-form flow
pub struct SubForm {
    pub submit: MockElement,
    pub table: MockElement,
    pub result_row: MockElement,
    pub present: MockElement,
    pub absent: MockElement,
    pub trigger: MockElement,
    pub save: MockElement,
}

/// Entry form with every configured field, labelled by logical name
pub fn portal_page() -> (MockPage, SubForm) {
    let page = MockPage::new();
    page.set_cookie("JSESSIONID", "abc123");

    for id in ["brxm", "nl", "nldw", "ks", "ypzs", "zsjs", "bz"] {
        let label = match id {
            "brxm" => "patient_name",
            "nl" => "age",
            "nldw" => "age_unit",
            "ks" => "department",
            "ypzs" => "drug_variety_count",
            "zsjs" => "injectable_count",
            _ => "remark",
        };
        page.add_id(id, label);
    }
    for (value, label) in [("1", "sex=男"), ("2", "sex=女")] {
        page.add(resolve(&LocatorStrategy::Name, "xb").with_value(value), label);
    }
    for (value, label) in [("1", "injectable=有"), ("0", "injectable=无")] {
        page.add(resolve(&LocatorStrategy::Name, "zsj").with_value(value), label);
    }
    for slot in 1..=5 {
        page.add_id(&format!("zd{}mc", slot), &format!("diagnosis{}_name", slot));
        page.add_id(&format!("zd{}bm", slot), &format!("diagnosis{}_code", slot));
    }
    page.add_id("btnReset", "reset");
    let submit = page.add_id("btnSubmit", "submit");
    page.dialog_on_click(submit, "提交成功");

    // Results table listing the submitted record
    let table = page.node("result_table");
    page.reveal_on_click(submit, ElementQuery::Id("resultTable".into()), table);
    let header = page.add_child(table, ElementQuery::Css("tr".into()), "header_row");
    page.add_child(header, ElementQuery::Css("th".into()), "header_cell");
    let result_row = page.add_child(table, ElementQuery::Css("tr".into()), "result_row");
    page.set_attr(result_row, "id", "rec_1001");

    let radio = ElementQuery::Css("input[type=\"radio\"]".into());
    let present = page.add_child(result_row, radio.clone(), "indicator=present");
    page.set_attr(present, "value", "1");
    let absent = page.add_child(result_row, radio, "indicator=absent");
    page.set_attr(absent, "value", "0");
    let trigger = page.add_child(
        result_row,
        ElementQuery::Css("input[type=\"button\"], button".into()),
        "detail_trigger",
    );

    // Detail form, shown once the trigger is clicked
    let marker = page.node("detail_form");
    page.reveal_on_click(trigger, ElementQuery::Id("drugDetailForm".into()), marker);
    for id in [
        "drug_name",
        "drug_id",
        "drug_spec",
        "total_quantity",
        "total_unit",
        "dose_value",
        "dose_unit",
        "frequency",
        "route",
    ] {
        let field = page.node(id);
        page.reveal_on_click(trigger, ElementQuery::Id(id.into()), field);
    }
    let save = page.node("detail_save");
    page.reveal_on_click(trigger, ElementQuery::Id("btnSave".into()), save);
    page.dialog_on_click(save, "保存成功");
    let back = page.node("return_link");
    page.reveal_on_click(save, ElementQuery::LinkText("返回".into()), back);

    (
        page,
        SubForm {
            submit,
            table,
            result_row,
            present,
            absent,
            trigger,
            save,
        },
    )
}
