//! Remote dictionary lookups for diagnosis and drug names
//!
//! Every call goes over the wire; nothing is cached between rows. Any failure
//! (network, status, body shape, no candidates) is logged and reported as
//! `None` so callers can skip the value and carry on.

use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::multipart::Form;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::{DictionaryConfig, DictionaryTable};
use crate::page::SessionCookie;
use crate::types::DictionaryMatch;

/// Which dictionary table to search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryKind {
    Diagnosis,
    Drug,
}

#[async_trait]
pub trait DictionaryLookup: Send + Sync {
    async fn lookup(
        &self,
        kind: DictionaryKind,
        keyword: &str,
        session: Option<&SessionCookie>,
    ) -> Option<DictionaryMatch>;

    async fn lookup_diagnosis(
        &self,
        keyword: &str,
        session: Option<&SessionCookie>,
    ) -> Option<DictionaryMatch> {
        self.lookup(DictionaryKind::Diagnosis, keyword, session).await
    }

    async fn lookup_drug(
        &self,
        keyword: &str,
        session: Option<&SessionCookie>,
    ) -> Option<DictionaryMatch> {
        self.lookup(DictionaryKind::Drug, keyword, session).await
    }
}

/// Multipart POST client for the portal's dictionary search
pub struct DictionaryClient {
    http: reqwest::Client,
    config: DictionaryConfig,
}

impl DictionaryClient {
    pub fn new(config: DictionaryConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(DictionaryClient { http, config })
    }

    fn table(&self, kind: DictionaryKind) -> &DictionaryTable {
        match kind {
            DictionaryKind::Diagnosis => &self.config.diagnosis,
            DictionaryKind::Drug => &self.config.drug,
        }
    }

    async fn fetch(
        &self,
        table: &DictionaryTable,
        keyword: &str,
        session: Option<&SessionCookie>,
    ) -> Result<Value, reqwest::Error> {
        let form = Form::new()
            .text("dict_table", table.table.clone())
            .text("search_field", table.search_field.clone())
            .text("order_field", table.order_field.clone())
            .text("szimu", keyword.to_string());

        let mut request = self.http.post(&self.config.endpoint).multipart(form);
        if let Some(cookie) = session {
            request = request.header(COOKIE, cookie.header_value());
        }

        request.send().await?.error_for_status()?.json().await
    }
}

#[async_trait]
impl DictionaryLookup for DictionaryClient {
    async fn lookup(
        &self,
        kind: DictionaryKind,
        keyword: &str,
        session: Option<&SessionCookie>,
    ) -> Option<DictionaryMatch> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return None;
        }
        if session.is_none() {
            warn!("No session cookie for {:?} lookup of '{}'", kind, keyword);
        }

        let table = self.table(kind);
        debug!("Looking up '{}' in {}", keyword, table.table);

        match self.fetch(table, keyword, session).await {
            Ok(body) => {
                let found = first_match(&body, table);
                match &found {
                    Some(m) => debug!("'{}' resolved to {} ({})", keyword, m.name, m.code),
                    None => warn!("No {:?} match for '{}'", kind, keyword),
                }
                found
            }
            Err(e) => {
                warn!("{:?} lookup for '{}' failed: {}", kind, keyword, e);
                None
            }
        }
    }
}

/// Take the first candidate of a JSON array response
///
/// No ranking is attempted; the endpoint's order is trusted.
pub fn first_match(body: &Value, table: &DictionaryTable) -> Option<DictionaryMatch> {
    let candidate = body.as_array()?.first()?.as_object()?;

    let name = scalar_text(candidate.get(&table.name_field)?)?;
    let code = scalar_text(candidate.get(&table.code_field)?)?;
    if name.is_empty() || code.is_empty() {
        return None;
    }

    let extra: HashMap<String, String> = table
        .extra_fields
        .iter()
        .filter_map(|(key, field)| {
            let value = candidate.get(field).and_then(scalar_text)?;
            Some((key.clone(), value))
        })
        .collect();

    Some(DictionaryMatch { name, code, extra })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
