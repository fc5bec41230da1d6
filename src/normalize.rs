//! Free-text units, routes and frequencies mapped onto the portal's option codes
//!
//! The portal's dropdowns submit numeric string codes. Tokens that match no
//! entry still produce a code (the category default) so a row is never
//! blocked on an unrecognized unit.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which dropdown a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeCategory {
    /// Dose and quantity units
    Dose,
    /// Route of administration
    Route,
    /// Administration frequency
    Frequency,
}

const DOSE_CODES: &[(&str, &str)] = &[
    ("单位", "2"),
    ("u", "2"),
    ("iu", "2"),
    ("万单位", "3"),
    ("万u", "3"),
    ("万iu", "3"),
    ("g", "5"),
    ("克", "5"),
    ("mg", "6"),
    ("毫克", "6"),
    ("μg", "7"),
    ("ug", "7"),
    ("微克", "7"),
    ("ml", "8"),
    ("毫升", "8"),
    ("l", "9"),
    ("升", "9"),
    ("片", "10"),
    ("粒", "11"),
    ("支", "12"),
    ("包", "13"),
    ("袋", "14"),
    ("瓶", "15"),
    ("滴", "16"),
    ("盒", "18"),
    ("丸", "19"),
    ("枚", "20"),
    ("喷", "21"),
    ("贴", "22"),
];

const ROUTE_CODES: &[(&str, &str)] = &[
    ("静滴", "26"),
    ("静脉滴注", "26"),
    ("ivgtt", "26"),
    ("静注", "27"),
    ("静脉注射", "27"),
    ("iv", "27"),
    ("肌注", "28"),
    ("肌肉注射", "28"),
    ("im", "28"),
    ("皮下注射", "29"),
    ("ih", "29"),
    ("皮内注射", "30"),
    ("外用", "31"),
    ("雾化吸入", "32"),
    ("雾化", "32"),
    ("滴眼", "33"),
    ("含服", "34"),
    ("口服", "35"),
    ("po", "35"),
    ("直肠给药", "36"),
    ("鼻饲", "37"),
];

const FREQUENCY_CODES: &[(&str, &str)] = &[
    ("q2h", "11"),
    ("q4h", "12"),
    ("q6h", "13"),
    ("q8h", "14"),
    ("q12h", "15"),
    ("qd", "17"),
    ("1/日", "17"),
    ("1日", "17"),
    ("每日一次", "17"),
    ("bid", "18"),
    ("2/日", "18"),
    ("2日", "18"),
    ("tid", "19"),
    ("3/日", "19"),
    ("3日", "19"),
    ("qid", "20"),
    ("4/日", "20"),
    ("4日", "20"),
    ("qn", "21"),
    ("每晚", "21"),
    ("st", "22"),
    ("即刻", "22"),
];

impl CodeCategory {
    /// Code submitted when a token is not recognized
    pub fn default_code(self) -> &'static str {
        match self {
            CodeCategory::Dose => "10",      // 片
            CodeCategory::Route => "35",     // 口服
            CodeCategory::Frequency => "17", // 1/日
        }
    }

    fn table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            CodeCategory::Dose => DOSE_CODES,
            CodeCategory::Route => ROUTE_CODES,
            CodeCategory::Frequency => FREQUENCY_CODES,
        }
    }
}

/// Look a token up in the built-in table for `category`
pub fn normalize(raw: &str, category: CodeCategory) -> String {
    lookup_builtin(&fold(raw), category)
        .unwrap_or(category.default_code())
        .to_string()
}

fn fold(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn lookup_builtin(token: &str, category: CodeCategory) -> Option<&'static str> {
    category
        .table()
        .iter()
        .find(|(key, _)| *key == token)
        .map(|(_, code)| *code)
}

/// Normalizer with per-site additions layered over the built-in tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Normalizer {
    #[serde(default)]
    pub dose: HashMap<String, String>,
    #[serde(default)]
    pub route: HashMap<String, String>,
    #[serde(default)]
    pub frequency: HashMap<String, String>,
}

impl Normalizer {
    pub fn normalize(&self, raw: &str, category: CodeCategory) -> String {
        let token = fold(raw);
        let extra = match category {
            CodeCategory::Dose => &self.dose,
            CodeCategory::Route => &self.route,
            CodeCategory::Frequency => &self.frequency,
        };

        if let Some(code) = extra
            .iter()
            .find(|(key, _)| fold(key) == token)
            .map(|(_, code)| code)
        {
            return code.clone();
        }

        lookup_builtin(&token, category)
            .unwrap_or(category.default_code())
            .to_string()
    }
}
