//! Best-effort extraction of dose and frequency from medication instructions

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // Longer units come first so "毫克" wins over "克" and "mg" over "g"
    static ref DOSE_PATTERN: Regex =
        Regex::new(r"(?i)([0-9]+(?:\.[0-9]+)?)\s*(万单位|毫克|毫升|mg|ml|g|克|片|粒|支|包|袋|瓶|滴)")
            .expect("dose pattern is valid");
    static ref FREQUENCY_PATTERN: Regex = Regex::new(
        r"(?i)(q12h|q2h|q4h|q6h|q8h|qid|tid|bid|qd|qn|st|即刻|每晚|[1-4]\s*/?\s*日)"
    )
    .expect("frequency pattern is valid");
    static ref QUANTITY_PATTERN: Regex =
        Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*(.*?)\s*$").expect("quantity pattern is valid");
}

/// Dose quantity, dose unit and frequency token pulled out of one instruction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DosageBreakdown {
    pub dose_value: String,
    pub dose_unit: String,
    pub frequency: String,
}

impl DosageBreakdown {
    pub fn has_dose(&self) -> bool {
        !self.dose_value.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.dose_value.is_empty() && self.dose_unit.is_empty() && self.frequency.is_empty()
    }
}

/// Parse an instruction such as `"0.25g tid"` or `"每次2片 口服 3/日"`
///
/// Dose and frequency are extracted independently; anything not found is
/// left empty.
pub fn parse(instruction: &str) -> DosageBreakdown {
    let instruction = fold_width(instruction);
    let instruction = instruction.as_str();
    let mut breakdown = DosageBreakdown::default();

    if let Some(caps) = DOSE_PATTERN.captures(instruction) {
        breakdown.dose_value = caps[1].to_string();
        breakdown.dose_unit = caps[2].to_lowercase();
    }

    if let Some(token) = find_frequency(instruction) {
        breakdown.frequency = token;
    }

    breakdown
}

fn find_frequency(text: &str) -> Option<String> {
    FREQUENCY_PATTERN.find_iter(text).find_map(|m| {
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        let token = m.as_str();

        let standalone = if token.is_ascii() {
            // "st" inside "test" or "qd" inside "qdx" is not a frequency
            !before.is_some_and(|c| c.is_ascii_alphanumeric())
                && !after.is_some_and(|c| c.is_ascii_alphanumeric())
        } else if token.starts_with(|c: char| c.is_ascii_digit()) {
            // "21日" is a date, not "1日"
            !before.is_some_and(|c| c.is_ascii_digit() || c == '.')
        } else {
            true
        };

        standalone.then(|| token.split_whitespace().collect::<String>().to_lowercase())
    })
}

/// Split an explicit quantity cell like `"2盒"` or `"10 片"` into value and unit
pub fn parse_quantity(text: &str) -> Option<(String, String)> {
    let text = fold_width(text);
    let caps = QUANTITY_PATTERN.captures(&text)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Map full-width forms typed through Chinese IMEs (`１００ｍｇ`) onto ASCII
pub fn fold_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{ff01}'..='\u{ff5e}' => char::from_u32(c as u32 - 0xfee0).unwrap_or(c),
            '\u{3000}' => ' ',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
#[path = "dosage_test.rs"]
mod dosage_test;
