//! Batch processing: every row through the engine, one after another

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::dictionary::DictionaryLookup;
use crate::engine::Engine;
use crate::page::Page;
use crate::types::{RowRecord, RowResult};

/// Counts reported after a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows whose record was submitted but whose sub-form failed
    pub antibiotic_failed: usize,
    /// Percentage of rows whose primary form succeeded
    pub success_rate: f64,
}

impl BatchSummary {
    pub fn from_results(results: &[RowResult]) -> Self {
        let total = results.len();
        let succeeded = results.iter().filter(|r| r.outcome.succeeded).count();
        let antibiotic_failed = results
            .iter()
            .filter(|r| r.outcome.succeeded && !r.antibiotic.succeeded())
            .count();
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded as f64 * 100.0 / total as f64
        };

        BatchSummary {
            total,
            succeeded,
            failed: total - succeeded,
            antibiotic_failed,
            success_rate,
        }
    }
}

/// Process all rows in order; a failing row never stops the batch
pub async fn run_batch<P: Page, D: DictionaryLookup>(
    page: &P,
    dictionary: &D,
    config: &Config,
    rows: &[RowRecord],
) -> (Vec<RowResult>, BatchSummary) {
    let engine = Engine::new(page, dictionary, config);
    let total = rows.len();
    let mut results = Vec::with_capacity(total);

    for (i, row) in rows.iter().enumerate() {
        let index = i + 1;
        info!("Processing row {}/{}", index, total);

        let result = engine.process_row(index, row).await;
        results.push(result);

        if config.data.refresh_between_rows && index < total {
            if let Err(e) = page.refresh().await {
                warn!("Page refresh after row {} failed: {}", index, e);
            }
        }
    }

    let summary = BatchSummary::from_results(&results);
    info!(
        "Batch finished: {} total, {} succeeded, {} failed, {} antibiotic failure(s), {:.1}% success",
        summary.total,
        summary.succeeded,
        summary.failed,
        summary.antibiotic_failed,
        summary.success_rate
    );
    (results, summary)
}
