//! Per-row result export as a UTF-8 CSV that opens directly in Excel

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::{AntibioticOutcome, RowResult};

pub const STATUS_COLUMN: &str = "处理状态";
pub const MESSAGE_COLUMN: &str = "处理消息";
pub const TIME_COLUMN: &str = "处理时间";
pub const ANTIBIOTIC_STATUS_COLUMN: &str = "抗菌药物处理";
pub const ANTIBIOTIC_MESSAGE_COLUMN: &str = "抗菌药物消息";

const TIMESTAMP_PLACEHOLDER: &str = "{timestamp}";
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Writes every processed row plus its outcome to a CSV file
pub struct ResultWriter {
    path: PathBuf,
}

impl ResultWriter {
    /// `template` may contain `{timestamp}`, replaced once at construction
    pub fn new(template: &str) -> Result<Self> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let path = PathBuf::from(template.replace(TIMESTAMP_PLACEHOLDER, &stamp));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(ResultWriter { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Original columns (union across rows, first-seen order) then the outcome columns
    pub fn write(&self, results: &[RowResult]) -> Result<()> {
        if results.is_empty() {
            warn!("No results to export");
            return Ok(());
        }

        let mut columns: Vec<&str> = Vec::new();
        for result in results {
            for key in result.row.keys() {
                if !columns.contains(&key) {
                    columns.push(key);
                }
            }
        }

        let mut file = fs::File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        // Excel only detects UTF-8 in a CSV through the byte order mark
        file.write_all(UTF8_BOM)?;
        let mut writer = csv::Writer::from_writer(file);

        let outcome_columns = [
            STATUS_COLUMN,
            MESSAGE_COLUMN,
            TIME_COLUMN,
            ANTIBIOTIC_STATUS_COLUMN,
            ANTIBIOTIC_MESSAGE_COLUMN,
        ];
        writer.write_record(columns.iter().copied().chain(outcome_columns))?;

        for result in results {
            let mut record: Vec<String> = columns
                .iter()
                .map(|c| result.row.get(c).unwrap_or("").to_string())
                .collect();
            record.extend(outcome_cells(result));
            writer.write_record(&record)?;
        }
        writer.flush()?;

        info!("Exported {} result(s) to {}", results.len(), self.path.display());
        Ok(())
    }
}

fn outcome_cells(result: &RowResult) -> [String; 5] {
    let status = if result.outcome.succeeded {
        "成功"
    } else {
        "失败"
    };
    let message = result
        .outcome
        .failure_reason
        .clone()
        .unwrap_or_else(|| "提交成功".to_string());
    let antibiotic_message = match &result.antibiotic {
        AntibioticOutcome::Failed(reason) => reason.clone(),
        _ => String::new(),
    };

    [
        status.to_string(),
        message,
        result.processed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        result.antibiotic.label().to_string(),
        antibiotic_message,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FormOutcome, RowRecord};

    fn result(
        index: usize,
        row: RowRecord,
        outcome: FormOutcome,
        antibiotic: AntibioticOutcome,
    ) -> RowResult {
        RowResult {
            index,
            row,
            outcome,
            antibiotic,
            processed_at: Local::now(),
        }
    }

    #[test]
    fn test_timestamp_placeholder_and_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("out/results_{timestamp}.csv");

        let writer = ResultWriter::new(template.to_str().unwrap()).unwrap();
        let name = writer.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("results_"));
        assert!(!name.contains("{timestamp}"));
        assert!(dir.path().join("out").is_dir());
    }

    #[test]
    fn test_write_union_of_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let writer = ResultWriter::new(path.to_str().unwrap()).unwrap();

        let results = vec![
            result(
                1,
                RowRecord::new().with("姓名", "张三").with("年龄", "45岁"),
                FormOutcome::success(),
                AntibioticOutcome::Completed,
            ),
            result(
                2,
                RowRecord::new().with("姓名", "李四").with("科室", "内科"),
                FormOutcome::failure("No element found for age (id=age)"),
                AntibioticOutcome::NotRequired,
            ),
        ];
        writer.write(&results).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let mut reader = csv::Reader::from_reader(&bytes[UTF8_BOM.len()..]);
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(
            headers,
            vec!["姓名", "年龄", "科室", "处理状态", "处理消息", "处理时间", "抗菌药物处理", "抗菌药物消息"]
        );

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&records[0][3], "成功");
        assert_eq!(&records[0][6], "成功");
        assert_eq!(&records[1][1], "");
        assert_eq!(&records[1][3], "失败");
        assert_eq!(&records[1][4], "No element found for age (id=age)");
        assert_eq!(&records[1][6], "无需处理");
    }

    #[test]
    fn test_empty_results_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        ResultWriter::new(path.to_str().unwrap())
            .unwrap()
            .write(&[])
            .unwrap();
        assert!(!path.exists());
    }
}
