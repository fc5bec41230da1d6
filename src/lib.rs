//! # formpilot
#![allow(clippy::uninlined_format_args)]
//!
//! Fills a hospital reporting portal's prescription entry form from
//! spreadsheet rows, one row at a time, through a WebDriver session.
//!
//! Each row goes through two stages:
//!
//! 1. the **primary form**: every column is dispatched to a field by its
//!    configured type, with portal rules for diagnoses (dictionary lookups
//!    fanned out over five slots), age, department and a few numeric fields;
//!    then the form is submitted, or reset when anything fails;
//! 2. the **antibiotic sub-form**: once the record is listed in the results
//!    table its present/absent selector is set and, when present, a drug
//!    detail form is filled from the row's instruction text.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Process rows.csv against the portal described by config.json
//! formpilot run --config config.json --input rows.csv
//!
//! # Refuse to start if the configuration has issues
//! formpilot run --config config.json --strict
//!
//! # Check a configuration and which row columns it leaves unmapped
//! formpilot validate --config config.json --input rows.csv
//!
//! # See how an instruction is parsed and coded
//! formpilot parse-dosage "0.25g bid"
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default
//! `formpilot=info`); stdout carries only JSON.
//!
//! ## Library Usage
//!
//! ```no_run
//! use formpilot::{Browser, BrowserType, Config, DictionaryClient, RowRecord};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load("config.json".as_ref())?;
//! let browser = Browser::connect(BrowserType::Chrome, "http://localhost:9515", None, true).await?;
//! let dictionary = DictionaryClient::new(config.dictionary.clone())?;
//!
//! let rows = vec![RowRecord::new().with("姓名", "张三").with("年龄", "45岁")];
//! let (results, summary) = formpilot::run_batch(&browser, &dictionary, &config, &rows).await;
//! println!("{} of {} submitted", summary.succeeded, results.len());
//! # Ok(())
//! # }
//! ```
//!
//! Anything implementing [`Page`] can stand in for the browser.

/// Antibiotic disclosure sub-form
pub mod antibiotic;

/// Run configuration
pub mod config;

/// Remote diagnosis and drug dictionary
pub mod dictionary;

/// Medication instruction parsing
pub mod dosage;

/// Per-row orchestration
pub mod engine;

/// Error types and exit codes
pub mod errors;

/// Field dispatch and business rules
pub mod fields;

/// Primary entry form controller
pub mod form;

/// Locator strategies and element queries
pub mod locator;

/// Login and navigation
pub mod login;

/// Unit, frequency and route coding
pub mod normalize;

/// The page abstraction the engine drives
pub mod page;

/// Result export
pub mod results;

/// Row input files
pub mod rows;

/// Batch processing
pub mod runner;

/// Shared data types
pub mod types;

/// WebDriver browser session
pub mod webdriver;

pub use config::Config;
pub use dictionary::{DictionaryClient, DictionaryLookup};
pub use engine::Engine;
pub use errors::{CliError, EngineError};
pub use page::Page;
pub use runner::{BatchSummary, run_batch};
pub use types::{AntibioticOutcome, FieldKind, FieldSpec, FormOutcome, RowRecord, RowResult};
pub use webdriver::{Browser, BrowserType};
