#![allow(clippy::uninlined_format_args)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use formpilot::config::Config;
use formpilot::dictionary::DictionaryClient;
use formpilot::errors::CliError;
use formpilot::normalize::{self, CodeCategory};
use formpilot::page::Page;
use formpilot::results::ResultWriter;
use formpilot::rows::read_rows;
use formpilot::runner::{self, BatchSummary};
use formpilot::types::{RowRecord, RowResult};
use formpilot::webdriver::Browser;
use formpilot::{dosage, login};

const EXIT_SUCCESS: i32 = 0;

#[derive(Parser)]
#[command(name = "formpilot")]
#[command(about = "Fill a reporting portal's entry form from spreadsheet rows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every row of the input file against the portal
    Run {
        /// JSON configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Row file (.xlsx, .xls, .csv or .json); overrides data.input_file
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Result CSV path; overrides data.output_file
        #[arg(short, long)]
        output: Option<String>,

        /// Refuse to start while the configuration has issues
        #[arg(long)]
        strict: bool,
    },

    /// Check a configuration (and optionally a row file) without a browser
    Validate {
        /// JSON configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Row file to check column names against
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show how a medication instruction is parsed and coded
    ParseDosage {
        /// Instruction text, e.g. "0.25g bid"
        text: String,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    match run(Cli::parse()).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            // Output JSON error to stdout for programmatic consumption
            let error_json = json!({
                "error": true,
                "message": err.to_string(),
                "exit_code": err.exit_code()
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );

            eprintln!("Error: {}", err);
            std::process::exit(err.exit_code());
        }
    }
}

fn init_tracing() {
    // Logs go to stderr so stdout stays clean for JSON output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "formpilot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Run {
            config,
            input,
            output,
            strict,
        } => handle_run(&config, input, output, strict).await,
        Commands::Validate { config, input } => handle_validate(&config, input),
        Commands::ParseDosage { text } => handle_parse_dosage(&text),
    }
}

fn load_config(path: &Path, strict: bool) -> Result<Config, CliError> {
    let config = Config::load(path).map_err(CliError::Config)?;

    let issues = config.validate();
    for issue in &issues {
        warn!("Config: {}", issue);
    }
    if strict && !issues.is_empty() {
        return Err(CliError::Config(anyhow::anyhow!(
            "{} configuration issue(s) found: {}",
            issues.len(),
            issues.join("; ")
        )));
    }
    Ok(config)
}

fn load_rows(config: &Config, input: Option<PathBuf>) -> Result<Vec<RowRecord>, CliError> {
    let path = input
        .or_else(|| config.data.input_file.clone())
        .ok_or_else(|| {
            CliError::Config(anyhow::anyhow!(
                "No input file: pass --input or set data.input_file"
            ))
        })?;
    Ok(read_rows(&path, config.data.sheet_name.as_deref())?)
}

async fn handle_run(
    config_path: &Path,
    input: Option<PathBuf>,
    output: Option<String>,
    strict: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path, strict)?;
    let rows = load_rows(&config, input)?;
    if rows.is_empty() {
        warn!("Input contains no rows; nothing to do");
        return Ok(());
    }

    let writer = ResultWriter::new(output.as_deref().unwrap_or(&config.data.output_file))?;
    let dictionary = DictionaryClient::new(config.dictionary.clone())?;

    let settings = &config.browser;
    let browser = Browser::connect(
        settings.browser,
        settings.webdriver_url(),
        settings.window().map_err(CliError::Config)?,
        settings.headless,
    )
    .await
    .map_err(|e| CliError::WebDriverFailed(format!("{:#}", e)))?;

    let outcome = drive(&browser, &dictionary, &config, &rows).await;

    if let Err(e) = browser.close().await {
        warn!("Failed to close the browser session: {}", e);
    }

    let (results, summary) = outcome?;
    writer.write(&results)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "summary": summary,
            "output": writer.path().display().to_string(),
        }))
        .context("Failed to serialize the summary")?
    );
    Ok(())
}

async fn drive(
    browser: &Browser,
    dictionary: &DictionaryClient,
    config: &Config,
    rows: &[RowRecord],
) -> Result<(Vec<RowResult>, BatchSummary), CliError> {
    let timings = &config.timings;

    if config.login.enabled {
        login::login(browser, &config.login, timings)
            .await
            .map_err(|e| CliError::Login(format!("{:#}", e)))?;
    } else if let Some(url) = &config.website_url {
        info!("Opening {}", url);
        browser
            .goto(url)
            .await
            .map_err(|e| CliError::Login(e.to_string()))?;
    }

    login::navigate(browser, &config.navigation, timings)
        .await
        .map_err(|e| CliError::Login(format!("{:#}", e)))?;

    Ok(runner::run_batch(browser, dictionary, config, rows).await)
}

fn handle_validate(config_path: &Path, input: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(config_path, false)?;
    let issues = config.validate();

    let mut report = json!({
        "config": config_path.display().to_string(),
        "form_elements": config.form_elements.len(),
        "issues": issues,
    });

    if input.is_some() || config.data.input_file.is_some() {
        let rows = load_rows(&config, input)?;
        let mut unmapped: Vec<String> = rows
            .iter()
            .flat_map(|row| config.check_row_keys(row))
            .collect();
        unmapped.sort();
        unmapped.dedup();
        report["rows"] = json!(rows.len());
        report["unmapped_columns"] = json!(unmapped);
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize the report")?
    );
    Ok(())
}

fn handle_parse_dosage(text: &str) -> Result<(), CliError> {
    let breakdown = dosage::parse(text);
    let report = json!({
        "input": text,
        "dose_value": breakdown.dose_value,
        "dose_unit": breakdown.dose_unit,
        "frequency": breakdown.frequency,
        "dose_unit_code": normalize::normalize(&breakdown.dose_unit, CodeCategory::Dose),
        "frequency_code": normalize::normalize(&breakdown.frequency, CodeCategory::Frequency),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize the breakdown")?
    );
    Ok(())
}
