//! Command-line interface definitions and argument parsing

use crate::cohort::PeriodGranularity;
use crate::config::AnalyticsConfig;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// Customer value analytics: RFM, CLV, cohort retention and behavioral segments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the customer CSV (customer_id, signup_date, age, gender, region)
    #[arg(short, long)]
    pub customers: PathBuf,

    /// Path to the order CSV (order_id, customer_id, order_date, final_amount)
    #[arg(short = 'r', long)]
    pub orders: PathBuf,

    /// JSON configuration file; missing keys use defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Reference date for recency (YYYY-MM-DD), defaults to today
    #[arg(long, value_parser = parse_reference_date)]
    pub reference_date: Option<NaiveDate>,

    /// Cohort period granularity: monthly, weekly or daily
    #[arg(long)]
    pub period: Option<PeriodGranularity>,

    /// Random seed for clustering
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output path for the JSON report
    #[arg(short, long, default_value = "report.json")]
    pub output: PathBuf,

    /// Directory to write every derived table as CSV
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Prediction mode: provide R,F,M values as comma-separated string
    /// Example: --predict "30,10,500.0" for Recency=30, Frequency=10, Monetary=500.0
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_reference_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got '{raw}': {e}"))
}

impl Args {
    /// Parse RFM values from the predict string
    /// Expected format: "recency,frequency,monetary"
    pub fn parse_rfm_values(&self) -> crate::Result<Option<(f64, f64, f64)>> {
        if let Some(ref predict_str) = self.predict {
            let parts: Vec<&str> = predict_str.split(',').collect();
            if parts.len() != 3 {
                anyhow::bail!("Predict values must be in format 'recency,frequency,monetary'");
            }

            let recency: f64 = parts[0]
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid recency value: {}", parts[0]))?;
            let frequency: f64 = parts[1]
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid frequency value: {}", parts[1]))?;
            let monetary: f64 = parts[2]
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid monetary value: {}", parts[2]))?;

            Ok(Some((recency, frequency, monetary)))
        } else {
            Ok(None)
        }
    }

    /// Configuration from `--config` (or defaults) with flag overrides applied
    pub fn analytics_config(&self) -> crate::Result<AnalyticsConfig> {
        let mut config = match &self.config {
            Some(path) => AnalyticsConfig::from_json_file(path)?,
            None => AnalyticsConfig::default(),
        };

        if let Some(date) = self.reference_date {
            config.rfm.reference_date = Some(date);
        }
        if let Some(period) = self.period {
            config.cohort.period = period;
        }
        if let Some(seed) = self.seed {
            config.segmentation.random_seed = seed;
        }

        config.validate()?;
        Ok(config)
    }
}
