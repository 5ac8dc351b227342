//! Analysis configuration passed explicitly into each engine

use crate::cohort::PeriodGranularity;
use crate::error::{AnalyticsError, AnalyticsResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for one analysis run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub rfm: RfmConfig,
    pub clv: ClvConfig,
    pub cohort: CohortConfig,
    pub segmentation: SegmentationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RfmConfig {
    /// Date recency is measured against; `None` means today (UTC)
    pub reference_date: Option<NaiveDate>,
    /// Recency assigned to customers without any order
    pub no_order_recency: i64,
}

impl Default for RfmConfig {
    fn default() -> Self {
        Self {
            reference_date: None,
            no_order_recency: 999,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClvConfig {
    pub days_per_month: f64,
    /// Predicted lifespan as a multiple of the observed lifespan
    pub lifespan_multiplier: f64,
    pub min_lifespan_months: f64,
    pub max_lifespan_months: f64,
    /// Lifespan reported for customers with no orders
    pub default_lifespan_months: f64,
    pub recent_window_days: i64,
    /// End of the comparison window, counted back from the latest order
    pub previous_window_days: i64,
    /// Fraction of the spending growth rate applied to the trend multiplier
    pub growth_dampening: f64,
    pub min_trend_multiplier: f64,
    pub max_trend_multiplier: f64,
    pub high_value_percentile: f64,
    pub low_value_percentile: f64,
}

impl Default for ClvConfig {
    fn default() -> Self {
        Self {
            days_per_month: 30.44,
            lifespan_multiplier: 1.5,
            min_lifespan_months: 1.0,
            max_lifespan_months: 60.0,
            default_lifespan_months: 12.0,
            recent_window_days: 180,
            previous_window_days: 360,
            growth_dampening: 0.5,
            min_trend_multiplier: 0.5,
            max_trend_multiplier: 2.0,
            high_value_percentile: 0.8,
            low_value_percentile: 0.2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortConfig {
    pub period: PeriodGranularity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub min_clusters: usize,
    pub max_clusters: usize,
    pub random_seed: u64,
    /// K-Means restarts per fit; the best run by inertia is kept
    pub n_runs: usize,
    pub max_iterations: u64,
    pub tolerance: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_clusters: 2,
            max_clusters: 7,
            random_seed: 42,
            n_runs: 10,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

impl AnalyticsConfig {
    /// Load a configuration from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> AnalyticsResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: AnalyticsConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        log::debug!("loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Check value ranges that the engines rely on
    pub fn validate(&self) -> AnalyticsResult<()> {
        let clv = &self.clv;
        if clv.days_per_month <= 0.0 {
            return Err(invalid("clv.days_per_month must be positive"));
        }
        if clv.min_lifespan_months > clv.max_lifespan_months {
            return Err(invalid(
                "clv.min_lifespan_months must not exceed clv.max_lifespan_months",
            ));
        }
        if clv.recent_window_days <= 0 || clv.previous_window_days <= clv.recent_window_days {
            return Err(invalid(
                "clv windows must satisfy 0 < recent_window_days < previous_window_days",
            ));
        }
        if clv.min_trend_multiplier > clv.max_trend_multiplier {
            return Err(invalid(
                "clv.min_trend_multiplier must not exceed clv.max_trend_multiplier",
            ));
        }
        if !(0.0..=1.0).contains(&clv.low_value_percentile)
            || !(0.0..=1.0).contains(&clv.high_value_percentile)
            || clv.low_value_percentile > clv.high_value_percentile
        {
            return Err(invalid(
                "clv percentiles must satisfy 0 <= low_value_percentile <= high_value_percentile <= 1",
            ));
        }

        let seg = &self.segmentation;
        if seg.min_clusters < 2 {
            return Err(invalid("segmentation.min_clusters must be at least 2"));
        }
        if seg.max_clusters < seg.min_clusters {
            return Err(invalid(
                "segmentation.max_clusters must not be below segmentation.min_clusters",
            ));
        }
        if seg.n_runs == 0 || seg.max_iterations == 0 {
            return Err(invalid(
                "segmentation.n_runs and segmentation.max_iterations must be positive",
            ));
        }
        if seg.tolerance <= 0.0 {
            return Err(invalid("segmentation.tolerance must be positive"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> AnalyticsError {
    AnalyticsError::InvalidConfig(message.to_string())
}
