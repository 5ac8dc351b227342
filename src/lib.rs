//! ValueForge: customer value analytics over order histories
//!
//! This library scores customers by Recency, Frequency and Monetary value,
//! estimates customer lifetime value, tracks signup cohorts over time and
//! groups customers into behavioral segments using K-Means clustering.

pub mod cli;
pub mod clv;
pub mod cohort;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod insights;
pub mod model;
pub mod pipeline;
pub mod quantile;
pub mod report;
pub mod rfm;
pub mod segmentation;

// Re-export public items for easier access
pub use cli::Args;
pub use clv::{ClvAnalyzer, ClvRecord, ClvSegment};
pub use cohort::{CohortAnalyzer, CohortPeriod, PeriodGranularity, RetentionMatrix};
pub use config::AnalyticsConfig;
pub use data::{load_customers, load_orders, Customer, Order, RfmData};
pub use error::{AnalyticsError, AnalyticsResult};
pub use model::{fit_kmeans, KMeansModel};
pub use pipeline::{run_pipeline, AnalyticsPipeline, AnalyticsReport};
pub use rfm::{RfmAnalyzer, RfmRecord, RfmSegment};
pub use segmentation::{BehavioralSegmentName, SegmentationAnalyzer};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
