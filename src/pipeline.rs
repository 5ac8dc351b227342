//! Sequences the engines over one customer and order table

use crate::clv::{ClvAnalyzer, ClvInsights, ClvRecord};
use crate::cohort::{
    CohortAnalyzer, CohortInsights, CohortLtv, CohortLtvPoint, CohortRecord, RetentionMatrix,
    RevenueCohortRecord,
};
use crate::config::AnalyticsConfig;
use crate::data::{Customer, Order};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::rfm::{RfmAnalyzer, RfmInsights, RfmRecord};
use crate::segmentation::{
    BehavioralSegmentName, DemographicRecord, SegmentationAnalyzer, SegmentationInsights,
    SegmentationResult,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;

/// Every derived table and insight report of one run
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub reference_date: NaiveDate,
    pub customer_count: usize,
    pub order_count: usize,
    pub rfm: Vec<RfmRecord>,
    pub rfm_insights: RfmInsights,
    pub clv: Vec<ClvRecord>,
    pub clv_insights: ClvInsights,
    pub cohorts: Vec<CohortRecord>,
    pub retention: RetentionMatrix,
    pub revenue_cohorts: Vec<RevenueCohortRecord>,
    pub ltv_curve: Vec<CohortLtvPoint>,
    pub cohort_ltv: Vec<CohortLtv>,
    pub cohort_insights: CohortInsights,
    /// None when there are too few customers to cluster
    pub segmentation: Option<SegmentationResult>,
    pub demographics: Vec<DemographicRecord>,
    pub segmentation_insights: SegmentationInsights,
}

impl AnalyticsReport {
    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: impl AsRef<Path>) -> AnalyticsResult<()> {
        let file = std::fs::File::create(path.as_ref())?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        log::info!("report written to {}", path.as_ref().display());
        Ok(())
    }
}

/// Owns one engine of each kind, configured from a single [`AnalyticsConfig`]
pub struct AnalyticsPipeline {
    rfm: RfmAnalyzer,
    clv: ClvAnalyzer,
    cohort: CohortAnalyzer,
    segmentation: SegmentationAnalyzer,
}

impl AnalyticsPipeline {
    pub fn new(config: AnalyticsConfig) -> AnalyticsResult<Self> {
        config.validate()?;
        Ok(Self {
            rfm: RfmAnalyzer::new(config.rfm),
            clv: ClvAnalyzer::new(config.clv),
            cohort: CohortAnalyzer::new(config.cohort),
            segmentation: SegmentationAnalyzer::new(config.segmentation),
        })
    }

    /// RFM, CLV, cohort and segmentation analyses in that order
    pub fn run(&mut self, customers: &[Customer], orders: &[Order]) -> AnalyticsResult<AnalyticsReport> {
        if customers.is_empty() {
            return Err(AnalyticsError::InsufficientData(
                "customer table is empty".to_string(),
            ));
        }
        log::info!(
            "running analytics over {} customers and {} orders",
            customers.len(),
            orders.len()
        );

        let rfm = self.rfm.analyze(orders, customers)?.to_vec();
        let rfm_insights = self.rfm.insights()?;

        let clv = self.clv.analyze(orders, customers)?.to_vec();
        let clv_insights = self.clv.insights()?;

        let retention = self.cohort.analyze(customers, orders)?.clone();
        let cohorts = self.cohort.cohort_data().to_vec();
        let revenue_cohorts = self.cohort.analyze_revenue_cohorts(customers, orders);
        let (ltv_curve, cohort_ltv) = CohortAnalyzer::calculate_ltv_by_cohort(&revenue_cohorts);
        let cohort_insights = self.cohort.insights()?;

        let segmentation = match self.segmentation.behavioral_segmentation(&rfm) {
            Ok(result) => Some(result.clone()),
            Err(AnalyticsError::InsufficientData(reason)) => {
                log::warn!("skipping behavioral segmentation: {reason}");
                None
            }
            Err(e) => return Err(e),
        };
        let demographics = self.segmentation.demographic_segmentation(customers).to_vec();
        let segmentation_insights = self.segmentation.insights()?;

        Ok(AnalyticsReport {
            reference_date: self.rfm.reference_date(),
            customer_count: customers.len(),
            order_count: orders.len(),
            rfm,
            rfm_insights,
            clv,
            clv_insights,
            cohorts,
            retention,
            revenue_cohorts,
            ltv_curve,
            cohort_ltv,
            cohort_insights,
            segmentation,
            demographics,
            segmentation_insights,
        })
    }

    /// Behavioral segment of a new (recency, frequency, monetary) triple
    pub fn predict_segment(
        &self,
        recency: f64,
        frequency: f64,
        monetary: f64,
    ) -> AnalyticsResult<(usize, BehavioralSegmentName)> {
        self.segmentation.predict_segment(recency, frequency, monetary)
    }

    pub fn segmentation(&self) -> &SegmentationAnalyzer {
        &self.segmentation
    }
}

/// Run every analysis once with a fresh pipeline
pub fn run_pipeline(
    config: AnalyticsConfig,
    customers: &[Customer],
    orders: &[Order],
) -> AnalyticsResult<AnalyticsReport> {
    AnalyticsPipeline::new(config)?.run(customers, orders)
}
