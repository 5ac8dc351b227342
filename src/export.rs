//! Polars DataFrame builders and CSV writers for the derived tables

use crate::clv::ClvRecord;
use crate::cohort::{CohortLtvPoint, CohortRecord, RetentionMatrix, RevenueCohortRecord};
use crate::error::AnalyticsResult;
use crate::pipeline::AnalyticsReport;
use crate::rfm::RfmRecord;
use crate::segmentation::{BehavioralRecord, DemographicRecord};
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

fn date_column(name: &str, dates: impl Iterator<Item = Option<NaiveDate>>) -> Series {
    let values: Vec<Option<String>> = dates
        .map(|date| date.map(|d| d.format("%Y-%m-%d").to_string()))
        .collect();
    Series::new(name, values)
}

fn count_column(name: &str, counts: impl Iterator<Item = usize>) -> Series {
    let values: Vec<u64> = counts.map(|count| count as u64).collect();
    Series::new(name, values)
}

pub fn rfm_frame(records: &[RfmRecord]) -> AnalyticsResult<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new(
            "customer_id",
            records.iter().map(|r| r.customer.customer_id.clone()).collect::<Vec<_>>(),
        ),
        date_column("last_order_date", records.iter().map(|r| r.last_order_date)),
        Series::new("recency", records.iter().map(|r| r.recency).collect::<Vec<_>>()),
        Series::new("frequency", records.iter().map(|r| r.frequency).collect::<Vec<_>>()),
        Series::new("monetary", records.iter().map(|r| r.monetary).collect::<Vec<_>>()),
        Series::new("r_score", records.iter().map(|r| u32::from(r.r_score)).collect::<Vec<_>>()),
        Series::new("f_score", records.iter().map(|r| u32::from(r.f_score)).collect::<Vec<_>>()),
        Series::new("m_score", records.iter().map(|r| u32::from(r.m_score)).collect::<Vec<_>>()),
        Series::new("rfm_score", records.iter().map(|r| r.rfm_score.clone()).collect::<Vec<_>>()),
        Series::new("rfm_avg_score", records.iter().map(|r| r.rfm_avg_score).collect::<Vec<_>>()),
        Series::new(
            "segment",
            records
                .iter()
                .map(|r| r.segment.map(|s| s.as_str().to_string()))
                .collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

pub fn clv_frame(records: &[ClvRecord]) -> AnalyticsResult<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new(
            "customer_id",
            records.iter().map(|r| r.customer.customer_id.clone()).collect::<Vec<_>>(),
        ),
        Series::new("total_spent", records.iter().map(|r| r.total_spent).collect::<Vec<_>>()),
        Series::new(
            "avg_order_value",
            records.iter().map(|r| r.avg_order_value).collect::<Vec<_>>(),
        ),
        Series::new(
            "purchase_count",
            records.iter().map(|r| r.purchase_count).collect::<Vec<_>>(),
        ),
        date_column("first_purchase", records.iter().map(|r| r.first_purchase)),
        date_column("last_purchase", records.iter().map(|r| r.last_purchase)),
        Series::new("lifespan_days", records.iter().map(|r| r.lifespan_days).collect::<Vec<_>>()),
        Series::new(
            "monthly_frequency",
            records.iter().map(|r| r.monthly_frequency).collect::<Vec<_>>(),
        ),
        Series::new(
            "predicted_lifespan_months",
            records.iter().map(|r| r.predicted_lifespan_months).collect::<Vec<_>>(),
        ),
        Series::new(
            "historical_clv",
            records.iter().map(|r| r.historical_clv).collect::<Vec<_>>(),
        ),
        Series::new(
            "spending_growth_rate",
            records.iter().map(|r| r.spending_growth_rate).collect::<Vec<_>>(),
        ),
        Series::new(
            "trend_multiplier",
            records.iter().map(|r| r.trend_multiplier).collect::<Vec<_>>(),
        ),
        Series::new(
            "predictive_clv",
            records.iter().map(|r| r.predictive_clv).collect::<Vec<_>>(),
        ),
        Series::new(
            "clv_percentile",
            records.iter().map(|r| r.clv_percentile).collect::<Vec<_>>(),
        ),
        Series::new(
            "clv_segment",
            records
                .iter()
                .map(|r| r.clv_segment.map(|s| s.as_str().to_string()))
                .collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

pub fn cohort_frame(records: &[CohortRecord]) -> AnalyticsResult<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new(
            "cohort_group",
            records.iter().map(|r| r.cohort_group.to_string()).collect::<Vec<_>>(),
        ),
        Series::new("period_number", records.iter().map(|r| r.period_number).collect::<Vec<_>>()),
        count_column("active_customers", records.iter().map(|r| r.active_customers)),
        count_column("total_customers", records.iter().map(|r| r.total_customers)),
        Series::new(
            "retention_rate",
            records.iter().map(|r| r.retention_rate).collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

/// One row per cohort, one `period_<n>` column per period number
pub fn retention_frame(matrix: &RetentionMatrix) -> AnalyticsResult<DataFrame> {
    let mut columns = vec![
        Series::new(
            "cohort_group",
            matrix
                .rows
                .iter()
                .map(|row| row.cohort_group.to_string())
                .collect::<Vec<_>>(),
        ),
        count_column("total_customers", matrix.rows.iter().map(|row| row.total_customers)),
    ];
    for (column, period) in matrix.periods.iter().enumerate() {
        let rates: Vec<f64> = matrix.rows.iter().map(|row| row.rates[column]).collect();
        columns.push(Series::new(&format!("period_{period}"), rates));
    }
    Ok(DataFrame::new(columns)?)
}

pub fn revenue_cohort_frame(records: &[RevenueCohortRecord]) -> AnalyticsResult<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new(
            "cohort_group",
            records.iter().map(|r| r.cohort_group.to_string()).collect::<Vec<_>>(),
        ),
        Series::new("period_number", records.iter().map(|r| r.period_number).collect::<Vec<_>>()),
        Series::new("total_revenue", records.iter().map(|r| r.total_revenue).collect::<Vec<_>>()),
        Series::new(
            "avg_revenue_per_order",
            records.iter().map(|r| r.avg_revenue_per_order).collect::<Vec<_>>(),
        ),
        count_column("active_customers", records.iter().map(|r| r.active_customers)),
        Series::new(
            "avg_revenue_per_customer",
            records.iter().map(|r| r.avg_revenue_per_customer).collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

pub fn cohort_ltv_frame(points: &[CohortLtvPoint]) -> AnalyticsResult<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new(
            "cohort_group",
            points.iter().map(|p| p.cohort_group.to_string()).collect::<Vec<_>>(),
        ),
        Series::new("period_number", points.iter().map(|p| p.period_number).collect::<Vec<_>>()),
        Series::new(
            "avg_revenue_per_customer",
            points.iter().map(|p| p.avg_revenue_per_customer).collect::<Vec<_>>(),
        ),
        Series::new(
            "cumulative_revenue_per_customer",
            points
                .iter()
                .map(|p| p.cumulative_revenue_per_customer)
                .collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

pub fn behavioral_frame(records: &[BehavioralRecord]) -> AnalyticsResult<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new(
            "customer_id",
            records
                .iter()
                .map(|r| r.rfm.customer.customer_id.clone())
                .collect::<Vec<_>>(),
        ),
        Series::new("recency", records.iter().map(|r| r.rfm.recency).collect::<Vec<_>>()),
        Series::new("frequency", records.iter().map(|r| r.rfm.frequency).collect::<Vec<_>>()),
        Series::new("monetary", records.iter().map(|r| r.rfm.monetary).collect::<Vec<_>>()),
        count_column("behavioral_segment", records.iter().map(|r| r.behavioral_segment)),
        Series::new(
            "behavioral_segment_name",
            records
                .iter()
                .map(|r| r.behavioral_segment_name.as_str().to_string())
                .collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

pub fn demographic_frame(records: &[DemographicRecord]) -> AnalyticsResult<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new(
            "customer_id",
            records.iter().map(|r| r.customer_id.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "age_group",
            records.iter().map(|r| r.age_group.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "gender_age_segment",
            records.iter().map(|r| r.gender_age_segment.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "region_gender_segment",
            records.iter().map(|r| r.region_gender_segment.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "demographic_segment",
            records.iter().map(|r| r.demographic_segment.clone()).collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

/// Write a DataFrame as CSV with a header row
pub fn write_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> AnalyticsResult<()> {
    let mut file = File::create(path.as_ref())?;
    CsvWriter::new(&mut file).finish(df)?;
    log::debug!("wrote {} rows to {}", df.height(), path.as_ref().display());
    Ok(())
}

/// Write every table of a report into `dir`, returning the written paths
pub fn export_report(report: &AnalyticsReport, dir: impl AsRef<Path>) -> AnalyticsResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut tables = vec![
        ("rfm.csv", rfm_frame(&report.rfm)?),
        ("clv.csv", clv_frame(&report.clv)?),
        ("cohorts.csv", cohort_frame(&report.cohorts)?),
        ("retention.csv", retention_frame(&report.retention)?),
        ("revenue_cohorts.csv", revenue_cohort_frame(&report.revenue_cohorts)?),
        ("cohort_ltv.csv", cohort_ltv_frame(&report.ltv_curve)?),
        ("demographics.csv", demographic_frame(&report.demographics)?),
    ];
    if let Some(segmentation) = &report.segmentation {
        tables.push(("behavioral_segments.csv", behavioral_frame(&segmentation.records)?));
    }

    let mut written = Vec::with_capacity(tables.len());
    for (file_name, mut df) in tables {
        let path = dir.join(file_name);
        write_csv(&mut df, &path)?;
        written.push(path);
    }
    log::info!("exported {} tables to {}", written.len(), dir.display());
    Ok(written)
}
