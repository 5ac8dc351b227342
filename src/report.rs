//! Console summaries of an analytics run

use crate::cohort::RetentionMatrix;
use crate::insights::InsightReport;
use crate::pipeline::AnalyticsReport;
use crate::segmentation::SegmentationResult;
use std::collections::BTreeMap;

fn print_recommendations(recommendations: &BTreeMap<String, Vec<String>>) {
    for (segment, actions) in recommendations {
        println!("  {segment}:");
        for action in actions {
            println!("    - {action}");
        }
    }
}

pub fn print_rfm_summary(report: &AnalyticsReport) {
    let InsightReport {
        overall, segments, ..
    } = &report.rfm_insights;

    println!("\n=== RFM Segments ===");
    println!("Reference date: {}", report.reference_date);
    println!(
        "Customers: {} ({} with orders)",
        overall.total_customers, overall.customers_with_orders
    );
    println!("Total revenue: {:.2}", overall.total_revenue);
    println!(
        "Average R/F/M of buyers: {:.1} days, {:.2} orders, {:.2}",
        overall.avg_recency, overall.avg_frequency, overall.avg_monetary
    );

    println!("\n  Segment               | Customers | Avg Monetary | Share");
    println!("  ----------------------|-----------|--------------|-------");
    for (segment, summary) in segments {
        println!(
            "  {:21} | {:9} | {:12.2} | {:5.1}%",
            segment, summary.customer_count, summary.avg_value, summary.contribution_pct
        );
    }
}

pub fn print_clv_summary(report: &AnalyticsReport) {
    let insights = &report.clv_insights;

    println!("\n=== Customer Lifetime Value ===");
    println!("Total predicted CLV: {:.2}", insights.overall.total_predicted_clv);
    println!(
        "Average CLV: {:.2} (median {:.2})",
        insights.overall.average_clv, insights.overall.median_clv
    );
    for (segment, summary) in &insights.segments {
        println!(
            "  {}: {} customers, avg {:.2}, {:.1}% of value",
            segment, summary.customer_count, summary.avg_value, summary.contribution_pct
        );
    }
}

/// Retention matrix with one column per period number
pub fn print_retention_matrix(matrix: &RetentionMatrix) {
    print!("  {:23} | {:>5}", "Cohort", "Size");
    for period in &matrix.periods {
        print!(" | {:>5}", format!("P{period}"));
    }
    println!();
    for row in &matrix.rows {
        print!("  {:23} | {:5}", row.cohort_group.to_string(), row.total_customers);
        for rate in &row.rates {
            print!(" | {:4.0}%", rate * 100.0);
        }
        println!();
    }
}

pub fn print_cohort_summary(report: &AnalyticsReport) {
    let overall = &report.cohort_insights.overall;

    println!("\n=== Cohort Retention ===");
    println!(
        "{} cohorts covering {} customers",
        overall.cohort_count, overall.total_customers
    );
    print_retention_matrix(&report.retention);
    for insight in &overall.business_insights {
        println!("  * {insight}");
    }
    for ltv in &report.cohort_ltv {
        println!("  LTV {}: {:.2}", ltv.cohort_group, ltv.ltv);
    }
}

/// Cluster sizes, per-k diagnostics and profiles
pub fn print_segmentation_statistics(result: &SegmentationResult) {
    println!("\n=== Behavioral Segments ===");
    println!("Number of clusters: {}", result.optimal_k);
    println!("Total customers: {}", result.records.len());
    println!("Within-cluster sum of squares (Inertia): {:.2}", result.inertia);
    println!("Silhouette score: {:.3}", result.silhouette);

    println!("\nCandidates:");
    for candidate in &result.candidates {
        println!(
            "  k={}: inertia {:.2}, silhouette {:.3}",
            candidate.k, candidate.inertia, candidate.silhouette
        );
    }

    println!("\nCluster profiles:");
    println!("  Cluster | Name                  | Size  | Recency | Frequency | Monetary");
    println!("  --------|-----------------------|-------|---------|-----------|----------");
    for profile in &result.profiles {
        println!(
            "  {:7} | {:21} | {:5} | {:7.1} | {:9.2} | {:8.2}",
            profile.cluster_id,
            profile.name.as_str(),
            profile.customer_count,
            profile.means.recency,
            profile.means.frequency,
            profile.means.monetary
        );
    }
}

/// Every section of the report, followed by recommended actions
pub fn print_report(report: &AnalyticsReport) {
    println!(
        "Analyzed {} customers and {} orders",
        report.customer_count, report.order_count
    );
    print_rfm_summary(report);
    print_clv_summary(report);
    print_cohort_summary(report);
    if let Some(result) = &report.segmentation {
        print_segmentation_statistics(result);
    }

    let demographics = &report.segmentation_insights.overall;
    if !demographics.age_distribution.is_empty() {
        println!("\nAge groups:");
        for (group, count) in &demographics.age_distribution {
            println!("  {group}: {count}");
        }
    }

    println!("\n=== Recommendations ===");
    print_recommendations(&report.rfm_insights.recommendations);
    print_recommendations(&report.clv_insights.recommendations);
    print_recommendations(&report.cohort_insights.recommendations);
    print_recommendations(&report.segmentation_insights.recommendations);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalyticsConfig, RfmConfig};
    use crate::data::{Customer, Order};
    use crate::pipeline::run_pipeline;
    use chrono::NaiveDate;

    #[test]
    fn test_print_report() {
        let day = |m, d| NaiveDate::from_ymd_opt(2024, m, d).unwrap();
        let customers = vec![
            Customer::new("A", day(1, 2)),
            Customer::new("B", day(1, 9)),
            Customer::new("C", day(2, 1)),
        ];
        let orders = vec![
            Order::new("O1", "A", day(1, 3), 50.0),
            Order::new("O2", "B", day(2, 11), 75.0),
            Order::new("O3", "A", day(3, 8), 20.0),
        ];
        let config = AnalyticsConfig {
            rfm: RfmConfig {
                reference_date: Some(day(4, 1)),
                ..RfmConfig::default()
            },
            ..AnalyticsConfig::default()
        };

        let report = run_pipeline(config, &customers, &orders).unwrap();
        // Should not panic
        print_report(&report);
    }
}
