//! ValueForge: customer value analytics CLI
//!
//! This is the main entrypoint that orchestrates data loading, the analytics
//! pipeline, report output, and segment prediction.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Instant;
use valueforge::{
    export, load_customers, load_orders, report, AnalyticsConfig, AnalyticsPipeline, Args,
    Customer, Order,
};

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if args.verbose {
        println!("ValueForge - Customer Value Analytics");
        println!("=====================================\n");
    }

    let config = args.analytics_config()?;

    // Check if in prediction mode
    if let Some(rfm_values) = args.parse_rfm_values()? {
        run_prediction_mode(&args, config, rfm_values)?;
    } else {
        run_full_pipeline(&args, config)?;
    }

    Ok(())
}

fn load_inputs(args: &Args) -> Result<(Vec<Customer>, Vec<Order>)> {
    let customers = load_customers(&args.customers).with_context(|| {
        format!("failed to load customers from {}", args.customers.display())
    })?;
    let orders = load_orders(&args.orders)
        .with_context(|| format!("failed to load orders from {}", args.orders.display()))?;
    println!(
        "✓ Data loaded: {} customers, {} orders",
        customers.len(),
        orders.len()
    );
    Ok((customers, orders))
}

/// Run prediction mode for a single customer
fn run_prediction_mode(
    args: &Args,
    config: AnalyticsConfig,
    rfm_values: (f64, f64, f64),
) -> Result<()> {
    println!("=== Prediction Mode ===");
    println!(
        "Input RFM values: R={}, F={}, M={}",
        rfm_values.0, rfm_values.1, rfm_values.2
    );

    let start_time = Instant::now();

    let (customers, orders) = load_inputs(args)?;
    let mut pipeline = AnalyticsPipeline::new(config)?;
    pipeline.run(&customers, &orders)?;

    let (cluster, name) = pipeline
        .predict_segment(rfm_values.0, rfm_values.1, rfm_values.2)
        .context("segment prediction needs a fitted behavioral model")?;

    let elapsed = start_time.elapsed();

    println!("\n✓ Predicted Segment: {} (cluster {})", name, cluster);
    println!("  Processing time: {:.2}s", elapsed.as_secs_f64());

    // Show cluster context
    if let Some(result) = pipeline.segmentation().result() {
        if let Some(profile) = result.profiles.iter().find(|p| p.cluster_id == cluster) {
            let percentage =
                profile.customer_count as f64 / result.records.len() as f64 * 100.0;
            println!("\nCluster {} details:", cluster);
            println!(
                "  Size: {} customers ({:.1}% of total)",
                profile.customer_count, percentage
            );
            println!(
                "  Mean profile: R={:.1}, F={:.2}, M={:.2}",
                profile.means.recency, profile.means.frequency, profile.means.monetary
            );
        }
    }

    Ok(())
}

/// Run the full analytics pipeline
fn run_full_pipeline(args: &Args, config: AnalyticsConfig) -> Result<()> {
    println!("=== Customer Value Analytics ===\n");

    let start_time = Instant::now();

    let (customers, orders) = load_inputs(args)?;

    let analysis_start = Instant::now();
    let mut pipeline = AnalyticsPipeline::new(config)?;
    let analytics = pipeline.run(&customers, &orders)?;
    if args.verbose {
        println!(
            "  Analysis time: {:.2}s",
            analysis_start.elapsed().as_secs_f64()
        );
    }

    report::print_report(&analytics);

    analytics
        .write_json(&args.output)
        .with_context(|| format!("failed to write report to {}", args.output.display()))?;
    println!("\n✓ Report saved to: {}", args.output.display());

    if let Some(dir) = &args.export_dir {
        let written = export::export_report(&analytics, dir)
            .with_context(|| format!("failed to export tables to {}", dir.display()))?;
        println!("✓ {} tables exported to: {}", written.len(), dir.display());
    }

    let total_time = start_time.elapsed();
    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());

    Ok(())
}
