//! Customer lifetime value: historical, trend-adjusted and tiered

use crate::config::ClvConfig;
use crate::data::{Customer, Order};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::insights::{mean, median, recommendation_map, summarize_segments, InsightReport};
use crate::quantile::percentile_ranks;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Value tier assigned from the predictive CLV percentile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClvSegment {
    #[serde(rename = "High Value")]
    HighValue,
    #[serde(rename = "Medium Value")]
    MediumValue,
    #[serde(rename = "Low Value")]
    LowValue,
}

impl ClvSegment {
    /// Tier label as it appears in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighValue => "High Value",
            Self::MediumValue => "Medium Value",
            Self::LowValue => "Low Value",
        }
    }
}

impl fmt::Display for ClvSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a [`ClvAnalyzer`]; each step requires the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClvStage {
    Uninitialized,
    Historical,
    Predictive,
    Segmented,
}

/// Customer row augmented with CLV estimates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClvRecord {
    #[serde(flatten)]
    pub customer: Customer,
    pub total_spent: f64,
    pub avg_order_value: f64,
    pub purchase_count: u32,
    pub first_purchase: Option<NaiveDate>,
    pub last_purchase: Option<NaiveDate>,
    /// Days between first and last purchase, at least 1 for buyers
    pub lifespan_days: i64,
    pub monthly_frequency: f64,
    pub predicted_lifespan_months: f64,
    pub historical_clv: f64,
    pub spending_growth_rate: f64,
    pub trend_multiplier: f64,
    pub predictive_clv: f64,
    pub clv_percentile: Option<f64>,
    pub clv_segment: Option<ClvSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClvOverview {
    pub total_predicted_clv: f64,
    pub average_clv: f64,
    pub median_clv: f64,
    pub total_customers: usize,
}

pub type ClvInsights = InsightReport<ClvOverview>;

#[derive(Debug)]
struct PurchaseStats {
    total: f64,
    count: u32,
    first: NaiveDate,
    last: NaiveDate,
}

/// Staged CLV engine
#[derive(Debug)]
pub struct ClvAnalyzer {
    config: ClvConfig,
    stage: ClvStage,
    records: Vec<ClvRecord>,
}

impl ClvAnalyzer {
    pub fn new(config: ClvConfig) -> Self {
        Self {
            config,
            stage: ClvStage::Uninitialized,
            records: Vec::new(),
        }
    }

    /// Last completed step
    pub fn stage(&self) -> ClvStage {
        self.stage
    }

    /// One record per customer, enriched by each completed step
    pub fn records(&self) -> &[ClvRecord] {
        &self.records
    }

    /// Historical CLV from each customer's purchase history
    ///
    /// CLV = average order value x monthly frequency x predicted lifespan,
    /// where the predicted lifespan is the observed lifespan stretched by the
    /// configured multiplier and clamped to the configured month range.
    ///
    /// # Arguments
    /// * `orders` - Order table; orders of unknown customers are ignored
    /// * `customers` - Customer table, one output record per row
    ///
    /// # Returns
    /// * One record per customer, in customer-table order. Customers without
    ///   orders get zero CLV and the default lifespan. The predictive CLV is
    ///   seeded with the historical value until the predictive step runs.
    pub fn calculate_historical_clv(
        &mut self,
        orders: &[Order],
        customers: &[Customer],
    ) -> AnalyticsResult<&[ClvRecord]> {
        log::info!("calculating historical CLV for {} customers", customers.len());

        let mut stats: HashMap<&str, PurchaseStats> = HashMap::new();
        for order in orders {
            stats
                .entry(order.customer_id.as_str())
                .and_modify(|s| {
                    s.total += order.final_amount;
                    s.count += 1;
                    s.first = s.first.min(order.order_date);
                    s.last = s.last.max(order.order_date);
                })
                .or_insert(PurchaseStats {
                    total: order.final_amount,
                    count: 1,
                    first: order.order_date,
                    last: order.order_date,
                });
        }

        let cfg = &self.config;
        self.records = customers
            .iter()
            .map(|customer| match stats.get(customer.customer_id.as_str()) {
                Some(s) => {
                    let lifespan_days = (s.last - s.first).num_days().max(1);
                    let lifespan_months = lifespan_days as f64 / cfg.days_per_month;
                    let monthly_frequency = if lifespan_months > 0.0 {
                        f64::from(s.count) / lifespan_months
                    } else {
                        1.0
                    };
                    let predicted_lifespan_months = (lifespan_months * cfg.lifespan_multiplier)
                        .clamp(cfg.min_lifespan_months, cfg.max_lifespan_months);
                    let avg_order_value = s.total / f64::from(s.count);
                    let historical_clv =
                        avg_order_value * monthly_frequency * predicted_lifespan_months;

                    ClvRecord {
                        customer: customer.clone(),
                        total_spent: s.total,
                        avg_order_value,
                        purchase_count: s.count,
                        first_purchase: Some(s.first),
                        last_purchase: Some(s.last),
                        lifespan_days,
                        monthly_frequency,
                        predicted_lifespan_months,
                        historical_clv,
                        spending_growth_rate: 0.0,
                        trend_multiplier: 1.0,
                        predictive_clv: historical_clv,
                        clv_percentile: None,
                        clv_segment: None,
                    }
                }
                None => ClvRecord {
                    customer: customer.clone(),
                    total_spent: 0.0,
                    avg_order_value: 0.0,
                    purchase_count: 0,
                    first_purchase: None,
                    last_purchase: None,
                    lifespan_days: 0,
                    monthly_frequency: 0.0,
                    predicted_lifespan_months: cfg.default_lifespan_months,
                    historical_clv: 0.0,
                    spending_growth_rate: 0.0,
                    trend_multiplier: 1.0,
                    predictive_clv: 0.0,
                    clv_percentile: None,
                    clv_segment: None,
                },
            })
            .collect();

        self.stage = ClvStage::Historical;
        log::info!("historical CLV done for {} customers", self.records.len());
        Ok(&self.records)
    }

    /// Adjust historical CLV by the recent-vs-previous spending trend
    ///
    /// Windows are anchored on the latest order date in `orders`. Customers
    /// without spending in the recent window keep a neutral multiplier.
    pub fn calculate_predictive_clv(&mut self, orders: &[Order]) -> AnalyticsResult<&[ClvRecord]> {
        if self.stage < ClvStage::Historical {
            return Err(AnalyticsError::precondition(
                "calculate_predictive_clv",
                "calculate_historical_clv",
            ));
        }
        log::info!("calculating predictive CLV");

        let mut recent: HashMap<&str, f64> = HashMap::new();
        let mut previous: HashMap<&str, f64> = HashMap::new();
        if let Some(latest) = orders.iter().map(|order| order.order_date).max() {
            let recent_start = latest - Duration::days(self.config.recent_window_days);
            let previous_start = latest - Duration::days(self.config.previous_window_days);
            for order in orders {
                let bucket = if order.order_date >= recent_start {
                    &mut recent
                } else if order.order_date >= previous_start {
                    &mut previous
                } else {
                    continue;
                };
                *bucket.entry(order.customer_id.as_str()).or_insert(0.0) += order.final_amount;
            }
        }

        let cfg = &self.config;
        for record in &mut self.records {
            let id = record.customer.customer_id.as_str();
            let (growth_rate, multiplier) = match recent.get(id) {
                Some(&recent_spending) => {
                    let previous_spending = previous.get(id).copied().unwrap_or(0.0);
                    let growth_rate = if previous_spending > 0.0 {
                        (recent_spending - previous_spending) / previous_spending
                    } else {
                        0.0
                    };
                    let multiplier = (1.0 + growth_rate * cfg.growth_dampening)
                        .clamp(cfg.min_trend_multiplier, cfg.max_trend_multiplier);
                    (growth_rate, multiplier)
                }
                None => (0.0, 1.0),
            };
            record.spending_growth_rate = growth_rate;
            record.trend_multiplier = multiplier;
            record.predictive_clv = record.historical_clv * multiplier;
        }

        self.stage = ClvStage::Predictive;
        log::info!(
            "predictive CLV done: {} customers with recent spending",
            recent.len()
        );
        Ok(&self.records)
    }

    /// Tier customers by predictive CLV percentile
    pub fn segment_customers_by_clv(&mut self) -> AnalyticsResult<&[ClvRecord]> {
        if self.stage < ClvStage::Predictive {
            return Err(AnalyticsError::precondition(
                "segment_customers_by_clv",
                "calculate_predictive_clv",
            ));
        }

        let values: Vec<f64> = self.records.iter().map(|r| r.predictive_clv).collect();
        let percentiles = percentile_ranks(&values);
        for (record, percentile) in self.records.iter_mut().zip(percentiles) {
            record.clv_percentile = Some(percentile);
            record.clv_segment = Some(if percentile >= self.config.high_value_percentile {
                ClvSegment::HighValue
            } else if percentile >= self.config.low_value_percentile {
                ClvSegment::MediumValue
            } else {
                ClvSegment::LowValue
            });
        }

        self.stage = ClvStage::Segmented;
        for (segment, summary) in &self.segment_summary() {
            log::debug!(
                "{segment}: {} customers, mean CLV {:.2}",
                summary.customer_count,
                summary.avg_value
            );
        }
        Ok(&self.records)
    }

    /// Historical, predictive and segmentation steps in order
    pub fn analyze(&mut self, orders: &[Order], customers: &[Customer]) -> AnalyticsResult<&[ClvRecord]> {
        self.calculate_historical_clv(orders, customers)?;
        self.calculate_predictive_clv(orders)?;
        self.segment_customers_by_clv()
    }

    fn segment_summary(&self) -> std::collections::BTreeMap<String, crate::insights::SegmentSummary> {
        summarize_segments(self.records.iter().filter_map(|record| {
            record
                .clv_segment
                .map(|segment| (segment.as_str(), record.predictive_clv))
        }))
    }

    pub fn insights(&self) -> AnalyticsResult<ClvInsights> {
        if self.stage < ClvStage::Predictive {
            return Err(AnalyticsError::precondition(
                "insights",
                "calculate_predictive_clv",
            ));
        }

        let values: Vec<f64> = self.records.iter().map(|r| r.predictive_clv).collect();
        let overall = ClvOverview {
            total_predicted_clv: values.iter().sum(),
            average_clv: mean(&values),
            median_clv: median(&values),
            total_customers: values.len(),
        };

        let segments = if self.stage == ClvStage::Segmented {
            self.segment_summary()
        } else {
            Default::default()
        };

        let recommendations = recommendation_map(&[
            (
                ClvSegment::HighValue.as_str(),
                &[
                    "Offer a VIP program",
                    "Provide personalized premium service",
                    "Give priority customer support",
                    "Offer exclusive products and discounts",
                ],
            ),
            (
                ClvSegment::MediumValue.as_str(),
                &[
                    "Upsell and cross-sell",
                    "Encourage loyalty program enrollment",
                    "Run regular promotions",
                    "Improve customer satisfaction",
                ],
            ),
            (
                ClvSegment::LowValue.as_str(),
                &[
                    "Maintain baseline service",
                    "Use cost-efficient marketing",
                    "Automate email campaigns",
                    "Run churn prevention programs",
                ],
            ),
        ]);

        Ok(InsightReport {
            overall,
            segments,
            recommendations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn customers(n: usize) -> Vec<Customer> {
        (0..n)
            .map(|i| Customer::new(format!("C{i}"), date(2023, 1, 1)))
            .collect()
    }

    #[test]
    fn test_historical_clv_formula() {
        let customers = customers(2);
        let orders = vec![
            Order::new("1", "C0", date(2024, 1, 1), 100.0),
            Order::new("2", "C0", date(2024, 3, 1), 300.0),
        ];
        let mut analyzer = ClvAnalyzer::new(ClvConfig::default());
        let records = analyzer.calculate_historical_clv(&orders, &customers).unwrap();

        let buyer = &records[0];
        assert_eq!(buyer.lifespan_days, 60);
        assert_eq!(buyer.avg_order_value, 200.0);
        let months = 60.0 / 30.44;
        assert!((buyer.monthly_frequency - 2.0 / months).abs() < 1e-9);
        assert!((buyer.predicted_lifespan_months - months * 1.5).abs() < 1e-9);
        let expected = 200.0 * (2.0 / months) * (months * 1.5);
        assert!((buyer.historical_clv - expected).abs() < 1e-9);

        let idle = &records[1];
        assert_eq!(idle.historical_clv, 0.0);
        assert_eq!(idle.monthly_frequency, 0.0);
        assert_eq!(idle.predicted_lifespan_months, 12.0);
    }

    #[test]
    fn test_single_order_lifespan_is_clamped() {
        let customers = customers(1);
        let orders = vec![Order::new("1", "C0", date(2024, 5, 5), 80.0)];
        let mut analyzer = ClvAnalyzer::new(ClvConfig::default());
        let records = analyzer.calculate_historical_clv(&orders, &customers).unwrap();

        assert_eq!(records[0].lifespan_days, 1);
        assert_eq!(records[0].predicted_lifespan_months, 1.0);
        assert!((records[0].historical_clv - 80.0 * 30.44).abs() < 1e-9);
    }

    #[test]
    fn test_trend_multiplier() {
        let customers = customers(4);
        let latest = date(2024, 12, 31);
        let recent = latest - Duration::days(10);
        let previous = latest - Duration::days(200);
        let orders = vec![
            // growth +2.0 -> multiplier clamps at 2.0
            Order::new("1", "C0", previous, 100.0),
            Order::new("2", "C0", recent, 300.0),
            // growth -0.5 -> multiplier 0.75
            Order::new("3", "C1", previous, 100.0),
            Order::new("4", "C1", recent, 50.0),
            // recent only -> growth 0
            Order::new("5", "C2", latest, 40.0),
            // previous only -> absent from recent window
            Order::new("6", "C3", previous, 70.0),
        ];
        let mut analyzer = ClvAnalyzer::new(ClvConfig::default());
        analyzer.calculate_historical_clv(&orders, &customers).unwrap();
        let records = analyzer.calculate_predictive_clv(&orders).unwrap();

        assert_eq!(records[0].spending_growth_rate, 2.0);
        assert_eq!(records[0].trend_multiplier, 2.0);
        assert_eq!(records[1].spending_growth_rate, -0.5);
        assert_eq!(records[1].trend_multiplier, 0.75);
        assert!((records[1].predictive_clv - records[1].historical_clv * 0.75).abs() < 1e-9);

        for record in &records[2..] {
            assert_eq!(record.spending_growth_rate, 0.0);
            assert_eq!(record.trend_multiplier, 1.0);
            assert_eq!(record.predictive_clv, record.historical_clv);
        }
    }

    #[test]
    fn test_value_tiers_split_twenty_sixty_twenty() {
        let customers = customers(10);
        let orders: Vec<Order> = (0..10)
            .map(|i| Order::new(format!("O{i}"), format!("C{i}"), date(2024, 6, 1), 10.0 * (i + 1) as f64))
            .collect();
        let mut analyzer = ClvAnalyzer::new(ClvConfig::default());
        let records = analyzer.analyze(&orders, &customers).unwrap();

        let tiers: Vec<ClvSegment> = records.iter().map(|r| r.clv_segment.unwrap()).collect();
        assert_eq!(tiers.iter().filter(|&&t| t == ClvSegment::HighValue).count(), 2);
        assert_eq!(tiers.iter().filter(|&&t| t == ClvSegment::LowValue).count(), 2);
        assert_eq!(tiers[9], ClvSegment::HighValue);
        assert_eq!(tiers[0], ClvSegment::LowValue);
        assert_eq!(analyzer.stage(), ClvStage::Segmented);
    }

    #[test]
    fn test_steps_out_of_order_fail() {
        let mut analyzer = ClvAnalyzer::new(ClvConfig::default());
        assert!(analyzer.calculate_predictive_clv(&[]).unwrap_err().is_precondition());
        assert!(analyzer.segment_customers_by_clv().unwrap_err().is_precondition());
        assert!(analyzer.insights().unwrap_err().is_precondition());

        analyzer.calculate_historical_clv(&[], &customers(3)).unwrap();
        assert!(analyzer.segment_customers_by_clv().unwrap_err().is_precondition());
    }

    #[test]
    fn test_insights_before_and_after_segmentation() {
        let customers = customers(5);
        let orders: Vec<Order> = (0..4)
            .map(|i| Order::new(format!("O{i}"), format!("C{i}"), date(2024, 6, 1), 25.0))
            .collect();
        let mut analyzer = ClvAnalyzer::new(ClvConfig::default());
        analyzer.calculate_historical_clv(&orders, &customers).unwrap();
        analyzer.calculate_predictive_clv(&orders).unwrap();

        let insights = analyzer.insights().unwrap();
        assert!(insights.segments.is_empty());
        assert_eq!(insights.overall.total_customers, 5);
        assert_eq!(insights.recommendations.len(), 3);

        analyzer.segment_customers_by_clv().unwrap();
        let insights = analyzer.insights().unwrap();
        let counted: usize = insights.segments.values().map(|s| s.customer_count).sum();
        assert_eq!(counted, 5);
        assert!((insights.overall.total_predicted_clv - 4.0 * 25.0 * 30.44).abs() < 1e-6);
    }
}
