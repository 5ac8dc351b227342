//! Signup cohorts, retention matrix, revenue cohorts and cohort LTV

use crate::config::CohortConfig;
use crate::data::{Customer, Order};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::insights::{mean, InsightReport};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Calendar granularity used to bucket signup and order dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodGranularity {
    #[default]
    Monthly,
    /// Weeks run Monday through Sunday
    Weekly,
    Daily,
}

impl PeriodGranularity {
    /// Calendar period containing `date`
    pub fn period_of(self, date: NaiveDate) -> CohortPeriod {
        let index = match self {
            Self::Monthly => i64::from(date.year()) * 12 + i64::from(date.month0()),
            Self::Weekly => {
                let monday =
                    i64::from(date.num_days_from_ce()) - i64::from(date.weekday().num_days_from_monday());
                // day 1 of the common era is a Monday
                (monday - 1).div_euclid(7)
            }
            Self::Daily => i64::from(date.num_days_from_ce()),
        };
        CohortPeriod {
            granularity: self,
            index,
        }
    }
}

impl FromStr for PeriodGranularity {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" | "month" | "m" => Ok(Self::Monthly),
            "weekly" | "week" | "w" => Ok(Self::Weekly),
            "daily" | "day" | "d" => Ok(Self::Daily),
            other => Err(AnalyticsError::InvalidInput(format!(
                "unknown period granularity '{other}' (expected monthly, weekly or daily)"
            ))),
        }
    }
}

/// One calendar period; periods of the same granularity order by time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CohortPeriod {
    pub granularity: PeriodGranularity,
    pub index: i64,
}

impl CohortPeriod {
    /// Number of period boundaries from `origin` to `self`
    pub fn offset_from(&self, origin: &CohortPeriod) -> i64 {
        self.index - origin.index
    }

    /// First day of the period
    pub fn start_date(&self) -> Option<NaiveDate> {
        match self.granularity {
            PeriodGranularity::Monthly => NaiveDate::from_ymd_opt(
                i32::try_from(self.index.div_euclid(12)).ok()?,
                u32::try_from(self.index.rem_euclid(12)).ok()? + 1,
                1,
            ),
            PeriodGranularity::Weekly => {
                NaiveDate::from_num_days_from_ce_opt(i32::try_from(self.index * 7 + 1).ok()?)
            }
            PeriodGranularity::Daily => {
                NaiveDate::from_num_days_from_ce_opt(i32::try_from(self.index).ok()?)
            }
        }
    }
}

impl fmt::Display for CohortPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(start) = self.start_date() else {
            return write!(f, "{:?}#{}", self.granularity, self.index);
        };
        match self.granularity {
            PeriodGranularity::Monthly => write!(f, "{}", start.format("%Y-%m")),
            PeriodGranularity::Weekly => {
                let end = start + chrono::Duration::days(6);
                write!(f, "{}/{}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
            }
            PeriodGranularity::Daily => write!(f, "{}", start.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for CohortPeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Active customers of one cohort in one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortRecord {
    pub cohort_group: CohortPeriod,
    /// Periods since the cohort's signup period; negative for orders placed before signup
    pub period_number: i64,
    pub active_customers: usize,
    pub total_customers: usize,
    pub retention_rate: f64,
}

/// Retention rate per cohort (rows) and period number (columns)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionMatrix {
    pub periods: Vec<i64>,
    pub rows: Vec<RetentionRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionRow {
    pub cohort_group: CohortPeriod,
    pub total_customers: usize,
    /// One rate per entry of [`RetentionMatrix::periods`], 0.0 where no customer was active
    pub rates: Vec<f64>,
}

impl RetentionMatrix {
    /// Rate of one cell, `None` when the cohort or period is absent
    pub fn rate(&self, cohort: &CohortPeriod, period: i64) -> Option<f64> {
        let column = self.periods.iter().position(|&p| p == period)?;
        self.rows
            .iter()
            .find(|row| &row.cohort_group == cohort)
            .map(|row| row.rates[column])
    }

    /// Average rate across cohorts for one period column
    pub fn column_mean(&self, period: i64) -> Option<f64> {
        let column = self.periods.iter().position(|&p| p == period)?;
        let values: Vec<f64> = self.rows.iter().map(|row| row.rates[column]).collect();
        if values.is_empty() {
            None
        } else {
            Some(mean(&values))
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.periods.len())
    }
}

/// Revenue of one cohort in one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueCohortRecord {
    pub cohort_group: CohortPeriod,
    pub period_number: i64,
    pub total_revenue: f64,
    pub avg_revenue_per_order: f64,
    pub active_customers: usize,
    pub avg_revenue_per_customer: f64,
}

/// Running revenue per active customer within a cohort
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortLtvPoint {
    pub cohort_group: CohortPeriod,
    pub period_number: i64,
    pub avg_revenue_per_customer: f64,
    pub cumulative_revenue_per_customer: f64,
}

/// Final cumulative revenue per customer of a cohort
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortLtv {
    pub cohort_group: CohortPeriod,
    pub ltv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortOverview {
    pub cohort_count: usize,
    pub total_customers: usize,
    pub period_1_retention: Option<f64>,
    pub period_3_retention: Option<f64>,
    pub period_6_retention: Option<f64>,
    pub business_insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortPerformance {
    /// Rate in the first period after signup
    pub initial_retention: f64,
    /// Mean rate over every period after signup
    pub avg_retention: f64,
    /// Initial rate minus the rate in the latest period
    pub retention_decline: f64,
}

pub type CohortInsights = InsightReport<CohortOverview, CohortPerformance>;

/// Progress of a [`CohortAnalyzer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CohortStage {
    Empty,
    Cohorts,
    Retention,
}

/// Order joined to its customer's cohort
struct CohortOrder<'a> {
    cohort: CohortPeriod,
    period_number: i64,
    order: &'a Order,
}

/// Staged cohort engine
#[derive(Debug)]
pub struct CohortAnalyzer {
    config: CohortConfig,
    stage: CohortStage,
    cohort_data: Vec<CohortRecord>,
    retention: Option<RetentionMatrix>,
}

impl CohortAnalyzer {
    pub fn new(config: CohortConfig) -> Self {
        Self {
            config,
            stage: CohortStage::Empty,
            cohort_data: Vec::new(),
            retention: None,
        }
    }

    /// Last completed step
    pub fn stage(&self) -> CohortStage {
        self.stage
    }

    pub fn cohort_data(&self) -> &[CohortRecord] {
        &self.cohort_data
    }

    /// Build the cohort x period table of active customers and retention
    ///
    /// # Arguments
    /// * `customers` - Customer table; the signup date picks the cohort
    /// * `orders` - Order table; each order date is bucketed into a period
    ///   number relative to its customer's cohort
    ///
    /// # Returns
    /// * One record per (cohort, period number) with at least one active
    ///   customer, ordered by cohort then period. Cohort size counts every
    ///   customer who signed up in the period, whether or not they ever
    ///   ordered. Orders that cannot be joined to a customer are left out,
    ///   and orders placed before signup get a negative period number.
    pub fn create_signup_cohorts(
        &mut self,
        customers: &[Customer],
        orders: &[Order],
    ) -> AnalyticsResult<&[CohortRecord]> {
        log::info!(
            "building {:?} signup cohorts for {} customers",
            self.config.period,
            customers.len()
        );

        let sizes = self.cohort_sizes(customers);
        let joined = self.join_orders(customers, orders);

        let mut active: BTreeMap<(CohortPeriod, i64), HashSet<&str>> = BTreeMap::new();
        for row in &joined {
            active
                .entry((row.cohort, row.period_number))
                .or_default()
                .insert(row.order.customer_id.as_str());
        }

        self.cohort_data = active
            .into_iter()
            .filter_map(|((cohort, period_number), members)| {
                let total_customers = *sizes.get(&cohort)?;
                Some(CohortRecord {
                    cohort_group: cohort,
                    period_number,
                    active_customers: members.len(),
                    total_customers,
                    retention_rate: members.len() as f64 / total_customers as f64,
                })
            })
            .collect();

        self.retention = None;
        self.stage = CohortStage::Cohorts;
        log::info!(
            "{} cohorts, {} cohort-period cells",
            sizes.len(),
            self.cohort_data.len()
        );
        Ok(&self.cohort_data)
    }

    /// Pivot the cohort table into a retention matrix (missing cells are 0)
    pub fn create_retention_table(&mut self) -> AnalyticsResult<&RetentionMatrix> {
        if self.stage < CohortStage::Cohorts {
            return Err(AnalyticsError::precondition(
                "create_retention_table",
                "create_signup_cohorts",
            ));
        }

        let periods: Vec<i64> = self
            .cohort_data
            .iter()
            .map(|record| record.period_number)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut rows: Vec<RetentionRow> = Vec::new();
        for record in &self.cohort_data {
            if rows.last().map(|row| row.cohort_group) != Some(record.cohort_group) {
                rows.push(RetentionRow {
                    cohort_group: record.cohort_group,
                    total_customers: record.total_customers,
                    rates: vec![0.0; periods.len()],
                });
            }
            if let (Some(row), Ok(column)) = (rows.last_mut(), periods.binary_search(&record.period_number)) {
                row.rates[column] = record.retention_rate;
            }
        }

        let matrix = RetentionMatrix { periods, rows };
        let (n_rows, n_cols) = matrix.shape();
        log::info!("retention matrix {n_rows} x {n_cols}");

        self.stage = CohortStage::Retention;
        Ok(self.retention.insert(matrix))
    }

    /// Cohorts then retention matrix
    pub fn analyze(
        &mut self,
        customers: &[Customer],
        orders: &[Order],
    ) -> AnalyticsResult<&RetentionMatrix> {
        self.create_signup_cohorts(customers, orders)?;
        self.create_retention_table()
    }

    /// Revenue per cohort and period
    pub fn analyze_revenue_cohorts(
        &self,
        customers: &[Customer],
        orders: &[Order],
    ) -> Vec<RevenueCohortRecord> {
        let joined = self.join_orders(customers, orders);

        let mut buckets: BTreeMap<(CohortPeriod, i64), (f64, usize, HashSet<&str>)> =
            BTreeMap::new();
        for row in &joined {
            let bucket = buckets
                .entry((row.cohort, row.period_number))
                .or_insert_with(|| (0.0, 0, HashSet::new()));
            bucket.0 += row.order.final_amount;
            bucket.1 += 1;
            bucket.2.insert(row.order.customer_id.as_str());
        }

        buckets
            .into_iter()
            .map(|((cohort, period_number), (revenue, order_count, members))| {
                RevenueCohortRecord {
                    cohort_group: cohort,
                    period_number,
                    total_revenue: revenue,
                    avg_revenue_per_order: revenue / order_count as f64,
                    active_customers: members.len(),
                    avg_revenue_per_customer: revenue / members.len() as f64,
                }
            })
            .collect()
    }

    /// Cumulative revenue per customer over increasing period numbers
    ///
    /// Returns the running curve and the last cumulative value per cohort.
    pub fn calculate_ltv_by_cohort(
        revenue: &[RevenueCohortRecord],
    ) -> (Vec<CohortLtvPoint>, Vec<CohortLtv>) {
        let mut by_cohort: BTreeMap<CohortPeriod, Vec<&RevenueCohortRecord>> = BTreeMap::new();
        for record in revenue {
            by_cohort.entry(record.cohort_group).or_default().push(record);
        }

        let mut curve = Vec::with_capacity(revenue.len());
        let mut final_ltv = Vec::with_capacity(by_cohort.len());
        for (cohort, mut records) in by_cohort {
            records.sort_by_key(|record| record.period_number);
            let mut cumulative = 0.0;
            for record in records {
                cumulative += record.avg_revenue_per_customer;
                curve.push(CohortLtvPoint {
                    cohort_group: cohort,
                    period_number: record.period_number,
                    avg_revenue_per_customer: record.avg_revenue_per_customer,
                    cumulative_revenue_per_customer: cumulative,
                });
            }
            final_ltv.push(CohortLtv {
                cohort_group: cohort,
                ltv: cumulative,
            });
        }
        (curve, final_ltv)
    }

    /// Retention trends, per-cohort performance and recommended actions
    pub fn insights(&self) -> AnalyticsResult<CohortInsights> {
        let matrix = match (&self.retention, self.stage) {
            (Some(matrix), CohortStage::Retention) => matrix,
            _ => {
                return Err(AnalyticsError::precondition(
                    "insights",
                    "create_retention_table",
                ))
            }
        };

        let period_1 = matrix.column_mean(1);
        let period_3 = matrix.column_mean(3);
        let period_6 = matrix.column_mean(6);

        let later_columns: Vec<usize> = matrix
            .periods
            .iter()
            .enumerate()
            .filter(|&(_, &period)| period > 0)
            .map(|(column, _)| column)
            .collect();

        let mut segments = BTreeMap::new();
        if let (Some(&first), Some(&last)) = (later_columns.first(), later_columns.last()) {
            for row in &matrix.rows {
                let later: Vec<f64> = later_columns.iter().map(|&c| row.rates[c]).collect();
                segments.insert(
                    row.cohort_group.to_string(),
                    CohortPerformance {
                        initial_retention: row.rates[first],
                        avg_retention: mean(&later),
                        retention_decline: row.rates[first] - row.rates[last],
                    },
                );
            }
        }

        let mut business_insights = Vec::new();
        if let Some(rate) = period_1 {
            business_insights.push(
                if rate >= 0.5 {
                    "Period-1 retention is healthy (50% or more)"
                } else if rate >= 0.3 {
                    "Period-1 retention is moderate (30-50%)"
                } else {
                    "Period-1 retention is low (under 30%)"
                }
                .to_string(),
            );
        }
        if let (Some(first), Some(third)) = (period_1, period_3) {
            business_insights.push(
                if first - third <= 0.2 {
                    "Retention decline between periods 1 and 3 is stable"
                } else {
                    "Retention is dropping sharply between periods 1 and 3"
                }
                .to_string(),
            );
        }

        let mut actions: Vec<&str> = Vec::new();
        if period_1.is_some_and(|rate| rate < 0.4) {
            actions.extend([
                "Improve the onboarding flow for new customers",
                "Strengthen follow-up after the first purchase",
                "Run satisfaction surveys and collect feedback",
            ]);
        }
        if period_3.is_some_and(|rate| rate < 0.2) {
            actions.extend([
                "Develop a mid-term retention program",
                "Expand personalized marketing campaigns",
                "Evaluate introducing a loyalty program",
            ]);
        }
        actions.extend([
            "Tailor marketing strategy per cohort",
            "Detect churn-risk customers early",
            "Improve service for each lifecycle stage",
        ]);

        let overall = CohortOverview {
            cohort_count: matrix.rows.len(),
            total_customers: matrix.rows.iter().map(|row| row.total_customers).sum(),
            period_1_retention: period_1,
            period_3_retention: period_3,
            period_6_retention: period_6,
            business_insights,
        };

        Ok(InsightReport {
            overall,
            segments,
            recommendations: BTreeMap::from([(
                "all_cohorts".to_string(),
                actions.into_iter().map(str::to_string).collect(),
            )]),
        })
    }

    fn cohort_sizes(&self, customers: &[Customer]) -> BTreeMap<CohortPeriod, usize> {
        let mut members: BTreeMap<CohortPeriod, HashSet<&str>> = BTreeMap::new();
        for customer in customers {
            members
                .entry(self.config.period.period_of(customer.signup_date))
                .or_default()
                .insert(customer.customer_id.as_str());
        }
        members
            .into_iter()
            .map(|(cohort, ids)| (cohort, ids.len()))
            .collect()
    }

    fn join_orders<'a>(&self, customers: &[Customer], orders: &'a [Order]) -> Vec<CohortOrder<'a>> {
        let granularity = self.config.period;
        let cohort_of: HashMap<&str, CohortPeriod> = customers
            .iter()
            .map(|c| (c.customer_id.as_str(), granularity.period_of(c.signup_date)))
            .collect();

        let mut unmatched = 0usize;
        let mut before_signup = 0usize;
        let joined: Vec<CohortOrder<'a>> = orders
            .iter()
            .filter_map(|order| {
                let Some(cohort) = cohort_of.get(order.customer_id.as_str()).copied() else {
                    unmatched += 1;
                    return None;
                };
                let period_number = granularity.period_of(order.order_date).offset_from(&cohort);
                if period_number < 0 {
                    before_signup += 1;
                }
                Some(CohortOrder {
                    cohort,
                    period_number,
                    order,
                })
            })
            .collect();

        if unmatched > 0 {
            log::warn!("{unmatched} orders have no matching customer and are excluded from cohorts");
        }
        if before_signup > 0 {
            log::warn!("{before_signup} orders predate their customer's signup period");
        }
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn monthly() -> CohortAnalyzer {
        CohortAnalyzer::new(CohortConfig::default())
    }

    /// January cohort: 4 customers, February cohort: 2 customers
    fn two_cohorts() -> (Vec<Customer>, Vec<Order>) {
        let customers = vec![
            Customer::new("J1", date(2024, 1, 3)),
            Customer::new("J2", date(2024, 1, 15)),
            Customer::new("J3", date(2024, 1, 20)),
            Customer::new("J4", date(2024, 1, 31)),
            Customer::new("F1", date(2024, 2, 2)),
            Customer::new("F2", date(2024, 2, 28)),
        ];
        let orders = vec![
            // period 0: everyone orders in their signup month
            Order::new("1", "J1", date(2024, 1, 4), 100.0),
            Order::new("2", "J2", date(2024, 1, 16), 50.0),
            Order::new("3", "J3", date(2024, 1, 21), 30.0),
            Order::new("4", "J4", date(2024, 1, 31), 20.0),
            Order::new("5", "J1", date(2024, 1, 25), 60.0),
            Order::new("6", "F1", date(2024, 2, 3), 40.0),
            Order::new("7", "F2", date(2024, 2, 28), 10.0),
            // period 1
            Order::new("8", "J1", date(2024, 2, 10), 80.0),
            Order::new("9", "J2", date(2024, 2, 11), 20.0),
            Order::new("10", "F1", date(2024, 3, 1), 30.0),
            // period 2
            Order::new("11", "J1", date(2024, 3, 5), 40.0),
            Order::new("12", "F2", date(2024, 4, 30), 25.0),
        ];
        (customers, orders)
    }

    #[test]
    fn test_period_numbers() {
        let jan = PeriodGranularity::Monthly.period_of(date(2024, 1, 31));
        let mar = PeriodGranularity::Monthly.period_of(date(2024, 3, 1));
        let dec = PeriodGranularity::Monthly.period_of(date(2023, 12, 31));
        assert_eq!(mar.offset_from(&jan), 2);
        assert_eq!(jan.offset_from(&dec), 1);
        assert_eq!(dec.offset_from(&jan), -1);

        // 2024-01-01 is a Monday, 2024-01-07 a Sunday
        let week = PeriodGranularity::Weekly;
        assert_eq!(week.period_of(date(2024, 1, 7)), week.period_of(date(2024, 1, 1)));
        assert_eq!(
            week.period_of(date(2024, 1, 8)).offset_from(&week.period_of(date(2024, 1, 7))),
            1
        );
        assert_eq!(
            week.period_of(date(2024, 1, 15)).offset_from(&week.period_of(date(2023, 12, 31))),
            3
        );

        let day = PeriodGranularity::Daily;
        assert_eq!(
            day.period_of(date(2024, 3, 1)).offset_from(&day.period_of(date(2024, 2, 28))),
            2
        );
    }

    #[test]
    fn test_period_labels() {
        assert_eq!(PeriodGranularity::Monthly.period_of(date(2024, 2, 17)).to_string(), "2024-02");
        assert_eq!(
            PeriodGranularity::Weekly.period_of(date(2024, 1, 3)).to_string(),
            "2024-01-01/2024-01-07"
        );
        assert_eq!(PeriodGranularity::Daily.period_of(date(2024, 2, 17)).to_string(), "2024-02-17");
        assert_eq!("Weekly".parse::<PeriodGranularity>().unwrap(), PeriodGranularity::Weekly);
        assert!("hourly".parse::<PeriodGranularity>().is_err());
    }

    #[test]
    fn test_two_cohort_retention() {
        let (customers, orders) = two_cohorts();
        let mut analyzer = monthly();
        let matrix = analyzer.analyze(&customers, &orders).unwrap().clone();

        let jan = PeriodGranularity::Monthly.period_of(date(2024, 1, 1));
        let feb = PeriodGranularity::Monthly.period_of(date(2024, 2, 1));

        assert_eq!(matrix.periods, vec![0, 1, 2]);
        assert_eq!(matrix.shape(), (2, 3));
        assert_eq!(matrix.rate(&jan, 0), Some(1.0));
        assert_eq!(matrix.rate(&jan, 1), Some(0.5));
        assert_eq!(matrix.rate(&jan, 2), Some(0.25));
        assert_eq!(matrix.rate(&feb, 0), Some(1.0));
        assert_eq!(matrix.rate(&feb, 1), Some(0.5));
        assert_eq!(matrix.rate(&feb, 2), Some(0.5));

        let cells = analyzer.cohort_data();
        assert_eq!(cells.len(), 6);
        assert_eq!(cells[0].active_customers, 4);
        assert_eq!(cells[0].total_customers, 4);
        assert!(cells.iter().all(|c| (0.0..=1.0).contains(&c.retention_rate)));
    }

    #[test]
    fn test_orders_before_signup_get_negative_period() {
        let customers = vec![
            Customer::new("A", date(2024, 2, 5)),
            Customer::new("B", date(2024, 2, 10)),
        ];
        let after_signup = vec![
            Order::new("1", "A", date(2024, 2, 20), 30.0),
            Order::new("3", "B", date(2024, 3, 3), 50.0),
        ];
        let mut orders = after_signup.clone();
        orders.push(Order::new("2", "B", date(2024, 1, 15), 20.0));

        let feb = PeriodGranularity::Monthly.period_of(date(2024, 2, 1));
        let mut analyzer = monthly();
        let matrix = analyzer.analyze(&customers, &orders).unwrap().clone();
        assert_eq!(matrix.periods, vec![-1, 0, 1]);
        assert_eq!(matrix.rate(&feb, -1), Some(0.5));
        assert_eq!(matrix.rate(&feb, 0), Some(0.5));
        assert_eq!(matrix.rate(&feb, 1), Some(0.5));

        // the early order leaves period 0 untouched
        let mut baseline = monthly();
        let without_early = baseline.analyze(&customers, &after_signup).unwrap();
        assert_eq!(without_early.periods, vec![0, 1]);
        assert_eq!(without_early.rate(&feb, 0), matrix.rate(&feb, 0));

        // performance only looks at periods after signup
        let insights = analyzer.insights().unwrap();
        assert_eq!(
            insights.segments["2024-02"],
            CohortPerformance {
                initial_retention: 0.5,
                avg_retention: 0.5,
                retention_decline: 0.0,
            }
        );
        assert_eq!(insights.overall.total_customers, 2);

        let revenue = analyzer.analyze_revenue_cohorts(&customers, &orders);
        assert_eq!(revenue[0].period_number, -1);
        assert_eq!(revenue[0].total_revenue, 20.0);
    }

    /// Week of Mon 2024-01-01: A and B. Week of Mon 2024-01-08: C.
    fn two_weekly_cohorts() -> (Vec<Customer>, Vec<Order>) {
        let customers = vec![
            Customer::new("A", date(2024, 1, 1)),
            Customer::new("B", date(2024, 1, 3)),
            Customer::new("C", date(2024, 1, 9)),
        ];
        let orders = vec![
            // Sunday closes the signup week of A and B
            Order::new("1", "A", date(2024, 1, 7), 30.0),
            // Monday opens their second week
            Order::new("2", "A", date(2024, 1, 8), 40.0),
            Order::new("3", "B", date(2024, 1, 8), 20.0),
            Order::new("4", "C", date(2024, 1, 14), 10.0),
        ];
        (customers, orders)
    }

    #[test]
    fn test_weekly_retention_crosses_sunday() {
        let (customers, orders) = two_weekly_cohorts();
        let mut analyzer = CohortAnalyzer::new(CohortConfig {
            period: PeriodGranularity::Weekly,
        });
        let matrix = analyzer.analyze(&customers, &orders).unwrap().clone();

        let first = PeriodGranularity::Weekly.period_of(date(2024, 1, 1));
        let second = PeriodGranularity::Weekly.period_of(date(2024, 1, 8));
        assert_eq!(matrix.periods, vec![0, 1]);
        assert_eq!(matrix.rows.len(), 2);
        assert_eq!(matrix.rows[0].cohort_group.to_string(), "2024-01-01/2024-01-07");
        assert_eq!(matrix.rows[0].total_customers, 2);
        assert_eq!(matrix.rows[1].cohort_group.to_string(), "2024-01-08/2024-01-14");
        assert_eq!(matrix.rate(&first, 0), Some(0.5));
        assert_eq!(matrix.rate(&first, 1), Some(1.0));
        assert_eq!(matrix.rate(&second, 0), Some(1.0));
        assert_eq!(matrix.rate(&second, 1), Some(0.0));

        let revenue = analyzer.analyze_revenue_cohorts(&customers, &orders);
        let periods: Vec<(String, i64)> = revenue
            .iter()
            .map(|r| (r.cohort_group.to_string(), r.period_number))
            .collect();
        assert_eq!(
            periods,
            vec![
                ("2024-01-01/2024-01-07".to_string(), 0),
                ("2024-01-01/2024-01-07".to_string(), 1),
                ("2024-01-08/2024-01-14".to_string(), 0),
            ]
        );
        assert_eq!(revenue[1].total_revenue, 60.0);
        assert_eq!(revenue[1].active_customers, 2);
        assert_eq!(revenue[1].avg_revenue_per_customer, 30.0);

        let (_, ltv) = CohortAnalyzer::calculate_ltv_by_cohort(&revenue);
        assert_eq!(ltv[0].ltv, 60.0);
        assert_eq!(ltv[1].ltv, 10.0);
    }

    #[test]
    fn test_daily_cohorts() {
        let (customers, orders) = two_weekly_cohorts();
        let mut analyzer = CohortAnalyzer::new(CohortConfig {
            period: PeriodGranularity::Daily,
        });
        let matrix = analyzer.analyze(&customers, &orders).unwrap();

        // one cohort per signup day
        assert_eq!(matrix.shape(), (3, 3));
        assert_eq!(matrix.periods, vec![5, 6, 7]);
        assert_eq!(matrix.rows[1].cohort_group.to_string(), "2024-01-03");
        let a = PeriodGranularity::Daily.period_of(date(2024, 1, 1));
        assert_eq!(matrix.rate(&a, 5), Some(0.0));
        assert_eq!(matrix.rate(&a, 6), Some(1.0));
        assert_eq!(matrix.rate(&a, 7), Some(1.0));
    }

    #[test]
    fn test_missing_cells_fill_with_zero() {
        let customers = vec![
            Customer::new("A", date(2024, 1, 10)),
            Customer::new("B", date(2024, 2, 10)),
        ];
        let orders = vec![
            Order::new("1", "A", date(2024, 1, 11), 10.0),
            Order::new("2", "A", date(2024, 4, 11), 10.0),
            Order::new("3", "B", date(2024, 2, 11), 10.0),
        ];
        let mut analyzer = monthly();
        let matrix = analyzer.analyze(&customers, &orders).unwrap();

        let feb = PeriodGranularity::Monthly.period_of(date(2024, 2, 1));
        assert_eq!(matrix.periods, vec![0, 3]);
        assert_eq!(matrix.rate(&feb, 3), Some(0.0));
    }

    #[test]
    fn test_unmatched_orders_are_excluded() {
        let customers = vec![Customer::new("A", date(2024, 1, 10))];
        let orders = vec![
            Order::new("1", "A", date(2024, 1, 11), 10.0),
            Order::new("2", "NOBODY", date(2024, 1, 12), 99.0),
        ];
        let mut analyzer = monthly();
        let cells = analyzer.create_signup_cohorts(&customers, &orders).unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].active_customers, 1);

        let revenue = analyzer.analyze_revenue_cohorts(&customers, &orders);
        assert_eq!(revenue.len(), 1);
        assert_eq!(revenue[0].total_revenue, 10.0);
    }

    #[test]
    fn test_retention_before_cohorts_fails() {
        let mut analyzer = monthly();
        assert!(analyzer.create_retention_table().unwrap_err().is_precondition());
        assert!(analyzer.insights().unwrap_err().is_precondition());

        let (customers, orders) = two_cohorts();
        analyzer.create_signup_cohorts(&customers, &orders).unwrap();
        assert!(analyzer.insights().unwrap_err().is_precondition());
    }

    #[test]
    fn test_revenue_and_ltv() {
        let (customers, orders) = two_cohorts();
        let analyzer = monthly();
        let revenue = analyzer.analyze_revenue_cohorts(&customers, &orders);

        let jan_0 = &revenue[0];
        assert_eq!(jan_0.period_number, 0);
        assert_eq!(jan_0.total_revenue, 260.0);
        assert_eq!(jan_0.active_customers, 4);
        assert_eq!(jan_0.avg_revenue_per_order, 52.0);
        assert_eq!(jan_0.avg_revenue_per_customer, 65.0);

        let (curve, ltv) = CohortAnalyzer::calculate_ltv_by_cohort(&revenue);
        assert_eq!(ltv.len(), 2);
        // January: 65 + 50 + 40
        assert_eq!(ltv[0].ltv, 155.0);
        // February: 25 + 30 + 25
        assert_eq!(ltv[1].ltv, 80.0);

        for pair in curve.windows(2) {
            if pair[0].cohort_group == pair[1].cohort_group {
                assert!(pair[1].period_number > pair[0].period_number);
                assert!(pair[1].cumulative_revenue_per_customer >= pair[0].cumulative_revenue_per_customer);
            }
        }
    }

    #[test]
    fn test_insights() {
        let (customers, orders) = two_cohorts();
        let mut analyzer = monthly();
        analyzer.analyze(&customers, &orders).unwrap();
        let insights = analyzer.insights().unwrap();

        assert_eq!(insights.overall.cohort_count, 2);
        assert_eq!(insights.overall.total_customers, 6);
        assert_eq!(insights.overall.period_1_retention, Some(0.5));
        assert_eq!(insights.overall.period_3_retention, None);
        assert_eq!(
            insights.overall.business_insights,
            vec!["Period-1 retention is healthy (50% or more)".to_string()]
        );

        assert_eq!(
            insights.segments["2024-01"],
            CohortPerformance {
                initial_retention: 0.5,
                avg_retention: 0.375,
                retention_decline: 0.25,
            }
        );
        // no low-retention triggers, only the general actions
        assert_eq!(insights.recommendations["all_cohorts"].len(), 3);
    }
}
