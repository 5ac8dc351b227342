//! RFM (Recency, Frequency, Monetary) scoring and segment assignment

use crate::config::RfmConfig;
use crate::data::{Customer, Order};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::insights::{mean, summarize_segments, InsightReport};
use crate::quantile::{quantile_scores, ScoreDirection};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::RangeInclusive;

/// Number of ordinal tiers each RFM axis is scored into
pub const RFM_TIERS: u8 = 5;

/// Named customer segment derived from an (R, F, M) score triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RfmSegment {
    #[serde(rename = "Champions")]
    Champions,
    #[serde(rename = "Loyal Customers")]
    LoyalCustomers,
    #[serde(rename = "Potential Loyalists")]
    PotentialLoyalists,
    #[serde(rename = "New Customers")]
    NewCustomers,
    #[serde(rename = "Promising")]
    Promising,
    #[serde(rename = "Cannot Lose Them")]
    CannotLoseThem,
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Need Attention")]
    NeedAttention,
    #[serde(rename = "About to Sleep")]
    AboutToSleep,
    #[serde(rename = "Hibernating")]
    Hibernating,
    #[serde(rename = "Lost")]
    Lost,
    #[serde(rename = "Others")]
    Others,
}

impl RfmSegment {
    /// Segment label as it appears in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Champions => "Champions",
            Self::LoyalCustomers => "Loyal Customers",
            Self::PotentialLoyalists => "Potential Loyalists",
            Self::NewCustomers => "New Customers",
            Self::Promising => "Promising",
            Self::CannotLoseThem => "Cannot Lose Them",
            Self::AtRisk => "At Risk",
            Self::NeedAttention => "Need Attention",
            Self::AboutToSleep => "About to Sleep",
            Self::Hibernating => "Hibernating",
            Self::Lost => "Lost",
            Self::Others => "Others",
        }
    }

    /// One-line behavioral description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Champions => "Bought recently, buy often and spend the most",
            Self::LoyalCustomers => "Buy regularly and respond to promotions",
            Self::PotentialLoyalists => "Recent customers with average frequency",
            Self::NewCustomers => "Bought most recently, but not often",
            Self::Promising => "Recent shoppers who have not spent much yet",
            Self::CannotLoseThem => "Used to buy often and spend big, but not lately",
            Self::AtRisk => "Valuable customers who have not purchased for a while",
            Self::NeedAttention => "Above-average recency, frequency and spend, slipping",
            Self::AboutToSleep => "Below-average recency and frequency",
            Self::Hibernating => "Last purchase long ago, low spend and few orders",
            Self::Lost => "No recent activity, lowest scores on every axis",
            Self::Others => "No segment rule matched",
        }
    }

    /// Recommended marketing actions, most important first
    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            Self::Champions => &[
                "Recommend premium products",
                "Offer a VIP program",
                "Launch a referral program",
            ],
            Self::LoyalCustomers => &[
                "Award loyalty points",
                "Send recurring discount coupons",
                "Notify first about new products",
            ],
            Self::PotentialLoyalists => &[
                "Invite to the loyalty program",
                "Recommend complementary products",
            ],
            Self::NewCustomers => &[
                "Run an onboarding sequence",
                "Offer a second-purchase incentive",
            ],
            Self::Promising => &["Build brand awareness", "Offer free samples or trials"],
            Self::CannotLoseThem => &[
                "Reach out personally right away",
                "Provide premium service",
                "Assign a dedicated account manager",
            ],
            Self::AtRisk => &[
                "Send personalized re-engagement messages",
                "Offer special discounts",
                "Run a win-back campaign",
            ],
            Self::NeedAttention => &[
                "Send limited-time offers",
                "Recommend products from purchase history",
            ],
            Self::AboutToSleep => &["Share popular products", "Offer renewal discounts"],
            Self::Hibernating => &[
                "Offer relevant products at a discount",
                "Reconnect through low-cost channels",
            ],
            Self::Lost => &[
                "Try a low-cost reactivation campaign",
                "Exclude from paid campaigns if it fails",
            ],
            Self::Others => &["Collect more purchase history before targeting"],
        }
    }
}

impl fmt::Display for RfmSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive score box that qualifies a customer for a segment
#[derive(Debug, Clone)]
pub struct SegmentRule {
    pub segment: RfmSegment,
    pub recency: RangeInclusive<u8>,
    pub frequency: RangeInclusive<u8>,
    pub monetary: RangeInclusive<u8>,
}

impl SegmentRule {
    pub fn matches(&self, r: u8, f: u8, m: u8) -> bool {
        self.recency.contains(&r) && self.frequency.contains(&f) && self.monetary.contains(&m)
    }
}

const fn rule(
    segment: RfmSegment,
    recency: RangeInclusive<u8>,
    frequency: RangeInclusive<u8>,
    monetary: RangeInclusive<u8>,
) -> SegmentRule {
    SegmentRule {
        segment,
        recency,
        frequency,
        monetary,
    }
}

/// Segment rules in evaluation order; the first matching box wins.
///
/// The boxes overlap, so this order decides the outcome for many triples.
pub const SEGMENT_RULES: [SegmentRule; 11] = [
    rule(RfmSegment::Champions, 4..=5, 4..=5, 4..=5),
    rule(RfmSegment::LoyalCustomers, 3..=5, 3..=5, 3..=5),
    rule(RfmSegment::PotentialLoyalists, 3..=5, 1..=3, 1..=3),
    rule(RfmSegment::NewCustomers, 4..=5, 1..=1, 1..=1),
    rule(RfmSegment::Promising, 3..=4, 1..=1, 1..=1),
    rule(RfmSegment::CannotLoseThem, 1..=2, 4..=5, 4..=5),
    rule(RfmSegment::AtRisk, 1..=2, 2..=5, 2..=5),
    rule(RfmSegment::NeedAttention, 2..=3, 2..=3, 2..=3),
    rule(RfmSegment::AboutToSleep, 2..=3, 1..=2, 1..=2),
    rule(RfmSegment::Hibernating, 1..=2, 1..=2, 1..=2),
    rule(RfmSegment::Lost, 1..=1, 1..=1, 1..=1),
];

/// Segment for a scored triple, `Others` when no rule matches
pub fn assign_segment(r: u8, f: u8, m: u8) -> RfmSegment {
    SEGMENT_RULES
        .iter()
        .find(|rule| rule.matches(r, f, m))
        .map(|rule| rule.segment)
        .unwrap_or(RfmSegment::Others)
}

/// Customer row augmented with RFM values, scores and segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmRecord {
    #[serde(flatten)]
    pub customer: Customer,
    pub last_order_date: Option<NaiveDate>,
    /// Days since the last order, or the no-order sentinel
    pub recency: i64,
    pub frequency: u32,
    pub monetary: f64,
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,
    /// Concatenated scores, e.g. "543"
    pub rfm_score: String,
    pub rfm_avg_score: f64,
    /// Filled in by [`RfmAnalyzer::assign_segments`]
    pub segment: Option<RfmSegment>,
}

impl RfmRecord {
    pub fn has_orders(&self) -> bool {
        self.frequency > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum RfmStage {
    Empty,
    Scored,
    Segmented,
}

#[derive(Debug, Default)]
struct OrderAggregate {
    last_order_date: Option<NaiveDate>,
    count: u32,
    total: f64,
}

/// Aggregate statistics across the whole RFM table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmOverview {
    pub total_customers: usize,
    pub customers_with_orders: usize,
    pub total_revenue: f64,
    pub avg_recency: f64,
    pub avg_frequency: f64,
    pub avg_monetary: f64,
}

pub type RfmInsights = InsightReport<RfmOverview>;

/// Staged RFM engine: score first, then assign segments
#[derive(Debug)]
pub struct RfmAnalyzer {
    config: RfmConfig,
    reference_date: NaiveDate,
    stage: RfmStage,
    records: Vec<RfmRecord>,
}

impl RfmAnalyzer {
    /// The reference date defaults to today when the config leaves it unset
    pub fn new(config: RfmConfig) -> Self {
        let reference_date = config
            .reference_date
            .unwrap_or_else(|| Utc::now().date_naive());
        Self {
            config,
            reference_date,
            stage: RfmStage::Empty,
            records: Vec::new(),
        }
    }

    /// Date recency is measured against
    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    /// Most recent result; empty until scores have been calculated
    pub fn records(&self) -> &[RfmRecord] {
        &self.records
    }

    /// Compute recency, frequency, monetary and their 1-5 scores per customer
    ///
    /// Every customer in `customers` appears in the output. Customers without
    /// orders carry the recency sentinel, zero frequency and monetary values
    /// and a score of 1 on every axis. Orders whose customer is not in the
    /// customer table are ignored.
    pub fn calculate_rfm_scores(
        &mut self,
        orders: &[Order],
        customers: &[Customer],
    ) -> AnalyticsResult<&[RfmRecord]> {
        log::info!(
            "calculating RFM scores for {} customers against {}",
            customers.len(),
            self.reference_date
        );

        let mut aggregates: HashMap<&str, OrderAggregate> = HashMap::new();
        for order in orders {
            let entry = aggregates.entry(order.customer_id.as_str()).or_default();
            entry.count += 1;
            entry.total += order.final_amount;
            entry.last_order_date = entry.last_order_date.max(Some(order.order_date));
        }

        let known: std::collections::HashSet<&str> =
            customers.iter().map(|c| c.customer_id.as_str()).collect();
        let orphans = aggregates.keys().filter(|id| !known.contains(*id)).count();
        if orphans > 0 {
            log::warn!("{orphans} customers in the order table are missing from the customer table");
        }

        // Ordering customers in customer-table order; ties rank by this order
        let active: Vec<(usize, &OrderAggregate, i64)> = customers
            .iter()
            .enumerate()
            .filter_map(|(index, customer)| {
                let aggregate = aggregates.get(customer.customer_id.as_str())?;
                let last = aggregate.last_order_date?;
                let recency = (self.reference_date - last).num_days();
                Some((index, aggregate, recency))
            })
            .collect();

        let recency: Vec<f64> = active.iter().map(|(_, _, r)| *r as f64).collect();
        let frequency: Vec<f64> = active.iter().map(|(_, a, _)| f64::from(a.count)).collect();
        let monetary: Vec<f64> = active.iter().map(|(_, a, _)| a.total).collect();

        let r_scores = quantile_scores(&recency, RFM_TIERS, ScoreDirection::LowerIsBetter);
        let f_scores = quantile_scores(&frequency, RFM_TIERS, ScoreDirection::HigherIsBetter);
        let m_scores = quantile_scores(&monetary, RFM_TIERS, ScoreDirection::HigherIsBetter);

        let mut records: Vec<RfmRecord> = customers
            .iter()
            .map(|customer| self.empty_record(customer))
            .collect();

        for (position, (index, aggregate, recency)) in active.iter().enumerate() {
            let record = &mut records[*index];
            record.last_order_date = aggregate.last_order_date;
            record.recency = *recency;
            record.frequency = aggregate.count;
            record.monetary = aggregate.total;
            set_scores(
                record,
                r_scores[position],
                f_scores[position],
                m_scores[position],
            );
        }

        log::info!(
            "RFM scores done: {} customers, {} with orders",
            records.len(),
            active.len()
        );

        self.records = records;
        self.stage = RfmStage::Scored;
        Ok(&self.records)
    }

    /// Label every scored customer with the first segment rule it matches
    ///
    /// Customers without any order are labeled `Lost` directly.
    pub fn assign_segments(&mut self) -> AnalyticsResult<&[RfmRecord]> {
        if self.stage < RfmStage::Scored {
            return Err(AnalyticsError::precondition(
                "assign_segments",
                "calculate_rfm_scores",
            ));
        }

        for record in &mut self.records {
            record.segment = Some(if record.has_orders() {
                assign_segment(record.r_score, record.f_score, record.m_score)
            } else {
                RfmSegment::Lost
            });
        }

        if log::log_enabled!(log::Level::Debug) {
            let total = self.records.len().max(1) as f64;
            for (segment, count) in self.segment_counts() {
                log::debug!(
                    "segment {segment}: {count} customers ({:.1}%)",
                    count as f64 / total * 100.0
                );
            }
        }

        self.stage = RfmStage::Segmented;
        Ok(&self.records)
    }

    /// Score and segment in one call
    pub fn analyze(
        &mut self,
        orders: &[Order],
        customers: &[Customer],
    ) -> AnalyticsResult<&[RfmRecord]> {
        self.calculate_rfm_scores(orders, customers)?;
        self.assign_segments()
    }

    /// Customer count per assigned segment
    pub fn segment_counts(&self) -> BTreeMap<RfmSegment, usize> {
        let mut counts = BTreeMap::new();
        for segment in self.records.iter().filter_map(|record| record.segment) {
            *counts.entry(segment).or_insert(0) += 1;
        }
        counts
    }

    /// Per-segment value summary and action plans
    pub fn insights(&self) -> AnalyticsResult<RfmInsights> {
        if self.stage < RfmStage::Segmented {
            return Err(AnalyticsError::precondition("insights", "assign_segments"));
        }

        let ordering: Vec<&RfmRecord> = self.records.iter().filter(|r| r.has_orders()).collect();
        let overall = RfmOverview {
            total_customers: self.records.len(),
            customers_with_orders: ordering.len(),
            total_revenue: self.records.iter().map(|r| r.monetary).sum(),
            avg_recency: mean(&ordering.iter().map(|r| r.recency as f64).collect::<Vec<_>>()),
            avg_frequency: mean(
                &ordering
                    .iter()
                    .map(|r| f64::from(r.frequency))
                    .collect::<Vec<_>>(),
            ),
            avg_monetary: mean(&ordering.iter().map(|r| r.monetary).collect::<Vec<_>>()),
        };

        let segments = summarize_segments(self.records.iter().filter_map(|record| {
            record
                .segment
                .map(|segment| (segment.as_str(), record.monetary))
        }));

        let recommendations = self
            .segment_counts()
            .keys()
            .map(|segment| {
                (
                    segment.to_string(),
                    segment.actions().iter().map(|a| a.to_string()).collect(),
                )
            })
            .collect();

        Ok(InsightReport {
            overall,
            segments,
            recommendations,
        })
    }

    fn empty_record(&self, customer: &Customer) -> RfmRecord {
        let mut record = RfmRecord {
            customer: customer.clone(),
            last_order_date: None,
            recency: self.config.no_order_recency,
            frequency: 0,
            monetary: 0.0,
            r_score: 1,
            f_score: 1,
            m_score: 1,
            rfm_score: String::new(),
            rfm_avg_score: 1.0,
            segment: None,
        };
        set_scores(&mut record, 1, 1, 1);
        record
    }
}

fn set_scores(record: &mut RfmRecord, r: u8, f: u8, m: u8) {
    record.r_score = r;
    record.f_score = f;
    record.m_score = m;
    record.rfm_score = format!("{r}{f}{m}");
    record.rfm_avg_score = f64::from(u16::from(r) + u16::from(f) + u16::from(m)) / 3.0;
}
