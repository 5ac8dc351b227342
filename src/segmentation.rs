//! Behavioral (K-Means) and demographic customer segmentation

use crate::config::SegmentationConfig;
use crate::data::{Customer, RfmData};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::insights::{mean, InsightReport};
use crate::model::{fit_kmeans, KMeansModel};
use crate::rfm::RfmRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Descriptive label for a behavioral cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BehavioralSegmentName {
    #[serde(rename = "VIP Customers")]
    Vip,
    #[serde(rename = "Former VIP")]
    FormerVip,
    #[serde(rename = "Loyal Customers")]
    Loyal,
    #[serde(rename = "At-Risk Customers")]
    AtRisk,
    #[serde(rename = "High Spenders")]
    HighSpender,
    #[serde(rename = "Dormant High Spenders")]
    DormantHighSpender,
    #[serde(rename = "New/General")]
    NewOrGeneral,
    #[serde(rename = "Low Engagement")]
    LowEngagement,
}

impl BehavioralSegmentName {
    /// Display label, also used as the insight map key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vip => "VIP Customers",
            Self::FormerVip => "Former VIP",
            Self::Loyal => "Loyal Customers",
            Self::AtRisk => "At-Risk Customers",
            Self::HighSpender => "High Spenders",
            Self::DormantHighSpender => "Dormant High Spenders",
            Self::NewOrGeneral => "New/General",
            Self::LowEngagement => "Low Engagement",
        }
    }

    /// Marketing actions suited to the segment
    pub fn strategies(&self) -> &'static [&'static str] {
        match self {
            Self::Vip => &[
                "Provide premium service",
                "Give first access to exclusive products",
                "Offer personal concierge service",
                "Invest a high marketing budget",
            ],
            Self::FormerVip => &[
                "Contact personally to understand the drop-off",
                "Offer a tailored comeback incentive",
            ],
            Self::Loyal => &[
                "Strengthen the loyalty program",
                "Run regular promotions",
                "Start a brand ambassador program",
                "Offer referral incentives",
            ],
            Self::AtRisk => &[
                "Send re-engagement campaigns",
                "Survey for dissatisfaction causes",
            ],
            Self::HighSpender => &[
                "Recommend premium bundles",
                "Encourage more frequent purchases with subscriptions",
            ],
            Self::DormantHighSpender => &[
                "Run a high-value win-back offer",
                "Highlight new premium arrivals",
            ],
            Self::NewOrGeneral => &[
                "Run an onboarding program",
                "Offer a first-purchase discount",
                "Share educational content",
                "Build the relationship gradually",
            ],
            Self::LowEngagement => &[
                "Use low-cost automated campaigns",
                "Test reactivation offers on a small sample",
            ],
        }
    }
}

impl fmt::Display for BehavioralSegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mean raw behavior of a group of customers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureMeans {
    pub frequency: f64,
    pub monetary: f64,
    pub recency: f64,
}

impl FeatureMeans {
    fn of(records: &[&RfmRecord]) -> Self {
        Self {
            frequency: mean(&records.iter().map(|r| f64::from(r.frequency)).collect::<Vec<_>>()),
            monetary: mean(&records.iter().map(|r| r.monetary).collect::<Vec<_>>()),
            recency: mean(&records.iter().map(|r| r.recency as f64).collect::<Vec<_>>()),
        }
    }
}

/// Name a cluster by comparing its means with the population means
///
/// Frequency and spend above average decide the family; a recency below
/// average (more recent) picks the active variant.
pub fn name_behavioral_segment(
    cluster: &FeatureMeans,
    overall: &FeatureMeans,
) -> BehavioralSegmentName {
    let frequent = cluster.frequency > overall.frequency;
    let big_spender = cluster.monetary > overall.monetary;
    let recent = cluster.recency < overall.recency;

    match (frequent, big_spender, recent) {
        (true, true, true) => BehavioralSegmentName::Vip,
        (true, true, false) => BehavioralSegmentName::FormerVip,
        (true, false, true) => BehavioralSegmentName::Loyal,
        (true, false, false) => BehavioralSegmentName::AtRisk,
        (false, true, true) => BehavioralSegmentName::HighSpender,
        (false, true, false) => BehavioralSegmentName::DormantHighSpender,
        (false, false, true) => BehavioralSegmentName::NewOrGeneral,
        (false, false, false) => BehavioralSegmentName::LowEngagement,
    }
}

/// Fit diagnostics for one candidate cluster count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCandidate {
    pub k: usize,
    pub inertia: f64,
    pub silhouette: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub cluster_id: usize,
    pub name: BehavioralSegmentName,
    pub customer_count: usize,
    pub means: FeatureMeans,
}

/// RFM row augmented with its behavioral cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralRecord {
    #[serde(flatten)]
    pub rfm: RfmRecord,
    pub behavioral_segment: usize,
    pub behavioral_segment_name: BehavioralSegmentName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationResult {
    pub optimal_k: usize,
    pub silhouette: f64,
    pub inertia: f64,
    pub candidates: Vec<ClusterCandidate>,
    pub overall_means: FeatureMeans,
    pub profiles: Vec<ClusterProfile>,
    pub records: Vec<BehavioralRecord>,
}

impl SegmentationResult {
    /// Name of a populated cluster
    pub fn segment_name(&self, cluster_id: usize) -> Option<BehavioralSegmentName> {
        self.profiles
            .iter()
            .find(|profile| profile.cluster_id == cluster_id)
            .map(|profile| profile.name)
    }
}

/// Demographic labels of one customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographicRecord {
    pub customer_id: String,
    pub age_group: String,
    pub gender_age_segment: String,
    pub region_gender_segment: String,
    pub demographic_segment: String,
}

/// Generational age band
pub fn age_group(age: Option<u32>) -> &'static str {
    match age {
        None => "Unknown",
        Some(age) if age < 25 => "Gen Z (18-24)",
        Some(age) if age < 35 => "Millennial (25-34)",
        Some(age) if age < 45 => "Gen X (35-44)",
        Some(age) if age < 55 => "Early Boomer (45-54)",
        Some(_) => "Late Boomer (55+)",
    }
}

/// Demographic labels for every customer
pub fn demographic_segments(customers: &[Customer]) -> Vec<DemographicRecord> {
    customers
        .iter()
        .map(|customer| {
            let age_group = age_group(customer.age);
            DemographicRecord {
                customer_id: customer.customer_id.clone(),
                age_group: age_group.to_string(),
                gender_age_segment: format!("{}_{}", customer.gender, age_group),
                region_gender_segment: format!("{}_{}", customer.region, customer.gender),
                demographic_segment: format!(
                    "{}_{}_{}",
                    customer.region, customer.gender, age_group
                ),
            }
        })
        .collect()
}

/// Average behavior of the customers carrying one segment name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub customer_count: usize,
    pub avg_frequency: f64,
    pub avg_monetary: f64,
    pub avg_recency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationOverview {
    pub total_customers: usize,
    pub optimal_k: Option<usize>,
    pub silhouette: Option<f64>,
    pub age_distribution: BTreeMap<String, usize>,
    pub gender_distribution: BTreeMap<String, usize>,
    pub region_distribution: BTreeMap<String, usize>,
}

pub type SegmentationInsights = InsightReport<SegmentationOverview, BehaviorProfile>;

struct FittedModel {
    data: RfmData,
    model: KMeansModel,
}

/// Behavioral segmentation engine
pub struct SegmentationAnalyzer {
    config: SegmentationConfig,
    fitted: Option<FittedModel>,
    result: Option<SegmentationResult>,
    demographics: Vec<DemographicRecord>,
    customers: Vec<Customer>,
}

impl SegmentationAnalyzer {
    pub fn new(config: SegmentationConfig) -> Self {
        Self {
            config,
            fitted: None,
            result: None,
            demographics: Vec::new(),
            customers: Vec::new(),
        }
    }

    /// Latest behavioral result; `None` until a segmentation succeeds
    pub fn result(&self) -> Option<&SegmentationResult> {
        self.result.as_ref()
    }

    /// Cluster customers on standardized frequency, monetary and recency
    ///
    /// # Arguments
    /// * `rfm` - Scored RFM table, one row per customer
    ///
    /// # Returns
    /// * The chosen cluster count with per-k diagnostics, named cluster
    ///   profiles and one behavioral record per customer. Every cluster count
    ///   in the configured range is fitted with the same seed; the count with
    ///   the highest silhouette wins, ties going to the smaller count.
    ///
    /// Any earlier result is discarded first, so a failed call leaves no
    /// fitted model behind.
    pub fn behavioral_segmentation(
        &mut self,
        rfm: &[RfmRecord],
    ) -> AnalyticsResult<&SegmentationResult> {
        log::info!("behavioral segmentation of {} customers", rfm.len());
        self.fitted = None;
        self.result = None;

        let n = rfm.len();
        let min_k = self.config.min_clusters.max(2);
        let max_k = self.config.max_clusters.min(n.saturating_sub(1));
        if max_k < min_k {
            return Err(AnalyticsError::InsufficientData(format!(
                "{n} customers cannot be split into at least {min_k} clusters"
            )));
        }

        let data = RfmData::from_rfm_records(rfm)?;

        let mut candidates = Vec::with_capacity(max_k - min_k + 1);
        let mut best: Option<(f64, KMeansModel)> = None;
        for k in min_k..=max_k {
            let model = fit_kmeans(&data.features, k, &self.config)?;
            let silhouette = model.silhouette(&data.features);
            log::debug!("k={k}: inertia {:.3}, silhouette {:.3}", model.inertia, silhouette);
            candidates.push(ClusterCandidate {
                k,
                inertia: model.inertia,
                silhouette,
            });
            if best.as_ref().map_or(true, |(score, _)| silhouette > *score) {
                best = Some((silhouette, model));
            }
        }
        let Some((silhouette, model)) = best else {
            return Err(AnalyticsError::Clustering("no cluster count was fitted".to_string()));
        };
        log::info!(
            "optimal cluster count {} (silhouette {:.3})",
            model.n_clusters,
            silhouette
        );

        let all: Vec<&RfmRecord> = rfm.iter().collect();
        let overall_means = FeatureMeans::of(&all);

        let mut members: Vec<Vec<&RfmRecord>> = vec![Vec::new(); model.n_clusters];
        for (record, &label) in rfm.iter().zip(model.labels.iter()) {
            members[label].push(record);
        }
        let profiles: Vec<ClusterProfile> = members
            .iter()
            .zip(model.cluster_sizes())
            .enumerate()
            .filter(|(_, (_, size))| *size > 0)
            .map(|(cluster_id, (records, customer_count))| {
                let means = FeatureMeans::of(records);
                ClusterProfile {
                    cluster_id,
                    name: name_behavioral_segment(&means, &overall_means),
                    customer_count,
                    means,
                }
            })
            .collect();

        let names: BTreeMap<usize, BehavioralSegmentName> = profiles
            .iter()
            .map(|profile| (profile.cluster_id, profile.name))
            .collect();
        let mut records = Vec::with_capacity(n);
        for (record, &label) in rfm.iter().zip(model.labels.iter()) {
            let Some(&name) = names.get(&label) else {
                continue;
            };
            records.push(BehavioralRecord {
                rfm: record.clone(),
                behavioral_segment: label,
                behavioral_segment_name: name,
            });
        }

        for profile in &profiles {
            log::debug!(
                "cluster {} '{}': {} customers, frequency {:.2}, monetary {:.2}, recency {:.1}",
                profile.cluster_id,
                profile.name,
                profile.customer_count,
                profile.means.frequency,
                profile.means.monetary,
                profile.means.recency
            );
        }

        let result = SegmentationResult {
            optimal_k: model.n_clusters,
            silhouette,
            inertia: model.inertia,
            candidates,
            overall_means,
            profiles,
            records,
        };
        self.fitted = Some(FittedModel { data, model });
        Ok(self.result.insert(result))
    }

    /// Cluster and name for a new (recency, frequency, monetary) triple
    pub fn predict_segment(
        &self,
        recency: f64,
        frequency: f64,
        monetary: f64,
    ) -> AnalyticsResult<(usize, BehavioralSegmentName)> {
        let (Some(fitted), Some(result)) = (&self.fitted, &self.result) else {
            return Err(AnalyticsError::precondition(
                "predict_segment",
                "behavioral_segmentation",
            ));
        };
        let scaled = fitted.data.scale_new_data(&[recency, frequency, monetary])?;
        let cluster = fitted.model.predict(&scaled)?;
        let name = result.segment_name(cluster).ok_or_else(|| {
            AnalyticsError::Clustering(format!("cluster {cluster} has no members"))
        })?;
        Ok((cluster, name))
    }

    /// Age-band, gender and region labels for every customer
    pub fn demographic_segmentation(&mut self, customers: &[Customer]) -> &[DemographicRecord] {
        log::info!("demographic segmentation of {} customers", customers.len());
        self.demographics = demographic_segments(customers);
        self.customers = customers.to_vec();
        &self.demographics
    }

    /// Behavioral profiles, demographic distributions and marketing strategies
    pub fn insights(&self) -> AnalyticsResult<SegmentationInsights> {
        if self.result.is_none() && self.demographics.is_empty() {
            return Err(AnalyticsError::precondition(
                "insights",
                "behavioral_segmentation or demographic_segmentation",
            ));
        }

        let mut by_name: BTreeMap<BehavioralSegmentName, Vec<&RfmRecord>> = BTreeMap::new();
        if let Some(result) = &self.result {
            for record in &result.records {
                by_name
                    .entry(record.behavioral_segment_name)
                    .or_default()
                    .push(&record.rfm);
            }
        }

        let segments = by_name
            .iter()
            .map(|(name, records)| {
                let means = FeatureMeans::of(records);
                (
                    name.to_string(),
                    BehaviorProfile {
                        customer_count: records.len(),
                        avg_frequency: means.frequency,
                        avg_monetary: means.monetary,
                        avg_recency: means.recency,
                    },
                )
            })
            .collect();

        let recommendations = by_name
            .keys()
            .map(|name| {
                (
                    name.to_string(),
                    name.strategies().iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect();

        let mut age_distribution = BTreeMap::new();
        for record in &self.demographics {
            *age_distribution.entry(record.age_group.clone()).or_insert(0) += 1;
        }
        let mut gender_distribution = BTreeMap::new();
        let mut region_distribution = BTreeMap::new();
        for customer in &self.customers {
            *gender_distribution.entry(customer.gender.clone()).or_insert(0) += 1;
            *region_distribution.entry(customer.region.clone()).or_insert(0) += 1;
        }

        let total_customers = match &self.result {
            Some(result) => result.records.len(),
            None => self.demographics.len(),
        };

        Ok(InsightReport {
            overall: SegmentationOverview {
                total_customers,
                optimal_k: self.result.as_ref().map(|r| r.optimal_k),
                silhouette: self.result.as_ref().map(|r| r.silhouette),
                age_distribution,
                gender_distribution,
                region_distribution,
            },
            segments,
            recommendations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn record(id: &str, recency: i64, frequency: u32, monetary: f64) -> RfmRecord {
        RfmRecord {
            customer: Customer::new(id, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            last_order_date: None,
            recency,
            frequency,
            monetary,
            r_score: 3,
            f_score: 3,
            m_score: 3,
            rfm_score: "333".to_string(),
            rfm_avg_score: 3.0,
            segment: None,
        }
    }

    /// Three behavior groups: frequent big recent spenders, occasional
    /// recent buyers, and long-gone low spenders
    fn grouped_records() -> Vec<RfmRecord> {
        let mut records = Vec::new();
        for i in 0..6u32 {
            records.push(record(&format!("V{i}"), 5 + i64::from(i), 20 + i, 2000.0 + 10.0 * f64::from(i)));
            records.push(record(&format!("N{i}"), 20 + i64::from(i), 2 + i % 2, 150.0 + f64::from(i)));
            records.push(record(&format!("L{i}"), 400 + i64::from(i), 1, 30.0 + f64::from(i)));
        }
        records
    }

    fn means(frequency: f64, monetary: f64, recency: f64) -> FeatureMeans {
        FeatureMeans {
            frequency,
            monetary,
            recency,
        }
    }

    #[test]
    fn test_naming_decision_table() {
        let overall = means(5.0, 500.0, 100.0);
        let cases = [
            (means(9.0, 900.0, 10.0), BehavioralSegmentName::Vip),
            (means(9.0, 900.0, 300.0), BehavioralSegmentName::FormerVip),
            (means(9.0, 100.0, 10.0), BehavioralSegmentName::Loyal),
            (means(9.0, 100.0, 300.0), BehavioralSegmentName::AtRisk),
            (means(1.0, 900.0, 10.0), BehavioralSegmentName::HighSpender),
            (means(1.0, 900.0, 300.0), BehavioralSegmentName::DormantHighSpender),
            (means(1.0, 100.0, 10.0), BehavioralSegmentName::NewOrGeneral),
            (means(1.0, 100.0, 300.0), BehavioralSegmentName::LowEngagement),
        ];
        for (cluster, expected) in cases {
            assert_eq!(name_behavioral_segment(&cluster, &overall), expected);
        }
        // equal to the average is not above it, and equal recency is not recent
        assert_eq!(
            name_behavioral_segment(&overall, &overall),
            BehavioralSegmentName::LowEngagement
        );
    }

    #[test]
    fn test_behavioral_segmentation_finds_groups() {
        let records = grouped_records();
        let mut analyzer = SegmentationAnalyzer::new(SegmentationConfig::default());
        let result = analyzer.behavioral_segmentation(&records).unwrap();

        assert_eq!(result.candidates.len(), 6);
        assert_eq!(result.candidates[0].k, 2);
        assert_eq!(result.candidates[5].k, 7);
        assert_eq!(result.records.len(), records.len());
        let best = result
            .candidates
            .iter()
            .map(|c| c.silhouette)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(result.silhouette, best);

        let vip_label = result.records[0].behavioral_segment;
        let vip_name = result.records[0].behavioral_segment_name;
        assert_eq!(vip_name, BehavioralSegmentName::Vip);
        for record in result.records.iter().filter(|r| r.rfm.customer.customer_id.starts_with('V')) {
            assert_eq!(record.behavioral_segment, vip_label);
        }
        let lapsed = result
            .records
            .iter()
            .find(|r| r.rfm.customer.customer_id == "L0")
            .unwrap();
        assert_eq!(lapsed.behavioral_segment_name, BehavioralSegmentName::LowEngagement);
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let records = grouped_records();
        let mut first = SegmentationAnalyzer::new(SegmentationConfig::default());
        let mut second = SegmentationAnalyzer::new(SegmentationConfig::default());

        let a: Vec<usize> = first
            .behavioral_segmentation(&records)
            .unwrap()
            .records
            .iter()
            .map(|r| r.behavioral_segment)
            .collect();
        let b: Vec<usize> = second
            .behavioral_segmentation(&records)
            .unwrap()
            .records
            .iter()
            .map(|r| r.behavioral_segment)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_predict_segment() {
        let records = grouped_records();
        let mut analyzer = SegmentationAnalyzer::new(SegmentationConfig::default());
        assert!(analyzer
            .predict_segment(10.0, 20.0, 2000.0)
            .unwrap_err()
            .is_precondition());

        analyzer.behavioral_segmentation(&records).unwrap();
        let (cluster, name) = analyzer.predict_segment(6.0, 22.0, 2015.0).unwrap();
        let result = analyzer.result().unwrap();
        assert_eq!(cluster, result.records[0].behavioral_segment);
        assert_eq!(name, BehavioralSegmentName::Vip);
    }

    #[test]
    fn test_failed_segmentation_discards_previous_fit() {
        let mut analyzer = SegmentationAnalyzer::new(SegmentationConfig::default());
        analyzer.behavioral_segmentation(&grouped_records()).unwrap();
        assert!(analyzer.result().is_some());

        let tiny = vec![record("A", 1, 1, 1.0), record("B", 2, 2, 2.0)];
        assert!(analyzer.behavioral_segmentation(&tiny).is_err());
        assert!(analyzer.result().is_none());
        assert!(analyzer
            .predict_segment(6.0, 22.0, 2015.0)
            .unwrap_err()
            .is_precondition());
    }

    #[test]
    fn test_too_few_customers() {
        let records = vec![record("A", 1, 1, 1.0), record("B", 2, 2, 2.0)];
        let mut analyzer = SegmentationAnalyzer::new(SegmentationConfig::default());
        assert!(matches!(
            analyzer.behavioral_segmentation(&records),
            Err(AnalyticsError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_demographic_segments() {
        let mut customer = Customer::new("A", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        customer.age = Some(29);
        customer.gender = "F".to_string();
        customer.region = "Seoul".to_string();

        let segments = demographic_segments(&[customer]);
        assert_eq!(
            segments[0],
            DemographicRecord {
                customer_id: "A".to_string(),
                age_group: "Millennial (25-34)".to_string(),
                gender_age_segment: "F_Millennial (25-34)".to_string(),
                region_gender_segment: "Seoul_F".to_string(),
                demographic_segment: "Seoul_F_Millennial (25-34)".to_string(),
            }
        );
        assert_eq!(age_group(Some(18)), "Gen Z (18-24)");
        assert_eq!(age_group(Some(55)), "Late Boomer (55+)");
        assert_eq!(age_group(None), "Unknown");
    }

    #[test]
    fn test_insights() {
        let records = grouped_records();
        let customers: Vec<Customer> = records.iter().map(|r| r.customer.clone()).collect();
        let mut analyzer = SegmentationAnalyzer::new(SegmentationConfig::default());
        assert!(analyzer.insights().unwrap_err().is_precondition());

        analyzer.behavioral_segmentation(&records).unwrap();
        analyzer.demographic_segmentation(&customers);
        let insights = analyzer.insights().unwrap();

        assert_eq!(insights.overall.total_customers, 18);
        assert!(insights.overall.optimal_k.is_some());
        assert_eq!(insights.overall.age_distribution["Unknown"], 18);
        assert_eq!(insights.overall.gender_distribution["Unknown"], 18);
        let counted: usize = insights.segments.values().map(|p| p.customer_count).sum();
        assert_eq!(counted, 18);
        assert!(insights.recommendations.contains_key("VIP Customers"));
    }
}
