//! K-Means clustering model implementation

use crate::config::SegmentationConfig;
use crate::error::{AnalyticsError, AnalyticsResult};
use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_pcg::Pcg64;

/// K-Means model wrapper with fitted parameters
#[derive(Debug)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids in standardized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl KMeansModel {
    /// Predict cluster for new data point
    pub fn predict(&self, features: &Array1<f64>) -> AnalyticsResult<usize> {
        if features.len() != self.centroids.ncols() {
            return Err(AnalyticsError::InvalidInput(format!(
                "feature vector must have exactly {} dimensions",
                self.centroids.ncols()
            )));
        }

        // Find nearest centroid
        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;

        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = euclidean_distance(&features.view(), &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }

        Ok(closest_cluster)
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Mean silhouette coefficient of the training assignment
    pub fn silhouette(&self, features: &Array2<f64>) -> f64 {
        silhouette_score(features, &self.labels, self.n_clusters)
    }
}

/// Fit K-Means on standardized features
///
/// # Arguments
/// * `features` - Standardized feature matrix (n_samples, n_features)
/// * `n_clusters` - Number of clusters to fit, at least 2
/// * `config` - Seed, restart count, iteration cap and tolerance
///
/// # Returns
/// * Fitted model with labels, centroids and inertia. The random generator
///   is seeded from `config.random_seed`, so identical input always produces
///   identical assignments.
pub fn fit_kmeans(
    features: &Array2<f64>,
    n_clusters: usize,
    config: &SegmentationConfig,
) -> AnalyticsResult<KMeansModel> {
    if n_clusters < 2 {
        return Err(AnalyticsError::InvalidInput(
            "number of clusters must be at least 2".to_string(),
        ));
    }

    if features.nrows() < n_clusters {
        return Err(AnalyticsError::InsufficientData(format!(
            "number of data points ({}) must be at least equal to number of clusters ({})",
            features.nrows(),
            n_clusters
        )));
    }

    let dataset = DatasetBase::from(features.clone());
    let rng = Pcg64::seed_from_u64(config.random_seed);

    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .n_runs(config.n_runs)
        .max_n_iterations(config.max_iterations)
        .tolerance(config.tolerance)
        .fit(&dataset)
        .map_err(|e| AnalyticsError::Clustering(e.to_string()))?;

    let labels: Array1<usize> = model.predict(&dataset);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(features, &labels, &centroids);

    Ok(KMeansModel {
        n_clusters,
        labels,
        centroids,
        inertia,
    })
}

/// Mean silhouette coefficient over all points
///
/// Points in single-member clusters score 0. Returns 0 when fewer than two
/// clusters are populated.
pub fn silhouette_score(features: &Array2<f64>, labels: &Array1<usize>, n_clusters: usize) -> f64 {
    let n_samples = features.nrows();
    if n_samples < 2 {
        return 0.0;
    }

    let mut silhouette_sum = 0.0;

    for i in 0..n_samples {
        let point = features.row(i);
        let cluster_label = labels[i];

        // a(i): mean distance to the rest of its own cluster
        let mut same_cluster_distances = Vec::new();
        let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); n_clusters];

        for j in 0..n_samples {
            if i == j {
                continue;
            }

            let distance = euclidean_distance(&point, &features.row(j));
            let other_label = labels[j];

            if other_label == cluster_label {
                same_cluster_distances.push(distance);
            } else if other_label < n_clusters {
                other_cluster_distances[other_label].push(distance);
            }
        }

        if same_cluster_distances.is_empty() {
            continue;
        }
        let a_i = same_cluster_distances.iter().sum::<f64>() / same_cluster_distances.len() as f64;

        // b(i): lowest mean distance to another cluster
        let b_i = other_cluster_distances
            .iter()
            .filter(|distances| !distances.is_empty())
            .map(|distances| distances.iter().sum::<f64>() / distances.len() as f64)
            .fold(f64::INFINITY, f64::min);

        let silhouette_i = if b_i.is_infinite() || a_i.max(b_i) == 0.0 {
            0.0
        } else {
            (b_i - a_i) / a_i.max(b_i)
        };

        silhouette_sum += silhouette_i;
    }

    silhouette_sum / n_samples as f64
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;

    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            let point = features.row(i);
            let centroid = centroids.row(cluster);
            let distance_sq = point
                .iter()
                .zip(centroid.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>();
            inertia += distance_sq;
        }
    }

    inertia
}

/// Calculate Euclidean distance between two points
fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}
