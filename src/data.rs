//! Customer and order tables, CSV ingest using Polars, and feature scaling

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::rfm::RfmRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use linfa::traits::{Fit, Transformer};
use linfa::Dataset;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Columns every customer table must provide
pub const CUSTOMER_COLUMNS: [&str; 5] = ["customer_id", "signup_date", "age", "gender", "region"];

/// Columns every order table must provide
pub const ORDER_COLUMNS: [&str; 4] = ["order_id", "customer_id", "order_date", "final_amount"];

/// One row of the customer table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub signup_date: NaiveDate,
    pub age: Option<u32>,
    pub gender: String,
    pub region: String,
}

impl Customer {
    /// Customer with placeholder demographics, handy when only signup matters
    pub fn new(customer_id: impl Into<String>, signup_date: NaiveDate) -> Self {
        Self {
            customer_id: customer_id.into(),
            signup_date,
            age: None,
            gender: "Unknown".to_string(),
            region: "Unknown".to_string(),
        }
    }
}

/// One row of the order table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub order_date: NaiveDate,
    pub final_amount: f64,
}

impl Order {
    pub fn new(
        order_id: impl Into<String>,
        customer_id: impl Into<String>,
        order_date: NaiveDate,
        final_amount: f64,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            customer_id: customer_id.into(),
            order_date,
            final_amount,
        }
    }
}

/// Parse a date or timestamp string, keeping only the calendar date
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(timestamp.date());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|timestamp| timestamp.date_naive())
}

/// Load the customer table from a CSV file
pub fn load_customers(file_path: impl AsRef<Path>) -> AnalyticsResult<Vec<Customer>> {
    let df = LazyCsvReader::new(file_path.as_ref())
        .has_header(true)
        .finish()?
        .filter(col("customer_id").is_not_null())
        .collect()?;

    let customers = customers_from_frame(&df)?;
    log::info!(
        "loaded {} customers from {}",
        customers.len(),
        file_path.as_ref().display()
    );
    Ok(customers)
}

/// Load the order table from a CSV file
pub fn load_orders(file_path: impl AsRef<Path>) -> AnalyticsResult<Vec<Order>> {
    let df = LazyCsvReader::new(file_path.as_ref())
        .has_header(true)
        .finish()?
        .filter(
            col("customer_id")
                .is_not_null()
                .and(col("order_id").is_not_null()),
        )
        .collect()?;

    let orders = orders_from_frame(&df)?;
    log::info!(
        "loaded {} orders from {}",
        orders.len(),
        file_path.as_ref().display()
    );
    Ok(orders)
}

/// Convert a customer DataFrame into typed rows
///
/// Rows with a missing id or an unparseable signup date are skipped.
pub fn customers_from_frame(df: &DataFrame) -> AnalyticsResult<Vec<Customer>> {
    require_columns(df, &CUSTOMER_COLUMNS)?;

    let ids = string_values(df, "customer_id")?;
    let signups = string_values(df, "signup_date")?;
    let ages = float_values(df, "age")?;
    let genders = string_values(df, "gender")?;
    let regions = string_values(df, "region")?;

    let mut customers = Vec::with_capacity(df.height());
    let mut skipped = 0usize;
    for i in 0..df.height() {
        let (Some(customer_id), Some(signup_date)) = (
            ids[i].clone(),
            signups[i].as_deref().and_then(parse_date),
        ) else {
            skipped += 1;
            continue;
        };

        customers.push(Customer {
            customer_id,
            signup_date,
            age: ages[i].filter(|age| *age >= 0.0).map(|age| age as u32),
            gender: genders[i].clone().unwrap_or_else(|| "Unknown".to_string()),
            region: regions[i].clone().unwrap_or_else(|| "Unknown".to_string()),
        });
    }

    if skipped > 0 {
        log::warn!("skipped {skipped} customer rows with a missing id or signup date");
    }
    Ok(customers)
}

/// Convert an order DataFrame into typed rows
///
/// Rows with a missing key, an unparseable date, or a missing or negative
/// amount are skipped.
pub fn orders_from_frame(df: &DataFrame) -> AnalyticsResult<Vec<Order>> {
    require_columns(df, &ORDER_COLUMNS)?;

    let order_ids = string_values(df, "order_id")?;
    let customer_ids = string_values(df, "customer_id")?;
    let dates = string_values(df, "order_date")?;
    let amounts = float_values(df, "final_amount")?;

    let mut orders = Vec::with_capacity(df.height());
    let mut skipped = 0usize;
    for i in 0..df.height() {
        let (Some(order_id), Some(customer_id), Some(order_date), Some(final_amount)) = (
            order_ids[i].clone(),
            customer_ids[i].clone(),
            dates[i].as_deref().and_then(parse_date),
            amounts[i].filter(|amount| *amount >= 0.0),
        ) else {
            skipped += 1;
            continue;
        };

        orders.push(Order {
            order_id,
            customer_id,
            order_date,
            final_amount,
        });
    }

    if skipped > 0 {
        log::warn!("skipped {skipped} invalid order rows");
    }
    Ok(orders)
}

fn require_columns(df: &DataFrame, required: &[&str]) -> AnalyticsResult<()> {
    let present = df.get_column_names();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !present.contains(name))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AnalyticsError::InvalidInput(format!(
            "missing required columns: {}",
            missing.join(", ")
        )))
    }
}

fn string_values(df: &DataFrame, name: &str) -> AnalyticsResult<Vec<Option<String>>> {
    let series = df.column(name)?.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|value| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
        .collect();
    Ok(values)
}

fn float_values(df: &DataFrame, name: &str) -> AnalyticsResult<Vec<Option<f64>>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}

/// Standardized behavioral features derived from an RFM table
#[derive(Debug)]
pub struct RfmData {
    /// Standardized features (n_customers, 3) in recency, frequency, monetary order
    pub features: Array2<f64>,
    /// Fitted standard scaler for normalizing new data
    pub scaler: LinearScaler<f64>,
}

impl RfmData {
    /// Build the standardized feature matrix from scored RFM records
    ///
    /// # Arguments
    /// * `records` - RFM rows, one per customer, in the order the rows of
    ///   `features` should follow
    ///
    /// # Returns
    /// * Features scaled to zero mean and unit variance per column; constant
    ///   columns are centred but left unscaled
    pub fn from_rfm_records(records: &[RfmRecord]) -> AnalyticsResult<Self> {
        if records.is_empty() {
            return Err(AnalyticsError::InsufficientData(
                "no RFM records to build features from".to_string(),
            ));
        }

        let mut raw = Vec::with_capacity(records.len() * 3);
        for record in records {
            raw.extend_from_slice(&[
                record.recency as f64,
                f64::from(record.frequency),
                record.monetary,
            ]);
        }

        let raw_features = Array2::from_shape_vec((records.len(), 3), raw)
            .map_err(|e| AnalyticsError::InvalidInput(e.to_string()))?;

        // Create and fit the standard scaler
        let dataset = Dataset::new(raw_features.clone(), Array1::<f64>::zeros(records.len()));
        let scaler = LinearScaler::standard()
            .fit(&dataset)
            .map_err(|e| AnalyticsError::InvalidInput(e.to_string()))?;
        let features = scaler.transform(raw_features);

        Ok(Self { features, scaler })
    }

    /// Scale a new (recency, frequency, monetary) triple using the fitted scaler
    pub fn scale_new_data(&self, rfm: &[f64; 3]) -> AnalyticsResult<Array1<f64>> {
        let input = Array2::from_shape_vec((1, 3), rfm.to_vec())
            .map_err(|e| AnalyticsError::InvalidInput(e.to_string()))?;
        let scaled = self.scaler.transform(input);
        Ok(scaled.row(0).to_owned())
    }
}
