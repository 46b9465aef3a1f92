use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::data::ScoredRecord;
use crate::state::ScalerParams;

/// Summary of one successful pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub rows: usize,
    pub regions: usize,
    pub first_month: Option<String>,
    pub last_month: Option<String>,

    pub flagged: usize,
    pub flagged_fraction: f64,
    pub contamination: f64,
    pub seed: u64,
    pub num_estimators: usize,

    /// Raw model score at the anomaly threshold
    pub threshold_offset: f64,

    pub scaler: Vec<ScalerParams>,

    /// SHA-256 (hex) of both serialized output tables
    pub digest: String,
}

impl RunReport {
    pub(crate) fn build(
        anomalies: &[ScoredRecord],
        contamination: f64,
        seed: u64,
        num_estimators: usize,
        threshold_offset: f64,
        scaler: &[ScalerParams],
        digest: String,
    ) -> Self {
        let regions: BTreeSet<&str> = anomalies.iter().map(|r| r.region()).collect();
        let months: BTreeSet<&str> = anomalies.iter().map(|r| r.month()).collect();
        let flagged = anomalies
            .iter()
            .filter(|r| r.anomaly_flag.is_anomalous())
            .count();

        let flagged_fraction = if anomalies.is_empty() {
            0.0
        } else {
            flagged as f64 / anomalies.len() as f64
        };

        Self {
            rows: anomalies.len(),
            regions: regions.len(),
            first_month: months.iter().next().map(|m| m.to_string()),
            last_month: months.iter().next_back().map(|m| m.to_string()),
            flagged,
            flagged_fraction,
            contamination,
            seed,
            num_estimators,
            threshold_offset,
            scaler: scaler.to_vec(),
            digest,
        }
    }

    /// Print run summary
    pub fn print_summary(&self) {
        println!("\n╔════════════════════════════════════════════════╗");
        println!("║         PIPELINE RUN SUMMARY                   ║");
        println!("╠════════════════════════════════════════════════╣");
        println!("║ Rows: {:<42} ║", self.rows);
        println!("║ Regions: {:<39} ║", self.regions);
        println!(
            "║ Months: {:<40} ║",
            format!(
                "{} .. {}",
                self.first_month.as_deref().unwrap_or("-"),
                self.last_month.as_deref().unwrap_or("-")
            )
        );
        println!("╠════════════════════════════════════════════════╣");
        println!("║ Flagged Anomalous: {:<29} ║", self.flagged);
        println!("║ Flagged %: {:<36.2}% ║", self.flagged_fraction * 100.0);
        println!("║ Contamination: {:<33} ║", self.contamination);
        println!("║ Estimators: {:<36} ║", self.num_estimators);
        println!("║ Seed: {:<42} ║", self.seed);
        println!("║ Threshold Offset: {:<30.6} ║", self.threshold_offset);
        println!("╠════════════════════════════════════════════════╣");
        for p in &self.scaler {
            println!(
                "║ {:<20} [{:>11.4}, {:>11.4}] ║",
                p.feature.name(),
                p.min,
                p.max
            );
        }
        println!("╠════════════════════════════════════════════════╣");
        println!("║ Digest: {:<40} ║", &self.digest[..self.digest.len().min(40)]);
        println!("╚════════════════════════════════════════════════╝\n");
    }
}
