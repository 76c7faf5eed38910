use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    pub process_id: Option<String>,
    pub system_id: Option<String>,
    pub analyzed_at: DateTime<Utc>,
    pub total_events: usize,
    pub variant_summary: VariantSummary,
    pub bottlenecks: Vec<Bottleneck>,
    pub resource_utilization: Vec<ResourceUtilization>,
    pub forecasts: Vec<KpiPrediction>,
    pub unavailable_forecasts: Vec<UnavailableForecast>,
    pub process_map: ProcessMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessVariant {
    pub variant_id: String,
    pub activity_sequence: Vec<String>,
    pub frequency: usize,
    pub frequency_percentage: f64,
    pub avg_duration_seconds: f64,
    pub median_duration_seconds: f64,
    pub min_duration_seconds: f64,
    pub max_duration_seconds: f64,
    pub is_happy_path: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationKind {
    ExtraActivity,
    MissingActivity,
    Reordered,
}

impl fmt::Display for DeviationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ExtraActivity => "extra activity",
            Self::MissingActivity => "missing activity",
            Self::Reordered => "reordered",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Maps an alignment fitness (0-1) onto a severity band.
    pub fn from_fitness(fitness: f64) -> Self {
        if fitness >= 0.8 {
            Self::Low
        } else if fitness >= 0.5 {
            Self::Medium
        } else if fitness >= 0.25 {
            Self::High
        } else {
            Self::Critical
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDeviation {
    pub deviation_id: String,
    pub case_id: String,
    pub variant_id: String,
    pub kind: DeviationKind,
    pub severity: Severity,
    pub description: String,
    pub expected: Vec<String>,
    pub actual: Vec<String>,
    pub extra_activities: Vec<String>,
    pub missing_activities: Vec<String>,
    pub fitness: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantSummary {
    pub total_cases: usize,
    pub total_variants: usize,
    pub variants: Vec<ProcessVariant>,
    pub deviations: Vec<ProcessDeviation>,
    pub conformance_rate: f64,
    pub avg_case_duration_seconds: f64,
}

impl VariantSummary {
    pub fn happy_path(&self) -> Option<&ProcessVariant> {
        self.variants.iter().find(|v| v.is_happy_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub activity: String,
    pub avg_wait_time_seconds: f64,
    pub p90_wait_time_seconds: f64,
    pub frequency: usize,
    pub impact_score: f64,
    pub root_cause_hypothesis: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationBasis {
    /// Bounded activity-count approximation, no working-hours context.
    Proxy,
    WorkingHours,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUtilization {
    pub resource_id: String,
    pub total_activities: usize,
    pub avg_activity_duration_seconds: f64,
    pub utilization_percentage: f64,
    pub utilization_basis: UtilizationBasis,
    pub workload_distribution: BTreeMap<String, usize>,
}

/// KPI requested from a forecaster.
///
/// Deployments may define their own KPI names; those arrive as `Other` and it
/// is up to the forecaster whether it can serve them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum KpiType {
    Delay,
    Throughput,
    AnomalyRisk,
    Cost,
    Other(String),
}

impl KpiType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Delay => "delay",
            Self::Throughput => "throughput",
            Self::AnomalyRisk => "anomaly_risk",
            Self::Cost => "cost",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for KpiType {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "delay" => Self::Delay,
            "throughput" => Self::Throughput,
            "anomaly_risk" => Self::AnomalyRisk,
            "cost" => Self::Cost,
            _ => Self::Other(value),
        }
    }
}

impl From<KpiType> for String {
    fn from(value: KpiType) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for KpiType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl fmt::Display for KpiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiForecast {
    pub kpi_type: KpiType,
    pub predicted_value: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub prediction_timestamp: DateTime<Utc>,
    pub model_version: String,
    pub risk_factors: Vec<String>,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiPrediction {
    pub forecast: KpiForecast,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailableForecast {
    pub kpi_type: KpiType,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MapFormat {
    #[default]
    Mermaid,
    Dot,
    Json,
}

impl fmt::Display for MapFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Mermaid => "mermaid",
            Self::Dot => "dot",
            Self::Json => "json",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessMapStatistics {
    pub total_activities: usize,
    pub total_transitions: usize,
    pub start_activities: Vec<String>,
    pub end_activities: Vec<String>,
    pub avg_path_length: f64,
    pub max_parallel_activities: usize,
    pub transition_frequencies: IndexMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessMap {
    pub process_map: String,
    pub statistics: ProcessMapStatistics,
    pub format: MapFormat,
}
