use chrono::Utc;
use log::debug;

use super::stats::calculate_rate;
use crate::error::{ProcmineError, Result};
use crate::report::{KpiForecast, KpiPrediction, KpiType, ProcessVariant, VariantSummary};

pub const LINEAR_MODEL_VERSION: &str = "linear-v1";

const Z_95: f64 = 1.96;
const LOW_CONFORMANCE_RATE: f64 = 80.0;
const SLOW_DEVIATION_FACTOR: f64 = 1.5;
const UNSTABLE_VARIATION: f64 = 0.2;
/// Coefficient of variation assumed for delay when the sample shows no spread.
const SMALL_SAMPLE_VARIATION: f64 = 0.5;

/// Produces a KPI forecast from variant statistics.
///
/// Implementations must return `ForecastUnavailable` rather than a made-up
/// value when they cannot serve a KPI, and the interval they report has to
/// widen with the uncertainty of the underlying data.
pub trait KpiForecaster: Send + Sync {
    fn model_version(&self) -> &str;

    /// # Errors
    ///
    /// Returns `ForecastUnavailable` when the KPI is unknown to the model or the
    /// summary lacks the history needed to estimate it.
    fn forecast(&self, summary: &VariantSummary, kpi_type: &KpiType) -> Result<KpiPrediction>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSettings {
    /// Variant count above which the process is reported as highly variable.
    pub variant_threshold: usize,
    /// Number of cases at which sample size no longer reduces confidence.
    pub min_cases_for_full_confidence: usize,
    /// Hourly cost of one case in flight; required for `cost` forecasts.
    pub cost_per_hour: Option<f64>,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            variant_threshold: 10,
            min_cases_for_full_confidence: 30,
            cost_per_hour: None,
        }
    }
}

/// Closed-form estimator over the variant summary.
///
/// Delay uses the frequency-weighted spread of variant durations, throughput a
/// Poisson interval on the case count, anomaly risk a Wilson score interval on
/// the non-conforming share, and cost the delay interval priced per hour.
#[derive(Debug, Clone, Default)]
pub struct LinearForecaster {
    settings: ForecastSettings,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Estimate {
    point: f64,
    lower: f64,
    upper: f64,
    samples: usize,
}

impl Estimate {
    fn zero() -> Self {
        Self::around(0.0, 0.0, 0)
    }

    fn around(point: f64, half_width: f64, samples: usize) -> Self {
        Self {
            point,
            lower: point - half_width,
            upper: point + half_width,
            samples,
        }
    }

    fn half_width(&self) -> f64 {
        (self.upper - self.lower) / 2.0
    }

    fn scaled(self, factor: f64) -> Self {
        Self {
            point: self.point * factor,
            lower: self.lower * factor,
            upper: self.upper * factor,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RiskFactor {
    NoHistory,
    HighVariability { variants: usize, threshold: usize },
    LowConformance { rate: f64 },
    SlowDeviations { factor: f64 },
    ReferenceDeviations { cases: usize },
    UnstableHappyPath { min: f64, max: f64 },
}

impl RiskFactor {
    fn describe(&self) -> String {
        match self {
            Self::NoHistory => "No historical cases available".to_string(),
            Self::HighVariability {
                variants,
                threshold,
            } => format!("High variant count: {variants} variants (threshold {threshold})"),
            Self::LowConformance { rate } => format!("Low conformance rate: {rate:.1}%"),
            Self::SlowDeviations { factor } => {
                format!("Deviating variants take {factor:.1}x longer than the happy path")
            }
            Self::ReferenceDeviations { cases } => {
                format!("{cases} cases deviate from the reference model")
            }
            Self::UnstableHappyPath { min, max } => {
                format!("Wide duration spread on the happy path ({min:.0}s to {max:.0}s)")
            }
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            Self::NoHistory => "Collect event history before relying on forecasts",
            Self::HighVariability { .. } => {
                "Consider process standardization to reduce variant count"
            }
            Self::LowConformance { .. } | Self::ReferenceDeviations { .. } => {
                "Review deviating cases against the expected activity sequence"
            }
            Self::SlowDeviations { .. } => {
                "Implement automated workflow for common variants"
            }
            Self::UnstableHappyPath { .. } => {
                "Investigate activities with highest wait times"
            }
        }
    }
}

impl LinearForecaster {
    pub fn new(settings: ForecastSettings) -> Self {
        Self { settings }
    }

    /// Rejects KPIs the model cannot serve regardless of the data.
    fn check_supported(&self, kpi_type: &KpiType) -> Result<()> {
        match kpi_type {
            KpiType::Cost if self.settings.cost_per_hour.is_none() => Err(unavailable(
                kpi_type,
                "no cost-per-hour rate is configured",
            )),
            KpiType::Other(_) => Err(unavailable(
                kpi_type,
                "the linear model has no estimator for this KPI",
            )),
            _ => Ok(()),
        }
    }

    fn estimate(&self, summary: &VariantSummary, kpi_type: &KpiType) -> Result<Estimate> {
        match kpi_type {
            KpiType::Delay => estimate_delay(summary, kpi_type),
            KpiType::Throughput => Ok(estimate_throughput(summary)),
            KpiType::AnomalyRisk => Ok(estimate_anomaly_risk(summary)),
            KpiType::Cost => {
                let rate = self.settings.cost_per_hour.ok_or_else(|| {
                    unavailable(kpi_type, "no cost-per-hour rate is configured")
                })?;
                Ok(estimate_delay(summary, kpi_type)?.scaled(rate / 3600.0))
            }
            KpiType::Other(_) => Err(unavailable(
                kpi_type,
                "the linear model has no estimator for this KPI",
            )),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn confidence_score(&self, estimate: &Estimate) -> f64 {
        if estimate.samples == 0 {
            return 0.0;
        }

        let required = self.settings.min_cases_for_full_confidence.max(1);
        let sufficiency = (estimate.samples as f64 / required as f64).min(1.0);
        let half_width = estimate.half_width();
        let relative_half_width = if estimate.point > 0.0 {
            half_width / estimate.point
        } else if half_width > 0.0 {
            1.0
        } else {
            0.0
        };

        100.0 * sufficiency / (1.0 + relative_half_width)
    }

    fn risk_factors(&self, summary: &VariantSummary) -> Vec<RiskFactor> {
        if summary.total_cases == 0 {
            return vec![RiskFactor::NoHistory];
        }

        let mut factors = vec![];

        if summary.total_variants > self.settings.variant_threshold {
            factors.push(RiskFactor::HighVariability {
                variants: summary.total_variants,
                threshold: self.settings.variant_threshold,
            });
        }

        if summary.conformance_rate < LOW_CONFORMANCE_RATE {
            factors.push(RiskFactor::LowConformance {
                rate: summary.conformance_rate,
            });
        }

        if let Some(happy) = summary.happy_path() {
            if let Some(factor) = slow_deviation_factor(summary, happy) {
                factors.push(RiskFactor::SlowDeviations { factor });
            }

            // range/4 approximates the standard deviation
            let sigma = (happy.max_duration_seconds - happy.min_duration_seconds) / 4.0;
            if happy.avg_duration_seconds > 0.0
                && sigma / happy.avg_duration_seconds >= UNSTABLE_VARIATION
            {
                factors.push(RiskFactor::UnstableHappyPath {
                    min: happy.min_duration_seconds,
                    max: happy.max_duration_seconds,
                });
            }
        }

        if !summary.deviations.is_empty() {
            factors.push(RiskFactor::ReferenceDeviations {
                cases: summary.deviations.len(),
            });
        }

        factors
    }
}

impl KpiForecaster for LinearForecaster {
    fn model_version(&self) -> &str {
        LINEAR_MODEL_VERSION
    }

    fn forecast(&self, summary: &VariantSummary, kpi_type: &KpiType) -> Result<KpiPrediction> {
        self.check_supported(kpi_type)?;
        let estimate = if summary.total_cases == 0 {
            Estimate::zero()
        } else {
            self.estimate(summary, kpi_type)?
        };

        let mut confidence_lower = estimate.lower.max(0.0);
        let mut confidence_upper = estimate.upper;
        if *kpi_type == KpiType::AnomalyRisk {
            confidence_lower = confidence_lower.min(100.0);
            confidence_upper = confidence_upper.min(100.0);
        }

        let factors = self.risk_factors(summary);
        let mut recommendations: Vec<String> = vec![];
        for factor in &factors {
            let text = factor.recommendation().to_string();
            if !recommendations.contains(&text) {
                recommendations.push(text);
            }
        }

        debug!(
            "Forecast {kpi_type}: {:.2} [{confidence_lower:.2}, {confidence_upper:.2}] from {} samples",
            estimate.point, estimate.samples
        );

        Ok(KpiPrediction {
            forecast: KpiForecast {
                kpi_type: kpi_type.clone(),
                predicted_value: estimate.point,
                confidence_lower,
                confidence_upper,
                prediction_timestamp: Utc::now(),
                model_version: LINEAR_MODEL_VERSION.to_string(),
                risk_factors: factors.iter().map(RiskFactor::describe).collect(),
                confidence_score: self.confidence_score(&estimate),
            },
            recommendations,
        })
    }
}

fn unavailable(kpi_type: &KpiType, reason: &str) -> ProcmineError {
    ProcmineError::ForecastUnavailable {
        kpi_type: kpi_type.to_string(),
        reason: reason.to_string(),
    }
}

/// Variants whose cases carry a duration: a case needs at least two events.
fn timed_variants(summary: &VariantSummary) -> impl Iterator<Item = &ProcessVariant> {
    summary
        .variants
        .iter()
        .filter(|v| v.activity_sequence.len() >= 2 && v.frequency > 0)
}

#[allow(clippy::cast_precision_loss)]
fn estimate_delay(summary: &VariantSummary, kpi_type: &KpiType) -> Result<Estimate> {
    let samples: usize = timed_variants(summary).map(|v| v.frequency).sum();
    if samples == 0 {
        return Err(unavailable(
            kpi_type,
            "no case has enough events to measure a duration",
        ));
    }

    let n = samples as f64;
    let point = summary.avg_case_duration_seconds;
    let (between, within) = timed_variants(summary).fold((0.0, 0.0), |(between, within), v| {
        let weight = v.frequency as f64 / n;
        let range_sigma = (v.max_duration_seconds - v.min_duration_seconds) / 4.0;
        (
            between + weight * (v.avg_duration_seconds - point).powi(2),
            within + weight * range_sigma.powi(2),
        )
    });

    let mut sigma = (between + within).sqrt();
    if samples < 2 || sigma == 0.0 {
        sigma = sigma.max(point * SMALL_SAMPLE_VARIATION / n.sqrt());
    }
    Ok(Estimate::around(
        point,
        Z_95 * sigma * (1.0 + 1.0 / n).sqrt(),
        samples,
    ))
}

#[allow(clippy::cast_precision_loss)]
fn estimate_throughput(summary: &VariantSummary) -> Estimate {
    let n = summary.total_cases as f64;
    Estimate::around(n, Z_95 * n.sqrt(), summary.total_cases)
}

/// Wilson score interval; stays non-degenerate at 0% and 100%.
#[allow(clippy::cast_precision_loss)]
fn estimate_anomaly_risk(summary: &VariantSummary) -> Estimate {
    let risk = (100.0 - summary.conformance_rate).clamp(0.0, 100.0);
    let share = risk / 100.0;
    let n = summary.total_cases as f64;
    let z2 = Z_95 * Z_95;

    let denominator = 1.0 + z2 / n;
    let center = (share + z2 / (2.0 * n)) / denominator;
    let spread = Z_95 / denominator * (share * (1.0 - share) / n + z2 / (4.0 * n * n)).sqrt();

    Estimate {
        point: risk,
        lower: ((center - spread) * 100.0).clamp(0.0, 100.0),
        upper: ((center + spread) * 100.0).clamp(0.0, 100.0),
        samples: summary.total_cases,
    }
}

/// How much slower deviating variants run on average, when at or beyond the threshold.
#[allow(clippy::cast_precision_loss)]
fn slow_deviation_factor(summary: &VariantSummary, happy: &ProcessVariant) -> Option<f64> {
    if happy.avg_duration_seconds <= 0.0 {
        return None;
    }

    let (weighted, cases) = timed_variants(summary)
        .filter(|v| !v.is_happy_path)
        .fold((0.0, 0usize), |(weighted, cases), v| {
            (
                weighted + v.avg_duration_seconds * v.frequency as f64,
                cases + v.frequency,
            )
        });
    if cases == 0 {
        return None;
    }

    let factor = weighted / cases as f64 / happy.avg_duration_seconds;
    (factor >= SLOW_DEVIATION_FACTOR).then_some(factor)
}

/// Share of cases following the happy path, whatever the conformance basis.
pub fn happy_path_share(summary: &VariantSummary) -> f64 {
    summary
        .happy_path()
        .map_or(0.0, |happy| calculate_rate(happy.frequency, summary.total_cases))
}
