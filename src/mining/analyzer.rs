use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};

use super::bottlenecks::{analyze_bottlenecks, BottleneckSettings};
use super::conformance::ReferenceModel;
use super::forecast::{KpiForecaster, LinearForecaster};
use super::process_map::{generate_process_map, DEFAULT_MAX_RENDERED_EDGES};
use super::source::{ExtractRequest, ExtractedEvents};
use super::variants::correlate_variants;
use crate::error::{ProcmineError, Result};
use crate::output::PhaseProgress;
use crate::report::{
    KpiPrediction, KpiType, MapFormat, ProcessReport, UnavailableForecast, VariantSummary,
};

#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub bottlenecks: BottleneckSettings,
    pub map_format: MapFormat,
    pub max_rendered_edges: usize,
    pub kpis: Vec<KpiType>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            bottlenecks: BottleneckSettings::default(),
            map_format: MapFormat::default(),
            max_rendered_edges: DEFAULT_MAX_RENDERED_EDGES,
            kpis: vec![KpiType::Delay, KpiType::Throughput],
        }
    }
}

/// Runs every analysis over one extracted event log.
pub struct ProcessAnalyzer {
    settings: AnalyzerSettings,
    reference: Option<ReferenceModel>,
    forecaster: Arc<dyn KpiForecaster>,
    show_progress: bool,
}

impl ProcessAnalyzer {
    pub fn new(settings: AnalyzerSettings) -> Self {
        Self {
            settings,
            reference: None,
            forecaster: Arc::new(LinearForecaster::default()),
            show_progress: false,
        }
    }

    #[must_use]
    pub fn with_reference(mut self, reference: Option<ReferenceModel>) -> Self {
        self.reference = reference;
        self
    }

    #[must_use]
    pub fn with_forecaster(mut self, forecaster: Arc<dyn KpiForecaster>) -> Self {
        self.forecaster = forecaster;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Builds the full `ProcessReport` for an extracted log.
    ///
    /// Correlation runs first. Bottleneck analysis and the process map then run
    /// side by side on the blocking pool, followed by one forecast per configured
    /// KPI. A KPI the forecaster cannot serve, or whose forecast fails, is
    /// listed under `unavailable_forecasts` instead of failing the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the correlation, bottleneck or map task panics, or
    /// the process map cannot be serialized.
    pub async fn analyze(
        &self,
        extracted: ExtractedEvents,
        request: &ExtractRequest,
    ) -> Result<ProcessReport> {
        info!(
            "Starting process analysis of {} events (extracted {})",
            extracted.total_events, extracted.extraction_timestamp
        );

        let log = Arc::new(extracted.events);

        // Phase 1: Variant correlation
        let progress = PhaseProgress::start_correlation(self.show_progress);

        let summary = {
            let log = Arc::clone(&log);
            let reference = self.reference.clone();
            tokio::task::spawn_blocking(move || correlate_variants(&log, reference.as_ref()))
                .await?
        };

        // Phase 2: Bottlenecks and process map
        let progress = progress.finish_correlation_start_analysis(summary.total_variants);

        let bottleneck_task = {
            let log = Arc::clone(&log);
            let settings = self.settings.bottlenecks.clone();
            tokio::task::spawn_blocking(move || analyze_bottlenecks(&log, &settings))
        };
        let map_task = {
            let log = Arc::clone(&log);
            let format = self.settings.map_format;
            let max_edges = self.settings.max_rendered_edges;
            tokio::task::spawn_blocking(move || generate_process_map(&log, format, max_edges))
        };
        let (bottleneck_analysis, process_map) = tokio::join!(bottleneck_task, map_task);
        let bottleneck_analysis = bottleneck_analysis?;
        let process_map = process_map??;

        // Phase 3: Forecasting
        let progress = progress.finish_analysis_start_forecasting(self.settings.kpis.len());

        let summary = Arc::new(summary);
        let (forecasts, unavailable_forecasts) = self.forecast_all(&summary).await;

        progress.finish_forecasting();

        info!(
            "Analysis complete: {} variants, {} bottlenecks, {} forecasts",
            summary.total_variants,
            bottleneck_analysis.bottlenecks.len(),
            forecasts.len()
        );

        Ok(ProcessReport {
            process_id: request.process_id.clone(),
            system_id: extracted.system_id,
            analyzed_at: Utc::now(),
            total_events: log.len(),
            variant_summary: Arc::unwrap_or_clone(summary),
            bottlenecks: bottleneck_analysis.bottlenecks,
            resource_utilization: bottleneck_analysis.resource_utilization,
            forecasts,
            unavailable_forecasts,
            process_map,
        })
    }

    async fn forecast_all(
        &self,
        summary: &Arc<VariantSummary>,
    ) -> (Vec<KpiPrediction>, Vec<UnavailableForecast>) {
        let tasks: Vec<_> = self
            .settings
            .kpis
            .iter()
            .cloned()
            .map(|kpi| {
                let summary = Arc::clone(summary);
                let forecaster = Arc::clone(&self.forecaster);
                tokio::task::spawn_blocking(move || forecaster.forecast(&summary, &kpi))
            })
            .collect();

        let results = futures::future::join_all(tasks).await;

        let mut forecasts = vec![];
        let mut unavailable = vec![];
        for (kpi_type, joined) in self.settings.kpis.iter().cloned().zip(results) {
            let reason = match joined {
                Ok(Ok(prediction)) => {
                    forecasts.push(prediction);
                    continue;
                }
                Ok(Err(ProcmineError::ForecastUnavailable { reason, .. })) => reason,
                Ok(Err(err)) => err.to_string(),
                Err(err) => ProcmineError::from(err).to_string(),
            };
            warn!("Skipping {kpi_type} forecast: {reason}");
            unavailable.push(UnavailableForecast { kpi_type, reason });
        }

        (forecasts, unavailable)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::mining::event_log::test_support::log_from;
    use crate::mining::forecast::ForecastSettings;

    fn extracted(log: crate::mining::event_log::EventLog) -> ExtractedEvents {
        ExtractedEvents {
            total_events: log.len(),
            events: log,
            extraction_timestamp: Utc::now(),
            system_id: Some("S4H".to_string()),
        }
    }

    fn purchase_log() -> crate::mining::event_log::EventLog {
        log_from(&[
            ("C1", &[("A", 0), ("B", 60), ("C", 120)]),
            ("C2", &[("A", 1000), ("B", 1100), ("C", 1300)]),
            ("C3", &[("A", 2000), ("C", 2030)]),
        ])
    }

    #[tokio::test]
    async fn builds_complete_report() {
        let request = ExtractRequest {
            process_id: Some("P2P".to_string()),
            ..ExtractRequest::default()
        };
        let report = ProcessAnalyzer::new(AnalyzerSettings::default())
            .analyze(extracted(purchase_log()), &request)
            .await
            .unwrap();

        assert_eq!(report.process_id.as_deref(), Some("P2P"));
        assert_eq!(report.system_id.as_deref(), Some("S4H"));
        assert_eq!(report.total_events, 8);
        assert_eq!(report.variant_summary.total_variants, 2);
        assert_eq!(report.process_map.statistics.total_activities, 3);
        assert!(report.process_map.process_map.starts_with("graph TD"));
        assert_eq!(report.forecasts.len(), 2);
        assert!(report.unavailable_forecasts.is_empty());
    }

    #[tokio::test]
    async fn records_unavailable_forecasts_without_failing() {
        let settings = AnalyzerSettings {
            kpis: vec![
                KpiType::Delay,
                KpiType::Cost,
                KpiType::Other("first_time_right".to_string()),
            ],
            ..AnalyzerSettings::default()
        };
        let report = ProcessAnalyzer::new(settings)
            .with_forecaster(Arc::new(LinearForecaster::new(ForecastSettings::default())))
            .analyze(extracted(purchase_log()), &ExtractRequest::default())
            .await
            .unwrap();

        assert_eq!(report.forecasts.len(), 1);
        assert_eq!(report.forecasts[0].forecast.kpi_type, KpiType::Delay);
        let unavailable: Vec<_> = report
            .unavailable_forecasts
            .iter()
            .map(|u| u.kpi_type.clone())
            .collect();
        assert_eq!(
            unavailable,
            vec![KpiType::Cost, KpiType::Other("first_time_right".to_string())]
        );
    }

    #[tokio::test]
    async fn applies_reference_model() {
        let reference = ReferenceModel::parse_sequence("A,B,C").unwrap();
        let report = ProcessAnalyzer::new(AnalyzerSettings::default())
            .with_reference(Some(reference))
            .analyze(extracted(purchase_log()), &ExtractRequest::default())
            .await
            .unwrap();

        assert_eq!(report.variant_summary.deviations.len(), 1);
        assert_eq!(report.variant_summary.deviations[0].case_id, "C3");
    }

    #[tokio::test]
    async fn empty_log_produces_empty_report() {
        let report = ProcessAnalyzer::new(AnalyzerSettings::default())
            .analyze(
                extracted(crate::mining::event_log::EventLog::default()),
                &ExtractRequest::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.total_events, 0);
        assert_eq!(report.variant_summary.total_cases, 0);
        assert!(report.bottlenecks.is_empty());
        assert!(report.process_map.process_map.is_empty());
        // zero-valued forecasts, not failures
        assert_eq!(report.forecasts.len(), 2);
        assert!(report
            .forecasts
            .iter()
            .all(|p| p.forecast.predicted_value == 0.0));
    }

    struct FailingForecaster {
        panic: bool,
    }

    impl KpiForecaster for FailingForecaster {
        fn model_version(&self) -> &str {
            "failing"
        }

        fn forecast(&self, _summary: &VariantSummary, _kpi: &KpiType) -> Result<KpiPrediction> {
            if self.panic {
                panic!("model crashed");
            }
            Err(ProcmineError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "inference timed out",
            )))
        }
    }

    #[tokio::test]
    async fn forecaster_errors_keep_the_rest_of_the_report() {
        let report = ProcessAnalyzer::new(AnalyzerSettings::default())
            .with_forecaster(Arc::new(FailingForecaster { panic: false }))
            .analyze(extracted(purchase_log()), &ExtractRequest::default())
            .await
            .unwrap();

        assert_eq!(report.variant_summary.total_cases, 3);
        assert!(report.forecasts.is_empty());
        assert_eq!(report.unavailable_forecasts.len(), 2);
        assert_eq!(report.unavailable_forecasts[0].kpi_type, KpiType::Delay);
        assert!(report.unavailable_forecasts[0]
            .reason
            .contains("inference timed out"));
    }

    #[tokio::test]
    async fn panicking_forecaster_is_recorded_as_unavailable() {
        let report = ProcessAnalyzer::new(AnalyzerSettings::default())
            .with_forecaster(Arc::new(FailingForecaster { panic: true }))
            .analyze(extracted(purchase_log()), &ExtractRequest::default())
            .await
            .unwrap();

        assert!(report.forecasts.is_empty());
        let kpis: Vec<_> = report
            .unavailable_forecasts
            .iter()
            .map(|u| u.kpi_type.clone())
            .collect();
        assert_eq!(kpis, vec![KpiType::Delay, KpiType::Throughput]);
        assert_eq!(report.process_map.statistics.total_activities, 3);
    }
}
