use anyhow::Result;
use std::io::Write;

use crate::config::OutputFormat;
use crate::mining::BottleneckAnalysis;
use crate::report::{
    Bottleneck, KpiPrediction, ProcessMap, ProcessReport, ResourceUtilization,
    UnavailableForecast, VariantSummary,
};

use super::summary::render_summary;
use super::CommandOutput;

/// Writes a command's result in the requested format.
///
/// - Summary: color-coded terminal tables
/// - JSON: the result's serde representation, optionally pretty-printed
/// - CSV: one block per section, separated by blank lines
pub fn export(
    result: &CommandOutput<'_>,
    format: OutputFormat,
    pretty: bool,
    output: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Summary => {
            write!(output, "{}", render_summary(result))?;
            Ok(())
        }
        OutputFormat::Json => export_json(result, pretty, output),
        OutputFormat::Csv => export_csv(result, output),
    }
}

fn export_json(result: &CommandOutput<'_>, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

fn export_csv(result: &CommandOutput<'_>, output: &mut dyn Write) -> Result<()> {
    match result {
        CommandOutput::Variants(summary) => write_variants_csv(summary, output),
        CommandOutput::Bottlenecks(analysis) => write_bottleneck_analysis_csv(analysis, output),
        CommandOutput::Forecasts {
            forecasts,
            unavailable_forecasts,
        } => write_forecasts_csv(forecasts, unavailable_forecasts, output),
        CommandOutput::Map(map) => write_transitions_csv(map, output),
        CommandOutput::Report(report) => write_report_csv(report, output),
    }
}

/// Quotes a CSV field, doubling embedded quotes.
fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn write_report_csv(report: &ProcessReport, output: &mut dyn Write) -> Result<()> {
    write_variants_csv(&report.variant_summary, output)?;
    writeln!(output)?;
    write_bottlenecks_csv(&report.bottlenecks, output)?;
    writeln!(output)?;
    write_resources_csv(&report.resource_utilization, output)?;
    writeln!(output)?;
    write_forecasts_csv(&report.forecasts, &report.unavailable_forecasts, output)?;
    writeln!(output)?;
    write_transitions_csv(&report.process_map, output)
}

fn write_variants_csv(summary: &VariantSummary, output: &mut dyn Write) -> Result<()> {
    writeln!(output, "Variant ID,Frequency,Frequency Percentage,Avg Duration,Median Duration,Min Duration,Max Duration,Happy Path,Activity Sequence")?;
    for variant in &summary.variants {
        writeln!(
            output,
            "{},{},{:.1},{:.1},{:.1},{:.1},{:.1},{},{}",
            variant.variant_id,
            variant.frequency,
            variant.frequency_percentage,
            variant.avg_duration_seconds,
            variant.median_duration_seconds,
            variant.min_duration_seconds,
            variant.max_duration_seconds,
            variant.is_happy_path,
            quote(&variant.activity_sequence.join(" > "))
        )?;
    }

    if summary.deviations.is_empty() {
        return Ok(());
    }

    writeln!(output)?;
    writeln!(output, "Deviation ID,Case ID,Variant ID,Kind,Severity,Fitness,Description")?;
    for deviation in &summary.deviations {
        writeln!(
            output,
            "{},{},{},{},{},{:.3},{}",
            deviation.deviation_id,
            quote(&deviation.case_id),
            deviation.variant_id,
            deviation.kind,
            deviation.severity,
            deviation.fitness,
            quote(&deviation.description)
        )?;
    }
    Ok(())
}

fn write_bottleneck_analysis_csv(analysis: &BottleneckAnalysis, output: &mut dyn Write) -> Result<()> {
    write_bottlenecks_csv(&analysis.bottlenecks, output)?;
    writeln!(output)?;
    write_resources_csv(&analysis.resource_utilization, output)
}

fn write_bottlenecks_csv(bottlenecks: &[Bottleneck], output: &mut dyn Write) -> Result<()> {
    writeln!(output, "Activity,Avg Wait,P90 Wait,Frequency,Impact Score,Root Cause")?;
    for bottleneck in bottlenecks {
        writeln!(
            output,
            "{},{:.1},{:.1},{},{:.1},{}",
            quote(&bottleneck.activity),
            bottleneck.avg_wait_time_seconds,
            bottleneck.p90_wait_time_seconds,
            bottleneck.frequency,
            bottleneck.impact_score,
            quote(&bottleneck.root_cause_hypothesis)
        )?;
    }
    Ok(())
}

fn write_resources_csv(resources: &[ResourceUtilization], output: &mut dyn Write) -> Result<()> {
    writeln!(output, "Resource,Total Activities,Avg Activity Duration,Utilization Percentage,Utilization Basis")?;
    for resource in resources {
        let basis = serde_json::to_value(resource.utilization_basis)?;
        writeln!(
            output,
            "{},{},{:.1},{:.1},{}",
            quote(&resource.resource_id),
            resource.total_activities,
            resource.avg_activity_duration_seconds,
            resource.utilization_percentage,
            basis.as_str().unwrap_or_default()
        )?;
    }
    Ok(())
}

fn write_forecasts_csv(
    forecasts: &[KpiPrediction],
    unavailable: &[UnavailableForecast],
    output: &mut dyn Write,
) -> Result<()> {
    writeln!(output, "KPI,Predicted Value,Confidence Lower,Confidence Upper,Confidence Score,Model Version,Risk Factors,Unavailable Reason")?;
    for prediction in forecasts {
        let forecast = &prediction.forecast;
        writeln!(
            output,
            "{},{:.2},{:.2},{:.2},{:.1},{},{},",
            forecast.kpi_type,
            forecast.predicted_value,
            forecast.confidence_lower,
            forecast.confidence_upper,
            forecast.confidence_score,
            forecast.model_version,
            quote(&forecast.risk_factors.join("; "))
        )?;
    }
    for skipped in unavailable {
        writeln!(output, "{},,,,,,,{}", skipped.kpi_type, quote(&skipped.reason))?;
    }
    Ok(())
}

fn write_transitions_csv(map: &ProcessMap, output: &mut dyn Write) -> Result<()> {
    writeln!(output, "Transition,Count")?;
    for (transition, count) in &map.statistics.transition_frequencies {
        writeln!(output, "{},{count}", quote(transition))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{KpiForecast, KpiType, MapFormat, ProcessMapStatistics, ProcessVariant};
    use chrono::Utc;

    fn summary() -> VariantSummary {
        VariantSummary {
            total_cases: 3,
            total_variants: 1,
            variants: vec![ProcessVariant {
                variant_id: "VAR_000".to_string(),
                activity_sequence: vec!["Create \"PO\"".to_string(), "Pay".to_string()],
                frequency: 3,
                frequency_percentage: 100.0,
                avg_duration_seconds: 60.0,
                median_duration_seconds: 60.0,
                min_duration_seconds: 30.0,
                max_duration_seconds: 90.0,
                is_happy_path: true,
            }],
            deviations: vec![],
            conformance_rate: 100.0,
            avg_case_duration_seconds: 60.0,
        }
    }

    fn export_to_string(result: &CommandOutput<'_>, format: OutputFormat) -> String {
        let mut buffer = Vec::new();
        export(result, format, false, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_export_json_variants() {
        let summary = summary();
        let output = export_to_string(&CommandOutput::Variants(&summary), OutputFormat::Json);

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["total_cases"], 3);
        assert_eq!(parsed["variants"][0]["variant_id"], "VAR_000");
    }

    #[test]
    fn test_export_json_forecasts_wraps_both_lists() {
        let unavailable = vec![UnavailableForecast {
            kpi_type: KpiType::Cost,
            reason: "no rate".to_string(),
        }];
        let output = export_to_string(
            &CommandOutput::Forecasts {
                forecasts: &[],
                unavailable_forecasts: &unavailable,
            },
            OutputFormat::Json,
        );

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["forecasts"], serde_json::json!([]));
        assert_eq!(parsed["unavailable_forecasts"][0]["kpi_type"], "cost");
    }

    #[test]
    fn test_export_csv_variants_escapes_quotes() {
        let summary = summary();
        let output = export_to_string(&CommandOutput::Variants(&summary), OutputFormat::Csv);

        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].starts_with("Variant ID,Frequency"));
        assert_eq!(
            lines[1],
            "VAR_000,3,100.0,60.0,60.0,30.0,90.0,true,\"Create \"\"PO\"\" > Pay\""
        );
    }

    #[test]
    fn test_export_csv_forecasts() {
        let forecasts = vec![KpiPrediction {
            forecast: KpiForecast {
                kpi_type: KpiType::Throughput,
                predicted_value: 3.0,
                confidence_lower: 0.0,
                confidence_upper: 6.39,
                prediction_timestamp: Utc::now(),
                model_version: "linear-v1".to_string(),
                risk_factors: vec![],
                confidence_score: 5.0,
            },
            recommendations: vec![],
        }];
        let output = export_to_string(
            &CommandOutput::Forecasts {
                forecasts: &forecasts,
                unavailable_forecasts: &[],
            },
            OutputFormat::Csv,
        );

        assert!(output.contains("throughput,3.00,0.00,6.39,5.0,linear-v1,\"\","));
    }

    #[test]
    fn test_export_csv_transitions() {
        let map = ProcessMap {
            process_map: String::new(),
            statistics: ProcessMapStatistics {
                transition_frequencies: [("A->B".to_string(), 2), ("B->C".to_string(), 1)]
                    .into_iter()
                    .collect(),
                ..ProcessMapStatistics::default()
            },
            format: MapFormat::Json,
        };
        let output = export_to_string(&CommandOutput::Map(&map), OutputFormat::Csv);
        assert_eq!(output, "Transition,Count\n\"A->B\",2\n\"B->C\",1\n");
    }

    #[test]
    fn test_export_summary_renders_tables() {
        let summary = summary();
        let output = export_to_string(&CommandOutput::Variants(&summary), OutputFormat::Summary);
        assert!(output.contains("Process Variants"));
    }
}
