use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use crate::mining::{happy_path_share, BottleneckAnalysis};
use crate::report::{
    Bottleneck, KpiPrediction, ProcessMap, ProcessReport, ResourceUtilization,
    UnavailableForecast, VariantSummary,
};

use super::styling::{bright, bright_yellow, cyan, dim, rate_colored};
use super::tables::{
    color_coded_conformance_cell, color_coded_confidence_cell, color_coded_impact_cell,
    color_coded_utilization_cell, create_cyan_header, create_table, format_duration,
    severity_cell,
};
use super::CommandOutput;

const TOP_ROWS: usize = 10;

/// Renders a command's result as human-readable, color-coded tables.
///
/// The full report gets an overview followed by every section; single
/// commands render only their own section. Rows are capped at ten per table
/// with a trailing "... and N more" line.
///
/// Color coding:
/// - Conformance and share: green above 80%, yellow from 50%, red below
/// - Bottleneck impact: red from 75, yellow from 40
/// - Utilization: red from 90%, yellow from 70%
pub fn render_summary(output: &CommandOutput<'_>) -> String {
    let mut out = String::new();

    match output {
        CommandOutput::Variants(summary) => render_variants(&mut out, summary),
        CommandOutput::Bottlenecks(analysis) => render_bottleneck_analysis(&mut out, analysis),
        CommandOutput::Forecasts {
            forecasts,
            unavailable_forecasts,
        } => {
            render_forecasts(&mut out, forecasts, unavailable_forecasts);
            render_next_steps(&mut out, forecasts, &[]);
        }
        CommandOutput::Map(map) => render_map(&mut out, map, true),
        CommandOutput::Report(report) => render_report(&mut out, report),
    }

    out
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn more_rows(table: &mut comfy_table::Table, hidden: usize, columns: usize) {
    if hidden == 0 {
        return;
    }
    let mut row = vec![Cell::new(format!("... and {hidden} more")).fg(TableColor::DarkGrey)];
    row.extend(vec![Cell::new(""); columns - 1]);
    table.add_row(row);
}

fn render_report(out: &mut String, report: &ProcessReport) {
    add_section_header(out, "📊", "Overview");

    let summary = &report.variant_summary;
    let _ = write!(
        out,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n\n",
        dim("Process:"),
        cyan(report.process_id.as_deref().unwrap_or("all")),
        dim("System:"),
        cyan(report.system_id.as_deref().unwrap_or("all")),
        dim("Events analyzed:"),
        bright_yellow(report.total_events),
        dim("Cases:"),
        bright_yellow(summary.total_cases),
        dim("Variants:"),
        bright_yellow(summary.total_variants),
        dim("Conformance rate:"),
        rate_colored(summary.conformance_rate),
        dim("Avg case duration:"),
        bright_yellow(format_duration(summary.avg_case_duration_seconds)),
        dim("Analysis date:"),
        dim(report.analyzed_at.format("%Y-%m-%d %H:%M UTC"))
    );

    if summary.total_cases == 0 {
        let _ = writeln!(out, "{}", bright_yellow("No events found."));
        return;
    }

    render_variants(out, summary);
    render_bottlenecks(out, &report.bottlenecks);
    render_resources(out, &report.resource_utilization);
    render_forecasts(out, &report.forecasts, &report.unavailable_forecasts);
    render_map(out, &report.process_map, false);
    render_next_steps(out, &report.forecasts, &report.bottlenecks);
}

fn render_variants(out: &mut String, summary: &VariantSummary) {
    add_section_header(out, "🔀", "Process Variants");

    if summary.variants.is_empty() {
        let _ = writeln!(out, "{}\n", bright_yellow("No cases found."));
        return;
    }

    let _ = writeln!(
        out,
        "  {} {}  {} {}\n",
        dim("Happy path share:"),
        rate_colored(happy_path_share(summary)),
        dim("Conformance:"),
        rate_colored(summary.conformance_rate)
    );

    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "Variant",
        "Cases",
        "Share",
        "Avg Duration",
        "Median",
        "Activity Sequence",
    ]));

    for variant in summary.variants.iter().take(TOP_ROWS) {
        let label = if variant.is_happy_path {
            Cell::new(format!("{} ★", variant.variant_id)).fg(TableColor::Green)
        } else {
            Cell::new(&variant.variant_id)
        };
        table.add_row(vec![
            label,
            Cell::new(variant.frequency),
            color_coded_conformance_cell(variant.frequency_percentage),
            Cell::new(format_duration(variant.avg_duration_seconds)),
            Cell::new(format_duration(variant.median_duration_seconds)),
            Cell::new(variant.activity_sequence.join(" → ")),
        ]);
    }
    more_rows(
        &mut table,
        summary.variants.len().saturating_sub(TOP_ROWS),
        6,
    );
    let _ = writeln!(out, "{table}\n");

    if summary.deviations.is_empty() {
        return;
    }

    add_section_header(out, "⚠️", "Deviations");
    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "Case", "Variant", "Kind", "Severity", "Fitness", "Description",
    ]));
    for deviation in summary.deviations.iter().take(TOP_ROWS) {
        table.add_row(vec![
            Cell::new(&deviation.case_id),
            Cell::new(&deviation.variant_id),
            Cell::new(deviation.kind.to_string()),
            severity_cell(deviation.severity),
            Cell::new(format!("{:.2}", deviation.fitness)),
            Cell::new(&deviation.description),
        ]);
    }
    more_rows(
        &mut table,
        summary.deviations.len().saturating_sub(TOP_ROWS),
        6,
    );
    let _ = writeln!(out, "{table}\n");
}

fn render_bottleneck_analysis(out: &mut String, analysis: &BottleneckAnalysis) {
    render_bottlenecks(out, &analysis.bottlenecks);
    render_resources(out, &analysis.resource_utilization);
}

fn render_bottlenecks(out: &mut String, bottlenecks: &[Bottleneck]) {
    add_section_header(out, "🐢", "Bottlenecks");

    if bottlenecks.is_empty() {
        let _ = writeln!(out, "{}\n", dim("No anomalous waits detected."));
        return;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "Activity",
        "Observations",
        "Avg Wait",
        "P90 Wait",
        "Impact",
        "Root Cause Hypothesis",
    ]));
    for bottleneck in bottlenecks.iter().take(TOP_ROWS) {
        table.add_row(vec![
            Cell::new(&bottleneck.activity),
            Cell::new(bottleneck.frequency),
            Cell::new(format_duration(bottleneck.avg_wait_time_seconds)),
            Cell::new(format_duration(bottleneck.p90_wait_time_seconds)),
            color_coded_impact_cell(bottleneck.impact_score),
            Cell::new(&bottleneck.root_cause_hypothesis),
        ]);
    }
    more_rows(&mut table, bottlenecks.len().saturating_sub(TOP_ROWS), 6);
    let _ = writeln!(out, "{table}\n");
}

fn render_resources(out: &mut String, resources: &[ResourceUtilization]) {
    add_section_header(out, "👥", "Resource Utilization");

    if resources.is_empty() {
        let _ = writeln!(out, "{}\n", dim("No events carry a user."));
        return;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "Resource",
        "Activities",
        "Avg Duration",
        "Utilization",
        "Top Activity",
    ]));
    for resource in resources.iter().take(TOP_ROWS) {
        let top_activity = resource
            .workload_distribution
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map_or_else(String::new, |(activity, count)| format!("{activity} ({count})"));
        table.add_row(vec![
            Cell::new(&resource.resource_id),
            Cell::new(resource.total_activities),
            Cell::new(format_duration(resource.avg_activity_duration_seconds)),
            color_coded_utilization_cell(resource.utilization_percentage),
            Cell::new(top_activity),
        ]);
    }
    more_rows(&mut table, resources.len().saturating_sub(TOP_ROWS), 5);
    let _ = writeln!(out, "{table}\n");
}

fn render_forecasts(
    out: &mut String,
    forecasts: &[KpiPrediction],
    unavailable: &[UnavailableForecast],
) {
    add_section_header(out, "🔮", "KPI Forecasts");

    if !forecasts.is_empty() {
        let mut table = create_table();
        table.set_header(create_cyan_header(&[
            "KPI",
            "Predicted",
            "95% Interval",
            "Confidence",
            "Risk Factors",
        ]));
        for prediction in forecasts {
            let forecast = &prediction.forecast;
            table.add_row(vec![
                Cell::new(forecast.kpi_type.as_str()),
                Cell::new(format!("{:.2}", forecast.predicted_value)),
                Cell::new(format!(
                    "{:.2} – {:.2}",
                    forecast.confidence_lower, forecast.confidence_upper
                )),
                color_coded_confidence_cell(forecast.confidence_score),
                Cell::new(forecast.risk_factors.join("\n")),
            ]);
        }
        let _ = writeln!(out, "{table}");
    }

    for skipped in unavailable {
        let _ = writeln!(
            out,
            "  {} {}",
            dim(format!("{} unavailable:", skipped.kpi_type)),
            dim(&skipped.reason)
        );
    }
    out.push('\n');
}

fn render_map(out: &mut String, map: &ProcessMap, include_diagram: bool) {
    add_section_header(out, "🗺️", "Process Map");

    let stats = &map.statistics;
    let _ = write!(
        out,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n\n",
        dim("Activities:"),
        bright_yellow(stats.total_activities),
        dim("Distinct transitions:"),
        bright_yellow(stats.total_transitions),
        dim("Start activities:"),
        cyan(stats.start_activities.join(", ")),
        dim("End activities:"),
        cyan(stats.end_activities.join(", ")),
        dim("Avg path length:"),
        bright_yellow(format!("{:.1}", stats.avg_path_length)),
        dim("Max parallel activities:"),
        bright_yellow(stats.max_parallel_activities)
    );

    if include_diagram && !map.process_map.is_empty() {
        let _ = writeln!(out, "{}\n", map.process_map);
    }
}

fn render_next_steps(out: &mut String, forecasts: &[KpiPrediction], bottlenecks: &[Bottleneck]) {
    let mut steps: Vec<String> = vec![];
    if let Some(worst) = bottlenecks.first() {
        steps.push(format!(
            "Investigate waits before '{}' ({})",
            worst.activity, worst.root_cause_hypothesis
        ));
    }
    for recommendation in forecasts.iter().flat_map(|p| &p.recommendations) {
        if !steps.contains(recommendation) {
            steps.push(recommendation.clone());
        }
    }

    if steps.is_empty() {
        return;
    }

    add_section_header(out, "💡", "Next Steps");
    for step in steps {
        let _ = writeln!(out, "  • {step}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{
        KpiForecast, KpiType, MapFormat, ProcessMapStatistics, ProcessVariant, UtilizationBasis,
    };
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn variant(id: &str, sequence: &[&str], frequency: usize, happy: bool) -> ProcessVariant {
        ProcessVariant {
            variant_id: id.to_string(),
            activity_sequence: sequence.iter().map(|a| (*a).to_string()).collect(),
            frequency,
            frequency_percentage: 50.0,
            avg_duration_seconds: 5400.0,
            median_duration_seconds: 3600.0,
            min_duration_seconds: 60.0,
            max_duration_seconds: 7200.0,
            is_happy_path: happy,
        }
    }

    fn summary() -> VariantSummary {
        VariantSummary {
            total_cases: 4,
            total_variants: 2,
            variants: vec![
                variant("VAR_000", &["Create PO", "Approve PO"], 2, true),
                variant("VAR_001", &["Create PO"], 2, false),
            ],
            deviations: vec![],
            conformance_rate: 50.0,
            avg_case_duration_seconds: 5400.0,
        }
    }

    fn bottleneck() -> Bottleneck {
        Bottleneck {
            activity: "Approve PO".to_string(),
            avg_wait_time_seconds: 28.0,
            p90_wait_time_seconds: 100.0,
            frequency: 5,
            impact_score: 100.0,
            root_cause_hypothesis: "High variability in processing time".to_string(),
        }
    }

    fn prediction() -> KpiPrediction {
        KpiPrediction {
            forecast: KpiForecast {
                kpi_type: KpiType::Delay,
                predicted_value: 5400.0,
                confidence_lower: 1000.0,
                confidence_upper: 9800.0,
                prediction_timestamp: Utc::now(),
                model_version: "linear-v1".to_string(),
                risk_factors: vec!["Low conformance rate: 50.0%".to_string()],
                confidence_score: 12.0,
            },
            recommendations: vec!["Review deviating cases".to_string()],
        }
    }

    fn report() -> ProcessReport {
        ProcessReport {
            process_id: Some("P2P".to_string()),
            system_id: None,
            analyzed_at: Utc::now(),
            total_events: 6,
            variant_summary: summary(),
            bottlenecks: vec![bottleneck()],
            resource_utilization: vec![ResourceUtilization {
                resource_id: "ana".to_string(),
                total_activities: 3,
                avg_activity_duration_seconds: 30.0,
                utilization_percentage: 30.0,
                utilization_basis: UtilizationBasis::Proxy,
                workload_distribution: BTreeMap::from([
                    ("Approve PO".to_string(), 1),
                    ("Create PO".to_string(), 2),
                ]),
            }],
            forecasts: vec![prediction()],
            unavailable_forecasts: vec![UnavailableForecast {
                kpi_type: KpiType::Cost,
                reason: "no cost-per-hour rate is configured".to_string(),
            }],
            process_map: ProcessMap {
                process_map: "graph TD".to_string(),
                statistics: ProcessMapStatistics {
                    total_activities: 2,
                    start_activities: vec!["Create PO".to_string()],
                    ..ProcessMapStatistics::default()
                },
                format: MapFormat::Mermaid,
            },
        }
    }

    #[test]
    fn test_render_report_includes_every_section() {
        let report = report();
        let output = render_summary(&CommandOutput::Report(&report));

        assert!(output.contains("Overview"));
        assert!(output.contains("P2P"));
        assert!(output.contains("Process Variants"));
        assert!(output.contains("Create PO → Approve PO"));
        assert!(output.contains("Bottlenecks"));
        assert!(output.contains("Resource Utilization"));
        assert!(output.contains("Create PO (2)"));
        assert!(output.contains("KPI Forecasts"));
        assert!(output.contains("cost unavailable:"));
        assert!(output.contains("Process Map"));
        assert!(output.contains("Next Steps"));
        assert!(output.contains("Investigate waits before 'Approve PO'"));
        // the diagram itself is only printed by the map command
        assert!(!output.contains("graph TD"));
    }

    #[test]
    fn test_render_report_without_cases() {
        let mut report = report();
        report.variant_summary = VariantSummary::default();
        let output = render_summary(&CommandOutput::Report(&report));

        assert!(output.contains("No events found."));
        assert!(!output.contains("Bottlenecks"));
    }

    #[test]
    fn test_render_summary_formats_durations() {
        let summary = summary();
        let output = render_summary(&CommandOutput::Variants(&summary));
        assert!(output.contains("1.5h"));
        assert!(output.contains("VAR_000 ★"));
    }

    #[test]
    fn test_render_map_prints_diagram() {
        let report = report();
        let output = render_summary(&CommandOutput::Map(&report.process_map));
        assert!(output.contains("graph TD"));
        assert!(output.contains("Create PO"));
    }

    #[test]
    fn test_render_summary_truncates_long_tables() {
        let mut summary = summary();
        summary.variants = (0..12)
            .map(|idx| variant(&format!("VAR_{idx:03}"), &["A"], 1, idx == 0))
            .collect();
        let output = render_summary(&CommandOutput::Variants(&summary));
        assert!(output.contains("... and 2 more"));
        assert!(!output.contains("VAR_011"));
    }

    #[test]
    fn test_render_bottlenecks_without_findings() {
        let analysis = BottleneckAnalysis::default();
        let output = render_summary(&CommandOutput::Bottlenecks(&analysis));
        assert!(output.contains("No anomalous waits detected."));
        assert!(output.contains("No events carry a user."));
    }
}
