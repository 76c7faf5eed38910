use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, info};

use super::conformance::{align, ReferenceModel};
use super::event_log::{Case, EventLog};
use super::stats::{calculate_rate, cmp_f64, mean, median};
use crate::report::{DeviationKind, ProcessDeviation, ProcessVariant, VariantSummary};

struct VariantGroup<'a> {
    sequence: Vec<&'a str>,
    cases: Vec<&'a Case<'a>>,
    first_seen: Option<DateTime<Utc>>,
}

/// Correlates an event log into ranked process variants.
///
/// Cases are grouped by their exact activity sequence and ranked by frequency.
/// Equal frequencies are ranked by which sequence was seen first in time (the
/// earliest case start), then lexically, so the ranking does not depend on the
/// order events arrive in. The top-ranked variant is the happy path.
///
/// Without a reference model the conformance rate is the happy path's share of
/// cases. With one, it is the share of cases matching the reference exactly,
/// and every other case yields a `ProcessDeviation`.
pub fn correlate_variants(log: &EventLog, reference: Option<&ReferenceModel>) -> VariantSummary {
    info!("Correlating variants from {} events", log.len());

    let cases = log.cases();
    if cases.is_empty() {
        return VariantSummary::default();
    }

    let total_cases = cases.len();
    let groups = rank_variant_groups(&cases);

    let variants: Vec<ProcessVariant> = groups
        .iter()
        .enumerate()
        .map(|(rank, group)| build_variant(rank, group, total_cases))
        .collect();

    let mut case_durations: Vec<f64> = cases.iter().filter_map(Case::duration_seconds).collect();
    case_durations.sort_by(|a, b| cmp_f64(*a, *b));

    let (conformance_rate, deviations) = match reference {
        Some(model) => check_conformance(model, &groups, &variants, total_cases),
        None => (
            variants.first().map_or(0.0, |v| v.frequency_percentage),
            vec![],
        ),
    };

    debug!(
        "Found {} variants across {} cases ({} deviations)",
        variants.len(),
        total_cases,
        deviations.len()
    );

    VariantSummary {
        total_cases,
        total_variants: variants.len(),
        variants,
        deviations,
        conformance_rate,
        avg_case_duration_seconds: mean(&case_durations),
    }
}

fn rank_variant_groups<'a>(cases: &'a [Case<'a>]) -> Vec<VariantGroup<'a>> {
    let mut groups: HashMap<Vec<&'a str>, VariantGroup<'a>> = HashMap::new();
    for case in cases {
        let sequence = case.activity_sequence();
        let group = groups
            .entry(sequence.clone())
            .or_insert_with(|| VariantGroup {
                sequence,
                cases: vec![],
                first_seen: None,
            });
        group.cases.push(case);
        group.first_seen = match (group.first_seen, case.started_at()) {
            (Some(seen), Some(start)) => Some(seen.min(start)),
            (seen, start) => seen.or(start),
        };
    }

    let mut ranked: Vec<VariantGroup<'a>> = groups.into_values().collect();
    ranked.sort_by(|a, b| {
        b.cases
            .len()
            .cmp(&a.cases.len())
            .then_with(|| a.first_seen.cmp(&b.first_seen))
            .then_with(|| a.sequence.cmp(&b.sequence))
    });
    ranked
}

fn build_variant(rank: usize, group: &VariantGroup<'_>, total_cases: usize) -> ProcessVariant {
    let frequency = group.cases.len();
    // Sorted so the floating-point sums do not depend on case order
    let mut durations: Vec<f64> = group
        .cases
        .iter()
        .filter_map(|case| case.duration_seconds())
        .collect();
    durations.sort_by(|a, b| cmp_f64(*a, *b));

    let min_duration = durations.first().copied().unwrap_or(0.0);
    let max_duration = durations.last().copied().unwrap_or(0.0);

    ProcessVariant {
        variant_id: variant_id(rank),
        activity_sequence: group.sequence.iter().map(|a| (*a).to_string()).collect(),
        frequency,
        frequency_percentage: calculate_rate(frequency, total_cases),
        avg_duration_seconds: mean(&durations),
        median_duration_seconds: median(&durations),
        min_duration_seconds: min_duration,
        max_duration_seconds: max_duration,
        is_happy_path: rank == 0 && frequency > 0,
    }
}

fn variant_id(rank: usize) -> String {
    format!("VAR_{rank:03}")
}

fn check_conformance(
    model: &ReferenceModel,
    groups: &[VariantGroup<'_>],
    variants: &[ProcessVariant],
    total_cases: usize,
) -> (f64, Vec<ProcessDeviation>) {
    let mut conforming = 0;
    let mut deviating: Vec<(&Case<'_>, &str, Vec<&str>)> = vec![];

    for (group, variant) in groups.iter().zip(variants) {
        if model.matches(&group.sequence) {
            conforming += group.cases.len();
        } else {
            deviating.extend(
                group
                    .cases
                    .iter()
                    .map(|case| (*case, variant.variant_id.as_str(), group.sequence.clone())),
            );
        }
    }

    deviating.sort_by(|a, b| {
        a.0.started_at()
            .cmp(&b.0.started_at())
            .then_with(|| a.0.case_id.cmp(b.0.case_id))
    });

    let deviations = deviating
        .into_iter()
        .enumerate()
        .map(|(idx, (case, variant_id, sequence))| {
            build_deviation(idx, model, case.case_id, variant_id, &sequence)
        })
        .collect();

    (calculate_rate(conforming, total_cases), deviations)
}

fn build_deviation(
    idx: usize,
    model: &ReferenceModel,
    case_id: &str,
    variant_id: &str,
    sequence: &[&str],
) -> ProcessDeviation {
    let alignment = align(model, sequence);

    let detail = match alignment.kind {
        DeviationKind::MissingActivity => {
            format!("skipped {}", alignment.missing_activities.join(", "))
        }
        DeviationKind::ExtraActivity => format!(
            "performed unexpected {}",
            alignment.extra_activities.join(", ")
        ),
        DeviationKind::Reordered => "executed the expected activities out of order".to_string(),
    };

    ProcessDeviation {
        deviation_id: format!("DEV_{idx:04}"),
        case_id: case_id.to_string(),
        variant_id: variant_id.to_string(),
        kind: alignment.kind,
        severity: alignment.severity,
        description: format!("Case {case_id} {detail}"),
        expected: model.activities().to_vec(),
        actual: sequence.iter().map(|a| (*a).to_string()).collect(),
        extra_activities: alignment.extra_activities,
        missing_activities: alignment.missing_activities,
        fitness: alignment.fitness,
    }
}
