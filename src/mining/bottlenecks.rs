use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use serde::Serialize;

use super::event_log::{seconds_between, Event, EventLog};
use super::stats::{calculate_rate, cmp_f64, mean, percentile};
use crate::report::{Bottleneck, ResourceUtilization, UtilizationBasis};

const CONCENTRATION_SHARE: f64 = 80.0;
const EXTREME_DELAY_RATIO: f64 = 3.0;
const PROXY_PERCENT_PER_ACTIVITY: f64 = 10.0;

/// Tunables for bottleneck detection and resource utilization.
#[derive(Debug, Clone, PartialEq)]
pub struct BottleneckSettings {
    /// Percentile of the wait distribution compared against the mean.
    pub percentile: f64,
    /// An activity is flagged when its percentile wait exceeds `ratio * mean`.
    pub ratio: f64,
    /// Working time available to each resource over the log's period, in seconds.
    pub available_seconds_per_resource: Option<f64>,
}

impl Default for BottleneckSettings {
    fn default() -> Self {
        Self {
            percentile: 90.0,
            ratio: 1.5,
            available_seconds_per_resource: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BottleneckAnalysis {
    pub bottlenecks: Vec<Bottleneck>,
    pub resource_utilization: Vec<ResourceUtilization>,
}

#[derive(Default)]
struct WaitData<'a> {
    waits: Vec<f64>,
    performers: HashMap<&'a str, usize>,
}

/// Finds activities with anomalous incoming wait times and rolls up resource workload.
///
/// The wait before an activity is the gap since the previous event of the same
/// case and is attributed to the activity being waited for. Resource figures are
/// computed independently from `user_id`; events without one are skipped.
pub fn analyze_bottlenecks(log: &EventLog, settings: &BottleneckSettings) -> BottleneckAnalysis {
    info!("Analyzing bottlenecks from {} events", log.len());

    if log.is_empty() {
        return BottleneckAnalysis::default();
    }

    let wait_data = collect_wait_times(log);

    let mut bottlenecks: Vec<Bottleneck> = wait_data
        .iter()
        .filter_map(|(activity, data)| evaluate_activity(activity, data, settings))
        .collect();

    bottlenecks.sort_by(|a, b| {
        cmp_f64(b.impact_score, a.impact_score).then_with(|| a.activity.cmp(&b.activity))
    });

    let resource_utilization = calculate_resource_utilization(log.events(), settings);

    debug!(
        "Flagged {} bottlenecks out of {} waited-for activities; {} resources",
        bottlenecks.len(),
        wait_data.len(),
        resource_utilization.len()
    );

    BottleneckAnalysis {
        bottlenecks,
        resource_utilization,
    }
}

fn collect_wait_times(log: &EventLog) -> HashMap<&str, WaitData<'_>> {
    let mut wait_data: HashMap<&str, WaitData<'_>> = HashMap::new();

    for case in log.cases() {
        for pair in case.events.windows(2) {
            let (previous, current) = (pair[0], pair[1]);
            let data = wait_data.entry(current.activity.as_str()).or_default();
            data.waits
                .push(seconds_between(previous.timestamp, current.timestamp));
            if let Some(user) = current.user_id.as_deref() {
                *data.performers.entry(user).or_insert(0) += 1;
            }
        }
    }

    for data in wait_data.values_mut() {
        data.waits.sort_by(|a, b| cmp_f64(*a, *b));
    }

    wait_data
}

fn evaluate_activity(
    activity: &str,
    data: &WaitData<'_>,
    settings: &BottleneckSettings,
) -> Option<Bottleneck> {
    if data.waits.is_empty() {
        return None;
    }

    let avg_wait = mean(&data.waits);
    // Percentiles are undefined below two samples
    let tail_wait = if data.waits.len() < 2 {
        avg_wait
    } else {
        percentile(&data.waits, settings.percentile)
    };

    if avg_wait <= 0.0 || tail_wait <= avg_wait * settings.ratio {
        return None;
    }

    let ratio = tail_wait / avg_wait;
    Some(Bottleneck {
        activity: activity.to_string(),
        avg_wait_time_seconds: avg_wait,
        p90_wait_time_seconds: tail_wait,
        frequency: data.waits.len(),
        impact_score: ((ratio - 1.0) * 50.0).min(100.0),
        root_cause_hypothesis: hypothesize_root_cause(ratio, data),
    })
}

fn hypothesize_root_cause(ratio: f64, data: &WaitData<'_>) -> String {
    let dominant = data
        .performers
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)));

    if let Some((user, &count)) = dominant {
        let share = calculate_rate(count, data.waits.len());
        if data.waits.len() >= 2 && share >= CONCENTRATION_SHARE {
            return format!(
                "Workload concentrated on resource {user} ({share:.0}% of executions)"
            );
        }
    }

    if ratio >= EXTREME_DELAY_RATIO {
        "Intermittent extreme delays: a minority of cases wait far longer than typical, \
         suggesting queueing or an external dependency"
            .to_string()
    } else {
        "High variability in processing time".to_string()
    }
}

fn calculate_resource_utilization(
    events: &[Event],
    settings: &BottleneckSettings,
) -> Vec<ResourceUtilization> {
    let mut by_resource: BTreeMap<&str, Vec<&Event>> = BTreeMap::new();
    for event in events {
        if let Some(user) = event.user_id.as_deref() {
            by_resource.entry(user).or_default().push(event);
        }
    }

    let mut utilization: Vec<ResourceUtilization> = by_resource
        .into_iter()
        .map(|(resource_id, events)| build_resource_utilization(resource_id, &events, settings))
        .collect();

    utilization.sort_by(|a, b| {
        b.total_activities
            .cmp(&a.total_activities)
            .then_with(|| a.resource_id.cmp(&b.resource_id))
    });
    utilization
}

#[allow(clippy::cast_precision_loss)]
fn build_resource_utilization(
    resource_id: &str,
    events: &[&Event],
    settings: &BottleneckSettings,
) -> ResourceUtilization {
    let mut workload_distribution: BTreeMap<String, usize> = BTreeMap::new();
    for event in events {
        *workload_distribution
            .entry(event.activity.clone())
            .or_insert(0) += 1;
    }

    let durations: Vec<f64> = events.iter().filter_map(|e| e.duration_seconds).collect();

    let (utilization_percentage, utilization_basis) = match settings
        .available_seconds_per_resource
        .filter(|available| *available > 0.0)
    {
        Some(available) => (
            (durations.iter().sum::<f64>() / available * 100.0).min(100.0),
            UtilizationBasis::WorkingHours,
        ),
        None => (
            (events.len() as f64 * PROXY_PERCENT_PER_ACTIVITY).min(100.0),
            UtilizationBasis::Proxy,
        ),
    };

    ResourceUtilization {
        resource_id: resource_id.to_string(),
        total_activities: events.len(),
        avg_activity_duration_seconds: mean(&durations),
        utilization_percentage,
        utilization_basis,
        workload_distribution,
    }
}
